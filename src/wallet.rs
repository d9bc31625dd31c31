//! Ethereum wallet functionality: the connected account, balances, ERC20 reads
//! and transaction submission.
//!
//! [`LedgerClient`] is the boundary the transfer flows are written against.
//! [`Wallet`] implements it over a JSON-RPC [`Provider`] and a [`Signer`].

use crate::eth::{EthError, Provider, RpcReceipt};
use crate::signer::{Signer, SignerError, TransactionData};

use alloy::rpc::types::request::TransactionRequest;
use alloy_primitives::{Address as EthAddress, Bytes, TxHash, TxKind, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

sol! {
    interface IERC20 {
        function balanceOf(address who) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }

    interface IBatchTransfer {
        function batchTransferNative(address[] recipients, uint256[] amounts) external payable;
        function batchTransferToken(address token, address[] recipients, uint256[] amounts) external;
    }
}

/// Decimals of the chain's native currency
pub const ETH_DECIMALS: u8 = 18;

/// Largest decimals value for which `10^decimals` fits comfortably in a U256
const MAX_DECIMALS: u8 = 77;

static DECIMAL_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(\.\d*)?|\.\d+)$").expect("static regex"));

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("signing error: {0}")]
    SignerError(#[from] SignerError),

    #[error("ethereum error: {0}")]
    EthError(#[from] EthError),

    #[error("name resolution error: {0}")]
    NameResolutionError(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("transaction error: {0}")]
    TransactionError(String),

    #[error("gas estimation error: {0}")]
    GasEstimationError(String),
}

/// Parse a 0x-prefixed, 20-byte hex address
pub fn parse_address(input: &str) -> Result<EthAddress, WalletError> {
    let trimmed = input.trim();
    if !(trimmed.starts_with("0x") && trimmed.len() == 42) {
        return Err(WalletError::InvalidAddress(trimmed.to_string()));
    }
    EthAddress::from_str(trimmed).map_err(|_| WalletError::InvalidAddress(trimmed.to_string()))
}

/// Whether `input` looks like a non-negative decimal number such as `1`, `0.5` or `.25`
pub fn is_decimal_literal(input: &str) -> bool {
    DECIMAL_LITERAL.is_match(input.trim())
}

/// An amount in an asset's smallest unit, tagged with the asset's decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    raw: U256,
    decimals: u8,
}

impl Amount {
    pub fn from_raw(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Parse a decimal string like "1.5" exactly into smallest units.
    ///
    /// Fails if the string is not a plain decimal, carries more fractional
    /// digits than the asset supports, or overflows 256 bits.
    pub fn parse(input: &str, decimals: u8) -> Result<Self, WalletError> {
        let input = input.trim();
        if decimals > MAX_DECIMALS {
            return Err(WalletError::InvalidAmount(format!(
                "unsupported decimals: {}",
                decimals
            )));
        }
        if !is_decimal_literal(input) {
            return Err(WalletError::InvalidAmount(format!(
                "not a decimal number: {:?}",
                input
            )));
        }

        let (whole, fraction) = input.split_once('.').unwrap_or((input, ""));
        if fraction.len() > decimals as usize {
            return Err(WalletError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                input, decimals
            )));
        }

        let digits = format!(
            "{}{}{}",
            whole,
            fraction,
            "0".repeat(decimals as usize - fraction.len())
        );
        let digits = digits.trim_start_matches('0');
        let raw = if digits.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(digits, 10)
                .map_err(|_| WalletError::InvalidAmount(format!("{} is too large", input)))?
        };

        Ok(Self { raw, decimals })
    }

    pub fn parse_eth(input: &str) -> Result<Self, WalletError> {
        Self::parse(input, ETH_DECIMALS)
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

impl fmt::Display for Amount {
    /// Decimal notation without trailing zeros, e.g. "1.5" or "3"
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = U256::from(10u8).pow(U256::from(self.decimals));
        let whole = self.raw / unit;
        let fraction = self.raw % unit;
        if fraction.is_zero() {
            return write!(f, "{}", whole);
        }
        let fraction = format!(
            "{:0>width$}",
            fraction.to_string(),
            width = self.decimals as usize
        );
        write!(f, "{}.{}", whole, fraction.trim_end_matches('0'))
    }
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub block_number: u64,
    /// False when the transaction was included but reverted
    pub success: bool,
}

impl From<RpcReceipt> for TxReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.to::<u64>()).unwrap_or(0),
            success: receipt.succeeded(),
        }
    }
}

/// Balance queries, submission and confirmation against the ledger.
///
/// Amounts are always in the asset's smallest unit.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The connected account that signs and pays for transactions
    fn account(&self) -> EthAddress;

    async fn native_balance(&self, owner: EthAddress) -> Result<U256, WalletError>;

    async fn token_balance(&self, token: EthAddress, owner: EthAddress)
        -> Result<U256, WalletError>;

    async fn token_decimals(&self, token: EthAddress) -> Result<u8, WalletError>;

    /// Sign and submit a transaction, returning once the node accepted it
    async fn send_transaction(
        &self,
        to: EthAddress,
        value: U256,
        data: Bytes,
    ) -> Result<TxHash, WalletError>;

    /// Wait until `hash` is mined with enough confirmations
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, WalletError>;
}

/// Confirmation policy for [`Wallet::wait_for_receipt`]
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    pub confirmations: u64,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            confirmations: 1,
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// A signing account bound to a provider
#[derive(Debug, Clone)]
pub struct Wallet<S> {
    provider: Provider,
    signer: S,
    policy: ConfirmationPolicy,
}

impl<S: Signer> Wallet<S> {
    pub fn new(provider: Provider, signer: S, policy: ConfirmationPolicy) -> Self {
        Self {
            provider,
            signer,
            policy,
        }
    }

    /// Token symbol for display, falling back to a generic label
    pub async fn token_symbol(&self, token: EthAddress) -> String {
        call_view_function(token, IERC20::symbolCall {}, &self.provider)
            .await
            .map(|r| r._0)
            .unwrap_or_else(|_| "tokens".to_string())
    }
}

#[async_trait]
impl<S: Signer> LedgerClient for Wallet<S> {
    fn account(&self) -> EthAddress {
        self.signer.address()
    }

    async fn native_balance(&self, owner: EthAddress) -> Result<U256, WalletError> {
        Ok(self.provider.get_balance(owner).await?)
    }

    async fn token_balance(
        &self,
        token: EthAddress,
        owner: EthAddress,
    ) -> Result<U256, WalletError> {
        let call = IERC20::balanceOfCall { who: owner };
        Ok(call_view_function(token, call, &self.provider).await?._0)
    }

    async fn token_decimals(&self, token: EthAddress) -> Result<u8, WalletError> {
        Ok(call_view_function(token, IERC20::decimalsCall {}, &self.provider)
            .await?
            ._0)
    }

    async fn send_transaction(
        &self,
        to: EthAddress,
        value: U256,
        data: Bytes,
    ) -> Result<TxHash, WalletError> {
        prepare_and_send_tx(to, data, value, &self.provider, &self.signer).await
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, WalletError> {
        wait_for_transaction(hash, &self.provider, &self.policy).await
    }
}

//
// HELPER FUNCTIONS
//

/// Helper for making contract view function calls
pub(crate) async fn call_view_function<T: SolCall + Send>(
    contract: EthAddress,
    call: T,
    provider: &Provider,
) -> Result<T::Return, WalletError> {
    let tx = TransactionRequest {
        to: Some(TxKind::Call(contract)),
        input: call.abi_encode().into(),
        ..Default::default()
    };

    let result = provider.call(tx).await?;

    if result.is_empty() {
        return Err(WalletError::TransactionError(format!(
            "empty result from call to {}",
            contract
        )));
    }

    T::abi_decode_returns(&result, true)
        .map_err(|e| WalletError::TransactionError(format!("failed to decode result: {}", e)))
}

/// Fee parameters (max fee, priority fee) based on network type
async fn calculate_gas_params(provider: &Provider) -> Result<(u128, u128), WalletError> {
    match provider.chain_id {
        // Mainnet: 50% buffer and 1.5 gwei priority fee
        1 => {
            let base_fee = latest_base_fee(provider).await?;
            Ok((base_fee + base_fee / 2 + 1_500_000_000, 1_500_000_000))
        }
        // Base
        8453 => {
            let base_fee = latest_base_fee(provider).await?;
            let max_fee = base_fee + base_fee / 3;
            let priority_fee =
                std::cmp::max(100_000u128, std::cmp::min(base_fee / 10, max_fee / 2));
            Ok((max_fee + priority_fee, priority_fee))
        }
        // Optimism: 25% buffer and 0.3 gwei priority fee
        10 => {
            let base_fee = latest_base_fee(provider).await?;
            Ok((base_fee + base_fee / 4 + 300_000_000, 300_000_000))
        }
        // Local dev networks
        31337 | 1337 => Ok((2_000_000_000, 100_000_000)),
        // Default: 30% buffer over the legacy gas price
        _ => {
            let gas_price = provider.get_gas_price().await?.saturating_to::<u128>();
            let adjusted = gas_price * 130 / 100;
            Ok((adjusted, adjusted / 10))
        }
    }
}

async fn latest_base_fee(provider: &Provider) -> Result<u128, WalletError> {
    provider
        .get_latest_block()
        .await?
        .base_fee_per_gas
        .map(|fee| fee.saturating_to::<u128>())
        .ok_or_else(|| WalletError::TransactionError("no base fee in block".into()))
}

/// Fill in nonce, fees and gas limit, sign and broadcast
#[instrument(level = "debug", skip(data, provider, signer), fields(from = %signer.address()))]
async fn prepare_and_send_tx<S: Signer>(
    to: EthAddress,
    data: Bytes,
    value: U256,
    provider: &Provider,
    signer: &S,
) -> Result<TxHash, WalletError> {
    let from = signer.address();
    let nonce = provider.get_transaction_count(from).await?;
    let (max_fee_per_gas, max_priority_fee) = calculate_gas_params(provider).await?;

    let estimate_request = TransactionRequest {
        from: Some(from),
        to: Some(TxKind::Call(to)),
        value: Some(value),
        input: data.clone().into(),
        ..Default::default()
    };
    // 20% buffer over the node's estimate
    let gas_limit = provider
        .estimate_gas(estimate_request)
        .await
        .map(|gas| gas * 120 / 100)
        .map_err(|e| WalletError::GasEstimationError(e.to_string()))?;
    debug!(nonce, gas_limit, max_fee_per_gas, "prepared transaction");

    let tx_data = TransactionData {
        to,
        value,
        data,
        nonce,
        gas_limit,
        max_fee_per_gas,
        max_priority_fee,
        chain_id: signer.chain_id(),
    };

    let signed_tx = signer.sign_transaction(&tx_data)?;
    let tx_hash = provider.send_raw_transaction(signed_tx).await?;

    info!(%tx_hash, %to, %value, "transaction sent");
    Ok(tx_hash)
}

/// Poll for the receipt of `tx_hash` until it has the requested confirmations.
///
/// Gives up once `policy.timeout` has elapsed, including while a poll is in flight.
pub async fn wait_for_transaction(
    tx_hash: TxHash,
    provider: &Provider,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt, WalletError> {
    let deadline = Instant::now() + policy.timeout;
    let timed_out = || {
        WalletError::TransactionError(format!(
            "transaction {} not confirmed within {:?}",
            tx_hash, policy.timeout
        ))
    };

    loop {
        if Instant::now() >= deadline {
            return Err(timed_out());
        }

        let poll = async {
            let Some(receipt) = provider.get_transaction_receipt(tx_hash).await? else {
                return Ok::<_, WalletError>(None);
            };
            let receipt = TxReceipt::from(receipt);
            let latest_block = provider.get_block_number().await?;

            // A receipt counts as its own first confirmation
            let confirmed = latest_block + 1 >= receipt.block_number + policy.confirmations;
            Ok(confirmed.then_some(receipt))
        };

        match tokio::time::timeout_at(deadline, poll).await {
            Err(_) => return Err(timed_out()),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(Some(receipt))) => {
                debug!(%tx_hash, block = receipt.block_number, success = receipt.success, "transaction confirmed");
                return Ok(receipt);
            }
            Ok(Ok(None)) => {}
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}
