//! Batch and single transfers.
//!
//! [`BatchTransfer`] sequences one submission: local validation, concurrent
//! name resolution, balance check, ERC20 approval when sending tokens, the
//! batch-contract call and the receipt check. Every failure is terminal for
//! that attempt; nothing is retried.

use crate::ens::{NameMatcher, NameResolver};
use crate::wallet::{
    is_decimal_literal, parse_address, Amount, IBatchTransfer, LedgerClient, TxReceipt,
    WalletError, IERC20, ETH_DECIMALS,
};

use alloy_primitives::{Address as EthAddress, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use futures::future::join_all;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("could not resolve {name}: {reason}")]
    Resolution { name: String, reason: String },

    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("approval failed: {0}")]
    ApprovalFailed(String),

    #[error("transfer reverted in transaction {0}")]
    ExecutionFailed(TxHash),

    #[error("{phase} failed: {source}")]
    Provider {
        phase: &'static str,
        #[source]
        source: WalletError,
    },
}

impl TransferError {
    fn provider(phase: &'static str) -> impl FnOnce(WalletError) -> Self {
        move |source| Self::Provider { phase, source }
    }
}

/// Which asset a transfer moves, and so which contract entry point and balance apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Native,
    Token(EthAddress),
}

/// State of one submission as seen by its caller
#[derive(Debug)]
pub enum TransferOutcome {
    Pending,
    Success(TxReceipt),
    Failed(TransferError),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success(_))
    }
}

impl From<Result<TxReceipt, TransferError>> for TransferOutcome {
    fn from(result: Result<TxReceipt, TransferError>) -> Self {
        match result {
            Ok(receipt) => TransferOutcome::Success(receipt),
            Err(e) => TransferOutcome::Failed(e),
        }
    }
}

/// Recipients paired by position with amounts, as typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    recipients: Vec<String>,
    amounts: Vec<String>,
}

impl TransferRequest {
    pub fn new<R, A>(recipients: R, amounts: A) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            recipients: recipients
                .into_iter()
                .map(|r| r.into().trim().to_string())
                .collect(),
            amounts: amounts
                .into_iter()
                .map(|a| a.into().trim().to_string())
                .collect(),
        }
    }

    /// Build a request from comma-separated lists like `"alex.eth, 0xB7d4..."`
    pub fn from_lists(recipients: &str, amounts: &str) -> Self {
        Self::new(split_list(recipients), split_list(amounts))
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn amounts(&self) -> &[String] {
        &self.amounts
    }

    /// Checks that need no network access
    pub fn validate(&self, matcher: &NameMatcher) -> Result<(), TransferError> {
        if self.recipients.is_empty() || self.amounts.is_empty() {
            return Err(TransferError::Validation(
                "recipient and amount lists must not be empty".to_string(),
            ));
        }
        if self.recipients.len() != self.amounts.len() {
            return Err(TransferError::Validation(format!(
                "{} recipients but {} amounts",
                self.recipients.len(),
                self.amounts.len()
            )));
        }

        for (i, recipient) in self.recipients.iter().enumerate() {
            if recipient.is_empty() {
                return Err(TransferError::Validation(format!(
                    "empty recipient at position {}",
                    i + 1
                )));
            }
            if !matcher.is_name(recipient) && parse_address(recipient).is_err() {
                return Err(TransferError::Validation(format!(
                    "malformed address: {}",
                    recipient
                )));
            }
        }

        if let Some(bad) = self.amounts.iter().find(|a| !is_decimal_literal(a)) {
            return Err(TransferError::Validation(format!("malformed amount: {:?}", bad)));
        }
        Ok(())
    }

    fn parse_amounts(&self, decimals: u8) -> Result<Vec<U256>, TransferError> {
        self.amounts
            .iter()
            .map(|a| {
                Amount::parse(a, decimals)
                    .map(|amount| amount.raw())
                    .map_err(|e| TransferError::Validation(e.to_string()))
            })
            .collect()
    }
}

fn split_list(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return vec![];
    }
    input.split(',').map(|s| s.trim().to_string()).collect()
}

/// A recipient entry and the address it stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipient {
    pub input: String,
    pub address: EthAddress,
}

/// Sends transfers from the ledger's account, one submission at a time
#[derive(Debug)]
pub struct BatchTransfer<L, R> {
    ledger: L,
    resolver: R,
    batch_contract: EthAddress,
    matcher: NameMatcher,
}

impl<L: LedgerClient, R: NameResolver> BatchTransfer<L, R> {
    pub fn new(ledger: L, resolver: R, batch_contract: EthAddress) -> Self {
        Self {
            ledger,
            resolver,
            batch_contract,
            matcher: NameMatcher::default(),
        }
    }

    pub fn with_name_matcher(mut self, matcher: NameMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The connected account
    pub fn account(&self) -> EthAddress {
        self.ledger.account()
    }

    /// Balance of the connected account in the selected asset
    pub async fn balance(&self, mode: TransferMode) -> Result<Amount, TransferError> {
        let decimals = self.decimals(mode).await?;
        let raw = self.raw_balance(mode, self.ledger.account()).await?;
        Ok(Amount::from_raw(raw, decimals))
    }

    /// Run one batch submission and report its terminal state
    pub async fn submit_batch(
        &self,
        request: &TransferRequest,
        mode: TransferMode,
    ) -> TransferOutcome {
        let result = self.try_submit_batch(request, mode).await;
        if let Err(e) = &result {
            warn!(error = %e, "batch transfer failed");
        }
        result.into()
    }

    #[instrument(skip_all, fields(recipients = request.recipients().len(), ?mode))]
    pub async fn try_submit_batch(
        &self,
        request: &TransferRequest,
        mode: TransferMode,
    ) -> Result<TxReceipt, TransferError> {
        request.validate(&self.matcher)?;

        let recipients = self.resolve_all(request.recipients()).await?;

        let decimals = self.decimals(mode).await?;
        let amounts = request.parse_amounts(decimals)?;
        let total = amounts.iter().try_fold(U256::ZERO, |acc, a| {
            acc.checked_add(*a)
                .ok_or_else(|| TransferError::Validation("total amount overflows".to_string()))
        })?;

        let available = self.raw_balance(mode, self.ledger.account()).await?;
        if available < total {
            return Err(TransferError::InsufficientFunds {
                required: Amount::from_raw(total, decimals),
                available: Amount::from_raw(available, decimals),
            });
        }
        info!(total = %Amount::from_raw(total, decimals), "balance check passed");

        let recipients: Vec<EthAddress> = recipients.into_iter().map(|r| r.address).collect();
        let (value, data) = match mode {
            TransferMode::Native => {
                let call = IBatchTransfer::batchTransferNativeCall {
                    recipients,
                    amounts,
                };
                (total, call.abi_encode())
            }
            TransferMode::Token(token) => {
                self.approve(token, total).await?;
                let call = IBatchTransfer::batchTransferTokenCall {
                    token,
                    recipients,
                    amounts,
                };
                (U256::ZERO, call.abi_encode())
            }
        };

        let hash = self
            .ledger
            .send_transaction(self.batch_contract, value, Bytes::from(data))
            .await
            .map_err(TransferError::provider("batch submission"))?;
        info!(%hash, "batch submitted");

        self.confirm(hash, "batch confirmation").await
    }

    /// Send `amount` ether to an address or name
    #[instrument(skip(self))]
    pub async fn send_native(&self, to: &str, amount: &str) -> Result<TxReceipt, TransferError> {
        let to = to.trim();
        if amount.trim().is_empty() {
            return Err(TransferError::Validation("amount is required".to_string()));
        }
        let amount =
            Amount::parse_eth(amount).map_err(|e| TransferError::Validation(e.to_string()))?;
        if to.is_empty() {
            return Err(TransferError::Validation("recipient is required".to_string()));
        }
        if !self.matcher.is_name(to) {
            parse_address(to)
                .map_err(|_| TransferError::Validation(format!("malformed address: {}", to)))?;
        }

        let recipient = self.resolve_one(to).await?;

        let available = self
            .raw_balance(TransferMode::Native, self.ledger.account())
            .await?;
        if available < amount.raw() {
            return Err(TransferError::InsufficientFunds {
                required: amount,
                available: Amount::from_raw(available, ETH_DECIMALS),
            });
        }

        let hash = self
            .ledger
            .send_transaction(recipient.address, amount.raw(), Bytes::new())
            .await
            .map_err(TransferError::provider("transaction"))?;
        info!(%hash, to = %recipient.address, %amount, "transfer submitted");

        self.confirm(hash, "transaction").await
    }

    async fn decimals(&self, mode: TransferMode) -> Result<u8, TransferError> {
        match mode {
            TransferMode::Native => Ok(ETH_DECIMALS),
            TransferMode::Token(token) => self
                .ledger
                .token_decimals(token)
                .await
                .map_err(TransferError::provider("reading token decimals")),
        }
    }

    async fn raw_balance(
        &self,
        mode: TransferMode,
        owner: EthAddress,
    ) -> Result<U256, TransferError> {
        match mode {
            TransferMode::Native => self.ledger.native_balance(owner).await,
            TransferMode::Token(token) => self.ledger.token_balance(token, owner).await,
        }
        .map_err(TransferError::provider("balance check"))
    }

    /// Resolve every entry concurrently; results keep input order and the
    /// first failure in input order wins
    async fn resolve_all(
        &self,
        entries: &[String],
    ) -> Result<Vec<ResolvedRecipient>, TransferError> {
        join_all(entries.iter().map(|entry| self.resolve_one(entry)))
            .await
            .into_iter()
            .collect()
    }

    async fn resolve_one(&self, entry: &str) -> Result<ResolvedRecipient, TransferError> {
        if !self.matcher.is_name(entry) {
            let address = parse_address(entry)
                .map_err(|_| TransferError::Validation(format!("malformed address: {}", entry)))?;
            return Ok(ResolvedRecipient {
                input: entry.to_string(),
                address,
            });
        }

        match self.resolver.resolve(entry).await {
            Ok(Some(address)) if address.is_zero() => Err(TransferError::Resolution {
                name: entry.to_string(),
                reason: "resolves to the zero address".to_string(),
            }),
            Ok(Some(address)) => Ok(ResolvedRecipient {
                input: entry.to_string(),
                address,
            }),
            Ok(None) => Err(TransferError::Resolution {
                name: entry.to_string(),
                reason: "no address record".to_string(),
            }),
            Err(e) => Err(TransferError::Resolution {
                name: entry.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Authorize the batch contract to move `total` tokens and wait for it to stick
    async fn approve(&self, token: EthAddress, total: U256) -> Result<(), TransferError> {
        let call = IERC20::approveCall {
            spender: self.batch_contract,
            value: total,
        };
        let hash = self
            .ledger
            .send_transaction(token, U256::ZERO, Bytes::from(call.abi_encode()))
            .await
            .map_err(|e| TransferError::ApprovalFailed(e.to_string()))?;

        let receipt = self
            .ledger
            .wait_for_receipt(hash)
            .await
            .map_err(|e| TransferError::ApprovalFailed(e.to_string()))?;
        if !receipt.success {
            return Err(TransferError::ApprovalFailed(format!(
                "approval transaction {} reverted",
                hash
            )));
        }
        info!(%hash, "approval confirmed");
        Ok(())
    }

    async fn confirm(
        &self,
        hash: TxHash,
        phase: &'static str,
    ) -> Result<TxReceipt, TransferError> {
        let receipt = self
            .ledger
            .wait_for_receipt(hash)
            .await
            .map_err(TransferError::provider(phase))?;
        if !receipt.success {
            return Err(TransferError::ExecutionFailed(hash));
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_comma_separated_lists() {
        let request = TransferRequest::from_lists(
            "alex.eth, 0xbe7f6bBE7f0B5A93CdB4BD8E557896cE2ae695F1",
            "1.5,2",
        );
        assert_eq!(
            request.recipients(),
            ["alex.eth", "0xbe7f6bBE7f0B5A93CdB4BD8E557896cE2ae695F1"]
        );
        assert_eq!(request.amounts(), ["1.5", "2"]);
        assert!(TransferRequest::from_lists("  ", "").recipients().is_empty());
    }

    #[test]
    fn validation_is_local_and_ordered() {
        let matcher = NameMatcher::default();

        let empty = TransferRequest::from_lists("", "");
        assert!(matches!(empty.validate(&matcher), Err(TransferError::Validation(_))));

        let mismatched = TransferRequest::from_lists("a.eth,b.eth", "1");
        let err = mismatched.validate(&matcher).unwrap_err();
        assert_eq!(err.to_string(), "invalid input: 2 recipients but 1 amounts");

        let bad_address = TransferRequest::from_lists("0xABC", "1");
        let err = bad_address.validate(&matcher).unwrap_err();
        assert_eq!(err.to_string(), "invalid input: malformed address: 0xABC");

        let trailing_comma = TransferRequest::from_lists("a.eth,", "1,2");
        assert!(trailing_comma
            .validate(&matcher)
            .unwrap_err()
            .to_string()
            .contains("empty recipient at position 2"));

        let bad_amount = TransferRequest::from_lists("a.eth", "-1");
        assert!(matches!(
            bad_amount.validate(&matcher),
            Err(TransferError::Validation(_))
        ));
    }

    #[test]
    fn amounts_parse_with_asset_decimals() {
        let request = TransferRequest::from_lists("a.eth,b.eth", "1.5,0.000001");
        assert_eq!(
            request.parse_amounts(6).unwrap(),
            vec![U256::from(1_500_000), U256::from(1)]
        );
        assert!(matches!(
            request.parse_amounts(2),
            Err(TransferError::Validation(_))
        ));
    }
}
