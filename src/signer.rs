//! Transaction signing for the connected account.
//!
//! The signer holds the key in memory and produces EIP-2718 encoded EIP-1559
//! transactions ready for `eth_sendRawTransaction`. It takes the place of the
//! browser wallet's signing prompt; everything above this module only sees the
//! [`Signer`] trait.

use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope},
    network::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::TxKind,
    signers::local::PrivateKeySigner,
};
use alloy_primitives::{hex, Address as EthAddress, Bytes, B256, U256};
use std::fmt;
use thiserror::Error;

/// Transaction data structure used for signing transactions
#[derive(Debug, Clone)]
pub struct TransactionData {
    /// The recipient address
    pub to: EthAddress,
    /// The amount to send in wei
    pub value: U256,
    /// Calldata, empty for plain value transfers
    pub data: Bytes,
    /// The transaction nonce
    pub nonce: u64,
    /// The maximum gas for the transaction
    pub gas_limit: u64,
    /// Max fee per gas in wei
    pub max_fee_per_gas: u128,
    /// Max priority fee per gas in wei
    pub max_priority_fee: u128,
    /// The chain ID for the transaction
    pub chain_id: u64,
}

/// Errors that can occur during signing operations
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key format: {0}")]
    InvalidPrivateKey(String),

    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("failed to sign transaction: {0}")]
    SigningError(String),
}

/// The Signer trait defines the interface for all signing implementations
pub trait Signer: Send + Sync {
    /// Get the Ethereum address associated with this signer
    fn address(&self) -> EthAddress;

    /// Get the chain ID this signer is configured for
    fn chain_id(&self) -> u64;

    /// Sign a transaction and return its raw EIP-2718 encoding
    fn sign_transaction(&self, tx_data: &TransactionData) -> Result<Bytes, SignerError>;
}

/// Local signer implementation using a private key stored in memory
#[derive(Clone)]
pub struct LocalSigner {
    inner: PrivateKeySigner,
    address: EthAddress,
    chain_id: u64,
}

// Keep the key out of logs
impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl LocalSigner {
    /// Create a signer from a private key in hexadecimal string format
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self, SignerError> {
        let clean_key = private_key.trim().trim_start_matches("0x");

        if clean_key.len() != 64 {
            return Err(SignerError::InvalidPrivateKey(
                "Private key must be 32 bytes (64 hex characters)".to_string(),
            ));
        }

        let key_bytes =
            hex::decode(clean_key).map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        let key = B256::from_slice(&key_bytes);

        let inner = PrivateKeySigner::from_bytes(&key)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        let address = inner.address();

        Ok(Self {
            inner,
            address,
            chain_id,
        })
    }
}

impl Signer for LocalSigner {
    fn address(&self) -> EthAddress {
        self.address
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sign_transaction(&self, tx_data: &TransactionData) -> Result<Bytes, SignerError> {
        if tx_data.chain_id != self.chain_id {
            return Err(SignerError::ChainIdMismatch {
                expected: self.chain_id,
                actual: tx_data.chain_id,
            });
        }

        let mut tx = TxEip1559 {
            chain_id: tx_data.chain_id,
            nonce: tx_data.nonce,
            to: TxKind::Call(tx_data.to),
            gas_limit: tx_data.gas_limit,
            max_fee_per_gas: tx_data.max_fee_per_gas,
            max_priority_fee_per_gas: tx_data.max_priority_fee,
            input: tx_data.data.clone(),
            value: tx_data.value,
            ..Default::default()
        };

        let sig = self
            .inner
            .sign_transaction_sync(&mut tx)
            .map_err(|e| SignerError::SigningError(e.to_string()))?;

        let signed = TxEnvelope::from(tx.into_signed(sig));

        let mut buf = vec![];
        signed.encode_2718(&mut buf);

        Ok(buf.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // First development account of anvil/hardhat
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_address_from_key() {
        let signer = LocalSigner::from_private_key(DEV_KEY, 31337).unwrap();
        assert_eq!(
            signer.address(),
            EthAddress::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
    }

    #[test]
    fn rejects_short_key() {
        let err = LocalSigner::from_private_key("0x1234", 1).unwrap_err();
        assert!(matches!(err, SignerError::InvalidPrivateKey(_)));
    }

    #[test]
    fn refuses_foreign_chain() {
        let signer = LocalSigner::from_private_key(DEV_KEY, 31337).unwrap();
        let tx = TransactionData {
            to: EthAddress::ZERO,
            value: U256::from(1),
            data: Bytes::new(),
            nonce: 0,
            gas_limit: 21_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee: 100_000_000,
            chain_id: 1,
        };
        let err = signer.sign_transaction(&tx).unwrap_err();
        assert!(matches!(
            err,
            SignerError::ChainIdMismatch {
                expected: 31337,
                actual: 1
            }
        ));
    }

    #[test]
    fn signs_typed_transaction() {
        let signer = LocalSigner::from_private_key(DEV_KEY, 31337).unwrap();
        let tx = TransactionData {
            to: EthAddress::ZERO,
            value: U256::from(1),
            data: Bytes::new(),
            nonce: 0,
            gas_limit: 21_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee: 100_000_000,
            chain_id: 31337,
        };
        let raw = signer.sign_transaction(&tx).unwrap();
        // EIP-1559 envelope type byte
        assert_eq!(raw[0], 0x02);
    }
}
