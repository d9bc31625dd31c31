//! Batch and single transfers of ETH and ERC20 tokens from a local account,
//! with ENS name resolution and a small donation-profile front-end.
//!
//! The entry point is [`batch::BatchTransfer`], generic over a
//! [`wallet::LedgerClient`] (balances, submission, receipts) and an
//! [`ens::NameResolver`].

pub mod batch;
pub mod config;
pub mod donation;
pub mod ens;
pub mod eth;
#[cfg(feature = "logging")]
pub mod logging;
pub mod signer;
#[cfg(test)]
mod testing;
pub mod wallet;

pub use batch::{BatchTransfer, TransferError, TransferMode, TransferOutcome, TransferRequest};
pub use wallet::{Amount, LedgerClient, TxReceipt, Wallet, WalletError};
