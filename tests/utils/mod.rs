#![allow(dead_code)]

use alloy_primitives::{address, b256, Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use batchpay::ens::NameResolver;
use batchpay::wallet::{LedgerClient, TxReceipt, WalletError};
use mockall::mock;

pub const SENDER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const BATCH_CONTRACT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
pub const TOKEN: Address = address!("1c7D4B196Cb0C7B01d743Fbc6116a902379C7238");
pub const ALEX: Address = address!("B7d4369AbFa74AED05d7db358dC3373d787B8997");
pub const SARAH: Address = address!("be7f6bBE7f0B5A93CdB4BD8E557896cE2ae695F1");

pub const APPROVE_TX: TxHash =
    b256!("1111111111111111111111111111111111111111111111111111111111111111");
pub const BATCH_TX: TxHash =
    b256!("2222222222222222222222222222222222222222222222222222222222222222");

mock! {
    pub Ledger {}

    #[async_trait]
    impl LedgerClient for Ledger {
        fn account(&self) -> Address;
        async fn native_balance(&self, owner: Address) -> Result<U256, WalletError>;
        async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, WalletError>;
        async fn token_decimals(&self, token: Address) -> Result<u8, WalletError>;
        async fn send_transaction(
            &self,
            to: Address,
            value: U256,
            data: Bytes,
        ) -> Result<TxHash, WalletError>;
        async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, WalletError>;
    }
}

mock! {
    pub Resolver {}

    #[async_trait]
    impl NameResolver for Resolver {
        async fn resolve(&self, name: &str) -> Result<Option<Address>, WalletError>;
    }
}

/// `n` ether in wei
pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

pub fn receipt(hash: TxHash, success: bool) -> TxReceipt {
    TxReceipt {
        hash,
        block_number: 42,
        success,
    }
}

/// Resolver that knows alex.eth and sarah.eth
pub fn known_names() -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver.expect_resolve().returning(|name| match name {
        "alex.eth" => Ok(Some(ALEX)),
        "sarah.eth" => Ok(Some(SARAH)),
        _ => Ok(None),
    });
    resolver
}
