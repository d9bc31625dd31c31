//! ENS name resolution.
//!
//! Two resolvers are provided: [`EnsRegistryResolver`] reads the ENS registry
//! and the name's resolver contract over JSON-RPC, [`IndexerResolver`] asks a
//! third-party HTTP indexing API. Both answer `Ok(None)` when the name exists
//! but has no address record.

use crate::eth::Provider;
use crate::wallet::{call_view_function, parse_address, WalletError};

use alloy_primitives::{address, keccak256, Address as EthAddress, B256};
use alloy_sol_macro::sol;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// ENS registry deployment, identical on mainnet and the public testnets
pub const ENS_REGISTRY_ADDRESS: EthAddress = address!("00000000000C2E074eC69A0dFb2997BA6C7d2e1e");

/// Suffix recognized as a name when nothing else is configured
pub const DEFAULT_NAME_SUFFIX: &str = ".eth";

const INDEXER_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

sol! {
    interface IENSRegistry {
        function resolver(bytes32 node) external view returns (address);
    }

    interface IAddrResolver {
        function addr(bytes32 node) external view returns (address);
    }
}

/// Maps a human-readable name to an address
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Returns `Ok(None)` when the name has no address
    async fn resolve(&self, name: &str) -> Result<Option<EthAddress>, WalletError>;
}

#[async_trait]
impl<T: NameResolver + ?Sized> NameResolver for Box<T> {
    async fn resolve(&self, name: &str) -> Result<Option<EthAddress>, WalletError> {
        (**self).resolve(name).await
    }
}

/// Decides which recipient entries are names rather than addresses
#[derive(Debug, Clone)]
pub struct NameMatcher {
    suffixes: Vec<String>,
}

impl Default for NameMatcher {
    fn default() -> Self {
        Self {
            suffixes: vec![DEFAULT_NAME_SUFFIX.to_string()],
        }
    }
}

impl NameMatcher {
    pub fn new<I, T>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let suffixes = suffixes
            .into_iter()
            .map(|s| {
                let s: String = s.into();
                let s = s.to_lowercase();
                if s.starts_with('.') {
                    s
                } else {
                    format!(".{}", s)
                }
            })
            .collect();
        Self { suffixes }
    }

    /// True for entries like `alice.eth`; a bare suffix is not a name
    pub fn is_name(&self, entry: &str) -> bool {
        let entry = entry.trim().to_lowercase();
        self.suffixes
            .iter()
            .any(|suffix| entry.len() > suffix.len() && entry.ends_with(suffix.as_str()))
    }
}

/// EIP-137 namehash of a dot-separated name
pub fn namehash(name: &str) -> B256 {
    let mut node = B256::ZERO;

    for label in name.rsplit('.').filter(|l| !l.is_empty()) {
        let label_hash = keccak256(label.as_bytes());
        node = keccak256([node.as_slice(), label_hash.as_slice()].concat());
    }
    node
}

/// Resolves names through the on-chain ENS registry
#[derive(Debug, Clone)]
pub struct EnsRegistryResolver {
    provider: Provider,
    registry: EthAddress,
}

impl EnsRegistryResolver {
    pub fn new(provider: Provider) -> Self {
        Self::with_registry(provider, ENS_REGISTRY_ADDRESS)
    }

    pub fn with_registry(provider: Provider, registry: EthAddress) -> Self {
        Self { provider, registry }
    }
}

#[async_trait]
impl NameResolver for EnsRegistryResolver {
    #[instrument(level = "debug", skip(self))]
    async fn resolve(&self, name: &str) -> Result<Option<EthAddress>, WalletError> {
        let node = namehash(&name.trim().to_lowercase());

        let resolver = call_view_function(
            self.registry,
            IENSRegistry::resolverCall { node },
            &self.provider,
        )
        .await?
        ._0;
        if resolver.is_zero() {
            debug!("no resolver set");
            return Ok(None);
        }

        let resolved = call_view_function(resolver, IAddrResolver::addrCall { node }, &self.provider)
            .await?
            ._0;
        Ok((!resolved.is_zero()).then_some(resolved))
    }
}

#[derive(Debug, Deserialize)]
struct IndexerResponse {
    address: Option<String>,
}

/// Resolves names through an HTTP indexing API answering
/// `GET {base}/{name}` with `{"address": "0x..."}`
#[derive(Debug, Clone)]
pub struct IndexerResolver {
    client: reqwest::Client,
    base_url: Url,
}

impl IndexerResolver {
    pub fn new(base_url: Url) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(INDEXER_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WalletError::NameResolutionError(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn lookup_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            name.trim().to_lowercase()
        )
    }
}

#[async_trait]
impl NameResolver for IndexerResolver {
    #[instrument(level = "debug", skip(self))]
    async fn resolve(&self, name: &str) -> Result<Option<EthAddress>, WalletError> {
        let response = self
            .client
            .get(self.lookup_url(name))
            .send()
            .await
            .map_err(|e| WalletError::NameResolutionError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(WalletError::NameResolutionError(format!(
                "indexer answered {} for {}",
                response.status(),
                name
            )));
        }

        let body: IndexerResponse = response
            .json()
            .await
            .map_err(|e| WalletError::NameResolutionError(e.to_string()))?;

        match body.address.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(address) => {
                let address = parse_address(address)?;
                Ok((!address.is_zero()).then_some(address))
            }
        }
    }
}
