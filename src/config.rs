//! Layered configuration: an optional TOML file overridden by `BATCHPAY_*`
//! environment variables (nested keys use `__`, e.g. `BATCHPAY_ENS__MODE`).

use crate::donation::Profile;
use crate::ens::{NameMatcher, DEFAULT_NAME_SUFFIX, ENS_REGISTRY_ADDRESS};
use crate::signer::{LocalSigner, SignerError};
use crate::wallet::ConfirmationPolicy;

use alloy_primitives::Address as EthAddress;
use ::config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const ENV_PREFIX: &str = "BATCHPAY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("no wallet configured: set BATCHPAY_PRIVATE_KEY")]
    MissingPrivateKey,

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(#[from] SignerError),

    #[error("ens.indexer_url is required when ens.mode = \"indexer\"")]
    MissingIndexerUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsMode {
    /// Read the ENS registry over the configured RPC endpoint
    #[default]
    Registry,
    /// Ask a third-party indexing API
    Indexer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsConfig {
    #[serde(default)]
    pub mode: EnsMode,
    #[serde(default = "default_registry")]
    pub registry: EthAddress,
    #[serde(default)]
    pub indexer_url: Option<Url>,
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for EnsConfig {
    fn default() -> Self {
        Self {
            mode: EnsMode::default(),
            registry: default_registry(),
            indexer_url: None,
            suffixes: default_suffixes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub rpc_url: Url,
    pub chain_id: u64,
    pub batch_contract: EthAddress,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub ens: EnsConfig,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

fn default_registry() -> EthAddress {
    ENS_REGISTRY_ADDRESS
}

fn default_suffixes() -> Vec<String> {
    vec![DEFAULT_NAME_SUFFIX.to_string()]
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_confirmations() -> u64 {
    1
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

impl AppConfig {
    /// Load from `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "reading configuration file");
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(
        builder: ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        if config.ens.mode == EnsMode::Indexer && config.ens.indexer_url.is_none() {
            return Err(ConfigError::MissingIndexerUrl);
        }
        Ok(config)
    }

    /// Upper bound for a single RPC call
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            confirmations: self.confirmations.max(1),
            timeout: Duration::from_secs(self.receipt_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// The connected account's signer
    pub fn signer(&self) -> Result<LocalSigner, ConfigError> {
        let key = self
            .private_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingPrivateKey)?;
        Ok(LocalSigner::from_private_key(key, self.chain_id)?)
    }

    pub fn name_matcher(&self) -> NameMatcher {
        NameMatcher::new(self.ens.suffixes.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Signer;
    use std::str::FromStr;

    const MINIMAL: &str = r#"
        rpc_url = "http://127.0.0.1:8545"
        chain_id = 31337
        batch_contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
    "#;

    #[test]
    fn defaults_fill_optional_keys() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.ens.mode, EnsMode::Registry);
        assert_eq!(config.ens.registry, ENS_REGISTRY_ADDRESS);
        assert!(config.name_matcher().is_name("alex.eth"));
        assert!(config.profiles.is_empty());
        assert_eq!(config.rpc_timeout(), Duration::from_secs(30));

        let policy = config.confirmation_policy();
        assert_eq!(policy.confirmations, 1);
        assert_eq!(policy.timeout, Duration::from_secs(120));
        assert_eq!(policy.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn missing_key_is_reported() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert!(matches!(config.signer(), Err(ConfigError::MissingPrivateKey)));
    }

    #[test]
    fn signer_uses_configured_chain() {
        let toml = format!(
            "{}\nprivate_key = \"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80\"",
            MINIMAL
        );
        let signer = AppConfig::from_toml_str(&toml).unwrap().signer().unwrap();
        assert_eq!(signer.chain_id(), 31337);
        assert_eq!(
            signer.address(),
            EthAddress::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
    }

    #[test]
    fn indexer_mode_needs_url() {
        let toml = format!("{}\n[ens]\nmode = \"indexer\"", MINIMAL);
        assert!(matches!(
            AppConfig::from_toml_str(&toml),
            Err(ConfigError::MissingIndexerUrl)
        ));
    }

    #[test]
    fn profiles_load_from_tables() {
        let toml = format!(
            r#"{}
            [[profiles]]
            id = "1"
            name = "Alex Rivers"
            address = "0xB7d4369AbFa74AED05d7db358dC3373d787B8997"
            ens = "alex.eth"
            "#,
            MINIMAL
        );
        let config = AppConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].ens, "alex.eth");
    }
}
