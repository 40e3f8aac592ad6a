//! Configuration loading and validation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::network::{ChainId, NativeCurrency, NetworkParams, NetworkValidator};
use crate::session::{SessionBuilder, SessionOptions};
use crate::storage::KeyValueStore;
use crate::token::cache::DEFAULT_STORAGE_KEY;
use crate::token::{TokenCache, TokenIssuer, DEFAULT_TTL_SECS, MAX_TTL_SECS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionOptions,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Network the session expects, hex (`0x1`) or decimal (`1`)
    #[serde(default = "default_expected_chain_id")]
    pub expected_chain_id: String,

    /// Display name, required to ask the agent to add the network
    #[serde(default)]
    pub chain_name: Option<String>,

    #[serde(default)]
    pub rpc_urls: Vec<String>,

    #[serde(default)]
    pub block_explorer_urls: Vec<String>,

    #[serde(default)]
    pub native_currency: Option<NativeCurrency>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            expected_chain_id: default_expected_chain_id(),
            chain_name: None,
            rpc_urls: vec![],
            block_explorer_urls: vec![],
            native_currency: None,
        }
    }
}

impl NetworkConfig {
    pub fn expected(&self) -> Result<ChainId> {
        ChainId::parse(&self.expected_chain_id)
            .with_context(|| format!("Invalid expected_chain_id {:?}", self.expected_chain_id))
    }

    /// Add-network parameters, if enough is configured to build them
    pub fn network_params(&self) -> Option<NetworkParams> {
        let chain_name = self.chain_name.clone()?;
        if self.rpc_urls.is_empty() {
            return None;
        }
        let chain_id = ChainId::parse(&self.expected_chain_id).ok()?;

        Some(NetworkParams {
            chain_id: chain_id.to_hex(),
            chain_name,
            rpc_urls: self.rpc_urls.clone(),
            block_explorer_urls: self.block_explorer_urls.clone(),
            native_currency: self.native_currency.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Token lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Human-readable first line of the signed challenge
    #[serde(default = "default_statement")]
    pub statement: String,

    /// Origin the token is issued for
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// File backing the CLI token store
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Treat expired cached tokens as absent
    #[serde(default = "default_true")]
    pub enforce_expiry: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            statement: default_statement(),
            domain: None,
            storage_key: default_storage_key(),
            storage_path: default_storage_path(),
            enforce_expiry: true,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_expected_chain_id() -> String {
    "0x1".to_string()
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_statement() -> String {
    "Sign this message to prove you control this wallet.".to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/session.json")
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("network.expected_chain_id", default_expected_chain_id())?
            .set_default("token.ttl_secs", default_ttl_secs() as i64)?
            .set_default("token.storage_key", default_storage_key())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix WALLET_SESSION_)
            .add_source(
                config::Environment::with_prefix("WALLET_SESSION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.network.expected()?;

        if self.token.ttl_secs == 0 {
            anyhow::bail!("token.ttl_secs must be positive");
        }

        if self.token.ttl_secs > MAX_TTL_SECS {
            anyhow::bail!(
                "token.ttl_secs cannot exceed {} (10 years), got {}",
                MAX_TTL_SECS,
                self.token.ttl_secs
            );
        }

        if self.token.storage_key.trim().is_empty() {
            anyhow::bail!("token.storage_key must not be empty");
        }

        if self.network.chain_name.is_some() && self.network.rpc_urls.is_empty() {
            tracing::warn!(
                "network.chain_name is set but network.rpc_urls is empty - unknown networks cannot be added"
            );
        }

        Ok(())
    }

    /// Session builder wired to `store`, ready for detection
    pub fn session_builder(&self, store: Arc<dyn KeyValueStore>) -> Result<SessionBuilder> {
        let validator = NetworkValidator::new(self.network.expected()?);
        let issuer = TokenIssuer::new(
            self.token.statement.clone(),
            self.token.domain.clone(),
            self.token.ttl_secs,
        );
        let cache = TokenCache::new(store, self.token.storage_key.clone(), self.token.enforce_expiry);

        let mut builder = SessionBuilder::new(validator, issuer, cache).options(self.session.clone());
        if let Some(params) = self.network.network_params() {
            builder = builder.network_params(params);
        }
        Ok(builder)
    }

    /// Get configuration for display
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Session:
    auto_validate_network_on_chain_change: {}
    emit_user_facing_warnings: {}
    action_errors: {:?}
  Network:
    expected_chain_id: {}
    chain_name: {}
    rpc_urls: {:?}
  Token:
    ttl: {}s
    domain: {}
    storage_key: {}
    storage_path: {}
    enforce_expiry: {}
"#,
            self.session.auto_validate_network_on_chain_change,
            self.session.emit_user_facing_warnings,
            self.session.action_errors,
            self.network.expected_chain_id,
            self.network.chain_name.as_deref().unwrap_or("(not set)"),
            self.network
                .rpc_urls
                .iter()
                .map(|url| mask_url(url))
                .collect::<Vec<_>>(),
            self.token.ttl_secs,
            self.token.domain.as_deref().unwrap_or("(not set)"),
            self.token.storage_key,
            self.token.storage_path.display(),
            self.token.enforce_expiry,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ErrorPolicy;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.session.auto_validate_network_on_chain_change);
        assert!(!config.session.emit_user_facing_warnings);
        assert_eq!(config.session.action_errors, ErrorPolicy::Propagate);
        assert_eq!(config.token.ttl_secs, 86_400);
        assert_eq!(config.network.expected().unwrap(), ChainId(1));
        assert!(config.network.network_params().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(
            &path,
            r#"
[session]
action_errors = "swallow"
emit_user_facing_warnings = true

[network]
expected_chain_id = "137"
chain_name = "Polygon"
rpc_urls = ["https://polygon-rpc.com"]

[token]
ttl_secs = 3600
enforce_expiry = false
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.session.action_errors, ErrorPolicy::Swallow);
        assert!(config.session.emit_user_facing_warnings);
        assert_eq!(config.network.expected().unwrap(), ChainId(137));
        assert_eq!(config.token.ttl_secs, 3600);
        assert!(!config.token.enforce_expiry);
        assert_eq!(config.token.storage_key, DEFAULT_STORAGE_KEY);

        let params = config.network.network_params().unwrap();
        assert_eq!(params.chain_id, "0x89");
        assert_eq!(params.native_currency.symbol, "ETH");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.network.expected_chain_id, "0x1");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.network.expected_chain_id = "mainnet".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.token.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.token.storage_key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }
}
