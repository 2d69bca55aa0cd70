//! Publisher configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use weavegate_common::{Address, BackendType, Error, Result};
use weavegate_storage::{BackendRegistry, Gateway, GatewayConfig, HttpGateway, StorageBackend};

use crate::retriever::{GatewayRetriever, RetrievalConfig};
use crate::retry::RetryConfig;
use crate::tagger::{DEFAULT_APP_NAME, DEFAULT_PROTOCOL};

/// What to do when every storage backend failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Surface `AllBackendsExhausted` and do not commit.
    #[default]
    Abort,
    /// Commit the operation with no off-chain URI.
    ProceedWithoutLocator,
}

/// One backend in the chain: a registry type name plus its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl BackendEntry {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            settings: Map::new(),
        }
    }
}

/// Upper bound on `retry.max_retries`. Each retry holds up the publish, and
/// the next backend in the chain is the real fallback.
pub const MAX_RETRIES_CAP: u32 = 5;

/// Backoff settings in config-file form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retrieval settings in config-file form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub timeout_ms: u64,
    pub quorum: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            quorum: 1,
        }
    }
}

/// Complete publisher configuration, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub chain_id: u64,
    pub app_name: String,
    pub protocol: String,
    /// Registry contract address bound into authorization tokens.
    pub registry: Address,
    /// Backends; the resolver orders them by priority.
    pub backends: Vec<BackendEntry>,
    pub gateways: Vec<GatewayConfig>,
    pub retry: RetrySettings,
    pub retrieval: RetrievalSettings,
    pub exhausted_policy: ExhaustedPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            chain_id: 11155111,
            app_name: DEFAULT_APP_NAME.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            registry: Address::ZERO,
            backends: vec![BackendEntry::new("arweave"), BackendEntry::new("ipfs")],
            gateways: vec![
                GatewayConfig {
                    url: "https://arweave.net".to_string(),
                    serves: vec![BackendType::Arweave],
                },
                GatewayConfig {
                    url: "https://ipfs.io".to_string(),
                    serves: vec![BackendType::Ipfs],
                },
                GatewayConfig {
                    url: "https://dweb.link".to_string(),
                    serves: vec![BackendType::Ipfs],
                },
            ],
            retry: RetrySettings::default(),
            retrieval: RetrievalSettings::default(),
            exhausted_policy: ExhaustedPolicy::default(),
        }
    }
}

impl PublisherConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or failed validation (`Error::Config`)
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path.as_ref(), self.to_json()?).await?;
        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(Error::Config("chain_id must be non-zero".to_string()));
        }
        if self.app_name.is_empty() || self.protocol.is_empty() {
            return Err(Error::Config(
                "app_name and protocol must be non-empty".to_string(),
            ));
        }
        if self.backends.is_empty() {
            return Err(Error::Config(
                "At least one backend is required".to_string(),
            ));
        }
        if self.retrieval.quorum == 0 {
            return Err(Error::Config("retrieval.quorum must be at least 1".to_string()));
        }
        if self.retrieval.timeout_ms == 0 {
            return Err(Error::Config("retrieval.timeout_ms must be non-zero".to_string()));
        }
        if self.retry.max_retries > MAX_RETRIES_CAP {
            return Err(Error::Config(format!(
                "retry.max_retries must be at most {}",
                MAX_RETRIES_CAP
            )));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.initial_delay_ms exceeds retry.max_delay_ms".to_string(),
            ));
        }
        for gateway in &self.gateways {
            if gateway.serves.is_empty() || gateway.serves.iter().any(|t| !t.is_storage()) {
                return Err(Error::Config(format!(
                    "Gateway '{}' must serve arweave and/or ipfs locators",
                    gateway.url
                )));
            }
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            timeout: Duration::from_millis(self.retrieval.timeout_ms),
            quorum: self.retrieval.quorum,
        }
    }

    /// Instantiate the configured backends through `registry`.
    pub fn build_backends(&self, registry: &BackendRegistry) -> Result<Vec<Arc<dyn StorageBackend>>> {
        self.backends
            .iter()
            .map(|entry| registry.resolve(&entry.kind, Value::Object(entry.settings.clone())))
            .collect()
    }

    /// Instantiate the configured HTTP gateways.
    pub fn build_gateways(&self) -> Result<Vec<Arc<dyn Gateway>>> {
        let timeout = Duration::from_millis(self.retrieval.timeout_ms);
        self.gateways
            .iter()
            .map(|g| Ok(Arc::new(HttpGateway::new(g.clone(), timeout)?) as Arc<dyn Gateway>))
            .collect()
    }

    /// Retriever over the configured HTTP gateways.
    pub fn build_retriever(&self) -> Result<GatewayRetriever> {
        Ok(GatewayRetriever::new(
            self.build_gateways()?,
            self.retrieval_config(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use weavegate_storage::create_default_registry;

    #[test]
    fn test_default_is_valid() {
        let config = PublisherConfig::default();
        config.validate().unwrap();
        assert_eq!(config.exhausted_policy, ExhaustedPolicy::Abort);
        assert_eq!(config.retrieval_config().quorum, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PublisherConfig::from_json(
            r#"{
                "chain_id": 84532,
                "backends": [{"type": "memory", "kind": "ipfs"}],
                "exhausted_policy": "proceed_without_locator",
                "retry": {"max_retries": 5}
            }"#,
        )
        .unwrap();

        assert_eq!(config.chain_id, 84532);
        assert_eq!(config.protocol, "ERC-8004");
        assert_eq!(config.backends[0].kind, "memory");
        assert_eq!(config.backends[0].settings["kind"], "ipfs");
        assert_eq!(config.exhausted_policy, ExhaustedPolicy::ProceedWithoutLocator);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 500);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = PublisherConfig::default();
        config.backends.clear();
        assert!(config.validate().is_err());

        let mut config = PublisherConfig::default();
        config.retrieval.quorum = 0;
        assert!(config.validate().is_err());

        let mut config = PublisherConfig::default();
        config.retry.initial_delay_ms = 20_000;
        assert!(config.validate().is_err());

        let mut config = PublisherConfig::default();
        config.gateways[0].serves = vec![BackendType::Https];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_retries_capped() {
        let mut config = PublisherConfig::default();
        config.retry.max_retries = MAX_RETRIES_CAP;
        config.validate().unwrap();

        config.retry.max_retries = MAX_RETRIES_CAP + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = PublisherConfig::from_json(r#"{"retry": {"max_retries": 1000}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_memory_backends() {
        let mut config = PublisherConfig::default();
        config.backends = vec![BackendEntry::new("memory"), {
            let mut entry = BackendEntry::new("memory");
            entry.settings.insert("kind".to_string(), Value::from("ipfs"));
            entry
        }];

        let backends = config.build_backends(&create_default_registry()).unwrap();
        assert_eq!(backends[0].backend_type(), BackendType::Arweave);
        assert_eq!(backends[1].backend_type(), BackendType::Ipfs);
        assert_eq!(config.build_gateways().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("weavegate.json");

        let mut config = PublisherConfig::default();
        config.app_name = "Agent0".to_string();
        config.save(&path).await.unwrap();

        let loaded = PublisherConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        tokio::fs::write(&path, r#"{"backends": []}"#).await.unwrap();
        assert!(matches!(
            PublisherConfig::load(&path).await,
            Err(Error::Config(_))
        ));
        assert!(PublisherConfig::load(temp.path().join("missing.json")).await.is_err());
    }
}
