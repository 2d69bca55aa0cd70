//! Read gateways.
//!
//! A gateway serves content for one or more locator types. Retrieval fans
//! out over every gateway that serves a locator's type and compares what
//! comes back, so a gateway only has to fetch, never verify.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use weavegate_common::{BackendType, Error, Locator, Result};

use crate::backend::StorageBackend;
use crate::http::{build_client, normalize_base_url, read_body, read_send_error};

/// A read endpoint for stored content.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Whether this gateway can fetch locators of `backend_type`.
    fn serves(&self, backend_type: BackendType) -> bool;

    /// Fetch the raw content behind `locator`.
    ///
    /// # Errors
    /// - `Error::NotFound` if the gateway does not have the content
    /// - `Error::TransientUnavailable` on network or availability failures
    /// - `Error::InvalidInput` if the locator type is not served
    async fn fetch(&self, locator: &Locator) -> Result<Bytes>;
}

/// Configuration for an HTTP gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL.
    pub url: String,
    /// Locator types served.
    pub serves: Vec<BackendType>,
}

/// Public HTTP gateway.
///
/// `ar://<id>` is fetched from `{url}/{id}`, `ipfs://<cid>` from
/// `{url}/ipfs/{cid}`.
pub struct HttpGateway {
    base_url: String,
    serves: Vec<BackendType>,
    http: Client,
}

impl HttpGateway {
    /// Create a gateway with a per-request timeout.
    ///
    /// # Errors
    /// - Invalid base URL
    /// - `serves` is empty or names a non-storage type
    pub fn new(config: GatewayConfig, timeout: Duration) -> Result<Self> {
        if config.serves.is_empty() {
            return Err(Error::Config(format!(
                "Gateway '{}' serves no locator types",
                config.url
            )));
        }
        if let Some(bad) = config.serves.iter().find(|t| !t.is_storage()) {
            return Err(Error::Config(format!(
                "Gateway '{}' cannot serve '{}' locators",
                config.url, bad
            )));
        }
        Ok(Self {
            base_url: normalize_base_url(&config.url)?,
            serves: config.serves,
            http: build_client(timeout)?,
        })
    }

    fn url_for(&self, locator: &Locator) -> String {
        match locator.backend() {
            BackendType::Ipfs => format!("{}/ipfs/{}", self.base_url, locator.id()),
            _ => format!("{}/{}", self.base_url, locator.id()),
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn serves(&self, backend_type: BackendType) -> bool {
        self.serves.contains(&backend_type)
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes> {
        if !self.serves(locator.backend()) {
            return Err(Error::InvalidInput(format!(
                "{} does not serve {} locators",
                self.base_url,
                locator.backend()
            )));
        }
        let response = self
            .http
            .get(self.url_for(locator))
            .send()
            .await
            .map_err(|e| read_send_error(&self.base_url, e))?;
        read_body(&self.base_url, response).await
    }
}

/// Gateway reading straight from a storage backend.
pub struct BackendGateway {
    name: String,
    backend: Arc<dyn StorageBackend>,
}

impl BackendGateway {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            name: format!("{}-direct", backend.name()),
            backend,
        }
    }

    /// Override the gateway name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Gateway for BackendGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn serves(&self, backend_type: BackendType) -> bool {
        self.backend.backend_type() == backend_type
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes> {
        if !self.serves(locator.backend()) {
            return Err(Error::InvalidInput(format!(
                "{} does not serve {} locators",
                self.name,
                locator.backend()
            )));
        }
        self.backend.read(locator.id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn gateway(serves: Vec<BackendType>) -> HttpGateway {
        HttpGateway::new(
            GatewayConfig {
                url: "https://gateway.example/".to_string(),
                serves,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let gw = gateway(vec![BackendType::Arweave, BackendType::Ipfs]);
        let ar = Locator::parse("ar://abc_123").unwrap();
        let ipfs = Locator::parse("ipfs://bafkqaaa").unwrap();
        assert_eq!(gw.url_for(&ar), "https://gateway.example/abc_123");
        assert_eq!(gw.url_for(&ipfs), "https://gateway.example/ipfs/bafkqaaa");
    }

    #[test]
    fn test_gateway_config_validation() {
        let empty = GatewayConfig {
            url: "https://gateway.example".to_string(),
            serves: vec![],
        };
        assert!(HttpGateway::new(empty, Duration::from_secs(1)).is_err());

        let web = GatewayConfig {
            url: "https://gateway.example".to_string(),
            serves: vec![BackendType::Https],
        };
        assert!(HttpGateway::new(web, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unserved_type_rejected() {
        let gw = gateway(vec![BackendType::Arweave]);
        let ipfs = Locator::parse("ipfs://bafkqaaa").unwrap();
        assert!(matches!(gw.fetch(&ipfs).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_backend_gateway_reads_through() {
        let backend = Arc::new(MemoryBackend::permanent());
        let receipt = backend
            .write(Bytes::from_static(b"payload"), &[])
            .await
            .unwrap();

        let gw = BackendGateway::new(backend.clone());
        assert_eq!(gw.name(), "memory-arweave-direct");
        assert!(gw.serves(BackendType::Arweave));
        assert!(!gw.serves(BackendType::Ipfs));
        assert_eq!(gw.fetch(&receipt.locator).await.unwrap(), Bytes::from_static(b"payload"));
    }
}
