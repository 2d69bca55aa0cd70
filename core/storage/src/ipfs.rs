//! Pinned-store backend talking to a Kubo-compatible RPC API.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use weavegate_common::{BackendErrorKind, BackendType, Error, Locator, Result, Tag};
use weavegate_crypto::raw_cid_v1;

use crate::backend::{StorageBackend, WriteReceipt};
use crate::http::{
    build_client, normalize_base_url, read_body, read_send_error, write_send_error,
    write_status_error,
};

const BACKEND_NAME: &str = "ipfs";

/// Payloads up to this size are a single raw leaf, so the CID can be
/// computed locally.
pub const SINGLE_BLOCK_LIMIT: usize = 256 * 1024;

const BOUNDARY: &str = "WeaveGateBoundary";

fn default_api_url() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Configuration for the pinned-store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfsConfig {
    /// RPC API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding an `Authorization` header value, for
    /// hosted pinning services.
    #[serde(default)]
    pub auth_env: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            auth_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Response of `/api/v0/add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddResponse {
    pub name: String,
    pub hash: String,
    pub size: String,
}

/// Pinned-store backend. Content is added and pinned in one call.
pub struct IpfsBackend {
    api_url: String,
    auth: Option<String>,
    http: Client,
}

impl IpfsBackend {
    /// Create a backend.
    ///
    /// # Errors
    /// - Invalid API URL
    /// - `auth_env` names an unset variable
    pub fn new(config: IpfsConfig) -> Result<Self> {
        let api_url = normalize_base_url(&config.api_url)?;
        let auth = match &config.auth_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                Error::Config(format!("Auth environment variable '{}' is not set", var))
            })?),
            None => None,
        };
        let http = build_client(Duration::from_secs(config.timeout_secs))?;

        Ok(Self {
            api_url,
            auth,
            http,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(url);
        match &self.auth {
            Some(auth) => builder.header(header::AUTHORIZATION, auth),
            None => builder,
        }
    }
}

/// Build a single-file multipart form body.
fn multipart_body(data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 192);
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"data\"\r\n");
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

#[async_trait]
impl StorageBackend for IpfsBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Ipfs
    }

    async fn write(&self, data: Bytes, tags: &[Tag]) -> Result<WriteReceipt> {
        if !tags.is_empty() {
            debug!(count = tags.len(), "Pinned store does not index tags; ignoring");
        }

        let expected = if data.len() <= SINGLE_BLOCK_LIMIT {
            Some(raw_cid_v1(&data)?)
        } else {
            None
        };
        let size = data.len() as u64;
        let url = format!(
            "{}/api/v0/add?cid-version=1&raw-leaves=true&pin=true",
            self.api_url
        );

        let response = self
            .request(&url)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(multipart_body(&data))
            .send()
            .await
            .map_err(|e| write_send_error(BACKEND_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(write_status_error(BACKEND_NAME, status, &body));
        }

        let added: AddResponse = response.json().await.map_err(|e| Error::WriteStatusUnknown {
            backend: BACKEND_NAME.to_string(),
            message: format!("unreadable add response: {}", e),
        })?;

        if let Some(expected) = expected {
            if added.hash != expected {
                return Err(Error::backend(
                    BACKEND_NAME,
                    BackendErrorKind::Rejected,
                    format!("node returned CID {} for content {}", added.hash, expected),
                ));
            }
        }

        info!(cid = %added.hash, size, "Content pinned");

        Ok(WriteReceipt {
            locator: Locator::new(BackendType::Ipfs, added.hash.clone())?,
            id: added.hash.clone(),
            size,
            confirmed_at: Utc::now(),
            provider_data: serde_json::to_value(&added).ok(),
        })
    }

    async fn read(&self, id: &str) -> Result<Bytes> {
        let url = format!("{}/api/v0/cat", self.api_url);
        let response = self
            .request(&url)
            .query(&[("arg", id)])
            .send()
            .await
            .map_err(|e| read_send_error(BACKEND_NAME, e))?;
        read_body(BACKEND_NAME, response).await
    }
}

/// Factory function for creating the backend from JSON config.
pub fn create_ipfs_backend(config: serde_json::Value) -> Result<Arc<dyn StorageBackend>> {
    let config: IpfsConfig = serde_json::from_value(config)
        .map_err(|e| Error::Config(format!("Invalid ipfs config: {}", e)))?;
    Ok(Arc::new(IpfsBackend::new(config)?))
}
