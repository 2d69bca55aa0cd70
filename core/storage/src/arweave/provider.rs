//! Permanent-store backend uploading signed data items to a bundler.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use weavegate_common::{BackendErrorKind, BackendType, Error, Locator, Result, Tag};
use weavegate_crypto::EthereumKey;

use super::bundle::DataItem;
use crate::backend::{StorageBackend, WriteReceipt};
use crate::http::{
    build_client, normalize_base_url, read_body, read_send_error, write_send_error,
    write_status_error,
};

const BACKEND_NAME: &str = "arweave";

/// Default bundler upload endpoint.
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.ardrive.io";
/// Default read gateway.
pub const DEFAULT_GATEWAY_URL: &str = "https://arweave.net";
/// Environment variable holding the hex signing key by default.
pub const DEFAULT_KEY_ENV: &str = "WEAVEGATE_ARWEAVE_KEY";

fn default_upload_url() -> String {
    DEFAULT_UPLOAD_URL.to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_key_env() -> String {
    DEFAULT_KEY_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Configuration for the permanent-store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArweaveConfig {
    /// Bundler base URL.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// Gateway used for reads.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Name of the environment variable holding the signing key.
    #[serde(default = "default_key_env")]
    pub key_env: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ArweaveConfig {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            gateway_url: default_gateway_url(),
            key_env: default_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Bundler response to an accepted upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub data_caches: Vec<String>,
    #[serde(default)]
    pub fast_finality_indexes: Vec<String>,
    #[serde(default)]
    pub winc: Option<String>,
}

/// Gateway GraphQL query returning the tags of one transaction.
pub const TAGS_QUERY: &str =
    "query($id: ID!) { transaction(id: $id) { tags { name value } } }";

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    transaction: Option<TransactionNode>,
}

#[derive(Debug, Deserialize)]
struct TransactionNode {
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Extract the tag list from a gateway GraphQL answer for `id`.
///
/// A null transaction means the gateway has not indexed the item yet.
fn parse_tags_response(id: &str, body: &[u8]) -> Result<Vec<Tag>> {
    let response: GraphQlResponse = serde_json::from_slice(body).map_err(|e| {
        Error::backend(
            BACKEND_NAME,
            BackendErrorKind::Rejected,
            format!("unreadable GraphQL response: {}", e),
        )
    })?;

    let Some(data) = response.data else {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(Error::backend(
            BACKEND_NAME,
            BackendErrorKind::Rejected,
            format!("GraphQL query failed: {}", messages.join("; ")),
        ));
    };

    match data.transaction {
        Some(node) => Ok(node.tags),
        None => Err(Error::backend(
            BACKEND_NAME,
            BackendErrorKind::IndexingPending,
            format!("{} is not indexed yet", id),
        )),
    }
}

/// Permanent-store backend.
///
/// Each write signs one data item locally and posts it to the bundler. The
/// id is known before upload, so the bundler's answer is checked against it.
pub struct ArweaveBackend {
    upload_url: String,
    gateway_url: String,
    key: EthereumKey,
    http: Client,
}

impl ArweaveBackend {
    /// Create a backend signing with `key`.
    ///
    /// # Errors
    /// - Upload or gateway URL is not a valid http(s) URL
    pub fn new(config: ArweaveConfig, key: EthereumKey) -> Result<Self> {
        let upload_url = normalize_base_url(&config.upload_url)?;
        let gateway_url = normalize_base_url(&config.gateway_url)?;
        let http = build_client(Duration::from_secs(config.timeout_secs))?;

        Ok(Self {
            upload_url,
            gateway_url,
            key,
            http,
        })
    }

    /// Address of the signing key, which pays for uploads.
    pub fn signer(&self) -> weavegate_common::Address {
        self.key.address()
    }

    /// Read back the tags stored with `id` through the gateway's GraphQL
    /// index.
    ///
    /// # Errors
    /// - `Error::Backend` with `IndexingPending` if the item is not indexed yet
    /// - `Error::TransientUnavailable` on network or availability failures
    pub async fn tags(&self, id: &str) -> Result<Vec<Tag>> {
        let url = format!("{}/graphql", self.gateway_url);
        let request = serde_json::json!({
            "query": TAGS_QUERY,
            "variables": { "id": id },
        });

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| read_send_error(BACKEND_NAME, e))?;
        let body = read_body(BACKEND_NAME, response).await?;

        let tags = parse_tags_response(id, &body)?;
        debug!(id, count = tags.len(), "Read tags from gateway index");
        Ok(tags)
    }
}

#[async_trait]
impl StorageBackend for ArweaveBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Arweave
    }

    async fn write(&self, data: Bytes, tags: &[Tag]) -> Result<WriteReceipt> {
        let item = DataItem::sign(data, tags, &self.key)?;
        let expected_id = item.id();
        let size = item.data_len() as u64;
        let url = format!("{}/v1/tx/ethereum", self.upload_url);

        debug!(id = %expected_id, size, "Uploading data item");

        let response = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(item.to_bytes())
            .send()
            .await
            .map_err(|e| write_send_error(BACKEND_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(write_status_error(BACKEND_NAME, status, &body));
        }

        // Accepted, but without a readable answer the id is unconfirmed.
        let upload: UploadResponse =
            response.json().await.map_err(|e| Error::WriteStatusUnknown {
                backend: BACKEND_NAME.to_string(),
                message: format!("unreadable upload response: {}", e),
            })?;

        if upload.id != expected_id {
            return Err(Error::backend(
                BACKEND_NAME,
                BackendErrorKind::Rejected,
                format!(
                    "bundler returned id {} for data item {}",
                    upload.id, expected_id
                ),
            ));
        }

        info!(id = %expected_id, size, "Data item accepted");

        Ok(WriteReceipt {
            locator: Locator::new(BackendType::Arweave, expected_id.clone())?,
            id: expected_id,
            size,
            confirmed_at: Utc::now(),
            provider_data: serde_json::to_value(&upload).ok(),
        })
    }

    async fn read(&self, id: &str) -> Result<Bytes> {
        let url = format!("{}/{}", self.gateway_url, id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| read_send_error(BACKEND_NAME, e))?;
        read_body(BACKEND_NAME, response).await
    }
}

/// Factory function for creating the backend from JSON config.
///
/// The signing key is read from the environment variable named by
/// `key_env`, never from the config itself.
pub fn create_arweave_backend(config: serde_json::Value) -> Result<Arc<dyn StorageBackend>> {
    let config: ArweaveConfig = serde_json::from_value(config)
        .map_err(|e| Error::Config(format!("Invalid arweave config: {}", e)))?;
    let secret = std::env::var(&config.key_env).map_err(|_| {
        Error::Config(format!(
            "Signing key environment variable '{}' is not set",
            config.key_env
        ))
    })?;
    let key = EthereumKey::from_hex(secret.trim())?;
    Ok(Arc::new(ArweaveBackend::new(config, key)?))
}
