//! Storage backend trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use weavegate_common::{BackendType, Locator, Result, Tag};

/// Confirmation returned by a backend after it accepted a write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Backend-native content id.
    pub id: String,
    /// Locator for the content (`ar://` or `ipfs://`).
    pub locator: Locator,
    /// Size of the stored payload in bytes.
    pub size: u64,
    /// When the backend confirmed acceptance.
    pub confirmed_at: DateTime<Utc>,
    /// Backend-specific confirmation data.
    pub provider_data: Option<serde_json::Value>,
}

/// Storage backend trait for append-only content stores.
///
/// Adapters own backend-specific authentication and signing, and translate
/// native failures into the shared error taxonomy:
/// - `Error::Backend { kind, .. }` for failures known to have left nothing behind
/// - `Error::WriteStatusUnknown` when the request may have been applied
///
/// Adapters must not retry writes; attempt and backoff policy belongs to
/// the caller.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the backend name used in logs and errors (e.g., "arweave").
    fn name(&self) -> &str;

    /// The locator type this backend produces.
    fn backend_type(&self) -> BackendType;

    /// Store `data` with `tags`.
    ///
    /// Tags are only durable on backends that index them. The permanent
    /// store signs them into the data item and can return them later
    /// (`ArweaveBackend::tags`). The pinned store uploads the bare payload
    /// and drops them, so tag-based discovery only covers permanent-store
    /// content.
    ///
    /// # Postconditions
    /// - On `Ok`, the backend confirmed acceptance and the receipt's
    ///   locator classifies as `backend_type()`
    ///
    /// # Errors
    /// - `Error::Backend` with the failure kind
    /// - `Error::WriteStatusUnknown` if confirmation was lost after sending
    async fn write(&self, data: Bytes, tags: &[Tag]) -> Result<WriteReceipt>;

    /// Read content by backend-native id.
    ///
    /// # Errors
    /// - `Error::NotFound` if the backend has no such content
    /// - `Error::TransientUnavailable` on network or availability failures
    async fn read(&self, id: &str) -> Result<Bytes>;
}
