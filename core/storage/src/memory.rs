//! In-memory storage backend for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use weavegate_common::{BackendErrorKind, BackendType, Error, Locator, Result, Tag};
use weavegate_crypto::{content_digest_id, raw_cid_v1};

use crate::arweave::encode_tags;
use crate::backend::{StorageBackend, WriteReceipt};

/// Failure a [`MemoryBackend`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Fail with `Error::Backend` of this kind; nothing is stored.
    Backend(BackendErrorKind),
    /// Store the content, then report `Error::WriteStatusUnknown`.
    StatusUnknown,
}

/// Stored object.
#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    tags: Vec<Tag>,
}

/// In-memory content-addressed backend.
///
/// Behaves like the permanent store or the pinned store depending on
/// construction. Permanent ids hash the encoded tags together with the
/// payload, so the same bytes stored under different tags are distinct
/// objects, as they are for signed data items. Pinned ids are CIDv1 over
/// the payload alone and tags are kept only for inspection.
/// Failures can be injected and write calls are counted, which makes it the
/// stand-in for external stores in tests.
pub struct MemoryBackend {
    name: String,
    backend_type: BackendType,
    objects: Arc<RwLock<HashMap<String, Entry>>>,
    queued_failures: Mutex<VecDeque<InjectedFailure>>,
    permanent_failure: Mutex<Option<InjectedFailure>>,
    write_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create a backend producing locators of `backend_type`.
    ///
    /// # Errors
    /// - `backend_type` is not a storage backend
    pub fn new(name: impl Into<String>, backend_type: BackendType) -> Result<Self> {
        if !backend_type.is_storage() {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a storage backend type",
                backend_type
            )));
        }
        Ok(Self::build(name.into(), backend_type))
    }

    /// A permanent-store stand-in named `memory-arweave`.
    pub fn permanent() -> Self {
        Self::build("memory-arweave".to_string(), BackendType::Arweave)
    }

    /// A pinned-store stand-in named `memory-ipfs`.
    pub fn pinned() -> Self {
        Self::build("memory-ipfs".to_string(), BackendType::Ipfs)
    }

    fn build(name: String, backend_type: BackendType) -> Self {
        Self {
            name,
            backend_type,
            objects: Arc::new(RwLock::new(HashMap::new())),
            queued_failures: Mutex::new(VecDeque::new()),
            permanent_failure: Mutex::new(None),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next write fail with `failure` (queued, one per write).
    pub fn fail_next(&self, failure: InjectedFailure) {
        self.queued_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(failure);
    }

    /// Make every write fail with `failure` until cleared with `None`.
    pub fn fail_always(&self, failure: Option<InjectedFailure>) {
        *self
            .permanent_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = failure;
    }

    /// Number of times `write` has been called, successful or not.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tags stored with `id`.
    pub fn tags(&self, id: &str) -> Option<Vec<Tag>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.tags.clone())
    }

    /// Ids of objects carrying a tag with exactly this name and value.
    pub fn find_by_tag(&self, name: &str, value: &str) -> Vec<String> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = objects
            .iter()
            .filter(|(_, entry)| {
                entry
                    .tags
                    .iter()
                    .any(|tag| tag.name == name && tag.value == value)
            })
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn next_failure(&self) -> Option<InjectedFailure> {
        let queued = self
            .queued_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        queued.or(*self
            .permanent_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner))
    }

    fn content_id(&self, data: &[u8], tags: &[Tag]) -> Result<String> {
        match self.backend_type {
            BackendType::Ipfs => raw_cid_v1(data),
            _ => {
                let mut preimage = encode_tags(tags)?;
                preimage.extend_from_slice(data);
                Ok(content_digest_id(&preimage))
            }
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    async fn write(&self, data: Bytes, tags: &[Tag]) -> Result<WriteReceipt> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let failure = self.next_failure();
        if let Some(InjectedFailure::Backend(kind)) = failure {
            return Err(Error::backend(
                self.name.clone(),
                kind,
                "injected failure",
            ));
        }

        let id = self.content_id(&data, tags)?;
        let size = data.len() as u64;
        // Stored objects are immutable; a repeat write keeps the first entry.
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_insert_with(|| Entry {
                data,
                tags: tags.to_vec(),
            });

        if failure == Some(InjectedFailure::StatusUnknown) {
            return Err(Error::WriteStatusUnknown {
                backend: self.name.clone(),
                message: "injected confirmation timeout".to_string(),
            });
        }

        Ok(WriteReceipt {
            locator: Locator::new(self.backend_type, id.clone())?,
            id,
            size,
            confirmed_at: Utc::now(),
            provider_data: None,
        })
    }

    async fn read(&self, id: &str) -> Result<Bytes> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| Error::NotFound(format!("{}: no content with id {}", self.name, id)))
    }
}
