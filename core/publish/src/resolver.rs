//! Priority resolver.
//!
//! Writes a validated document to the first backend that accepts it. The
//! chain is an explicit list sorted once by backend priority; each backend
//! gets bounded retries for transient failures before the resolver falls
//! through to the next one.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use weavegate_common::{BackendType, Error, Locator, Result, Tag};
use weavegate_storage::StorageBackend;

use crate::gate::ValidatedOperation;
use crate::retry::{RetryConfig, RetryExecutor};
use crate::tagger::{derive_tags, missing_required, TagContext};

/// How one backend's attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Stored(Locator),
    Failed(String),
}

/// Record of one backend in the chain. Returned for observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAttempt {
    pub backend: String,
    pub backend_type: BackendType,
    /// Number of write calls made, including retries.
    pub tries: u32,
    pub outcome: AttemptOutcome,
}

/// Successful store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub locator: Locator,
    /// Name of the backend that accepted the write.
    pub backend: String,
    pub tags: Vec<Tag>,
    /// Every backend tried, in order, including the successful one.
    pub attempts: Vec<WriteAttempt>,
}

/// Ordered fallback chain over storage backends.
pub struct PriorityResolver {
    backends: Vec<Arc<dyn StorageBackend>>,
    retry: RetryExecutor,
}

impl PriorityResolver {
    /// Create a resolver, ordering `backends` by priority.
    ///
    /// Backends of equal priority keep their given order.
    ///
    /// # Errors
    /// - `backends` is empty
    /// - A backend produces non-storage locators
    pub fn new(mut backends: Vec<Arc<dyn StorageBackend>>, retry: RetryConfig) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::Config(
                "At least one storage backend is required".to_string(),
            ));
        }
        if let Some(bad) = backends.iter().find(|b| b.backend_type().priority().is_none()) {
            return Err(Error::Config(format!(
                "Backend '{}' produces '{}' locators, which cannot be stored",
                bad.name(),
                bad.backend_type()
            )));
        }
        backends.sort_by_key(|b| b.backend_type().priority());

        Ok(Self {
            backends,
            retry: RetryExecutor::new(retry),
        })
    }

    /// Backend names in the order they are tried.
    pub fn chain(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Store `document` for a validated operation.
    ///
    /// The tag context's data type and resource are taken from the
    /// operation, so tags always describe what was validated.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the derived tags lack a required tag
    /// - `Error::WriteStatusUnknown` as soon as any backend reports it; no
    ///   later backend is tried
    /// - `Error::AllBackendsExhausted` if every backend failed
    pub async fn store(
        &self,
        document: &Value,
        validated: &ValidatedOperation,
        context: &TagContext,
    ) -> Result<StoreOutcome> {
        let operation = validated.operation();
        let mut context = context.clone();
        context.data_type = operation.data_type();
        context.resource = Some(*operation.resource());

        let tags = derive_tags(document, &context);
        let missing = missing_required(&tags);
        if !missing.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Refusing to write without required tags: {}",
                missing.join(", ")
            )));
        }

        let data = Bytes::from(serde_json::to_vec(document)?);
        let mut attempts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let tries = AtomicU32::new(0);
            debug!(backend = backend.name(), size = data.len(), "Attempting write");

            let result = self
                .retry
                .execute(|| {
                    tries.fetch_add(1, Ordering::SeqCst);
                    backend.write(data.clone(), &tags)
                })
                .await;
            let tries = tries.load(Ordering::SeqCst);

            match result {
                Ok(receipt) => {
                    if receipt.locator.backend() != backend.backend_type() {
                        // An adapter returning a foreign locator is a defect.
                        return Err(Error::InvalidInput(format!(
                            "Backend '{}' returned locator {} of the wrong type",
                            backend.name(),
                            receipt.locator
                        )));
                    }
                    info!(
                        backend = backend.name(),
                        locator = %receipt.locator,
                        tries,
                        "Document stored"
                    );
                    attempts.push(WriteAttempt {
                        backend: backend.name().to_string(),
                        backend_type: backend.backend_type(),
                        tries,
                        outcome: AttemptOutcome::Stored(receipt.locator.clone()),
                    });
                    return Ok(StoreOutcome {
                        locator: receipt.locator,
                        backend: backend.name().to_string(),
                        tags,
                        attempts,
                    });
                }
                Err(err @ Error::WriteStatusUnknown { .. }) => {
                    warn!(
                        backend = backend.name(),
                        error = %err,
                        "Write status unknown; not falling through"
                    );
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        backend = backend.name(),
                        error = %err,
                        tries,
                        "Backend failed, downgrading to next backend"
                    );
                    attempts.push(WriteAttempt {
                        backend: backend.name().to_string(),
                        backend_type: backend.backend_type(),
                        tries,
                        outcome: AttemptOutcome::Failed(err.to_string()),
                    });
                }
            }
        }

        let failures: Vec<String> = attempts
            .iter()
            .map(|attempt| match &attempt.outcome {
                AttemptOutcome::Failed(message) => format!("{}: {}", attempt.backend, message),
                AttemptOutcome::Stored(locator) => format!("{}: {}", attempt.backend, locator),
            })
            .collect();
        warn!(backends = failures.len(), "All storage backends exhausted");
        Err(Error::AllBackendsExhausted { failures })
    }
}
