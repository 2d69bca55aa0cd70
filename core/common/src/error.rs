//! Common error types for WeaveGate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reason an operation was (or would be) reverted by the ledger.
///
/// Messages match the revert strings the registries emit so that operator
/// logs can be grepped the same way on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RevertReason {
    /// Feedback client is the resource owner.
    SelfFeedback,
    /// Token signature does not recover to the owner or an approved operator.
    SignerNotAuthorized,
    /// Token was issued to a different delegate than the submitting client.
    DelegateMismatch,
    /// Token expiry is not in the future.
    AuthorizationExpired,
    /// Next feedback index exceeds the token's index bound.
    IndexLimitExceeded,
    /// Token targets another resource, chain or registry.
    ScopeMismatch,
    /// Resource does not exist.
    ResourceNotFound,
    /// Resource exists but is inactive.
    ResourceInactive,
    /// Caller does not own the resource.
    NotOwner,
    /// Score outside 0..=100.
    InvalidScore,
    /// Any other revert string.
    Other(String),
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfFeedback => write!(f, "Self-feedback not allowed"),
            Self::SignerNotAuthorized => write!(f, "Signer not authorized"),
            Self::DelegateMismatch => write!(f, "Client address mismatch"),
            Self::AuthorizationExpired => write!(f, "FeedbackAuth expired"),
            Self::IndexLimitExceeded => write!(f, "IndexLimit exceeded"),
            Self::ScopeMismatch => write!(f, "FeedbackAuth scope mismatch"),
            Self::ResourceNotFound => write!(f, "Agent does not exist"),
            Self::ResourceInactive => write!(f, "Agent is not active"),
            Self::NotOwner => write!(f, "Not authorized"),
            Self::InvalidScore => write!(f, "Score must be between 0 and 100"),
            Self::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Classification of a storage backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Prepaid credits or balance do not cover the write.
    InsufficientBalance,
    /// Payload exceeds the backend's size limit.
    SizeLimitExceeded,
    /// Request never reached the backend (connect failure or timeout before send).
    NetworkTimeout,
    /// Content accepted but not yet indexed or propagated.
    IndexingPending,
    /// Backend temporarily unavailable (5xx, rate limited).
    Unavailable,
    /// Backend refused the write or answered with something unusable.
    Rejected,
}

impl BackendErrorKind {
    /// Whether an identical request may succeed if repeated after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::Unavailable | Self::IndexingPending
        )
    }

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientBalance => "insufficient_balance",
            Self::SizeLimitExceeded => "size_limit_exceeded",
            Self::NetworkTimeout => "network_timeout",
            Self::IndexingPending => "indexing_pending",
            Self::Unavailable => "unavailable",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for WeaveGate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The ledger would revert the operation. Never retried, nothing written.
    #[error("Validation rejected: {0}")]
    ValidationRejected(RevertReason),

    /// A storage backend failed.
    #[error("Backend '{backend}' failed ({kind}): {message}")]
    Backend {
        backend: String,
        kind: BackendErrorKind,
        message: String,
    },

    /// The write was sent but its confirmation never arrived.
    ///
    /// The content may exist on the backend. Callers must check before
    /// retrying, a blind retry can pay for the same document twice.
    #[error("Write status unknown on '{backend}': {message}")]
    WriteStatusUnknown { backend: String, message: String },

    /// Every configured backend failed.
    #[error("All storage backends exhausted: {}", failures.join("; "))]
    AllBackendsExhausted { failures: Vec<String> },

    /// No gateway produced the content.
    #[error("All gateways failed for {locator}: {}", failures.join("; "))]
    AllGatewaysFailed {
        locator: String,
        failures: Vec<String>,
    },

    /// Gateways returned different content for the same locator.
    #[error("Integrity mismatch for {locator}: '{first}' and '{second}' returned different content")]
    IntegrityMismatch {
        locator: String,
        first: String,
        second: String,
    },

    /// Token issuance attempted by someone other than the resource owner.
    #[error("{caller} is not the owner of resource {resource}")]
    NotResourceOwner { resource: String, caller: String },

    /// Content or resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Read endpoint temporarily unavailable.
    #[error("Transiently unavailable: {0}")]
    TransientUnavailable(String),

    /// Ledger transport failure (not a revert).
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a backend failure.
    pub fn backend(
        backend: impl Into<String>,
        kind: BackendErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            kind,
            message: message.into(),
        }
    }

    /// Whether repeating the same request after a backoff may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Backend { kind, .. } => kind.is_transient(),
            Self::TransientUnavailable(_) => true,
            _ => false,
        }
    }

    /// The backend failure kind, if this is a backend error.
    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            Self::Backend { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
