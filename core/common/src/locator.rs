//! Content locators and the URI type classifier.
//!
//! A locator is the string persisted on the ledger next to an operation:
//! `ar://<id>` for the permanent store, `ipfs://<cid>` for the pinned store.
//! Indexers type every persisted URI with [`classify`], so the match order
//! here is part of the persisted format and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const AR_PREFIX: &str = "ar://";
const IPFS_PREFIX: &str = "ipfs://";
const HTTPS_PREFIX: &str = "https://";
const HTTP_PREFIX: &str = "http://";

/// Type of a locator, as assigned by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Pay-per-write permanent store (`ar://`).
    Arweave,
    /// Content-addressed pinned store (`ipfs://`).
    Ipfs,
    /// Plain HTTPS URL.
    Https,
    /// Plain HTTP URL.
    Http,
    /// Anything else.
    Unknown,
}

impl BackendType {
    /// Name used by indexers for the URI type field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arweave => "arweave",
            Self::Ipfs => "ipfs",
            Self::Https => "https",
            Self::Http => "http",
            Self::Unknown => "unknown",
        }
    }

    /// Locator scheme for content-addressed stores.
    pub fn scheme(&self) -> Option<&'static str> {
        match self {
            Self::Arweave => Some("ar"),
            Self::Ipfs => Some("ipfs"),
            _ => None,
        }
    }

    /// Whether this type names a storage backend that can produce locators.
    pub fn is_storage(&self) -> bool {
        self.scheme().is_some()
    }

    /// Write priority of a storage backend; lower is tried first.
    pub fn priority(&self) -> Option<u8> {
        match self {
            Self::Arweave => Some(0),
            Self::Ipfs => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a locator string.
///
/// Match order is fixed: permanent store, then pinned store, then HTTP(S).
/// A compound string such as `ar://ipfs://x` therefore resolves to exactly
/// one type.
pub fn classify(uri: &str) -> BackendType {
    if uri.starts_with(AR_PREFIX) {
        BackendType::Arweave
    } else if uri.starts_with(IPFS_PREFIX) {
        BackendType::Ipfs
    } else if uri.starts_with(HTTPS_PREFIX) {
        BackendType::Https
    } else if uri.starts_with(HTTP_PREFIX) {
        BackendType::Http
    } else {
        BackendType::Unknown
    }
}

/// A locator for content held by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    backend: BackendType,
    id: String,
}

impl Locator {
    /// Create a locator from a backend type and its native id.
    ///
    /// # Errors
    /// - Backend is not a storage backend
    /// - Id is empty or contains characters outside `[A-Za-z0-9_-]`
    pub fn new(backend: BackendType, id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if !backend.is_storage() {
            return Err(crate::Error::InvalidInput(format!(
                "'{}' is not a storage backend",
                backend
            )));
        }
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Locator id cannot be empty".to_string(),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::Error::InvalidInput(format!(
                "Locator id contains invalid characters: '{}'",
                id
            )));
        }
        Ok(Self { backend, id })
    }

    /// Parse a locator string.
    ///
    /// # Errors
    /// - String does not classify as a storage backend
    /// - Id part is invalid
    pub fn parse(uri: &str) -> crate::Result<Self> {
        let backend = classify(uri);
        let id = match backend {
            BackendType::Arweave => &uri[AR_PREFIX.len()..],
            BackendType::Ipfs => &uri[IPFS_PREFIX.len()..],
            _ => {
                return Err(crate::Error::InvalidInput(format!(
                    "Not a content locator: '{}' ({})",
                    uri, backend
                )))
            }
        };
        Self::new(backend, id)
    }

    /// Backend type.
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Backend-native id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `new` rejects non-storage backends, so the scheme is always present.
        let scheme = self.backend.scheme().unwrap_or("unknown");
        write!(f, "{}://{}", scheme, self.id)
    }
}

impl FromStr for Locator {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Locator {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}
