//! Authoritative ledger interface.
//!
//! The ledger owns resource ownership, the per-resource feedback index and
//! authorization checks. This crate only simulates and commits against it;
//! [`crate::memory_ledger::MemoryLedger`] reproduces its rules in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use weavegate_common::{Address, Locator, ResourceId, Result, RevertReason};
use weavegate_crypto::{fingerprint, AuthorizationToken};

/// Kind of document an operation publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Registration,
    Feedback,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "Registration",
            Self::Feedback => "Feedback",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger operation, without the content locator it will carry.
///
/// The locator is only known after storage, so it is attached to the
/// validated operation when the commit is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Point a resource at a new registration document.
    SetUri {
        resource: ResourceId,
        caller: Address,
    },
    /// Submit feedback about a resource.
    Feedback {
        resource: ResourceId,
        client: Address,
        score: u8,
        #[serde(default)]
        tag1: Option<String>,
        #[serde(default)]
        tag2: Option<String>,
        #[serde(default)]
        authorization: Option<AuthorizationToken>,
    },
}

impl Operation {
    /// Resource the operation targets.
    pub fn resource(&self) -> &ResourceId {
        match self {
            Self::SetUri { resource, .. } | Self::Feedback { resource, .. } => resource,
        }
    }

    /// Address submitting the operation.
    pub fn submitter(&self) -> &Address {
        match self {
            Self::SetUri { caller, .. } => caller,
            Self::Feedback { client, .. } => client,
        }
    }

    /// Kind of document the operation publishes.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::SetUri { .. } => DataType::Registration,
            Self::Feedback { .. } => DataType::Feedback,
        }
    }

    /// Blake2b-256 fingerprint of the canonical JSON form.
    pub fn fingerprint(&self) -> Result<[u8; 32]> {
        Ok(fingerprint(&serde_json::to_vec(self)?))
    }
}

/// An operation ready to be committed, with its optional content locator.
///
/// Only a validated operation can be turned into a commit, see
/// [`crate::gate::ValidatedOperation::into_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    operation: Operation,
    uri: Option<Locator>,
    fingerprint: [u8; 32],
}

impl Commit {
    pub(crate) fn new(operation: Operation, uri: Option<Locator>, fingerprint: [u8; 32]) -> Self {
        Self {
            operation,
            uri,
            fingerprint,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Off-chain locator, or `None` when the operation carries no URI.
    pub fn uri(&self) -> Option<&Locator> {
        self.uri.as_ref()
    }

    /// Fingerprint of the operation as it was validated.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

/// Result of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// The commit would succeed against current state.
    Accepted,
    /// The commit would revert.
    Reverted(RevertReason),
}

/// Result of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitReceipt),
    Reverted(RevertReason),
}

/// Receipt of an applied commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Ledger transaction id.
    pub tx_id: String,
    pub resource: ResourceId,
    /// Feedback index consumed, for feedback commits.
    pub index: Option<u64>,
    pub uri: Option<Locator>,
    pub committed_at: DateTime<Utc>,
}

/// The authoritative ledger.
///
/// Transport failures are `Err`; rule violations are reported in the
/// outcome so that a failed round-trip can never be mistaken for a revert
/// or an acceptance.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Chain the ledger lives on.
    fn chain_id(&self) -> u64;

    /// Registry contract address, bound into authorization tokens.
    fn registry(&self) -> Address;

    /// Current owner of `resource`.
    ///
    /// # Errors
    /// - `Error::NotFound` if the resource does not exist
    async fn owner_of(&self, resource: &ResourceId) -> Result<Address>;

    /// Dry-run `operation` against current state without mutating it.
    async fn simulate(&self, operation: &Operation) -> Result<SimulationOutcome>;

    /// Apply a commit.
    async fn commit(&self, commit: &Commit) -> Result<CommitOutcome>;

    /// Last feedback index `client` consumed on `resource` (0 if none).
    async fn feedback_index(&self, resource: &ResourceId, client: &Address) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(score: u8) -> Operation {
        Operation::Feedback {
            resource: ResourceId::new(11155111, 7),
            client: Address::from_bytes([2; 20]),
            score,
            tag1: Some("quality".to_string()),
            tag2: None,
            authorization: None,
        }
    }

    #[test]
    fn test_fingerprint_binds_parameters() {
        assert_eq!(
            feedback(85).fingerprint().unwrap(),
            feedback(85).fingerprint().unwrap()
        );
        assert_ne!(
            feedback(85).fingerprint().unwrap(),
            feedback(86).fingerprint().unwrap()
        );
    }

    #[test]
    fn test_operation_accessors() {
        let op = feedback(85);
        assert_eq!(op.data_type(), DataType::Feedback);
        assert_eq!(op.submitter(), &Address::from_bytes([2; 20]));

        let set_uri = Operation::SetUri {
            resource: ResourceId::new(1, 2),
            caller: Address::from_bytes([1; 20]),
        };
        assert_eq!(set_uri.data_type().as_str(), "Registration");
        assert_eq!(set_uri.resource(), &ResourceId::new(1, 2));
    }

    #[test]
    fn test_operation_json_shape() {
        let json = serde_json::to_value(feedback(85)).unwrap();
        assert_eq!(json["type"], "feedback");
        assert_eq!(json["score"], 85);
        assert_eq!(json["resource"], "11155111:7");
    }
}
