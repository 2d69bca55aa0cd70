//! Pre-validation gate.
//!
//! Every billed write is preceded by a dry run of the ledger commit it
//! serves. [`ValidatedOperation`] can only be produced here, and storage
//! and commit both consume it, so the order is enforced by the types.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use weavegate_common::{Error, Locator, Result};

use crate::ledger::{Commit, Ledger, Operation, SimulationOutcome};

/// An operation the ledger accepted in simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOperation {
    operation: Operation,
    fingerprint: [u8; 32],
    validated_at: DateTime<Utc>,
}

impl ValidatedOperation {
    /// The operation that was simulated.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Fingerprint of the exact parameters that were simulated.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// When the simulation succeeded.
    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    /// Build the commit for this operation with its content locator.
    ///
    /// `uri` is `None` when the caller proceeds without off-chain storage.
    pub fn into_commit(self, uri: Option<Locator>) -> Commit {
        Commit::new(self.operation, uri, self.fingerprint)
    }
}

/// Simulates operations against the ledger before anything is written.
pub struct PreValidationGate {
    ledger: Arc<dyn Ledger>,
}

impl PreValidationGate {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Simulate `operation` once.
    ///
    /// # Errors
    /// - `Error::ValidationRejected` if the commit would revert
    /// - Ledger transport errors, passed through unchanged
    pub async fn validate(&self, operation: Operation) -> Result<ValidatedOperation> {
        let fingerprint = operation.fingerprint()?;

        match self.ledger.simulate(&operation).await? {
            SimulationOutcome::Accepted => {
                info!(
                    resource = %operation.resource(),
                    data_type = %operation.data_type(),
                    "Operation pre-validated"
                );
                Ok(ValidatedOperation {
                    operation,
                    fingerprint,
                    validated_at: Utc::now(),
                })
            }
            SimulationOutcome::Reverted(reason) => {
                warn!(
                    resource = %operation.resource(),
                    reason = %reason,
                    "Operation rejected in simulation"
                );
                Err(Error::ValidationRejected(reason))
            }
        }
    }
}
