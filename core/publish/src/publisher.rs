//! End-to-end publish flow.
//!
//! `validate -> store -> commit`. Nothing is written to a billed backend
//! before the ledger accepted the operation in simulation, and the commit
//! carries exactly the operation that was simulated.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use weavegate_common::{Error, Locator, Result, Tag};
use weavegate_storage::BackendRegistry;

use crate::config::{ExhaustedPolicy, PublisherConfig};
use crate::gate::PreValidationGate;
use crate::ledger::{CommitOutcome, CommitReceipt, Ledger, Operation};
use crate::resolver::{PriorityResolver, StoreOutcome};
use crate::tagger::{TagContext, DEFAULT_APP_NAME, DEFAULT_PROTOCOL};

/// Result of a completed publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Published {
    /// Off-chain locator, `None` when committed without one.
    pub locator: Option<Locator>,
    pub store: Option<StoreOutcome>,
    pub receipt: CommitReceipt,
}

/// Runs the gate, resolver and ledger commit in order.
pub struct Publisher {
    ledger: Arc<dyn Ledger>,
    gate: PreValidationGate,
    resolver: PriorityResolver,
    policy: ExhaustedPolicy,
    app_name: String,
    protocol: String,
}

impl Publisher {
    pub fn new(ledger: Arc<dyn Ledger>, resolver: PriorityResolver) -> Self {
        Self {
            gate: PreValidationGate::new(ledger.clone()),
            ledger,
            resolver,
            policy: ExhaustedPolicy::default(),
            app_name: DEFAULT_APP_NAME.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
        }
    }

    /// Build a publisher from a config, instantiating backends through
    /// `registry`.
    ///
    /// # Errors
    /// - `Error::Config` if the config is invalid, names an unknown
    ///   backend, or its chain id differs from the ledger's
    pub fn from_config(
        config: &PublisherConfig,
        ledger: Arc<dyn Ledger>,
        registry: &BackendRegistry,
    ) -> Result<Self> {
        config.validate()?;
        if config.chain_id != ledger.chain_id() {
            return Err(Error::Config(format!(
                "Config chain {} does not match ledger chain {}",
                config.chain_id,
                ledger.chain_id()
            )));
        }
        let resolver = PriorityResolver::new(
            config.build_backends(registry)?,
            config.retry_config(),
        )?;
        Ok(Self::new(ledger, resolver)
            .with_policy(config.exhausted_policy)
            .with_app_name(config.app_name.clone())
            .with_protocol(config.protocol.clone()))
    }

    pub fn with_policy(mut self, policy: ExhaustedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Publish `document` for `operation`.
    pub async fn publish(&self, operation: Operation, document: &Value) -> Result<Published> {
        self.publish_with_tags(operation, document, Vec::new()).await
    }

    /// Publish with extra searchable tags.
    ///
    /// # Errors
    /// - `Error::ValidationRejected` if simulation or the commit reverts
    /// - `Error::WriteStatusUnknown` from the resolver, uncommitted
    /// - `Error::AllBackendsExhausted` under [`ExhaustedPolicy::Abort`]
    /// - Ledger transport errors
    pub async fn publish_with_tags(
        &self,
        operation: Operation,
        document: &Value,
        extra: Vec<Tag>,
    ) -> Result<Published> {
        let validated = self.gate.validate(operation).await?;

        let mut context = TagContext::new(
            self.ledger.chain_id(),
            validated.operation().data_type(),
            Utc::now(),
        )
        .with_app_name(self.app_name.clone())
        .with_protocol(self.protocol.clone());
        context.extra = extra;

        let store = match self.resolver.store(document, &validated, &context).await {
            Ok(outcome) => Some(outcome),
            Err(Error::AllBackendsExhausted { failures })
                if self.policy == ExhaustedPolicy::ProceedWithoutLocator =>
            {
                warn!(
                    resource = %validated.operation().resource(),
                    failures = failures.len(),
                    "No backend stored the document, committing without a URI"
                );
                None
            }
            Err(e) => return Err(e),
        };
        let locator = store.as_ref().map(|s| s.locator.clone());

        let commit = validated.into_commit(locator.clone());
        match self.ledger.commit(&commit).await? {
            CommitOutcome::Committed(receipt) => {
                info!(
                    resource = %receipt.resource,
                    tx = %receipt.tx_id,
                    locator = ?locator.as_ref().map(ToString::to_string),
                    "Operation committed"
                );
                Ok(Published {
                    locator,
                    store,
                    receipt,
                })
            }
            CommitOutcome::Reverted(reason) => {
                // State moved between simulation and commit; any stored
                // document is now orphaned.
                error!(
                    resource = %commit.operation().resource(),
                    reason = %reason,
                    locator = ?locator.as_ref().map(ToString::to_string),
                    "Commit reverted after successful pre-validation"
                );
                Err(Error::ValidationRejected(reason))
            }
        }
    }
}
