//! Write and read paths for WeaveGate.
//!
//! A document is published in three steps: the ledger simulates the
//! operation it belongs to ([`gate`]), the document is written to the
//! first storage backend that accepts it ([`resolver`]), and the operation
//! is committed with the resulting locator. [`Publisher`] runs all three.
//! Readers fetch through several gateways at once ([`retriever`]).

pub mod config;
pub mod gate;
pub mod issuer;
pub mod ledger;
pub mod memory_ledger;
pub mod publisher;
pub mod resolver;
pub mod retriever;
pub mod retry;
pub mod tagger;

pub use config::{
    BackendEntry, ExhaustedPolicy, PublisherConfig, RetrievalSettings, RetrySettings, MAX_RETRIES_CAP,
};
pub use gate::{PreValidationGate, ValidatedOperation};
pub use issuer::TokenIssuer;
pub use ledger::{
    Commit, CommitOutcome, CommitReceipt, DataType, Ledger, Operation, SimulationOutcome,
};
pub use memory_ledger::{FeedbackRecord, MemoryLedger};
pub use publisher::{Published, Publisher};
pub use resolver::{AttemptOutcome, PriorityResolver, StoreOutcome, WriteAttempt};
pub use retriever::{GatewayRetriever, RetrievalConfig};
pub use retry::{RetryConfig, RetryExecutor};
pub use tagger::{derive_tags, missing_required, TagContext, REQUIRED_TAGS};
