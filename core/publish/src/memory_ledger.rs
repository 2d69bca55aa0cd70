//! In-process ledger for tests and offline runs.
//!
//! Reproduces the reputation registry rules that matter to publishing:
//! resource existence and activity, self-feedback, score range, operator
//! approval and authorization token checks with a monotonic per-client
//! feedback index.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use weavegate_common::{Address, Error, Locator, ResourceId, Result, RevertReason};

use crate::ledger::{
    Commit, CommitOutcome, CommitReceipt, Ledger, Operation, SimulationOutcome,
};

const MAX_SCORE: u8 = 100;

/// A stored feedback entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub index: u64,
    pub score: u8,
    pub tag1: Option<String>,
    pub tag2: Option<String>,
    pub uri: Option<Locator>,
}

#[derive(Debug, Clone)]
struct Resource {
    owner: Address,
    active: bool,
    uri: Option<Locator>,
    operators: HashSet<Address>,
}

impl Resource {
    fn is_authorized(&self, signer: &Address) -> bool {
        *signer == self.owner || self.operators.contains(signer)
    }
}

#[derive(Default)]
struct State {
    next_token_id: u64,
    resources: HashMap<ResourceId, Resource>,
    feedback: HashMap<(ResourceId, Address), Vec<FeedbackRecord>>,
    time_override: Option<u64>,
    commits: usize,
}

impl State {
    fn now(&self) -> u64 {
        self.time_override
            .unwrap_or_else(|| Utc::now().timestamp().max(0) as u64)
    }

    fn last_index(&self, resource: &ResourceId, client: &Address) -> u64 {
        self.feedback
            .get(&(*resource, *client))
            .map(|records| records.len() as u64)
            .unwrap_or(0)
    }
}

/// Reference ledger held in memory.
pub struct MemoryLedger {
    chain_id: u64,
    registry: Address,
    require_authorization: bool,
    unreachable: AtomicBool,
    state: RwLock<State>,
}

impl MemoryLedger {
    /// Create an empty ledger. Feedback requires an authorization token.
    pub fn new(chain_id: u64, registry: Address) -> Self {
        Self {
            chain_id,
            registry,
            require_authorization: true,
            unreachable: AtomicBool::new(false),
            state: RwLock::new(State {
                next_token_id: 1,
                ..State::default()
            }),
        }
    }

    /// Whether feedback without an authorization token is rejected.
    pub fn with_authorization_required(mut self, required: bool) -> Self {
        self.require_authorization = required;
        self
    }

    /// Simulate a transport outage: every call fails with `Error::Ledger`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Pin the ledger clock to a unix timestamp, or release it with `None`.
    pub async fn set_time(&self, now: Option<u64>) {
        self.state.write().await.time_override = now;
    }

    /// Register a new active resource owned by `owner`.
    pub async fn register(&self, owner: Address, uri: Option<Locator>) -> ResourceId {
        let mut state = self.state.write().await;
        let resource = ResourceId::new(self.chain_id, state.next_token_id);
        state.next_token_id += 1;
        state.resources.insert(
            resource,
            Resource {
                owner,
                active: true,
                uri,
                operators: HashSet::new(),
            },
        );
        debug!(resource = %resource, owner = %owner, "Resource registered");
        resource
    }

    /// Mark a resource active or inactive.
    pub async fn set_active(&self, resource: &ResourceId, active: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .resources
            .get_mut(resource)
            .ok_or_else(|| Error::NotFound(format!("Resource {}", resource)))?;
        entry.active = active;
        Ok(())
    }

    /// Let `operator` sign authorizations on behalf of the owner.
    pub async fn approve_operator(&self, resource: &ResourceId, operator: Address) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .resources
            .get_mut(resource)
            .ok_or_else(|| Error::NotFound(format!("Resource {}", resource)))?;
        entry.operators.insert(operator);
        Ok(())
    }

    /// Registration URI of a resource.
    pub async fn uri_of(&self, resource: &ResourceId) -> Option<Locator> {
        self.state
            .read()
            .await
            .resources
            .get(resource)
            .and_then(|r| r.uri.clone())
    }

    /// Feedback `client` left on `resource` at `index` (1-based).
    pub async fn feedback_record(
        &self,
        resource: &ResourceId,
        client: &Address,
        index: u64,
    ) -> Option<FeedbackRecord> {
        let state = self.state.read().await;
        let records = state.feedback.get(&(*resource, *client))?;
        let position = usize::try_from(index.checked_sub(1)?).ok()?;
        records.get(position).cloned()
    }

    /// Number of applied commits.
    pub async fn commit_count(&self) -> usize {
        self.state.read().await.commits
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Ledger("ledger endpoint unreachable".to_string()));
        }
        Ok(())
    }

    fn evaluate(&self, state: &State, operation: &Operation) -> std::result::Result<(), RevertReason> {
        let resource_id = operation.resource();
        if resource_id.chain_id() != self.chain_id {
            return Err(RevertReason::ResourceNotFound);
        }
        let resource = state
            .resources
            .get(resource_id)
            .ok_or(RevertReason::ResourceNotFound)?;

        match operation {
            Operation::SetUri { caller, .. } => {
                if !resource.is_authorized(caller) {
                    return Err(RevertReason::NotOwner);
                }
                Ok(())
            }
            Operation::Feedback {
                client,
                score,
                authorization,
                ..
            } => {
                if !resource.active {
                    return Err(RevertReason::ResourceInactive);
                }
                if *score > MAX_SCORE {
                    return Err(RevertReason::InvalidScore);
                }
                if *client == resource.owner || resource.operators.contains(client) {
                    return Err(RevertReason::SelfFeedback);
                }
                match authorization {
                    Some(token) => token.verify(
                        resource_id,
                        &self.registry,
                        client,
                        state.last_index(resource_id, client) + 1,
                        state.now(),
                        |signer| resource.is_authorized(signer),
                    ),
                    None if self.require_authorization => Err(RevertReason::SignerNotAuthorized),
                    None => Ok(()),
                }
            }
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn registry(&self) -> Address {
        self.registry
    }

    async fn owner_of(&self, resource: &ResourceId) -> Result<Address> {
        self.check_reachable()?;
        self.state
            .read()
            .await
            .resources
            .get(resource)
            .map(|r| r.owner)
            .ok_or_else(|| Error::NotFound(format!("Resource {}", resource)))
    }

    async fn simulate(&self, operation: &Operation) -> Result<SimulationOutcome> {
        self.check_reachable()?;
        let state = self.state.read().await;
        Ok(match self.evaluate(&state, operation) {
            Ok(()) => SimulationOutcome::Accepted,
            Err(reason) => SimulationOutcome::Reverted(reason),
        })
    }

    async fn commit(&self, commit: &Commit) -> Result<CommitOutcome> {
        self.check_reachable()?;
        let mut state = self.state.write().await;
        let operation = commit.operation();
        if let Err(reason) = self.evaluate(&state, operation) {
            return Ok(CommitOutcome::Reverted(reason));
        }

        let resource = *operation.resource();
        let uri = commit.uri().cloned();
        let index = match operation {
            Operation::SetUri { .. } => {
                if let Some(entry) = state.resources.get_mut(&resource) {
                    entry.uri = uri.clone();
                }
                None
            }
            Operation::Feedback {
                client,
                score,
                tag1,
                tag2,
                ..
            } => {
                let records = state.feedback.entry((resource, *client)).or_default();
                let index = records.len() as u64 + 1;
                records.push(FeedbackRecord {
                    index,
                    score: *score,
                    tag1: tag1.clone(),
                    tag2: tag2.clone(),
                    uri: uri.clone(),
                });
                Some(index)
            }
        };
        state.commits += 1;

        Ok(CommitOutcome::Committed(CommitReceipt {
            tx_id: format!("0x{}", Uuid::new_v4().simple()),
            resource,
            index,
            uri,
            committed_at: Utc::now(),
        }))
    }

    async fn feedback_index(&self, resource: &ResourceId, client: &Address) -> Result<u64> {
        self.check_reachable()?;
        Ok(self.state.read().await.last_index(resource, client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::PreValidationGate;
    use std::sync::Arc;
    use weavegate_crypto::{AuthorizationToken, EthereumKey, TokenClaims, TOKEN_VERSION};

    const CHAIN: u64 = 11155111;
    const NOW: u64 = 1_760_000_000;

    fn registry() -> Address {
        Address::from_bytes([0x8a; 20])
    }

    fn client() -> Address {
        Address::from_bytes([2; 20])
    }

    fn token(owner: &EthereumKey, resource: ResourceId, index_bound: u64) -> AuthorizationToken {
        AuthorizationToken::sign(
            TokenClaims {
                version: TOKEN_VERSION,
                resource,
                delegate: client(),
                index_bound,
                expiry: NOW + 3600,
                registry: registry(),
                signer: owner.address(),
            },
            owner,
        )
        .unwrap()
    }

    fn feedback(resource: ResourceId, score: u8, auth: Option<AuthorizationToken>) -> Operation {
        Operation::Feedback {
            resource,
            client: client(),
            score,
            tag1: None,
            tag2: None,
            authorization: auth,
        }
    }

    async fn ledger_with_owner(owner: &EthereumKey) -> (Arc<MemoryLedger>, ResourceId) {
        let ledger = Arc::new(MemoryLedger::new(CHAIN, registry()));
        ledger.set_time(Some(NOW)).await;
        let resource = ledger.register(owner.address(), None).await;
        (ledger, resource)
    }

    async fn reverted(ledger: &MemoryLedger, op: &Operation) -> RevertReason {
        match ledger.simulate(op).await.unwrap() {
            SimulationOutcome::Reverted(reason) => reason,
            SimulationOutcome::Accepted => panic!("expected revert"),
        }
    }

    #[tokio::test]
    async fn test_register_and_owner_of() {
        let owner = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;
        assert_eq!(resource, ResourceId::new(CHAIN, 1));
        assert_eq!(ledger.owner_of(&resource).await.unwrap(), owner.address());
        assert!(matches!(
            ledger.owner_of(&ResourceId::new(CHAIN, 99)).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_feedback_rules() {
        let owner = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;

        assert_eq!(
            reverted(&ledger, &feedback(resource, 85, None)).await,
            RevertReason::SignerNotAuthorized
        );
        assert_eq!(
            reverted(&ledger, &feedback(resource, 101, Some(token(&owner, resource, 1)))).await,
            RevertReason::InvalidScore
        );
        assert_eq!(
            reverted(&ledger, &feedback(ResourceId::new(CHAIN, 42), 85, None)).await,
            RevertReason::ResourceNotFound
        );
        assert_eq!(
            reverted(&ledger, &feedback(ResourceId::new(1, 1), 85, None)).await,
            RevertReason::ResourceNotFound
        );

        ledger.set_active(&resource, false).await.unwrap();
        assert_eq!(
            reverted(&ledger, &feedback(resource, 85, Some(token(&owner, resource, 1)))).await,
            RevertReason::ResourceInactive
        );
    }

    #[tokio::test]
    async fn test_foreign_signer_rejected() {
        let owner = EthereumKey::generate().unwrap();
        let stranger = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;

        let op = feedback(resource, 85, Some(token(&stranger, resource, 1)));
        assert_eq!(reverted(&ledger, &op).await, RevertReason::SignerNotAuthorized);

        // Approved operators may sign on the owner's behalf.
        ledger
            .approve_operator(&resource, stranger.address())
            .await
            .unwrap();
        assert_eq!(ledger.simulate(&op).await.unwrap(), SimulationOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_index_bound_consumed_by_commits() {
        let owner = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;
        let gate = PreValidationGate::new(ledger.clone());
        let auth = token(&owner, resource, 1);

        let validated = gate
            .validate(feedback(resource, 85, Some(auth.clone())))
            .await
            .unwrap();
        let outcome = ledger.commit(&validated.into_commit(None)).await.unwrap();
        let receipt = match outcome {
            CommitOutcome::Committed(receipt) => receipt,
            CommitOutcome::Reverted(reason) => panic!("unexpected revert: {}", reason),
        };
        assert_eq!(receipt.index, Some(1));
        assert_eq!(ledger.feedback_index(&resource, &client()).await.unwrap(), 1);

        // Same token, next index is 2 > bound 1.
        let err = gate
            .validate(feedback(resource, 90, Some(auth)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ValidationRejected(RevertReason::IndexLimitExceeded)
        ));
    }

    #[tokio::test]
    async fn test_expiry_uses_ledger_clock() {
        let owner = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;
        let op = feedback(resource, 85, Some(token(&owner, resource, 5)));

        ledger.set_time(Some(NOW + 3600)).await;
        assert_eq!(reverted(&ledger, &op).await, RevertReason::AuthorizationExpired);
    }

    #[tokio::test]
    async fn test_set_uri_requires_owner() {
        let owner = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;

        let op = Operation::SetUri {
            resource,
            caller: client(),
        };
        assert_eq!(reverted(&ledger, &op).await, RevertReason::NotOwner);

        let gate = PreValidationGate::new(ledger.clone());
        let validated = gate
            .validate(Operation::SetUri {
                resource,
                caller: owner.address(),
            })
            .await
            .unwrap();
        let locator = Locator::parse("ar://abc").unwrap();
        ledger
            .commit(&validated.into_commit(Some(locator.clone())))
            .await
            .unwrap();
        assert_eq!(ledger.uri_of(&resource).await, Some(locator));
    }

    #[tokio::test]
    async fn test_commit_without_uri_recorded() {
        let owner = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;
        let gate = PreValidationGate::new(ledger.clone());

        let validated = gate
            .validate(feedback(resource, 70, Some(token(&owner, resource, 1))))
            .await
            .unwrap();
        ledger.commit(&validated.into_commit(None)).await.unwrap();

        let record = ledger.feedback_record(&resource, &client(), 1).await.unwrap();
        assert_eq!(record.score, 70);
        assert!(record.uri.is_none());
        assert!(ledger.feedback_record(&resource, &client(), 0).await.is_none());
        assert_eq!(ledger.commit_count().await, 1);
    }

    #[tokio::test]
    async fn test_unreachable_ledger() {
        let owner = EthereumKey::generate().unwrap();
        let (ledger, resource) = ledger_with_owner(&owner).await;
        ledger.set_unreachable(true);
        assert!(matches!(
            ledger.simulate(&feedback(resource, 85, None)).await,
            Err(Error::Ledger(_))
        ));
    }
}
