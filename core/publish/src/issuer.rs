//! Authorization token issuer.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use weavegate_common::{Address, Error, ResourceId, Result};
use weavegate_crypto::{AuthorizationToken, EthereumKey, TokenClaims, TOKEN_VERSION};

use crate::ledger::Ledger;

const SECONDS_PER_HOUR: u64 = 3600;

/// Issues delegated authorization tokens on behalf of a resource owner.
pub struct TokenIssuer {
    ledger: Arc<dyn Ledger>,
    key: EthereumKey,
}

impl TokenIssuer {
    pub fn new(ledger: Arc<dyn Ledger>, key: EthereumKey) -> Self {
        Self { ledger, key }
    }

    /// Address tokens are signed with.
    pub fn signer(&self) -> Address {
        self.key.address()
    }

    /// Issue a token valid for `expiry_hours` from now.
    ///
    /// # Errors
    /// - `Error::NotResourceOwner` if the signing key does not own `resource`
    /// - `Error::InvalidInput` for a zero expiry or a resource on another chain
    /// - Ledger errors from the ownership lookup
    pub async fn issue(
        &self,
        resource: ResourceId,
        delegate: Address,
        index_bound: u64,
        expiry_hours: u64,
    ) -> Result<AuthorizationToken> {
        let now = Utc::now().timestamp().max(0) as u64;
        self.issue_at(resource, delegate, index_bound, expiry_hours, now)
            .await
    }

    /// Issue a token with an explicit issuance time (unix seconds).
    pub async fn issue_at(
        &self,
        resource: ResourceId,
        delegate: Address,
        index_bound: u64,
        expiry_hours: u64,
        now: u64,
    ) -> Result<AuthorizationToken> {
        if expiry_hours == 0 {
            return Err(Error::InvalidInput(
                "expiry_hours must be at least 1".to_string(),
            ));
        }
        if resource.chain_id() != self.ledger.chain_id() {
            return Err(Error::InvalidInput(format!(
                "Resource {} is not on chain {}",
                resource,
                self.ledger.chain_id()
            )));
        }

        let owner = self.ledger.owner_of(&resource).await?;
        if owner != self.key.address() {
            warn!(resource = %resource, signer = %self.key.address(), "Refusing to issue token");
            return Err(Error::NotResourceOwner {
                resource: resource.to_string(),
                caller: self.key.address().to_string(),
            });
        }

        let expiry = expiry_hours
            .checked_mul(SECONDS_PER_HOUR)
            .and_then(|secs| now.checked_add(secs))
            .ok_or_else(|| Error::InvalidInput("expiry overflows".to_string()))?;

        let claims = TokenClaims {
            version: TOKEN_VERSION,
            resource,
            delegate,
            index_bound,
            expiry,
            registry: self.ledger.registry(),
            signer: owner,
        };
        let token = AuthorizationToken::sign(claims, &self.key)?;

        info!(
            resource = %resource,
            delegate = %delegate,
            index_bound,
            expiry,
            "Authorization token issued"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::PreValidationGate;
    use crate::ledger::Operation;
    use crate::memory_ledger::MemoryLedger;
    use weavegate_common::RevertReason;

    const CHAIN: u64 = 11155111;
    const NOW: u64 = 1_760_000_000;

    fn client() -> Address {
        Address::from_bytes([2; 20])
    }

    async fn setup() -> (Arc<MemoryLedger>, EthereumKey, ResourceId) {
        let ledger = Arc::new(MemoryLedger::new(CHAIN, Address::from_bytes([0x8a; 20])));
        ledger.set_time(Some(NOW)).await;
        let owner = EthereumKey::generate().unwrap();
        let resource = ledger.register(owner.address(), None).await;
        (ledger, owner, resource)
    }

    #[tokio::test]
    async fn test_issue_binds_claims() {
        let (ledger, owner, resource) = setup().await;
        let issuer = TokenIssuer::new(ledger.clone(), owner);

        let token = issuer
            .issue_at(resource, client(), 3, 24, NOW)
            .await
            .unwrap();
        let claims = token.claims();
        assert_eq!(claims.resource, resource);
        assert_eq!(claims.delegate, client());
        assert_eq!(claims.index_bound, 3);
        assert_eq!(claims.expiry, NOW + 24 * 3600);
        assert_eq!(claims.registry, ledger.registry());
        assert_eq!(claims.chain_id(), CHAIN);
        assert_eq!(token.recover_signer().unwrap(), issuer.signer());
    }

    #[tokio::test]
    async fn test_issued_token_passes_gate() {
        let (ledger, owner, resource) = setup().await;
        let token = TokenIssuer::new(ledger.clone(), owner)
            .issue_at(resource, client(), 1, 1, NOW)
            .await
            .unwrap();

        let op = Operation::Feedback {
            resource,
            client: client(),
            score: 85,
            tag1: None,
            tag2: None,
            authorization: Some(token),
        };
        PreValidationGate::new(ledger).validate(op).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_owner_cannot_issue() {
        let (ledger, _owner, resource) = setup().await;
        let stranger = EthereumKey::generate().unwrap();
        let err = TokenIssuer::new(ledger, stranger)
            .issue_at(resource, client(), 1, 24, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotResourceOwner { .. }));
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (ledger, owner, resource) = setup().await;
        let issuer = TokenIssuer::new(ledger, owner);

        assert!(matches!(
            issuer.issue_at(resource, client(), 1, 0, NOW).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            issuer
                .issue_at(ResourceId::new(1, resource.token_id()), client(), 1, 24, NOW)
                .await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            issuer
                .issue_at(ResourceId::new(CHAIN, 99), client(), 1, 24, NOW)
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected_by_gate() {
        let (ledger, owner, resource) = setup().await;
        let token = TokenIssuer::new(ledger.clone(), owner)
            .issue_at(resource, client(), 1, 1, NOW - 2 * 3600)
            .await
            .unwrap();

        let err = PreValidationGate::new(ledger)
            .validate(Operation::Feedback {
                resource,
                client: client(),
                score: 85,
                tag1: None,
                tag2: None,
                authorization: Some(token),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ValidationRejected(RevertReason::AuthorizationExpired)
        ));
    }
}
