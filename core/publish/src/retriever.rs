//! Multi-gateway retriever.
//!
//! Races every gateway that serves a locator's type. Each gateway runs in
//! its own task with its own timeout; once `quorum` gateways returned the
//! same bytes the rest are aborted by dropping the task set.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use weavegate_common::{BackendType, Error, Locator, Result};
use weavegate_crypto::verify_raw_cid;
use weavegate_storage::Gateway;

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Per-gateway timeout.
    pub timeout: Duration,
    /// Number of gateways that must return identical bytes. Clamped to the
    /// number of eligible gateways.
    pub quorum: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            quorum: 1,
        }
    }
}

/// Fetches stored documents through a set of gateways.
pub struct GatewayRetriever {
    gateways: Vec<Arc<dyn Gateway>>,
    config: RetrievalConfig,
}

impl GatewayRetriever {
    pub fn new(gateways: Vec<Arc<dyn Gateway>>, config: RetrievalConfig) -> Self {
        Self { gateways, config }
    }

    /// Fetch a locator given as a string.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the string is not an `ar://` or `ipfs://`
    ///   locator
    /// - Everything [`GatewayRetriever::fetch`] returns
    pub async fn fetch_uri(&self, uri: &str) -> Result<Bytes> {
        let locator = Locator::parse(uri)?;
        self.fetch(&locator).await
    }

    /// Fetch the content behind `locator`.
    ///
    /// # Errors
    /// - `Error::IntegrityMismatch` if two gateways returned different bytes
    /// - `Error::AllGatewaysFailed` if no eligible gateway is configured, or
    ///   too few returned usable content
    pub async fn fetch(&self, locator: &Locator) -> Result<Bytes> {
        let eligible: Vec<Arc<dyn Gateway>> = self
            .gateways
            .iter()
            .filter(|g| g.serves(locator.backend()))
            .cloned()
            .collect();
        if eligible.is_empty() {
            return Err(Error::AllGatewaysFailed {
                locator: locator.to_string(),
                failures: vec![format!("no gateway serves {} locators", locator.backend())],
            });
        }
        let quorum = self.config.quorum.clamp(1, eligible.len());

        let mut tasks = JoinSet::new();
        for gateway in eligible {
            let locator = locator.clone();
            let limit = self.config.timeout;
            tasks.spawn(async move {
                let name = gateway.name().to_string();
                let result = match timeout(limit, gateway.fetch(&locator)).await {
                    Ok(result) => result.and_then(|body| check_content(&locator, body)),
                    Err(_) => Err(Error::TransientUnavailable(format!(
                        "timed out after {:?}",
                        limit
                    ))),
                };
                (name, result)
            });
        }

        let mut agreed: Option<(String, Bytes)> = None;
        let mut agreeing = 0;
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (name, result) = match joined {
                Ok(output) => output,
                Err(e) => {
                    failures.push(format!("gateway task failed: {}", e));
                    continue;
                }
            };

            let body = match result {
                Ok(body) => body,
                Err(e) => {
                    debug!(gateway = %name, error = %e, "Gateway fetch failed");
                    failures.push(format!("{}: {}", name, e));
                    continue;
                }
            };

            let mismatch = match &agreed {
                Some((first, expected)) if *expected != body => Some(first.clone()),
                _ => None,
            };
            if let Some(first) = mismatch {
                warn!(locator = %locator, first = %first, second = %name, "Gateways disagree");
                return Err(Error::IntegrityMismatch {
                    locator: locator.to_string(),
                    first,
                    second: name,
                });
            }
            if agreed.is_none() {
                agreed = Some((name, body));
            }
            agreeing += 1;

            if agreeing >= quorum {
                if let Some((first, body)) = agreed.take() {
                    info!(locator = %locator, gateway = %first, agreeing, "Content retrieved");
                    return Ok(body);
                }
            }
        }

        if agreeing > 0 {
            failures.push(format!("only {} of {} gateways agreed", agreeing, quorum));
        }
        Err(Error::AllGatewaysFailed {
            locator: locator.to_string(),
            failures,
        })
    }
}

/// Drop bodies that provably do not match an `ipfs://` locator.
fn check_content(locator: &Locator, body: Bytes) -> Result<Bytes> {
    if locator.backend() == BackendType::Ipfs
        && verify_raw_cid(locator.id(), &body)? == Some(false)
    {
        return Err(Error::InvalidInput(format!(
            "content does not match {}",
            locator
        )));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use weavegate_storage::{BackendGateway, MemoryBackend, StorageBackend};

    /// Gateway returning fixed content after a delay.
    struct FixedGateway {
        name: String,
        body: Option<Bytes>,
        delay: Duration,
    }

    impl FixedGateway {
        fn new(name: &str, body: Option<&'static str>, delay_ms: u64) -> Arc<dyn Gateway> {
            Arc::new(Self {
                name: name.to_string(),
                body: body.map(|b| Bytes::from_static(b.as_bytes())),
                delay: Duration::from_millis(delay_ms),
            })
        }
    }

    #[async_trait]
    impl Gateway for FixedGateway {
        fn name(&self) -> &str {
            &self.name
        }

        fn serves(&self, backend_type: BackendType) -> bool {
            backend_type.is_storage()
        }

        async fn fetch(&self, _locator: &Locator) -> Result<Bytes> {
            tokio::time::sleep(self.delay).await;
            self.body
                .clone()
                .ok_or_else(|| Error::NotFound(format!("{}: missing", self.name)))
        }
    }

    fn ar() -> Locator {
        Locator::parse("ar://abc").unwrap()
    }

    fn config(quorum: usize, timeout_ms: u64) -> RetrievalConfig {
        RetrievalConfig {
            timeout: Duration::from_millis(timeout_ms),
            quorum,
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let retriever = GatewayRetriever::new(
            vec![
                FixedGateway::new("slow", Some("doc"), 5_000),
                FixedGateway::new("fast", Some("doc"), 0),
            ],
            config(1, 10_000),
        );
        let started = std::time::Instant::now();
        assert_eq!(retriever.fetch(&ar()).await.unwrap(), Bytes::from_static(b"doc"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_failures_skipped() {
        let retriever = GatewayRetriever::new(
            vec![
                FixedGateway::new("missing", None, 0),
                FixedGateway::new("ok", Some("doc"), 10),
            ],
            config(1, 1_000),
        );
        assert_eq!(retriever.fetch(&ar()).await.unwrap(), Bytes::from_static(b"doc"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let retriever = GatewayRetriever::new(
            vec![FixedGateway::new("hung", Some("doc"), 5_000)],
            config(1, 20),
        );
        match retriever.fetch(&ar()).await.unwrap_err() {
            Error::AllGatewaysFailed { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("timed out"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_disagreement_is_integrity_mismatch() {
        let retriever = GatewayRetriever::new(
            vec![
                FixedGateway::new("a", Some("doc"), 0),
                FixedGateway::new("b", Some("tampered"), 20),
            ],
            config(2, 1_000),
        );
        assert!(matches!(
            retriever.fetch(&ar()).await,
            Err(Error::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_quorum_not_reached() {
        let retriever = GatewayRetriever::new(
            vec![
                FixedGateway::new("a", Some("doc"), 0),
                FixedGateway::new("b", None, 0),
            ],
            config(2, 1_000),
        );
        assert!(matches!(
            retriever.fetch(&ar()).await,
            Err(Error::AllGatewaysFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_ipfs_body_checked_against_cid() {
        let pinned = Arc::new(MemoryBackend::pinned());
        let receipt = pinned.write(Bytes::from_static(b"hello"), &[]).await.unwrap();

        let retriever = GatewayRetriever::new(
            vec![
                FixedGateway::new("liar", Some("forged"), 0),
                Arc::new(BackendGateway::new(pinned.clone())) as Arc<dyn Gateway>,
            ],
            config(1, 1_000),
        );
        assert_eq!(
            retriever.fetch(&receipt.locator).await.unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[tokio::test]
    async fn test_no_eligible_gateway() {
        let permanent = Arc::new(MemoryBackend::permanent());
        let retriever = GatewayRetriever::new(
            vec![Arc::new(BackendGateway::new(permanent)) as Arc<dyn Gateway>],
            RetrievalConfig::default(),
        );
        let ipfs = Locator::parse("ipfs://bafkqaaa").unwrap();
        assert!(matches!(
            retriever.fetch(&ipfs).await,
            Err(Error::AllGatewaysFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_web_urls_rejected() {
        let retriever = GatewayRetriever::new(Vec::new(), RetrievalConfig::default());
        assert!(matches!(
            retriever.fetch_uri("https://agent.example/card.json").await,
            Err(Error::InvalidInput(_))
        ));
    }
}
