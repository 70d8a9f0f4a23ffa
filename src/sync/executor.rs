//! Batch sync executor
//!
//! Pushes a [`SyncPlan`] to the Cloudflare API one batch at a time. Rate
//! limiting (HTTP 429) is flow control, not failure: the executor sleeps
//! according to `Retry-After`, raises a pre-emptive throttle delay for the
//! rest of the run, and retries the same batch whole. Any other error aborts
//! the run immediately; batches already applied stay applied.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::api::CloudflareClient;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::sync::planner::SyncPlan;

/// Additive jitter applied to every rate-limit wait, in seconds
const RATE_LIMIT_JITTER_SECS: (u64, u64) = (2, 5);

/// Pre-emptive pause state for one sync invocation
///
/// Scoped to a single list-sync run and never shared across invocations.
/// Raised on each 429, decayed on each successful batch, always within
/// `[base, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleState {
    delay: Duration,
    base: Duration,
    max: Duration,
}

impl ThrottleState {
    /// Create a throttle starting at its base delay
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            delay: base,
            base,
            max,
        }
    }

    /// Current pre-emptive delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Raise the delay after a rate-limit signal, capped at the maximum
    pub fn raise(&mut self) {
        let doubled = if self.delay.is_zero() {
            Duration::from_secs(1)
        } else {
            self.delay.saturating_mul(2)
        };
        self.delay = doubled.min(self.max);
    }

    /// Decay the delay after a success, never below the base
    pub fn decay(&mut self) {
        self.delay = (self.delay / 2).max(self.base);
    }
}

/// Executes sync plans against the Cloudflare API
pub struct BatchSyncExecutor<'a> {
    client: &'a CloudflareClient,
    config: &'a SyncConfig,
}

impl<'a> BatchSyncExecutor<'a> {
    pub fn new(client: &'a CloudflareClient, config: &'a SyncConfig) -> Self {
        Self { client, config }
    }

    /// Apply every batch of the plan in order
    ///
    /// Returns `Ok(())` only when all batches succeeded. On a non-rate-limit
    /// error, or when a single batch exhausts its rate-limit retries, the
    /// run fails with no rollback of previously applied batches.
    pub async fn execute(
        &self,
        account_id: &str,
        list_id: &str,
        plan: &SyncPlan,
    ) -> Result<(), SyncError> {
        let mut throttle = ThrottleState::new(
            Duration::from_millis(self.config.throttle_base_ms),
            Duration::from_millis(self.config.throttle_max_ms),
        );

        for (index, batch) in plan.batches.iter().enumerate() {
            self.apply_batch(account_id, list_id, index, batch, &mut throttle)
                .await?;
        }

        info!(
            account_id = account_id,
            list_id = list_id,
            batches = plan.batches.len(),
            members = plan.total_members,
            "Sync completed"
        );

        Ok(())
    }

    /// Apply one batch, retrying through rate-limit signals
    async fn apply_batch(
        &self,
        account_id: &str,
        list_id: &str,
        index: usize,
        batch: &[String],
        throttle: &mut ThrottleState,
    ) -> Result<(), SyncError> {
        let mut rate_limit_retries = 0u32;

        loop {
            if !throttle.delay().is_zero() {
                debug!(
                    batch = index + 1,
                    delay_ms = throttle.delay().as_millis(),
                    "Throttling before send"
                );
                tokio::time::sleep(throttle.delay()).await;
            }

            match self
                .client
                .replace_list_items(account_id, list_id, batch)
                .await
            {
                Ok(()) => {
                    debug!(
                        batch = index + 1,
                        members = batch.len(),
                        "Batch applied"
                    );
                    throttle.decay();
                    return Ok(());
                }
                Err(SyncError::RateLimited(retry_after)) => {
                    if rate_limit_retries >= self.config.batch_max_retries {
                        warn!(
                            batch = index + 1,
                            retries = rate_limit_retries,
                            "Rate-limit retries exhausted"
                        );
                        return Err(SyncError::RateLimited(retry_after));
                    }
                    rate_limit_retries += 1;

                    let wait = rate_limit_wait(retry_after, self.config);
                    warn!(
                        batch = index + 1,
                        attempt = rate_limit_retries,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limited, waiting before retrying batch"
                    );

                    tokio::time::sleep(wait).await;
                    throttle.raise();
                }
                Err(err) => {
                    warn!(
                        batch = index + 1,
                        error = %err,
                        "Batch failed, aborting sync for this list"
                    );
                    return Err(err);
                }
            }
        }
    }
}

/// Compute the wait for a rate-limit signal
///
/// `Retry-After` (or the configured fallback) plus 2-5 seconds of random
/// jitter, capped at the absolute maximum wait.
fn rate_limit_wait(retry_after: Option<u64>, config: &SyncConfig) -> Duration {
    let base = retry_after.unwrap_or(config.rate_limit_wait_secs);
    let jitter = rand::thread_rng()
        .gen_range(RATE_LIMIT_JITTER_SECS.0 as f64..=RATE_LIMIT_JITTER_SECS.1 as f64);

    Duration::from_secs_f64(base as f64 + jitter)
        .min(Duration::from_secs(config.rate_limit_max_wait_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use std::collections::HashSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_sync_config() -> SyncConfig {
        SyncConfig {
            // Cap of zero collapses every rate-limit wait so tests stay fast
            rate_limit_max_wait_secs: 0,
            throttle_base_ms: 0,
            throttle_max_ms: 1,
            batch_max_retries: 3,
            ..SyncConfig::default()
        }
    }

    fn test_client(base: &str) -> CloudflareClient {
        CloudflareClient::new(
            "test-token",
            &HttpConfig {
                timeout_secs: 5,
                api_base: base.to_string(),
            },
        )
        .unwrap()
    }

    fn plan_of(batches: Vec<Vec<&str>>) -> SyncPlan {
        let batches: Vec<Vec<String>> = batches
            .into_iter()
            .map(|b| b.into_iter().map(String::from).collect())
            .collect();
        let total_members = batches.iter().map(|b| b.len()).sum();
        SyncPlan {
            batches,
            total_members,
            dropped: 0,
        }
    }

    // Test 1: Raise doubles the delay and caps at the maximum
    #[test]
    fn test_throttle_raise_capped() {
        let mut throttle =
            ThrottleState::new(Duration::from_millis(0), Duration::from_millis(3_000));

        throttle.raise();
        assert_eq!(throttle.delay(), Duration::from_secs(1));
        throttle.raise();
        assert_eq!(throttle.delay(), Duration::from_secs(2));
        throttle.raise();
        assert_eq!(throttle.delay(), Duration::from_millis(3_000));
        throttle.raise();
        assert_eq!(throttle.delay(), Duration::from_millis(3_000));
    }

    // Test 2: Decay halves the delay but never drops below the base
    #[test]
    fn test_throttle_decay_floored_at_base() {
        let mut throttle =
            ThrottleState::new(Duration::from_millis(500), Duration::from_secs(30));

        throttle.raise();
        throttle.raise();
        assert_eq!(throttle.delay(), Duration::from_secs(2));

        throttle.decay();
        assert_eq!(throttle.delay(), Duration::from_secs(1));
        throttle.decay();
        assert_eq!(throttle.delay(), Duration::from_millis(500));
        throttle.decay();
        assert_eq!(throttle.delay(), Duration::from_millis(500));
    }

    // Test 3: Rate-limit wait never exceeds the configured cap
    #[test]
    fn test_rate_limit_wait_capped() {
        let config = SyncConfig {
            rate_limit_wait_secs: 10,
            rate_limit_max_wait_secs: 8,
            ..SyncConfig::default()
        };

        for _ in 0..100 {
            assert!(rate_limit_wait(None, &config) <= Duration::from_secs(8));
            assert!(rate_limit_wait(Some(600), &config) <= Duration::from_secs(8));
        }
    }

    // Test 4: Retry-After takes precedence over the fallback
    #[test]
    fn test_rate_limit_wait_uses_retry_after() {
        let config = SyncConfig {
            rate_limit_wait_secs: 60,
            rate_limit_max_wait_secs: 300,
            ..SyncConfig::default()
        };

        for _ in 0..100 {
            let wait = rate_limit_wait(Some(20), &config);
            // 20s Retry-After plus 2-5s jitter
            assert!(wait >= Duration::from_secs(22) && wait <= Duration::from_secs(25));
        }
    }

    // Test 5: All batches succeed in order
    #[tokio::test]
    async fn test_execute_all_batches() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/accounts/acc1/rules/lists/list1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": null
            })))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let config = fast_sync_config();
        let executor = BatchSyncExecutor::new(&client, &config);

        let plan = plan_of(vec![vec!["1.1.1.1"], vec!["2.2.2.2"], vec!["3.3.3.3"]]);
        executor.execute("acc1", "list1", &plan).await.unwrap();
    }

    // Test 6: A 429 retries the same batch until it succeeds
    #[tokio::test]
    async fn test_rate_limited_batch_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/accounts/acc1/rules/lists/list1/items"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/accounts/acc1/rules/lists/list1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let config = fast_sync_config();
        let executor = BatchSyncExecutor::new(&client, &config);

        let plan = plan_of(vec![vec!["1.1.1.1"]]);
        executor.execute("acc1", "list1", &plan).await.unwrap();
    }

    // Test 7: Exhausting rate-limit retries fails the run
    #[tokio::test]
    async fn test_rate_limit_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/accounts/acc1/rules/lists/list1/items"))
            .respond_with(ResponseTemplate::new(429))
            // Initial attempt + batch_max_retries
            .expect(4)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let config = fast_sync_config();
        let executor = BatchSyncExecutor::new(&client, &config);

        let plan = plan_of(vec![vec!["1.1.1.1"]]);
        let err = executor.execute("acc1", "list1", &plan).await.unwrap_err();
        assert!(matches!(err, SyncError::RateLimited(_)));
    }

    // Test 8: A non-rate-limit error aborts immediately, later batches unsent
    #[tokio::test]
    async fn test_transport_error_aborts_run() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/accounts/acc1/rules/lists/list1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "errors": [{"code": 1003, "message": "Invalid list item"}],
                "result": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let config = fast_sync_config();
        let executor = BatchSyncExecutor::new(&client, &config);

        let plan = plan_of(vec![vec!["bogus"], vec!["2.2.2.2"]]);
        let err = executor.execute("acc1", "list1", &plan).await.unwrap_err();
        assert_eq!(err, SyncError::Api("Invalid list item".to_string()));
    }

    // Test 9: The union of executed payloads equals the plan membership
    #[tokio::test]
    async fn test_executed_payloads_cover_plan() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/accounts/acc1/rules/lists/list1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "errors": [], "result": null
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let config = fast_sync_config();
        let executor = BatchSyncExecutor::new(&client, &config);

        let plan = plan_of(vec![vec!["1.1.1.1", "2.2.2.2"], vec!["3.3.3.3"]]);
        executor.execute("acc1", "list1", &plan).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let mut sent: HashSet<String> = HashSet::new();
        for request in &requests {
            let body: Vec<serde_json::Value> = serde_json::from_slice(&request.body).unwrap();
            for item in body {
                sent.insert(item["ip"].as_str().unwrap().to_string());
            }
        }

        let expected: HashSet<String> = plan.batches.iter().flatten().cloned().collect();
        assert_eq!(sent, expected);
    }
}
