// Virtual client pool
//
// Each virtual client performs exactly one redirect through the shared
// fixture. Clients never talk to each other; the only shared value is the
// read-only fixture, and outcomes flow back to the pool through the join
// handles rather than through shared counters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::api::{self, STATUS_FOUND};
use crate::error::LoadTestError;
use crate::fixture::{Fixture, FixtureBroadcast};
use crate::stats::{StatsCollector, TRANSPORT_ERROR_STATUS};
use crate::transport::HttpTransport;

/// Name of the per-client check, as it appears in reports.
pub const REDIRECT_CHECK: &str = "redirect: status is 302";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

impl CheckResult {
    /// A redirect passes iff the target answered 302 Found.
    pub fn redirect(status: u16) -> Self {
        Self {
            name: REDIRECT_CHECK.to_string(),
            passed: status == STATUS_FOUND,
        }
    }
}

/// What one virtual client observed.
#[derive(Debug, Clone)]
pub struct WorkUnitOutcome {
    pub client_id: usize,
    /// HTTP status, or 0 when the transport failed.
    pub status: u16,
    pub short_code: String,
    pub latency: Duration,
    pub check: CheckResult,
    pub completed_at: Instant,
}

/// Issue one redirect for `fixture` and classify the raw response.
/// Never fails: transport errors become a failed check with status 0.
pub async fn execute_work_unit(
    transport: &dyn HttpTransport,
    fixture: &Fixture,
    client_id: usize,
) -> WorkUnitOutcome {
    let request = api::redirect_request(&fixture.short_code);
    let started = Instant::now();
    let status = match transport.send(&request).await {
        Ok(response) => response.status,
        Err(e) => {
            debug!(client_id, error = %e, "redirect request failed");
            TRANSPORT_ERROR_STATUS
        }
    };
    let latency = started.elapsed();

    WorkUnitOutcome {
        client_id,
        status,
        short_code: fixture.short_code.clone(),
        latency,
        check: CheckResult::redirect(status),
        completed_at: Instant::now(),
    }
}

/// Summary of one pool execution.
#[derive(Debug, Clone)]
pub struct PoolReport {
    pub dispatched: usize,
    pub completed: usize,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub released_at: Instant,
    /// Completion time of the last work unit to finish.
    pub last_completed_at: Option<Instant>,
    pub duration: Duration,
}

/// Fixed-size population of virtual clients, one work unit each.
pub struct VirtualClientPool {
    transport: Arc<dyn HttpTransport>,
    stats: Arc<StatsCollector>,
}

impl VirtualClientPool {
    pub fn new(transport: Arc<dyn HttpTransport>, stats: Arc<StatsCollector>) -> Self {
        Self { transport, stats }
    }

    /// Spawn one task per fixture handle, release them together, and wait
    /// for every one of them to finish before returning.
    pub async fn run(&self, broadcast: &FixtureBroadcast) -> Result<PoolReport, LoadTestError> {
        let population = broadcast.population();
        let gate = Arc::new(Barrier::new(population + 1));
        let mut tasks = JoinSet::new();

        for (client_id, fixture) in broadcast.handles().into_iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let gate = Arc::clone(&gate);
            tasks.spawn(async move {
                gate.wait().await;
                execute_work_unit(transport.as_ref(), &fixture, client_id).await
            });
        }

        info!(
            population,
            short_code = %broadcast.fixture().short_code,
            "releasing virtual clients"
        );
        gate.wait().await;
        let released_at = Instant::now();

        let mut report = PoolReport {
            dispatched: population,
            completed: 0,
            checks_passed: 0,
            checks_failed: 0,
            released_at,
            last_completed_at: None,
            duration: Duration::ZERO,
        };

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| LoadTestError::WorkerPanicked(e.to_string()))?;
            self.record(&outcome);

            report.completed += 1;
            if outcome.check.passed {
                report.checks_passed += 1;
            } else {
                report.checks_failed += 1;
            }
            report.last_completed_at = report.last_completed_at.max(Some(outcome.completed_at));
        }

        report.duration = released_at.elapsed();
        info!(
            completed = report.completed,
            passed = report.checks_passed,
            failed = report.checks_failed,
            elapsed_ms = report.duration.as_millis() as u64,
            "all virtual clients finished"
        );
        Ok(report)
    }

    fn record(&self, outcome: &WorkUnitOutcome) {
        if outcome.status == TRANSPORT_ERROR_STATUS {
            self.stats.record_transport_failure(outcome.latency);
        } else {
            self.stats.record_request(outcome.status, outcome.latency);
        }
        self.stats.record_check(&outcome.check.name, outcome.check.passed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockShortener;
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;

    fn broadcast(mock: &MockShortener, population: usize) -> FixtureBroadcast {
        FixtureBroadcast::new(Fixture::new(mock.short_code.clone(), mock.long_url.clone()), population)
    }

    fn make_pool(mock: Arc<MockShortener>) -> (VirtualClientPool, Arc<StatsCollector>) {
        let stats = Arc::new(StatsCollector::new());
        (VirtualClientPool::new(mock, stats.clone()), stats)
    }

    #[test]
    fn test_check_passes_only_on_302() {
        assert!(CheckResult::redirect(302).passed);
        for status in [0, 200, 301, 307, 404, 500] {
            assert!(!CheckResult::redirect(status).passed, "status {}", status);
        }
        assert_eq!(CheckResult::redirect(302).name, REDIRECT_CHECK);
    }

    #[tokio::test]
    async fn test_execute_work_unit_success() {
        let mock = MockShortener::new();
        let fixture = Fixture::new("3e8", "https://x.com");
        let outcome = execute_work_unit(&mock, &fixture, 7).await;
        assert_eq!(outcome.client_id, 7);
        assert_eq!(outcome.status, 302);
        assert!(outcome.check.passed);
        assert_eq!(mock.clicks(), 1);
    }

    #[tokio::test]
    async fn test_execute_work_unit_transport_error_is_status_zero() {
        let mock = MockShortener::new();
        mock.fail_redirects(1);
        let outcome = execute_work_unit(&mock, &Fixture::new("3e8", "https://x.com"), 0).await;
        assert_eq!(outcome.status, 0);
        assert!(!outcome.check.passed);
    }

    #[tokio::test]
    async fn test_execute_work_unit_not_found_fails_check() {
        let mock = MockShortener::new();
        let outcome = execute_work_unit(&mock, &Fixture::new("nope", "https://x.com"), 0).await;
        assert_eq!(outcome.status, 404);
        assert!(!outcome.check.passed);
    }

    #[tokio::test]
    async fn test_pool_runs_exactly_population_units() {
        let mock = Arc::new(MockShortener::new());
        let (pool, stats) = make_pool(mock.clone());
        let report = pool.run(&broadcast(&mock, 100)).await.unwrap();

        assert_eq!(report.dispatched, 100);
        assert_eq!(report.completed, 100);
        assert_eq!(report.checks_passed, 100);
        assert_eq!(report.checks_failed, 0);
        assert_eq!(mock.redirect_calls.load(Ordering::Relaxed), 100);
        assert_eq!(mock.clicks(), 100);

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 100);
        assert_eq!(snap.status_codes.get(&302), Some(&100));
        assert_eq!(snap.checks.get(REDIRECT_CHECK).map(|c| c.passes), Some(100));
    }

    #[tokio::test]
    async fn test_pool_failures_do_not_cancel_siblings() {
        let mock = Arc::new(MockShortener::new());
        mock.fail_redirects(10);
        let (pool, stats) = make_pool(mock.clone());
        let report = pool.run(&broadcast(&mock, 500)).await.unwrap();

        assert_eq!(report.completed, 500);
        assert_eq!(report.checks_failed, 10);
        assert_eq!(report.checks_passed, 490);
        let snap = stats.snapshot();
        assert_eq!(snap.transport_errors, 10);
        assert_eq!(snap.status_codes.get(&0), Some(&10));
        assert_eq!(mock.clicks(), 490);
    }

    #[tokio::test]
    async fn test_pool_clients_share_the_fixture() {
        let mock = Arc::new(MockShortener::new());
        let (pool, _) = make_pool(mock.clone());
        pool.run(&broadcast(&mock, 64)).await.unwrap();

        let codes = mock.redirect_codes();
        assert_eq!(codes.len(), 64);
        assert!(codes.iter().all(|c| c == "3e8"));
    }

    #[tokio::test]
    async fn test_pool_runs_clients_concurrently() {
        let mock = Arc::new(MockShortener::new());
        mock.set_redirect_delay(Duration::from_millis(200));
        let (pool, _) = make_pool(mock.clone());

        let report = pool.run(&broadcast(&mock, 200)).await.unwrap();
        // 200 sequential requests would take 40s.
        assert!(report.duration < Duration::from_secs(5), "took {:?}", report.duration);
        assert_eq!(report.completed, 200);
    }

    #[tokio::test]
    async fn test_pool_reports_last_completion() {
        let mock = Arc::new(MockShortener::new());
        let (pool, _) = make_pool(mock.clone());
        let report = pool.run(&broadcast(&mock, 20)).await.unwrap();
        let last = report.last_completed_at.expect("completion time recorded");
        assert!(last >= report.released_at);
        assert!(last >= mock.last_redirect_at().unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_pool_dispatches_each_unit_once(population in 1usize..300, failures in 0u64..20) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();
            let failures = failures.min(population as u64);
            let (report, calls, clicks) = rt.block_on(async {
                let mock = Arc::new(MockShortener::new());
                mock.fail_redirects(failures);
                let (pool, _) = make_pool(mock.clone());
                let report = pool.run(&broadcast(&mock, population)).await.unwrap();
                (report, mock.redirect_calls.load(Ordering::Relaxed), mock.clicks())
            });

            prop_assert_eq!(report.completed, population);
            prop_assert_eq!(calls, population as u64);
            prop_assert_eq!(report.checks_failed, failures);
            prop_assert_eq!(clicks, (population as u64 - failures) as i64);
        }
    }
}
