// Run orchestrator module
//
// Drives one accuracy run from start to finish:
// provision -> distribute -> pool (completion barrier) -> settle -> verify -> report.
// Setup and verification faults abort the run; per-client faults only feed
// the failure rate.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::LoadTestError;
use crate::fixture::{self, Fixture, FixtureBroadcast};
use crate::reporter::{evaluate_thresholds, RunOutcome, RunReport};
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::transport::HttpTransport;
use crate::verifier::{AggregateVerifier, Verification};
use crate::vu::{PoolReport, VirtualClientPool};

/// Orchestrator - owns the configuration and the shared transport.
/// Every call to `run` collects its statistics from scratch.
pub struct Orchestrator {
    config: Config,
    transport: Arc<dyn HttpTransport>,
}

impl Orchestrator {
    pub fn new(config: Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    /// Execute the full run and build the report.
    ///
    /// Returns `Err` only for fatal faults. An accuracy mismatch or a
    /// threshold breach is a normal `RunReport` with the matching outcome.
    pub async fn run(&self) -> Result<RunReport, LoadTestError> {
        let started_at = chrono_now();
        let run_started = Instant::now();
        let stats = Arc::new(StatsCollector::new());

        // Phase 1: setup
        let fixture = fixture::provision(self.transport.as_ref(), &self.config).await?;

        // Phase 2: distribute + execute
        let population = self.config.vus as usize;
        let broadcast = FixtureBroadcast::new(fixture, population);
        let pool = VirtualClientPool::new(Arc::clone(&self.transport), Arc::clone(&stats));
        let pool_report = pool.run(&broadcast).await?;
        if pool_report.completed != population {
            warn!(
                completed = pool_report.completed,
                population, "pool finished with fewer work units than dispatched"
            );
        }

        // Phase 3: settle + verify
        let verifier = AggregateVerifier::new(
            Arc::clone(&self.transport),
            self.config.settle_interval(),
        );
        let expected = self.config.expected_count();
        let (verification, queried_at) = verifier.verify(broadcast.fixture(), expected).await?;
        if let Some(last) = pool_report.last_completed_at {
            debug_assert!(queried_at >= last);
        }

        // Phase 4: report
        let snapshot = stats.snapshot();
        let report = build_run_report(
            &self.config,
            broadcast.fixture(),
            &snapshot,
            &pool_report,
            verification,
            run_started.elapsed().as_millis() as u64,
            started_at,
            chrono_now(),
        );
        info!(outcome = ?report.outcome, "run finished");
        Ok(report)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[allow(clippy::too_many_arguments)]
fn build_run_report(
    config: &Config,
    fixture: &Fixture,
    snapshot: &StatsSnapshot,
    pool_report: &PoolReport,
    verification: Verification,
    execution_ms: u64,
    started_at: String,
    finished_at: String,
) -> RunReport {
    let thresholds = evaluate_thresholds(&config.thresholds, snapshot);
    let outcome = RunOutcome::decide(verification.passed, &thresholds);
    RunReport {
        config: config.clone(),
        short_code: fixture.short_code.clone(),
        work_units: pool_report.dispatched as u64,
        total_requests: snapshot.total_requests,
        failed_requests: snapshot.failed_requests,
        transport_errors: snapshot.transport_errors,
        checks_passed: snapshot.checks_passed,
        checks_failed: snapshot.checks_failed,
        checks_rate: snapshot.checks_rate(),
        http_req_failed_rate: snapshot.http_req_failed_rate(),
        checks: snapshot.checks.clone(),
        latency_avg_ms: snapshot.latency_avg.as_secs_f64() * 1000.0,
        latency_max_ms: snapshot.latency_max.as_secs_f64() * 1000.0,
        latency_p50_ms: snapshot.latency_p50.as_secs_f64() * 1000.0,
        latency_p90_ms: snapshot.latency_p90.as_secs_f64() * 1000.0,
        latency_p95_ms: snapshot.latency_p95.as_secs_f64() * 1000.0,
        latency_p99_ms: snapshot.latency_p99.as_secs_f64() * 1000.0,
        status_codes: snapshot.status_codes.clone(),
        thresholds,
        verification,
        outcome,
        execution_ms,
        started_at,
        finished_at,
    }
}

/// Current time as unix seconds.
fn chrono_now() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}
