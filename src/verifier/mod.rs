// Aggregate verifier
//
// Runs once, after the completion barrier. Compares the target's reported
// click count against the number of dispatched work units with no
// tolerance in either direction, and never retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::{self, LinkStats, STATUS_OK};
use crate::error::LoadTestError;
use crate::fixture::Fixture;
use crate::transport::HttpTransport;

/// Result of the exact-count comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub short_code: String,
    pub expected: u64,
    pub observed: i64,
    /// |observed - expected|
    pub difference: u64,
    pub passed: bool,
    #[serde(default)]
    pub long_url: Option<String>,
    #[serde(default)]
    pub last_accessed_at: Option<String>,
}

impl Verification {
    pub fn new(short_code: &str, expected: u64, stats: &LinkStats) -> Self {
        let observed = stats.click_count;
        let difference = (i128::from(observed) - i128::from(expected)).unsigned_abs() as u64;
        Self {
            short_code: short_code.to_string(),
            expected,
            observed,
            difference,
            passed: difference == 0,
            long_url: stats.long_url.clone(),
            last_accessed_at: stats.last_accessed_at.clone(),
        }
    }

    /// Positive when the target counted more clicks than were issued.
    pub fn signed_difference(&self) -> i128 {
        i128::from(self.observed) - i128::from(self.expected)
    }
}

pub struct AggregateVerifier {
    transport: Arc<dyn HttpTransport>,
    settle_interval: Duration,
}

impl AggregateVerifier {
    pub fn new(transport: Arc<dyn HttpTransport>, settle_interval: Duration) -> Self {
        Self {
            transport,
            settle_interval,
        }
    }

    /// Wait the settle interval, fetch the stats once and compare.
    /// Returns the verification and the instant the stats query was issued.
    pub async fn verify(
        &self,
        fixture: &Fixture,
        expected: u64,
    ) -> Result<(Verification, Instant), LoadTestError> {
        info!(
            settle_ms = self.settle_interval.as_millis() as u64,
            "verifying click count accuracy"
        );
        if !self.settle_interval.is_zero() {
            tokio::time::sleep(self.settle_interval).await;
        }

        let queried_at = Instant::now();
        let response = self
            .transport
            .send(&api::stats_request(&fixture.short_code))
            .await
            .map_err(|e| LoadTestError::StatsUnavailable {
                status: 0,
                body: e.to_string(),
            })?;

        if response.status != STATUS_OK {
            error!(status = response.status, body = %response.body, "failed to get stats");
            return Err(LoadTestError::StatsUnavailable {
                status: response.status,
                body: response.body,
            });
        }

        let stats: LinkStats = serde_json::from_str(&response.body).map_err(|e| {
            LoadTestError::MalformedResponse(format!("{} (body: {})", e, response.body))
        })?;

        let verification = Verification::new(&fixture.short_code, expected, &stats);
        if verification.passed {
            info!(expected, observed = verification.observed, "click count is accurate");
        } else {
            error!(
                expected,
                observed = verification.observed,
                difference = verification.difference,
                "click count mismatch"
            );
        }
        Ok((verification, queried_at))
    }
}
