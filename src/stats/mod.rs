// Statistics collector module

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Status code recorded for requests that never produced a response.
pub const TRANSPORT_ERROR_STATUS: u16 = 0;

#[derive(Default)]
struct CheckTally {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// Pass/fail counts for one named check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

/// Thread-safe statistics collector using atomic operations.
/// Latency recording uses sharded buffers to reduce lock contention
/// when thousands of virtual clients finish at once.
pub struct StatsCollector {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    transport_errors: AtomicU64,
    checks_passed: AtomicU64,
    checks_failed: AtomicU64,
    checks: DashMap<String, CheckTally>,
    status_codes: DashMap<u16, AtomicU64>,
    latency_shards: Vec<Mutex<Vec<Duration>>>,
    shard_count: usize,
}

/// A point-in-time snapshot of collected statistics.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub transport_errors: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub checks: BTreeMap<String, CheckCounts>,
    pub latency_avg: Duration,
    pub latency_max: Duration,
    pub latency_p50: Duration,
    pub latency_p90: Duration,
    pub latency_p95: Duration,
    pub latency_p99: Duration,
    pub status_codes: HashMap<u16, u64>,
}

impl StatsSnapshot {
    pub fn checks_total(&self) -> u64 {
        self.checks_passed + self.checks_failed
    }

    /// Fraction of checks that passed. No checks at all counts as 0.
    pub fn checks_rate(&self) -> f64 {
        let total = self.checks_total();
        if total == 0 {
            0.0
        } else {
            self.checks_passed as f64 / total as f64
        }
    }

    /// Fraction of requests that failed (transport error or status >= 400).
    pub fn http_req_failed_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        let shard_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::with_shards(shard_count)
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let latency_shards = (0..shard_count).map(|_| Mutex::new(Vec::new())).collect();
        Self {
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            checks_passed: AtomicU64::new(0),
            checks_failed: AtomicU64::new(0),
            checks: DashMap::new(),
            status_codes: DashMap::new(),
            latency_shards,
            shard_count,
        }
    }

    /// Record a request that produced an HTTP response.
    pub fn record_request(&self, status: u16, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if status >= 400 {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.count_status(status);
        self.push_latency(latency);
    }

    /// Record a request that failed before any response arrived.
    pub fn record_transport_failure(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        self.count_status(TRANSPORT_ERROR_STATUS);
        self.push_latency(latency);
    }

    /// Record the outcome of a named check.
    pub fn record_check(&self, name: &str, passed: bool) {
        let tally = self.checks.entry(name.to_string()).or_default();
        if passed {
            self.checks_passed.fetch_add(1, Ordering::Relaxed);
            tally.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.checks_failed.fetch_add(1, Ordering::Relaxed);
            tally.fails.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn count_status(&self, status: u16) {
        self.status_codes
            .entry(status)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn push_latency(&self, latency: Duration) {
        let idx = self.shard_index();
        self.latency_shards[idx]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(latency);
    }

    /// Select a shard based on the current thread ID.
    fn shard_index(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        (hasher.finish() as usize) % self.shard_count
    }

    /// Take a snapshot of the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);

        // Merge all shards into a single Vec for percentile calculation
        let mut all_latencies = Vec::new();
        for shard in &self.latency_shards {
            let guard = shard.lock().unwrap_or_else(|e| e.into_inner());
            all_latencies.extend_from_slice(&guard);
        }
        let (p50, p90, p95, p99) = calculate_percentiles(&all_latencies);
        let latency_max = all_latencies.iter().copied().max().unwrap_or(Duration::ZERO);
        let latency_avg = if all_latencies.is_empty() {
            Duration::ZERO
        } else {
            all_latencies.iter().sum::<Duration>() / all_latencies.len() as u32
        };

        let status_codes = self
            .status_codes
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect();

        let checks = self
            .checks
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    CheckCounts {
                        passes: entry.value().passes.load(Ordering::Relaxed),
                        fails: entry.value().fails.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();

        StatsSnapshot {
            total_requests: total,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            checks_passed: self.checks_passed.load(Ordering::Relaxed),
            checks_failed: self.checks_failed.load(Ordering::Relaxed),
            checks,
            latency_avg,
            latency_max,
            latency_p50: p50,
            latency_p90: p90,
            latency_p95: p95,
            latency_p99: p99,
            status_codes,
        }
    }
}

/// Calculate percentiles from a slice of durations.
/// Returns (p50, p90, p95, p99). Returns Duration::ZERO for empty input.
pub fn calculate_percentiles(latencies: &[Duration]) -> (Duration, Duration, Duration, Duration) {
    if latencies.is_empty() {
        return (Duration::ZERO, Duration::ZERO, Duration::ZERO, Duration::ZERO);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    (
        percentile_at(&sorted, 50.0),
        percentile_at(&sorted, 90.0),
        percentile_at(&sorted, 95.0),
        percentile_at(&sorted, 99.0),
    )
}

/// Nearest-rank percentile over an already sorted, non-empty slice.
fn percentile_at(sorted: &[Duration], pct: f64) -> Duration {
    let len = sorted.len();
    let rank = (pct / 100.0 * len as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(len - 1)]
}
