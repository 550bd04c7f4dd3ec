// Reporter module - Result data models, summary rendering and JSON output
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use crate::config::{Config, ThresholdConfig};
use crate::error::LoadTestError;
use crate::stats::{CheckCounts, StatsSnapshot};
use crate::verifier::Verification;

/// しきい値の判定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

/// 最終結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Passed,
    ThresholdsBreached,
    AccuracyMismatch,
}

impl RunOutcome {
    /// 精度不一致は常にしきい値違反より優先される
    pub fn decide(verification_passed: bool, thresholds: &[ThresholdResult]) -> Self {
        if !verification_passed {
            RunOutcome::AccuracyMismatch
        } else if thresholds.iter().any(|t| !t.passed) {
            RunOutcome::ThresholdsBreached
        } else {
            RunOutcome::Passed
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Passed => 0,
            RunOutcome::AccuracyMismatch => 1,
            RunOutcome::ThresholdsBreached => 99,
        }
    }
}

/// 実行結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub config: Config,
    pub short_code: String,
    pub work_units: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub transport_errors: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub checks_rate: f64,
    pub http_req_failed_rate: f64,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckCounts>,
    pub latency_avg_ms: f64,
    pub latency_max_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub status_codes: HashMap<u16, u64>,
    pub thresholds: Vec<ThresholdResult>,
    pub verification: Verification,
    pub outcome: RunOutcome,
    pub execution_ms: u64,
    pub started_at: String,
    pub finished_at: String,
}

/// 結果比較レポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub checks_rate_change: f64,
    pub http_req_failed_rate_change: f64,
    pub latency_p50_change_pct: f64,
    pub latency_p90_change_pct: f64,
    pub latency_p95_change_pct: f64,
    pub latency_p99_change_pct: f64,
    pub difference_change: i128,
    pub improvements: Vec<String>,
    pub regressions: Vec<String>,
}

/// スナップショットをしきい値と照合する
pub fn evaluate_thresholds(config: &ThresholdConfig, snap: &StatsSnapshot) -> Vec<ThresholdResult> {
    let failed_rate = snap.http_req_failed_rate();
    let checks_rate = snap.checks_rate();
    vec![
        ThresholdResult {
            metric: "http_req_failed".to_string(),
            expression: format!("rate<{}", config.http_req_failed_max_rate),
            observed: failed_rate,
            passed: failed_rate < config.http_req_failed_max_rate,
        },
        ThresholdResult {
            metric: "checks".to_string(),
            expression: format!("rate>{}", config.checks_min_rate),
            observed: checks_rate,
            passed: checks_rate > config.checks_min_rate,
        },
    ]
}

fn mark(passed: bool) -> &'static str {
    if passed {
        "✓"
    } else {
        "✗"
    }
}

/// コンソール向けのサマリを生成する
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let v = &report.verification;

    let _ = writeln!(out, "=== Click Count Accuracy Summary ===");
    let _ = writeln!(out, "Target:           {}", report.config.base_url);
    let _ = writeln!(out, "Short Code:       {}", report.short_code);
    let _ = writeln!(out, "Work Units:       {}", report.work_units);
    let _ = writeln!(
        out,
        "Requests:         {} (failed: {}, transport errors: {})",
        report.total_requests, report.failed_requests, report.transport_errors
    );
    for t in &report.thresholds {
        let _ = writeln!(
            out,
            "{} {:<16} {:.2}% ({})",
            mark(t.passed),
            t.metric,
            t.observed * 100.0,
            t.expression
        );
    }
    for (name, counts) in &report.checks {
        let _ = writeln!(
            out,
            "  {} {}: {} passed / {} failed",
            mark(counts.fails == 0),
            name,
            counts.passes,
            counts.fails
        );
    }
    let _ = writeln!(
        out,
        "Latency avg: {:.1}ms | p50: {:.1}ms | p90: {:.1}ms | p95: {:.1}ms | p99: {:.1}ms | max: {:.1}ms",
        report.latency_avg_ms,
        report.latency_p50_ms,
        report.latency_p90_ms,
        report.latency_p95_ms,
        report.latency_p99_ms,
        report.latency_max_ms,
    );
    if !report.status_codes.is_empty() {
        let mut codes: Vec<_> = report.status_codes.iter().collect();
        codes.sort_by_key(|(k, _)| **k);
        let code_strs: Vec<String> = codes.iter().map(|(k, c)| format!("{}:{}", k, c)).collect();
        let _ = writeln!(out, "Status Codes:     {}", code_strs.join(" | "));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Expected Click Count: {}", v.expected);
    let _ = writeln!(out, "Actual Click Count:   {}", v.observed);
    let _ = writeln!(out, "Difference:           {}", v.difference);
    let _ = writeln!(out);

    if v.passed {
        let _ = writeln!(
            out,
            "✓ SUCCESS: Click count is accurate ({}/{})",
            v.observed, v.expected
        );
    } else {
        let _ = writeln!(out, "✗ FAIL: Click count mismatch!");
        let _ = writeln!(out, "  Expected: {} ({} work units)", v.expected, report.work_units);
        let _ = writeln!(out, "  Got:      {}", v.observed);
    }

    match report.outcome {
        RunOutcome::Passed => {
            let _ = writeln!(out, "=== Accuracy Test Passed ===");
        }
        RunOutcome::AccuracyMismatch => {
            let _ = writeln!(
                out,
                "=== Accuracy Test Failed: expected {}, got {} (difference {}) ===",
                v.expected, v.observed, v.difference
            );
        }
        RunOutcome::ThresholdsBreached => {
            let breached: Vec<&str> = report
                .thresholds
                .iter()
                .filter(|t| !t.passed)
                .map(|t| t.metric.as_str())
                .collect();
            let _ = writeln!(
                out,
                "=== Run Failed: thresholds breached ({}) ===",
                breached.join(", ")
            );
        }
    }
    out
}

/// JSON結果をファイルに書き出す
pub fn write_json_result(result: &RunReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// JSON結果ファイルを読み込む
pub fn read_json_result(path: &Path) -> Result<RunReport, LoadTestError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        LoadTestError::ResultFile(format!(
            "Failed to read result file '{}': {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        LoadTestError::ResultFile(format!(
            "Failed to parse result file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// パーセンテージ変化を計算する。previous が 0 の場合は 0.0 を返す。
fn pct_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

/// 2つの実行結果を比較する
pub fn compare_results(current: &RunReport, previous: &RunReport) -> ComparisonReport {
    let checks_rate_change = current.checks_rate - previous.checks_rate;
    let http_req_failed_rate_change = current.http_req_failed_rate - previous.http_req_failed_rate;
    let latency_p50_change_pct = pct_change(current.latency_p50_ms, previous.latency_p50_ms);
    let latency_p90_change_pct = pct_change(current.latency_p90_ms, previous.latency_p90_ms);
    let latency_p95_change_pct = pct_change(current.latency_p95_ms, previous.latency_p95_ms);
    let latency_p99_change_pct = pct_change(current.latency_p99_ms, previous.latency_p99_ms);
    let difference_change =
        i128::from(current.verification.difference) - i128::from(previous.verification.difference);

    let mut improvements = Vec::new();
    let mut regressions = Vec::new();

    match (previous.verification.passed, current.verification.passed) {
        (false, true) => improvements.push("Click count is now accurate".to_string()),
        (true, false) => regressions.push(format!(
            "Click count became inaccurate (difference {})",
            current.verification.difference
        )),
        (false, false) if difference_change < 0 => improvements.push(format!(
            "Click count discrepancy shrank by {}",
            difference_change.abs()
        )),
        (false, false) if difference_change > 0 => regressions.push(format!(
            "Click count discrepancy grew by {}",
            difference_change
        )),
        _ => {}
    }

    // checks: higher is better
    if checks_rate_change > 0.0 {
        improvements.push(format!("Checks rate improved by {:.4}", checks_rate_change));
    } else if checks_rate_change < 0.0 {
        regressions.push(format!("Checks rate regressed by {:.4}", checks_rate_change.abs()));
    }

    // http_req_failed: lower is better
    if http_req_failed_rate_change < 0.0 {
        improvements.push(format!(
            "Request failure rate improved by {:.4}",
            http_req_failed_rate_change.abs()
        ));
    } else if http_req_failed_rate_change > 0.0 {
        regressions.push(format!(
            "Request failure rate regressed by {:.4}",
            http_req_failed_rate_change
        ));
    }

    // Latency: lower is better
    for (name, change) in [
        ("p50 latency", latency_p50_change_pct),
        ("p90 latency", latency_p90_change_pct),
        ("p95 latency", latency_p95_change_pct),
        ("p99 latency", latency_p99_change_pct),
    ] {
        if change < 0.0 {
            improvements.push(format!("{} improved by {:.1}%", name, change.abs()));
        } else if change > 0.0 {
            regressions.push(format!("{} regressed by {:.1}%", name, change));
        }
    }

    ComparisonReport {
        checks_rate_change,
        http_req_failed_rate_change,
        latency_p50_change_pct,
        latency_p90_change_pct,
        latency_p95_change_pct,
        latency_p99_change_pct,
        difference_change,
        improvements,
        regressions,
    }
}
