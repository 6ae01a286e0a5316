//! Shared checks for suites built on the load tester
//!
//! The `assert_*` helpers panic with a message prefixed by `context`, so they
//! read like ordinary test assertions at the call site.

use crate::config::{thresholds, ConfigError, TestProfile, TesterConfig};
use crate::load_test::LoadTester;
use crate::types::{RequestTally, TrialMetrics};
use std::time::Duration;

/// Join a base URL and an endpoint, tolerating stray or missing slashes.
pub fn build_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{}{}", base, endpoint)
    } else {
        format!("{}/{}", base, endpoint)
    }
}

pub fn create_tester(base_url: &str, profile: TestProfile) -> Result<LoadTester, ConfigError> {
    LoadTester::new(TesterConfig::from_profile(base_url, profile))
}

/// Upper bounds for latency percentiles, in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyBounds {
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[track_caller]
pub fn assert_success_rate<T: RequestTally + ?Sized>(metrics: &T, min_rate: f64, context: &str) {
    let rate = metrics.success_rate();
    assert!(
        rate >= min_rate,
        "{}: {:.1}% < {:.1}% ({}/{} successful)",
        context,
        rate,
        min_rate,
        metrics.success_count(),
        metrics.total_requests()
    );
}

#[track_caller]
pub fn assert_min_requests<T: RequestTally + ?Sized>(metrics: &T, min_count: u64, context: &str) {
    let total = metrics.total_requests();
    assert!(
        total >= min_count,
        "{}: {} requests < {} expected",
        context,
        total,
        min_count
    );
}

#[track_caller]
pub fn assert_has_latency_metrics(metrics: &TrialMetrics) {
    assert!(
        metrics.latency.is_some(),
        "Missing latency metrics: [latency_p50, latency_p95, latency_p99]"
    );
}

#[track_caller]
pub fn assert_latency_bounds(metrics: &TrialMetrics, bounds: LatencyBounds, context: &str) {
    assert_has_latency_metrics(metrics);
    let Some(latency) = &metrics.latency else {
        return;
    };

    let checks = [
        ("p50", latency.p50, bounds.p50),
        ("p95", latency.p95, bounds.p95),
        ("p99", latency.p99, bounds.p99),
    ];
    for (name, observed, limit) in checks {
        if let Some(limit) = limit {
            assert!(
                observed <= limit,
                "{}: {}={:.0}ms > {:.0}ms",
                context,
                name,
                observed,
                limit
            );
        }
    }
}

/// The service is back above the recovery threshold, optionally by a margin
/// over the degraded run.
#[track_caller]
pub fn assert_recovery<B, A>(before: &B, after: &A, min_improvement: f64, context: &str)
where
    B: RequestTally + ?Sized,
    A: RequestTally + ?Sized,
{
    let before_rate = before.success_rate();
    let after_rate = after.success_rate();

    assert!(
        after_rate >= thresholds::RECOVERY,
        "{}: {:.1}% < {:.1}% (recovered from {:.1}%)",
        context,
        after_rate,
        thresholds::RECOVERY,
        before_rate
    );

    if min_improvement > 0.0 {
        let improvement = after_rate - before_rate;
        assert!(
            improvement >= min_improvement,
            "{}: improvement {:.1}% < {:.1}%",
            context,
            improvement,
            min_improvement
        );
    }
}

/// Internal consistency of a trial's numbers.
#[track_caller]
pub fn validate_metrics(metrics: &TrialMetrics) {
    assert_eq!(
        metrics.success_count + metrics.failure_count,
        metrics.total_requests,
        "success and failure counts must add up to the total"
    );
    assert!(
        (0.0..=100.0).contains(&metrics.success_rate),
        "success rate out of range: {}",
        metrics.success_rate
    );
    assert!(metrics.duration >= 0.0, "negative duration: {}", metrics.duration);
    assert!(metrics.throughput >= 0.0, "negative throughput: {}", metrics.throughput);

    if let Some(latency) = &metrics.latency {
        assert!(
            latency.min <= latency.p50
                && latency.p50 <= latency.p95
                && latency.p95 <= latency.p99
                && latency.p99 <= latency.max,
            "latency percentiles out of order: {:?}",
            latency
        );
    }
}

/// Run one trial against `endpoint` and apply the basic checks.
pub async fn run_and_assert(
    tester: &LoadTester,
    endpoint: &str,
    workers: usize,
    duration: Duration,
    min_success_rate: f64,
    min_requests: u64,
) -> TrialMetrics {
    let url = tester.url_for(endpoint);
    let metrics = tester
        .run_trial(&url, workers, duration)
        .await
        .unwrap_or_else(|e| panic!("{}: invalid trial: {}", endpoint, e));

    validate_metrics(&metrics);
    assert_success_rate(&metrics, min_success_rate, endpoint);
    assert_min_requests(&metrics, min_requests, endpoint);

    metrics
}
