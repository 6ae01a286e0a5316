use crate::config::ConfigError;
use crate::prometheus::InfrastructureSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// One fixed-duration run at a fixed concurrency level.
///
/// A zero duration is allowed and produces an empty trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialConfiguration {
    url: String,
    workers: usize,
    duration: Duration,
    collect_infra_metrics: bool,
}

impl TrialConfiguration {
    pub fn new(url: impl Into<String>, workers: usize, duration: Duration) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::NonPositive {
                name: "workers",
                value: 0,
            });
        }
        Ok(Self {
            url: url.into(),
            workers,
            duration,
            collect_infra_metrics: false,
        })
    }

    pub fn with_infra_metrics(mut self, collect: bool) -> Self {
        self.collect_infra_metrics = collect;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn collect_infra_metrics(&self) -> bool {
        self.collect_infra_metrics
    }
}

/// Why a single probe did not count as a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ConnectionError,
    HttpStatus(u16),
    Other(String),
}

impl FailureKind {
    /// Stable key used in the per-trial failure breakdown.
    pub fn label(&self) -> String {
        match self {
            FailureKind::Timeout => "timeout".to_string(),
            FailureKind::ConnectionError => "connection_error".to_string(),
            FailureKind::HttpStatus(status) => format!("http_{}", status),
            FailureKind::Other(_) => "other".to_string(),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "request timed out"),
            FailureKind::ConnectionError => write!(f, "connection error"),
            FailureKind::HttpStatus(status) => write!(f, "HTTP {}", status),
            FailureKind::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Result of one logical GET, retries included.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency_ms: f64,
    pub failure: Option<FailureKind>,
}

impl ProbeOutcome {
    pub fn ok(latency_ms: f64) -> Self {
        Self {
            success: true,
            latency_ms,
            failure: None,
        }
    }

    pub fn failed(kind: FailureKind, latency_ms: f64) -> Self {
        Self {
            success: false,
            latency_ms,
            failure: Some(kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LatencyDistribution {
    #[serde(rename = "latency_min")]
    pub min: f64,
    #[serde(rename = "latency_max")]
    pub max: f64,
    #[serde(rename = "latency_avg")]
    pub avg: f64,
    #[serde(rename = "latency_p50")]
    pub p50: f64,
    #[serde(rename = "latency_p95")]
    pub p95: f64,
    #[serde(rename = "latency_p99")]
    pub p99: f64,
}

/// Aggregate statistics for one fixed-duration trial.
///
/// Latencies are milliseconds, `duration` is wall-clock seconds and
/// `success_rate` is a percentage. The latency fields are absent when the
/// trial produced no samples.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrialMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_requests: u64,
    pub success_rate: f64,
    pub duration: f64,
    pub throughput: f64,
    #[serde(flatten)]
    pub latency: Option<LatencyDistribution>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<InfrastructureSnapshot>,
}

/// Outcome of a breaking-point search.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BreakingPoint {
    pub breaking_point: usize,
    pub metrics: BTreeMap<usize, TrialMetrics>,
}

impl BreakingPoint {
    /// Metrics of the level reported as the breaking point, if it was tested.
    pub fn breaking_trial(&self) -> Option<&TrialMetrics> {
        self.metrics.get(&self.breaking_point)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChaosEvent {
    pub pod: String,
    pub killed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChaosResult {
    pub candidates: usize,
    pub killed_pods: Vec<ChaosEvent>,
    pub success: u64,
    pub total: u64,
    pub success_rate: f64,
}

/// Read view shared by everything that counts successful requests.
pub trait RequestTally {
    fn success_count(&self) -> u64;
    fn total_requests(&self) -> u64;
    fn success_rate(&self) -> f64;
}

impl RequestTally for TrialMetrics {
    fn success_count(&self) -> u64 {
        self.success_count
    }

    fn total_requests(&self) -> u64 {
        self.total_requests
    }

    fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

impl RequestTally for ChaosResult {
    fn success_count(&self) -> u64 {
        self.success
    }

    fn total_requests(&self) -> u64 {
        self.total
    }

    fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

/// Percentage of `part` in `whole`, 0 when nothing was counted.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_labels() {
        assert_eq!(FailureKind::Timeout.label(), "timeout");
        assert_eq!(FailureKind::ConnectionError.label(), "connection_error");
        assert_eq!(FailureKind::HttpStatus(503).label(), "http_503");
        assert_eq!(FailureKind::Other("boom".into()).label(), "other");
    }

    #[test]
    fn test_trial_needs_workers() {
        assert!(TrialConfiguration::new("http://localhost", 0, Duration::from_secs(1)).is_err());
        let trial = TrialConfiguration::new("http://localhost", 3, Duration::ZERO).unwrap();
        assert_eq!(trial.workers(), 3);
        assert!(!trial.collect_infra_metrics());
    }

    #[test]
    fn test_percentage_of_nothing_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 4), 75.0);
    }

    #[test]
    fn test_trial_metrics_without_latency_omits_fields() {
        let metrics = TrialMetrics {
            success_count: 0,
            failure_count: 0,
            total_requests: 0,
            success_rate: 0.0,
            duration: 0.0,
            throughput: 0.0,
            latency: None,
            failures: BTreeMap::new(),
            infrastructure: None,
        };

        let value = serde_json::to_value(&metrics).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("latency_p50"));
        assert!(!object.contains_key("failures"));
        assert!(!object.contains_key("infrastructure"));

        let parsed: TrialMetrics = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.latency, None);
    }
}
