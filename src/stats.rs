use crate::types::{percentage, FailureKind, LatencyDistribution, ProbeOutcome, TrialMetrics};
use std::collections::BTreeMap;
use std::time::Duration;

/// Accumulates probe outcomes for a single trial.
///
/// Owned by the one task that drains the trial's probes, so it needs no
/// locking of its own.
#[derive(Debug, Default)]
pub struct Statistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    latencies: Vec<f64>,
    failures: BTreeMap<String, u64>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ProbeOutcome) {
        self.total_requests += 1;
        self.latencies.push(outcome.latency_ms);

        if outcome.success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
            let label = outcome
                .failure
                .map(|kind| kind.label())
                .unwrap_or_else(|| "other".to_string());
            *self.failures.entry(label).or_insert(0) += 1;
        }
    }

    /// Count a failure that has no latency, such as a probe task that never
    /// finished. It is left out of the latency distribution.
    pub fn record_unmeasured(&mut self, kind: FailureKind) {
        self.total_requests += 1;
        self.failed_requests += 1;
        *self.failures.entry(kind.label()).or_insert(0) += 1;
    }

    pub fn success_rate(&self) -> f64 {
        percentage(self.successful_requests, self.total_requests)
    }

    /// Min/max/avg and percentiles over every recorded latency.
    pub fn latency_distribution(&self) -> Option<LatencyDistribution> {
        if self.latencies.is_empty() {
            return None;
        }

        let mut sorted = self.latencies.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let avg = sorted.iter().sum::<f64>() / n as f64;

        Some(LatencyDistribution {
            min: sorted[0],
            max: sorted[n - 1],
            avg,
            p50: median(&sorted),
            p95: index_percentile(&sorted, 0.95),
            p99: index_percentile(&sorted, 0.99),
        })
    }

    pub fn finish(self, elapsed: Duration) -> TrialMetrics {
        let duration = elapsed.as_secs_f64();
        let throughput = if duration > 0.0 {
            self.total_requests as f64 / duration
        } else {
            0.0
        };

        TrialMetrics {
            success_count: self.successful_requests,
            failure_count: self.failed_requests,
            total_requests: self.total_requests,
            success_rate: self.success_rate(),
            duration,
            throughput,
            latency: self.latency_distribution(),
            failures: self.failures,
            infrastructure: None,
        }
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

// Nearest-rank at floor(q * n); a single sample stands for every percentile.
fn index_percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.len() <= 1 {
        return sorted[0];
    }
    let index = ((sorted.len() as f64) * quantile).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}
