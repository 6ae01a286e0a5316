use crate::cluster::{ClusterControl, Kubectl};
use crate::config::{endpoints, ConfigError, TesterConfig, DEFAULT_SUCCESS_THRESHOLD};
use crate::probe::HttpProbe;
use crate::prometheus::{summarize_infrastructure, MetricsSource, NullMetricsSource};
use crate::stats::Statistics;
use crate::types::{BreakingPoint, FailureKind, ProbeOutcome, TrialConfiguration, TrialMetrics};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Parameters of a breaking-point search.
#[derive(Debug, Clone)]
pub struct StressOptions {
    pub endpoint: String,
    pub success_threshold: f64,
    pub step_size: usize,
    pub test_duration: Duration,
    pub cooldown: Duration,
    pub collect_infra_metrics: bool,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            endpoint: endpoints::STAC_COLLECTIONS.to_string(),
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            step_size: 5,
            test_duration: Duration::from_secs(10),
            cooldown: Duration::from_secs(2),
            collect_infra_metrics: false,
        }
    }
}

/// Drives trials, searches and chaos runs against one deployment.
pub struct LoadTester {
    base_url: String,
    max_workers: usize,
    namespace: String,
    request_delay: Duration,
    pub(crate) probe: HttpProbe,
    metrics: Arc<dyn MetricsSource>,
    pub(crate) cluster: Arc<dyn ClusterControl>,
}

impl LoadTester {
    pub fn new(config: TesterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let probe = HttpProbe::new(config.timeout, config.retry.clone())?;
        let base_url = config.normalized_base_url();

        info!(
            "LoadTester initialized: base_url={}, max_workers={}, timeout={:?}",
            base_url, config.max_workers, config.timeout
        );

        Ok(Self {
            base_url,
            max_workers: config.max_workers,
            namespace: config.namespace,
            request_delay: config.request_delay,
            probe,
            metrics: Arc::new(NullMetricsSource),
            cluster: Arc::new(Kubectl::default()),
        })
    }

    pub fn with_metrics_source(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterControl>) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Join `endpoint` onto the base URL.
    pub fn url_for(&self, endpoint: &str) -> String {
        crate::assertions::build_url(&self.base_url, endpoint)
    }

    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        self.probe.probe(url).await
    }

    pub async fn run_trial(
        &self,
        url: &str,
        workers: usize,
        duration: Duration,
    ) -> Result<TrialMetrics, ConfigError> {
        let trial = TrialConfiguration::new(url, workers, duration)?;
        Ok(self.execute_trial(&trial).await)
    }

    /// Run one trial: submit probes at a steady rate for the trial's duration,
    /// then wait for every submitted probe before aggregating.
    pub async fn execute_trial(&self, trial: &TrialConfiguration) -> TrialMetrics {
        info!(
            "Testing {} with {} concurrent requests for {:?}",
            trial.url(),
            trial.workers(),
            trial.duration()
        );

        let window_start = Utc::now();
        let start_time = Instant::now();
        let pool = Arc::new(Semaphore::new(trial.workers()));
        let mut in_flight = FuturesUnordered::new();

        // Submission never waits on the pool; only the delay paces it.
        while start_time.elapsed() < trial.duration() {
            let pool = pool.clone();
            let probe = self.probe.clone();
            let url = trial.url().to_string();

            in_flight.push(tokio::spawn(async move {
                let _permit = pool.acquire_owned().await.ok();
                probe.probe(&url).await
            }));

            sleep(self.request_delay).await;
        }

        let mut stats = Statistics::new();
        while let Some(joined) = in_flight.next().await {
            match joined {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    error!("Probe task for {} did not complete: {}", trial.url(), e);
                    stats.record_unmeasured(FailureKind::Other(e.to_string()));
                }
            }
        }

        let window_end = Utc::now();
        let mut metrics = stats.finish(start_time.elapsed());
        log_trial(trial.workers(), &metrics);

        if trial.collect_infra_metrics() && self.metrics.is_enabled() {
            info!("Collecting infrastructure metrics from Prometheus...");
            let snapshot = self
                .metrics
                .collect(&self.namespace, window_start, window_end)
                .await;
            if !snapshot.is_empty() {
                info!("Infrastructure metrics: {:?}", summarize_infrastructure(&snapshot));
                metrics.infrastructure = Some(snapshot);
            }
        }

        metrics
    }

    /// Raise concurrency by `step_size` until the success rate drops below
    /// the threshold.
    ///
    /// Stops at the first level that breaches, without resampling it. When
    /// no level breaches, `max_workers` is reported.
    pub async fn find_breaking_point(
        &self,
        options: &StressOptions,
    ) -> Result<BreakingPoint, ConfigError> {
        if options.step_size == 0 {
            return Err(ConfigError::NonPositive {
                name: "step_size",
                value: 0,
            });
        }

        let url = self.url_for(&options.endpoint);
        info!("🔥 Starting stress test on {}", url);
        info!(
            "Max workers: {}, Success threshold: {}%",
            self.max_workers, options.success_threshold
        );

        let levels: Vec<usize> = (options.step_size..=self.max_workers)
            .step_by(options.step_size)
            .collect();
        let mut metrics = BTreeMap::new();

        for (index, &workers) in levels.iter().enumerate() {
            let trial = TrialConfiguration::new(url.as_str(), workers, options.test_duration)?
                .with_infra_metrics(options.collect_infra_metrics);
            let result = self.execute_trial(&trial).await;
            let success_rate = result.success_rate;
            metrics.insert(workers, result);

            if success_rate < options.success_threshold {
                info!(
                    "💥 Breaking point found at {} concurrent requests (success rate: {:.1}%)",
                    workers, success_rate
                );
                return Ok(BreakingPoint {
                    breaking_point: workers,
                    metrics,
                });
            }

            let is_last = index + 1 == levels.len();
            if !is_last && !options.cooldown.is_zero() {
                sleep(options.cooldown).await;
            }
        }

        info!("✅ Stress test completed - no breaking point found");
        Ok(BreakingPoint {
            breaking_point: self.max_workers,
            metrics,
        })
    }

    /// Sustained load spread over several endpoints.
    ///
    /// Each endpoint gets an equal share of the users and of the duration.
    /// An empty list falls back to the STAC/raster/vector mix.
    pub async fn run_normal_load(
        &self,
        endpoint_list: &[&str],
        duration: Duration,
        concurrent_users: usize,
        collect_infra_metrics: bool,
    ) -> Result<BTreeMap<String, TrialMetrics>, ConfigError> {
        let defaults = endpoints::normal_mix();
        let endpoint_list = if endpoint_list.is_empty() {
            defaults.as_slice()
        } else {
            endpoint_list
        };

        info!(
            "Starting normal load test ({:?}, {} users)",
            duration, concurrent_users
        );

        let share = endpoint_list.len();
        let workers = (concurrent_users / share).max(1);
        let per_endpoint = duration / share as u32;

        let mut results = BTreeMap::new();
        for endpoint in endpoint_list {
            info!("Testing {}...", endpoint);
            let trial = TrialConfiguration::new(self.url_for(endpoint), workers, per_endpoint)?
                .with_infra_metrics(collect_infra_metrics);
            results.insert(endpoint.to_string(), self.execute_trial(&trial).await);
        }

        Ok(results)
    }
}

fn log_trial(workers: usize, metrics: &TrialMetrics) {
    let (p50, p95, p99) = metrics
        .latency
        .as_ref()
        .map(|l| (l.p50, l.p95, l.p99))
        .unwrap_or_default();

    info!(
        "Workers: {}, Success: {:.1}% ({}/{}), Latency p50/p95/p99: {:.0}/{:.0}/{:.0}ms, Throughput: {:.1} req/s",
        workers,
        metrics.success_rate,
        metrics.success_count,
        metrics.total_requests,
        p50,
        p95,
        p99,
        metrics.throughput
    );
}
