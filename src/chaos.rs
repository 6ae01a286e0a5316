//! Pod-kill chaos under continuous load

use crate::cluster::default_selector;
use crate::config::{endpoints, DEFAULT_NAMESPACE};
use crate::load_test::LoadTester;
use crate::probe::HttpProbe;
use crate::types::{percentage, ChaosEvent, ChaosResult};
use chrono::Utc;
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

pub const CHAOS_PROBE_INTERVAL: Duration = Duration::from_millis(500);
pub const CHAOS_JOIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ChaosOptions {
    pub namespace: String,
    pub duration: Duration,
    pub kill_interval: Duration,
    pub endpoint: String,
    /// Pause between two background probes.
    pub probe_interval: Duration,
    pub selector: String,
    /// How long past the chaos window to wait for the load generator.
    pub join_grace: Duration,
}

impl Default for ChaosOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            duration: Duration::from_secs(300),
            kill_interval: Duration::from_secs(60),
            endpoint: endpoints::STAC_COLLECTIONS.to_string(),
            probe_interval: CHAOS_PROBE_INTERVAL,
            selector: default_selector(),
            join_grace: CHAOS_JOIN_GRACE,
        }
    }
}

#[derive(Debug, Default)]
struct LoadTally {
    success: AtomicU64,
    total: AtomicU64,
}

impl LoadTally {
    fn record(&self, success: bool) {
        if success {
            self.success.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }
}

impl LoadTester {
    /// Kill one random pod every `kill_interval` while a background task keeps
    /// probing `endpoint` for the whole window.
    ///
    /// Pods that cannot be listed or deleted are logged and skipped, so this
    /// always produces a result.
    pub async fn run_chaos_test(&self, options: &ChaosOptions) -> ChaosResult {
        let url = self.url_for(&options.endpoint);
        info!(
            "💥 Starting chaos test on {} (namespace: {})",
            url, options.namespace
        );

        let deadline = Instant::now() + options.duration;
        let tally = Arc::new(LoadTally::default());
        let stop = CancellationToken::new();
        // Stops the generator even if this future is dropped mid-run.
        let _stop_on_exit = stop.clone().drop_guard();

        let mut generator = tokio::spawn(generate_load(
            self.probe.clone(),
            url,
            deadline,
            options.probe_interval,
            tally.clone(),
            stop.clone(),
        ));

        let mut pods = match timeout_at(
            deadline,
            self.cluster.list_units(&options.namespace, &options.selector),
        )
        .await
        {
            Ok(Ok(pods)) => {
                info!("Found {} pods for chaos testing", pods.len());
                pods
            }
            Ok(Err(e)) => {
                warn!("Could not get pod list, chaos disabled: {:#}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("Listing pods did not finish within the chaos window, chaos disabled");
                Vec::new()
            }
        };
        let candidates = pods.len();
        let mut killed_pods = Vec::new();

        // A kill may land on the deadline itself; deletions get the join grace.
        let kill_deadline = deadline + options.join_grace;
        while Instant::now() < deadline && !pods.is_empty() {
            sleep_until((Instant::now() + options.kill_interval).min(deadline)).await;

            let index = rand::thread_rng().gen_range(0..pods.len());
            let pod = pods[index].clone();
            info!("Killing pod: {}", pod);

            match timeout_at(kill_deadline, self.cluster.destroy_unit(&options.namespace, &pod)).await {
                Ok(Ok(())) => {
                    killed_pods.push(ChaosEvent {
                        pod,
                        killed_at: Utc::now(),
                    });
                    pods.swap_remove(index);
                }
                Ok(Err(e)) => error!("Failed to kill pod {}: {:#}", pod, e),
                Err(_) => error!("Killing pod {} did not finish in time", pod),
            }
        }

        match timeout_at(kill_deadline, &mut generator).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Load generator stopped unexpectedly: {}", e),
            Err(_) => {
                warn!("Load generator still running after the grace period, cancelling");
                stop.cancel();
                generator.abort();
            }
        }

        let success = tally.success.load(Ordering::Relaxed);
        let total = tally.total.load(Ordering::Relaxed);
        let result = ChaosResult {
            candidates,
            killed_pods,
            success,
            total,
            success_rate: percentage(success, total),
        };

        info!(
            "Chaos test completed: {:.1}% success rate, killed {} pods",
            result.success_rate,
            result.killed_pods.len()
        );
        result
    }
}

async fn generate_load(
    probe: HttpProbe,
    url: String,
    deadline: Instant,
    interval: Duration,
    tally: Arc<LoadTally>,
    stop: CancellationToken,
) {
    while Instant::now() < deadline {
        let outcome = tokio::select! {
            _ = stop.cancelled() => break,
            outcome = probe.probe(&url) => outcome,
        };
        if !outcome.success {
            debug!("Background probe failed: {:?}", outcome.failure);
        }
        tally.record(outcome.success);

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }
}
