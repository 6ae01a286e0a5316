//! Optional infrastructure metrics pulled from Prometheus
//!
//! Everything here is best effort: an unreachable server, a failed query or a
//! missing URL all degrade to an empty snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PROMETHEUS_TIMEOUT: Duration = Duration::from_secs(10);
const RANGE_STEP: &str = "15s";

/// Category -> series name -> Prometheus `data` object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct InfrastructureSnapshot(pub BTreeMap<String, BTreeMap<String, Value>>);

impl InfrastructureSnapshot {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn category(&self, name: &str) -> Option<&BTreeMap<String, Value>> {
        self.0.get(name)
    }

    fn has_series(&self, category: &str, series: &str) -> bool {
        self.category(category)
            .map(|c| c.contains_key(series))
            .unwrap_or(false)
    }

    /// Insert a category, dropping series that returned nothing.
    pub fn insert_category(&mut self, name: &str, series: Vec<(&str, Option<Value>)>) {
        let collected: BTreeMap<String, Value> = series
            .into_iter()
            .filter_map(|(key, value)| value.filter(has_data).map(|v| (key.to_string(), v)))
            .collect();

        if !collected.is_empty() {
            self.0.insert(name.to_string(), collected);
        }
    }
}

fn has_data(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Source of infrastructure metrics for a test's time window.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn collect(
        &self,
        namespace: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> InfrastructureSnapshot;
}

/// Used when no metrics backend is configured or reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsSource;

#[async_trait]
impl MetricsSource for NullMetricsSource {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn collect(
        &self,
        _namespace: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> InfrastructureSnapshot {
        InfrastructureSnapshot::default()
    }
}

/// Pick Prometheus when `url` is set and answers, otherwise the null source.
pub async fn metrics_source(url: Option<&str>) -> Arc<dyn MetricsSource> {
    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        info!("Prometheus URL not provided, skipping metrics collection");
        return Arc::new(NullMetricsSource);
    };

    match PrometheusClient::connect(url).await {
        Some(client) => {
            info!("📈 Prometheus integration enabled: {}", url);
            Arc::new(client)
        }
        None => {
            info!("Prometheus integration disabled (unavailable)");
            Arc::new(NullMetricsSource)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone)]
pub struct PrometheusClient {
    url: String,
    client: Client,
}

impl PrometheusClient {
    /// Connect to `url`, returning `None` when the server is unreachable.
    pub async fn connect(url: &str) -> Option<Self> {
        Self::connect_with_timeout(url, DEFAULT_PROMETHEUS_TIMEOUT).await
    }

    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Option<Self> {
        let client = match Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not build Prometheus client: {}", e);
                return None;
            }
        };

        let prometheus = Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        };
        if prometheus.check_availability().await {
            Some(prometheus)
        } else {
            None
        }
    }

    async fn check_availability(&self) -> bool {
        let endpoint = format!("{}/api/v1/status/config", self.url);
        match self.client.get(&endpoint).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                info!("Prometheus available at {}", self.url);
                true
            }
            Ok(response) => {
                warn!("Prometheus returned status {}", response.status());
                false
            }
            Err(e) => {
                debug!("Prometheus not available at {}: {}", self.url, e);
                false
            }
        }
    }

    /// Instant query, evaluated at `time` when given.
    pub async fn query(&self, query: &str, time: Option<DateTime<Utc>>) -> Option<Value> {
        let mut params = vec![("query", query.to_string())];
        if let Some(time) = time {
            params.push(("time", unix_seconds(time)));
        }
        self.get_data("/api/v1/query", &params).await
    }

    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Value> {
        let params = vec![
            ("query", query.to_string()),
            ("start", unix_seconds(start)),
            ("end", unix_seconds(end)),
            ("step", RANGE_STEP.to_string()),
        ];
        self.get_data("/api/v1/query_range", &params).await
    }

    async fn get_data(&self, path: &str, params: &[(&str, String)]) -> Option<Value> {
        let endpoint = format!("{}{}", self.url, path);
        let response = match self.client.get(&endpoint).query(params).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Prometheus query error: {}", e);
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Prometheus query failed: {}", status);
            return None;
        }

        match response.json::<ApiResponse>().await {
            Ok(body) if body.status == "success" => Some(body.data),
            Ok(body) => {
                warn!("Prometheus query returned status {:?}", body.status);
                None
            }
            Err(e) => {
                debug!("Prometheus response could not be decoded: {}", e);
                None
            }
        }
    }

    async fn pod_metrics(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, Option<Value>)> {
        let cpu = format!(
            r#"rate(container_cpu_usage_seconds_total{{namespace="{ns}",container!="",container!="POD"}}[1m])"#
        );
        let memory = format!(
            r#"container_memory_working_set_bytes{{namespace="{ns}",container!="",container!="POD"}}"#
        );
        vec![
            ("cpu", self.query_range(&cpu, start, end).await),
            ("memory", self.query_range(&memory, start, end).await),
        ]
    }

    async fn hpa_metrics(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, Option<Value>)> {
        let current =
            format!(r#"kube_horizontalpodautoscaler_status_current_replicas{{namespace="{ns}"}}"#);
        let desired =
            format!(r#"kube_horizontalpodautoscaler_status_desired_replicas{{namespace="{ns}"}}"#);
        vec![
            ("current_replicas", self.query_range(&current, start, end).await),
            ("desired_replicas", self.query_range(&desired, start, end).await),
        ]
    }

    async fn request_metrics(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, Option<Value>)> {
        let rate = format!(r#"rate(nginx_ingress_controller_requests{{namespace="{ns}"}}[1m])"#);
        let latency = format!(
            r#"histogram_quantile(0.95, rate(nginx_ingress_controller_request_duration_seconds_bucket{{namespace="{ns}"}}[1m]))"#
        );
        vec![
            ("request_rate", self.query_range(&rate, start, end).await),
            ("request_latency_p95", self.query_range(&latency, start, end).await),
        ]
    }

    async fn database_metrics(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, Option<Value>)> {
        let connections = format!(r#"pg_stat_activity_count{{namespace="{ns}"}}"#);
        let duration = format!(r#"rate(pg_stat_statements_mean_exec_time{{namespace="{ns}"}}[1m])"#);
        vec![
            ("db_connections", self.query_range(&connections, start, end).await),
            ("db_query_duration", self.query_range(&duration, start, end).await),
        ]
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn collect(
        &self,
        namespace: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> InfrastructureSnapshot {
        info!("Collecting infrastructure metrics from {} to {}", start, end);

        let mut snapshot = InfrastructureSnapshot::default();
        snapshot.insert_category("pod_metrics", self.pod_metrics(namespace, start, end).await);
        snapshot.insert_category("hpa_metrics", self.hpa_metrics(namespace, start, end).await);
        snapshot.insert_category(
            "request_metrics",
            self.request_metrics(namespace, start, end).await,
        );
        snapshot.insert_category(
            "database_metrics",
            self.database_metrics(namespace, start, end).await,
        );
        snapshot
    }
}

fn unix_seconds(time: DateTime<Utc>) -> String {
    format!("{:.3}", time.timestamp_millis() as f64 / 1000.0)
}

/// Human-readable view of which infrastructure series were captured.
pub fn summarize_infrastructure(snapshot: &InfrastructureSnapshot) -> BTreeMap<String, String> {
    let checks = [
        ("pod_metrics", "cpu", "pod_cpu", "Collected"),
        ("pod_metrics", "memory", "pod_memory", "Collected"),
        ("hpa_metrics", "current_replicas", "hpa_scaling", "Observed"),
        ("request_metrics", "request_rate", "ingress_rate", "Collected"),
        ("request_metrics", "request_latency_p95", "ingress_latency", "Collected"),
        ("database_metrics", "db_connections", "db_connections", "Collected"),
    ];

    let mut summary: BTreeMap<String, String> = checks
        .iter()
        .filter(|(category, series, _, _)| snapshot.has_series(category, series))
        .map(|(_, _, label, status)| (label.to_string(), status.to_string()))
        .collect();

    if summary.is_empty() {
        summary.insert("status".to_string(), "No metrics available".to_string());
    }
    summary
}
