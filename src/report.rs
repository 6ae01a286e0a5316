//! Console summaries and JSON export

use crate::prometheus::summarize_infrastructure;
use crate::types::{ChaosResult, TrialMetrics};
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const RULE_WIDTH: usize = 60;

/// Ordered, human-readable lines describing one trial.
pub fn summarize(metrics: &TrialMetrics) -> Vec<(&'static str, String)> {
    let mut lines = vec![(
        "Success Rate",
        format!(
            "{:.1}% ({}/{})",
            metrics.success_rate, metrics.success_count, metrics.total_requests
        ),
    )];

    if let Some(latency) = &metrics.latency {
        lines.push((
            "Latency (ms)",
            format!(
                "p50={:.0} p95={:.0} p99={:.0} (min={:.0}, max={:.0}, avg={:.0})",
                latency.p50, latency.p95, latency.p99, latency.min, latency.max, latency.avg
            ),
        ));
    }

    lines.push(("Throughput", format!("{:.1} req/s", metrics.throughput)));
    lines.push(("Duration", format!("{:.1}s", metrics.duration)));

    if !metrics.failures.is_empty() {
        let breakdown: Vec<String> = metrics
            .failures
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect();
        lines.push(("Failures", breakdown.join(", ")));
    }

    lines
}

pub fn print_summary(title: &str, metrics: &TrialMetrics) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{}", rule);
    println!("{}", title);
    println!("{}", rule);

    for (label, value) in summarize(metrics) {
        println!("{:<15}{}", format!("{}:", label), value);
    }

    if let Some(infrastructure) = &metrics.infrastructure {
        println!("\nInfrastructure Metrics:");
        for (key, value) in summarize_infrastructure(infrastructure) {
            println!("  {}: {}", key, value);
        }
    }

    println!("{}\n", rule);
}

pub fn print_chaos_summary(result: &ChaosResult) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{}", rule);
    println!("Chaos Test Results");
    println!("{}", rule);
    println!(
        "{:<15}{:.1}% ({}/{})",
        "Success Rate:", result.success_rate, result.success, result.total
    );
    println!(
        "{:<15}{} of {} candidates",
        "Pods Killed:", result.killed_pods.len(), result.candidates
    );
    for event in &result.killed_pods {
        println!("  {} at {}", event.pod, event.killed_at.to_rfc3339());
    }
    println!("{}\n", rule);
}

/// Write `report` as pretty-printed JSON to `path`.
pub fn export_json<T: Serialize + ?Sized>(report: &T, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("failed to serialize metrics to {}", path.display()))?;
    writer.flush()?;

    info!("📄 Metrics exported to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BreakingPoint, ChaosEvent, LatencyDistribution};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn sample_metrics() -> TrialMetrics {
        TrialMetrics {
            success_count: 48,
            failure_count: 2,
            total_requests: 50,
            success_rate: 96.0,
            duration: 5.0312,
            throughput: 9.937907457,
            latency: Some(LatencyDistribution {
                min: 3.25,
                max: 812.4,
                avg: 41.123456789,
                p50: 12.0,
                p95: 301.75,
                p99: 812.4,
            }),
            failures: BTreeMap::from([("http_503".to_string(), 2)]),
            infrastructure: None,
        }
    }

    #[test]
    fn test_summary_lines() {
        let lines = summarize(&sample_metrics());
        let labels: Vec<&str> = lines.iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            vec!["Success Rate", "Latency (ms)", "Throughput", "Duration", "Failures"]
        );
        assert_eq!(lines[0].1, "96.0% (48/50)");
        assert_eq!(lines[1].1, "p50=12 p95=302 p99=812 (min=3, max=812, avg=41)");
        assert_eq!(lines[4].1, "http_503=2");
    }

    #[test]
    fn test_summary_without_samples_skips_latency() {
        let mut metrics = sample_metrics();
        metrics.latency = None;
        metrics.failures.clear();
        let labels: Vec<&str> = summarize(&metrics).iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["Success Rate", "Throughput", "Duration"]);
    }

    #[test]
    fn test_stress_export_round_trip() {
        let report = BreakingPoint {
            breaking_point: 10,
            metrics: BTreeMap::from([(5, sample_metrics()), (10, sample_metrics())]),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stress.json");
        export_json(&report, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["breaking_point"], 10);
        assert_eq!(value["metrics"]["5"]["latency_p95"], 301.75);
        assert_eq!(value["metrics"]["5"]["failures"]["http_503"], 2);

        let parsed: BreakingPoint = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_normal_export_is_keyed_by_endpoint() {
        let mut no_samples = sample_metrics();
        no_samples.success_count = 0;
        no_samples.failure_count = 0;
        no_samples.total_requests = 0;
        no_samples.success_rate = 0.0;
        no_samples.latency = None;
        no_samples.failures.clear();

        let report = BTreeMap::from([
            ("/stac/collections".to_string(), sample_metrics()),
            ("/raster/healthz".to_string(), no_samples),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal.json");
        export_json(&report, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["/stac/collections"]["success_rate"], 96.0);
        assert_eq!(value["/stac/collections"]["latency_p99"], 812.4);
        assert!(value["/raster/healthz"].get("latency_p50").is_none());
        assert!(value["/raster/healthz"].get("failures").is_none());

        let parsed: BTreeMap<String, TrialMetrics> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_chaos_export_round_trip() {
        let report = ChaosResult {
            candidates: 3,
            killed_pods: vec![
                ChaosEvent {
                    pod: "eoapi-stac-0".to_string(),
                    killed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                },
                ChaosEvent {
                    pod: "eoapi-raster-1".to_string(),
                    killed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap(),
                },
            ],
            success: 117,
            total: 120,
            success_rate: 97.5,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chaos.json");
        export_json(&report, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["candidates"], 3);
        assert_eq!(value["killed_pods"][1]["pod"], "eoapi-raster-1");
        assert_eq!(value["killed_pods"][0]["killed_at"], "2024-05-01T12:00:00Z");
        assert_eq!(value["success_rate"], 97.5);

        let parsed: ChaosResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");
        assert!(export_json(&sample_metrics(), &path).is_err());
    }
}
