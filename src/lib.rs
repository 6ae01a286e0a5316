//! Load, stress and chaos testing for eoAPI deployments.
//!
//! A [`LoadTester`] runs fixed-duration trials against an endpoint, searches
//! for the concurrency level where the success rate breaks down, and kills
//! pods under sustained load to check that the services survive it.

pub mod assertions;
pub mod chaos;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod load_test;
pub mod probe;
pub mod prometheus;
pub mod report;
pub mod retry;
pub mod stats;
pub mod types;

pub use chaos::ChaosOptions;
pub use cluster::{ClusterControl, Kubectl};
pub use config::{ConfigError, TestProfile, TesterConfig};
pub use load_test::{LoadTester, StressOptions};
pub use prometheus::{metrics_source, InfrastructureSnapshot, MetricsSource, NullMetricsSource, PrometheusClient};
pub use retry::RetryPolicy;
pub use types::{
    BreakingPoint, ChaosEvent, ChaosResult, FailureKind, ProbeOutcome, RequestTally,
    TrialConfiguration, TrialMetrics,
};
