//! Command line surface

use crate::config::{concurrency, endpoints, DEFAULT_MAX_WORKERS, DEFAULT_NAMESPACE, DEFAULT_SUCCESS_THRESHOLD};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_TIMEOUT_SECS: i64 = 30;
const DEFAULT_STEP_SIZE: i64 = 5;
const DEFAULT_TEST_DURATION_SECS: i64 = 10;
const DEFAULT_COOLDOWN_SECS: i64 = 2;
const DEFAULT_RUN_DURATION_SECS: i64 = 60;
const DEFAULT_KILL_INTERVAL_SECS: i64 = 60;

#[derive(Parser, Debug)]
#[command(author, version, about = "eoAPI load, stress and chaos testing", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Stress flags for the default run; ignored when a subcommand is named
    #[command(flatten, next_help_heading = "Stress options (no subcommand)")]
    pub stress: StressArgs,

    /// Type of test to run (default: stress)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The selected test, falling back to stress with the top-level flags.
    pub fn resolved_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Stress(self.stress.clone()))
    }
}

// Numeric flags are signed so that non-positive values reach validation
// instead of failing in the parser.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Base URL for eoAPI (default: STAC_ENDPOINT without /stac, or http://localhost)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS, allow_negative_numbers = true)]
    pub timeout: i64,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Export metrics to a JSON file
    #[arg(long, global = true, value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Prometheus URL for infrastructure metrics
    #[arg(long, global = true, env = "PROMETHEUS_URL", value_name = "URL")]
    pub prometheus_url: Option<String>,

    /// Kubernetes namespace
    #[arg(long, global = true, env = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Collect infrastructure metrics from Prometheus during tests
    #[arg(long, global = true)]
    pub collect_infra_metrics: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Find the concurrency level where the success rate breaks down
    Stress(StressArgs),

    /// Sustained mixed-endpoint load
    Normal(NormalArgs),

    /// Kill pods while keeping load on an endpoint
    Chaos(ChaosArgs),
}

impl Command {
    pub fn title(&self) -> &'static str {
        match self {
            Command::Stress(_) => "Stress",
            Command::Normal(_) => "Normal",
            Command::Chaos(_) => "Chaos",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StressArgs {
    /// Endpoint to test, relative to the base URL
    #[arg(long, default_value = endpoints::STAC_COLLECTIONS)]
    pub endpoint: String,

    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS as i64, allow_negative_numbers = true)]
    pub max_workers: i64,

    /// Minimum success rate (%) a level must keep
    #[arg(long, default_value_t = DEFAULT_SUCCESS_THRESHOLD)]
    pub success_threshold: f64,

    #[arg(long, default_value_t = DEFAULT_STEP_SIZE, allow_negative_numbers = true)]
    pub step_size: i64,

    /// Seconds spent at each concurrency level
    #[arg(long, default_value_t = DEFAULT_TEST_DURATION_SECS, allow_negative_numbers = true)]
    pub test_duration: i64,

    /// Seconds to wait between levels
    #[arg(long, default_value_t = DEFAULT_COOLDOWN_SECS, allow_negative_numbers = true)]
    pub cooldown: i64,
}

#[derive(Args, Debug, Clone)]
pub struct NormalArgs {
    /// Test duration in seconds, shared across endpoints
    #[arg(long, default_value_t = DEFAULT_RUN_DURATION_SECS, allow_negative_numbers = true)]
    pub duration: i64,

    /// Concurrent users
    #[arg(long, default_value_t = concurrency::NORMAL as i64, allow_negative_numbers = true)]
    pub users: i64,
}

#[derive(Args, Debug, Clone)]
pub struct ChaosArgs {
    /// Test duration in seconds
    #[arg(long, default_value_t = DEFAULT_RUN_DURATION_SECS, allow_negative_numbers = true)]
    pub duration: i64,

    /// Seconds between pod kills
    #[arg(long, default_value_t = DEFAULT_KILL_INTERVAL_SECS, allow_negative_numbers = true)]
    pub kill_interval: i64,

    #[arg(long, default_value = endpoints::STAC_COLLECTIONS)]
    pub endpoint: String,
}
