//! Tester configuration, test profiles and shared thresholds

use crate::retry::RetryPolicy;
use reqwest::Url;
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_WORKERS: usize = 50;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 95.0;
pub const DEFAULT_NAMESPACE: &str = "eoapi";
pub const DEFAULT_BASE_URL: &str = "http://localhost";

/// Pause between two probe submissions within a trial.
pub const REQUEST_DELAY: Duration = Duration::from_millis(100);

/// Chaos runs pass when at least this share of requests succeeded.
pub const CHAOS_PASS_RATE: f64 = 80.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid base_url: {0:?}")]
    InvalidBaseUrl(String),

    #[error("base_url must start with http:// or https://: {0}")]
    UnsupportedScheme(String),

    #[error("{name} must be a positive integer: {value}")]
    NonPositive { name: &'static str, value: i64 },

    #[error("{name} must not be negative: {value}")]
    Negative { name: &'static str, value: i64 },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Check a signed command-line value and convert it to a count.
pub fn positive(name: &'static str, value: i64) -> Result<usize, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(value as usize)
}

/// Seconds from a signed command-line value; zero is allowed.
pub fn non_negative_secs(name: &'static str, value: i64) -> Result<Duration, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Negative { name, value });
    }
    Ok(Duration::from_secs(value as u64))
}

/// Base URL derived from `STAC_ENDPOINT` by dropping the `/stac` path.
pub fn default_base_url() -> String {
    env::var("STAC_ENDPOINT")
        .map(|endpoint| endpoint.replace("/stac", ""))
        .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

#[derive(Debug, Clone)]
pub struct TesterConfig {
    pub base_url: String,
    pub max_workers: usize,
    pub timeout: Duration,
    pub namespace: String,
    pub retry: RetryPolicy,
    pub request_delay: Duration,
}

impl TesterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            namespace: DEFAULT_NAMESPACE.to_string(),
            retry: RetryPolicy::default(),
            request_delay: REQUEST_DELAY,
        }
    }

    pub fn from_profile(base_url: impl Into<String>, profile: TestProfile) -> Self {
        Self {
            max_workers: profile.max_workers,
            timeout: profile.timeout,
            ..Self::new(base_url)
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Reject anything that would make a run meaningless before it starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::UnsupportedScheme(self.base_url.clone()));
        }
        Url::parse(base_url).map_err(|_| ConfigError::InvalidBaseUrl(self.base_url.clone()))?;

        if self.max_workers == 0 {
            return Err(ConfigError::NonPositive {
                name: "max_workers",
                value: 0,
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "timeout",
                value: 0,
            });
        }
        Ok(())
    }

    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }
}

/// Worker and timeout presets for the different load scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestProfile {
    pub max_workers: usize,
    pub timeout: Duration,
}

impl TestProfile {
    pub const LIGHT: TestProfile = TestProfile {
        max_workers: 5,
        timeout: Duration::from_secs(10),
    };
    pub const NORMAL: TestProfile = TestProfile {
        max_workers: 10,
        timeout: Duration::from_secs(15),
    };
    pub const STRESS: TestProfile = TestProfile {
        max_workers: 50,
        timeout: Duration::from_secs(10),
    };
    pub const CHAOS: TestProfile = TestProfile {
        max_workers: 20,
        timeout: Duration::from_secs(8),
    };
}

/// Success-rate floors, in percent.
pub mod thresholds {
    pub const HEALTH_ENDPOINTS: f64 = 98.0;
    pub const API_ENDPOINTS: f64 = 95.0;
    pub const API_NORMAL: f64 = 93.0;
    pub const API_SUSTAINED: f64 = 90.0;
    pub const STRESS_HIGH: f64 = 90.0;
    pub const STRESS_MODERATE: f64 = 80.0;
    pub const STRESS_LOW: f64 = 70.0;
    pub const CHAOS_HIGH: f64 = 70.0;
    pub const CHAOS_MODERATE: f64 = 60.0;
    pub const CHAOS_LOW: f64 = 50.0;
    pub const DEGRADED: f64 = 30.0;
    pub const RECOVERY: f64 = 85.0;
}

pub mod endpoints {
    pub const STAC_COLLECTIONS: &str = "/stac/collections";
    pub const STAC_SEARCH: &str = "/stac/search";
    pub const RASTER_HEALTH: &str = "/raster/healthz";
    pub const VECTOR_HEALTH: &str = "/vector/healthz";

    pub fn all_health() -> Vec<&'static str> {
        vec![RASTER_HEALTH, VECTOR_HEALTH]
    }

    pub fn all_api() -> Vec<&'static str> {
        vec![STAC_COLLECTIONS, STAC_SEARCH]
    }

    pub fn all_endpoints() -> Vec<&'static str> {
        let mut all = all_api();
        all.extend(all_health());
        all
    }

    /// Mix used by the normal-load run.
    pub fn normal_mix() -> Vec<&'static str> {
        vec![STAC_COLLECTIONS, RASTER_HEALTH, VECTOR_HEALTH]
    }
}

pub mod durations {
    use std::time::Duration;

    pub const QUICK: Duration = Duration::from_secs(3);
    pub const SHORT: Duration = Duration::from_secs(5);
    pub const NORMAL: Duration = Duration::from_secs(10);
    pub const MODERATE: Duration = Duration::from_secs(30);
    pub const LONG: Duration = Duration::from_secs(60);
    pub const EXTENDED: Duration = Duration::from_secs(300);
}

pub mod concurrency {
    pub const SINGLE: usize = 1;
    pub const LIGHT: usize = 3;
    pub const MODERATE: usize = 5;
    pub const NORMAL: usize = 10;
    pub const HIGH: usize = 15;
    pub const STRESS: usize = 20;
    pub const EXTREME: usize = 25;
}

/// Latency ceilings in milliseconds.
pub mod latency {
    pub const P50_FAST: f64 = 100.0;
    pub const P50_ACCEPTABLE: f64 = 200.0;
    pub const P95_FAST: f64 = 500.0;
    pub const P95_ACCEPTABLE: f64 = 1000.0;
    pub const P99_FAST: f64 = 2000.0;
    pub const P99_ACCEPTABLE: f64 = 5000.0;
}
