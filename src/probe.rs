use crate::config::ConfigError;
use crate::retry::RetryPolicy;
use crate::types::{FailureKind, ProbeOutcome};
use log::debug;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Issues timed GET requests on a shared, pooled client.
///
/// Cloning is cheap and every clone shares the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

enum Attempt {
    Done(ProbeOutcome),
    Retry(FailureKind),
}

impl HttpProbe {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, ConfigError> {
        let client = Client::builder().timeout(timeout).build()?;
        debug!("HTTP client created with retry strategy {:?}", retry);

        Ok(Self {
            client,
            timeout,
            retry,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One logical GET against `url`, retries included.
    ///
    /// Success means a final status of 200. Every failure comes back as data,
    /// with the latency measured up to the point it happened.
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();
        let mut retries = 0;

        loop {
            let last_failure = match self.attempt(url, start, retries).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Retry(kind) => kind,
            };

            if !self.retry.has_budget(retries) {
                return ProbeOutcome::failed(last_failure, elapsed_ms(start));
            }

            retries += 1;
            let delay = self.retry.delay_for_retry(retries);
            debug!(
                "Retrying {} after {} (retry {}, waiting {:?})",
                url, last_failure, retries, delay
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    async fn attempt(&self, url: &str, start: Instant, retries: u32) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = classify(&e);
                debug!("Request to {} failed: {}", url, e);
                return if is_retryable(&e) {
                    Attempt::Retry(kind)
                } else {
                    Attempt::Done(ProbeOutcome::failed(kind, elapsed_ms(start)))
                };
            }
        };

        let status = response.status();
        if self.retry.should_retry_status(status.as_u16()) && self.retry.has_budget(retries) {
            return Attempt::Retry(FailureKind::HttpStatus(status.as_u16()));
        }

        // Drain the body so latency covers the whole response and the
        // connection goes back to the pool.
        if let Err(e) = response.bytes().await {
            debug!("Reading body from {} failed: {}", url, e);
            return Attempt::Done(ProbeOutcome::failed(classify(&e), elapsed_ms(start)));
        }

        let latency_ms = elapsed_ms(start);
        if status == StatusCode::OK {
            Attempt::Done(ProbeOutcome::ok(latency_ms))
        } else {
            debug!("Request to {} returned status {}", url, status);
            Attempt::Done(ProbeOutcome::failed(
                FailureKind::HttpStatus(status.as_u16()),
                latency_ms,
            ))
        }
    }
}

fn classify(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_connect() {
        FailureKind::ConnectionError
    } else {
        FailureKind::Other(error.to_string())
    }
}

fn is_retryable(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
