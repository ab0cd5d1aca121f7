//! Rate-limited, breaker-gated, retrying HTTP fetcher.
//!
//! The only component that talks to the network. One instance is shared by
//! every strategy and run, so its rate limiter and circuit breaker see the
//! whole process's traffic.

use std::sync::Arc;

use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::fetch::backoff::BackoffPolicy;
use crate::fetch::circuit_breaker::CircuitBreaker;
use crate::fetch::rate_limiter::RateLimiter;
use crate::fetch::transport::HttpTransport;
use crate::models::Config;
use crate::telemetry::Telemetry;
use crate::utils::get_domain;

/// Resilient GET client composed of limiter, breaker and backoff.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    backoff: BackoffPolicy,
    telemetry: Arc<dyn Telemetry>,
}

impl ResilientFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: &Config,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(&config.rate_limit, Arc::clone(&telemetry)),
            breaker: CircuitBreaker::from_config(&config.circuit_breaker),
            backoff: BackoffPolicy::from_config(&config.rate_limit),
            telemetry,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetch the body of `url` as raw bytes.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let host = host_of(url)?;
        let mut attempt = 0u32;

        loop {
            if !self.breaker.allow_request() {
                self.report_breaker();
                return Err(AppError::CircuitOpen {
                    url: url.to_string(),
                });
            }

            self.limiter.acquire(&host).await;

            let start = Instant::now();
            let error = match self.transport.get(url).await {
                Ok(response) => {
                    self.telemetry.http_request(response.status, start.elapsed());
                    if response.status == 200 {
                        self.breaker.record_success();
                        self.report_breaker();
                        return Ok(response.body);
                    }
                    self.breaker.record_failure();
                    self.report_breaker();
                    AppError::HttpStatus {
                        status: response.status,
                        url: url.to_string(),
                    }
                }
                Err(error) => {
                    self.telemetry.http_request(0, start.elapsed());
                    self.breaker.record_failure();
                    self.report_breaker();
                    error
                }
            };

            if !error.is_transient() || !self.backoff.should_retry(attempt) {
                return Err(error);
            }

            let delay = self.backoff.delay(attempt);
            log::warn!(
                "{}. Retrying in {}ms (attempt {}/{})",
                error,
                delay.as_millis(),
                attempt + 1,
                self.backoff.max_retries()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Fetch the body of `url` decoded as text (lossy UTF-8).
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn report_breaker(&self) {
        self.telemetry.circuit_breaker_state(self.breaker.state());
    }
}

/// Host component used as the politeness key.
fn host_of(url: &str) -> Result<String> {
    get_domain(url).ok_or_else(|| AppError::InvalidUrl(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::CircuitState;
    use crate::telemetry::MemoryTelemetry;
    use crate::testing::{ScriptedTransport, fast_config};

    const URL: &str = "https://records.example.gov/files/001.pdf";

    fn fetcher(transport: Arc<ScriptedTransport>) -> (ResilientFetcher, Arc<MemoryTelemetry>) {
        let telemetry = Arc::new(MemoryTelemetry::new());
        let fetcher = ResilientFetcher::new(transport, &fast_config(), telemetry.clone());
        (fetcher, telemetry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URL, 200, b"%PDF-1.7");
        let (fetcher, telemetry) = fetcher(transport.clone());

        let body = fetcher.fetch_bytes(URL).await.unwrap();

        assert_eq!(body, b"%PDF-1.7");
        assert_eq!(transport.calls(URL), 1);
        assert_eq!(telemetry.snapshot().http_statuses.get(&200), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_then_ok_retries_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue_status(URL, 429);
        transport.respond(URL, 200, b"ok");
        let (fetcher, _) = fetcher(transport.clone());

        let body = fetcher.fetch_bytes(URL).await.unwrap();

        assert_eq!(body, b"ok");
        assert_eq!(transport.calls(URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_fails_without_retry() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URL, 404, b"");
        let (fetcher, _) = fetcher(transport.clone());

        let err = fetcher.fetch_bytes(URL).await.unwrap_err();

        assert!(matches!(err, AppError::HttpStatus { status: 404, .. }));
        assert_eq!(transport.calls(URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_exhausts_retry_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URL, 503, b"");
        let mut config = fast_config();
        config.circuit_breaker.failure_threshold = 100;
        let fetcher = ResilientFetcher::new(
            transport.clone(),
            &config,
            Arc::new(MemoryTelemetry::new()),
        );

        let err = fetcher.fetch_bytes(URL).await.unwrap_err();

        assert!(matches!(err, AppError::HttpStatus { status: 503, .. }));
        // First attempt plus five retries.
        assert_eq!(transport.calls(URL), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_ok_status_yields_a_body() {
        for status in [204, 206, 302] {
            let transport = Arc::new(ScriptedTransport::new());
            transport.respond(URL, status, b"partial");
            let (fetcher, _) = fetcher(transport.clone());

            let err = fetcher.fetch_bytes(URL).await.unwrap_err();

            assert!(
                matches!(err, AppError::HttpStatus { status: s, .. } if s == status),
                "{status}"
            );
            assert_eq!(transport.calls(URL), 1);
            assert_eq!(fetcher.breaker().consecutive_failures(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue_error(URL, "connection reset");
        transport.respond(URL, 200, b"ok");
        let (fetcher, _) = fetcher(transport.clone());

        assert_eq!(fetcher.fetch_bytes(URL).await.unwrap(), b"ok");
        assert_eq!(transport.calls(URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_fails_fast_without_network() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URL, 500, b"");
        let mut config = fast_config();
        config.circuit_breaker.failure_threshold = 2;
        config.circuit_breaker.cooldown_ms = 60_000;
        let telemetry = Arc::new(MemoryTelemetry::new());
        let fetcher = ResilientFetcher::new(transport.clone(), &config, telemetry.clone());

        assert!(fetcher.fetch_bytes(URL).await.is_err());
        assert!(fetcher.fetch_bytes(URL).await.is_err());
        assert_eq!(fetcher.breaker().state(), CircuitState::Open);

        let err = fetcher.fetch_bytes(URL).await.unwrap_err();
        assert!(matches!(err, AppError::CircuitOpen { .. }));
        assert_eq!(transport.calls(URL), 2);
        assert_eq!(telemetry.snapshot().breaker_state, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_text_decodes_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URL, 200, "<html>listing</html>".as_bytes());
        let (fetcher, _) = fetcher(transport);

        assert_eq!(fetcher.fetch_text(URL).await.unwrap(), "<html>listing</html>");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of(URL).unwrap(), "records.example.gov");
        assert!(host_of("not a url").is_err());
    }
}
