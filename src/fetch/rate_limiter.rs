//! Token-bucket admission control with per-host politeness.
//!
//! A request to a host has to clear three gates in order:
//!
//! 1. the polite delay since the previous request to the same host,
//! 2. the global token bucket shared by every host,
//! 3. the host's own token bucket.
//!
//! Buckets hand out reservations: taking a token may drive the balance
//! negative, and the caller sleeps until its reservation is covered. Later
//! callers queue behind earlier reservations, so grants follow arrival order.
//! Each host has its own async lock; waiting on one host never blocks another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::RateLimitConfig;
use crate::telemetry::Telemetry;

/// Waits shorter than this are not reported.
const REPORT_THRESHOLD: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    rate_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Full bucket holding `rate` tokens, refilled at `rate` per second.
    fn new(rate: u32) -> Self {
        let rate = f64::from(rate.max(1));
        Self {
            capacity: rate,
            rate_per_sec: rate,
            tokens: rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token and return how long the caller must wait for it.
    fn reserve(&mut self, now: Instant) -> Duration {
        self.refill(now);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate_per_sec)
        }
    }
}

#[derive(Debug)]
struct HostState {
    bucket: TokenBucket,
    last_request: Option<Instant>,
}

type HostSlot = Arc<tokio::sync::Mutex<HostState>>;

/// Global and per-host rate limiter.
pub struct RateLimiter {
    polite_delay: Duration,
    per_host_rate: u32,
    global: Mutex<TokenBucket>,
    hosts: Mutex<HashMap<String, HostSlot>>,
    telemetry: Arc<dyn Telemetry>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            polite_delay: config.polite_delay(),
            per_host_rate: config.per_host_requests_per_second,
            global: Mutex::new(TokenBucket::new(config.requests_per_second)),
            hosts: Mutex::new(HashMap::new()),
            telemetry,
        }
    }

    fn host_slot(&self, host: &str) -> HostSlot {
        let mut hosts = self
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rate = self.per_host_rate;
        Arc::clone(hosts.entry(host.to_string()).or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(HostState {
                bucket: TokenBucket::new(rate),
                last_request: None,
            }))
        }))
    }

    fn reserve_global(&self) -> Duration {
        self.global
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reserve(Instant::now())
    }

    async fn wait(&self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return Duration::ZERO;
        }
        let start = Instant::now();
        tokio::time::sleep(delay).await;
        let waited = start.elapsed();
        if waited >= REPORT_THRESHOLD {
            self.telemetry.rate_limit_wait(waited);
        }
        waited
    }

    /// Suspend until one request to `host` is permitted.
    ///
    /// Returns the total time spent waiting.
    pub async fn acquire(&self, host: &str) -> Duration {
        let slot = self.host_slot(host);
        let mut state = slot.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(last) = state.last_request {
            let since = last.elapsed();
            if since < self.polite_delay {
                waited += self.wait(self.polite_delay - since).await;
            }
        }

        let global_delay = self.reserve_global();
        waited += self.wait(global_delay).await;

        let host_delay = state.bucket.reserve(Instant::now());
        waited += self.wait(host_delay).await;

        state.last_request = Some(Instant::now());
        if !waited.is_zero() {
            log::debug!("Rate limiter held request to {} for {:?}", host, waited);
        }
        waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{MemoryTelemetry, NoopTelemetry};

    fn config(rps: u32, polite_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: rps,
            per_host_requests_per_second: rps,
            polite_delay_ms: polite_ms,
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_capacity_is_immediate() {
        let limiter = RateLimiter::new(&config(3, 0), Arc::new(NoopTelemetry));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire("example.com").await;
        }
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_rate_bounds_throughput() {
        let limiter = RateLimiter::new(&config(2, 0), Arc::new(NoopTelemetry));
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire("example.com").await;
        }
        // Two tokens up front, then one every 500ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(990), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1_100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_polite_delay_applies_per_host() {
        let telemetry = Arc::new(MemoryTelemetry::new());
        let limiter = RateLimiter::new(&config(1_000, 200), telemetry.clone());

        let start = Instant::now();
        limiter.acquire("a.example.com").await;
        limiter.acquire("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(200));

        let waited = limiter.acquire("a.example.com").await;
        assert!(waited >= Duration::from_millis(190), "{waited:?}");
        assert!(telemetry.snapshot().rate_limit_wait_ms >= 190);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_bucket_is_shared_across_hosts() {
        let limiter = RateLimiter::new(
            &RateLimitConfig {
                requests_per_second: 1,
                per_host_requests_per_second: 100,
                polite_delay_ms: 0,
                ..RateLimitConfig::default()
            },
            Arc::new(NoopTelemetry),
        );

        let start = Instant::now();
        limiter.acquire("a.example.com").await;
        limiter.acquire("b.example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[test]
    fn test_bucket_reservations_queue() {
        let mut bucket = TokenBucket::new(1);
        let now = bucket.last_refill;
        assert_eq!(bucket.reserve(now), Duration::ZERO);
        assert_eq!(bucket.reserve(now), Duration::from_secs(1));
        assert_eq!(bucket.reserve(now), Duration::from_secs(2));
    }
}
