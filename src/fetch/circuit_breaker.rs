//! Circuit Breaker pattern implementation.
//!
//! Stops hammering remote servers after a run of consecutive failures.
//!
//! ```text
//! CLOSED --[threshold failures]--> OPEN --[cooldown elapsed]--> HALF_OPEN
//!   ^                               ^                              |
//!   |                               +---------[probe fails]--------+
//!   +------------------------------------------[probe succeeds]----+
//! ```
//!
//! There is no background timer. The OPEN -> HALF_OPEN transition is
//! evaluated lazily whenever the state is read or a request asks for
//! admission, and the transition plus the single-probe grant are decided
//! under the same lock so concurrent callers cannot both become the probe.

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::CircuitBreakerConfig;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// A single probe request is allowed to test recovery.
    HalfOpen,
    /// Requests are rejected immediately.
    Open,
}

impl CircuitState {
    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn gauge_value(&self) -> u64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
            CircuitState::Open => write!(f, "OPEN"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Thread-safe three-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Breaker state stays consistent across a panic elsewhere; keep using it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled_down = inner
            .opened_at
            .is_some_and(|opened| opened.elapsed() >= self.cooldown);
        if cooled_down {
            log::info!("Circuit breaker cooldown elapsed, moving to HALF_OPEN");
            inner.state = CircuitState::HalfOpen;
            inner.probe_in_flight = false;
        }
    }

    /// Current state, performing the lazy OPEN -> HALF_OPEN transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Ask for admission of one request.
    ///
    /// Rejects while OPEN within the cooldown. In HALF_OPEN the first caller
    /// becomes the probe; later callers are rejected until its outcome is
    /// recorded.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful request. Closes the circuit and clears failures.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            log::info!("Circuit breaker closing after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Record a failed request, opening the circuit at the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.probe_in_flight = false;

        if inner.consecutive_failures >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                log::warn!(
                    "Circuit breaker OPEN after {} consecutive failures (cooldown {:?})",
                    inner.consecutive_failures,
                    self.cooldown
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}
