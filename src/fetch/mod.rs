//! Resilient fetch layer.
//!
//! - `RateLimiter`: global and per-host token buckets plus polite delay
//! - `CircuitBreaker`: fail fast after consecutive failures
//! - `BackoffPolicy`: jittered exponential retry delays
//! - `ResilientFetcher`: composes the above around an `HttpTransport`

pub mod backoff;
pub mod circuit_breaker;
pub mod fetcher;
pub mod rate_limiter;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use fetcher::ResilientFetcher;
pub use rate_limiter::RateLimiter;
pub use transport::{HttpTransport, ReqwestTransport, TransportResponse, create_async_client};
