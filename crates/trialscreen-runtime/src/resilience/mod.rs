//! Resilience patterns for trialscreen-runtime.
//!
//! This module provides:
//! - Circuit breaker per provider
//! - Fallback strategies
//!
//! Timeouts and retry with backoff are applied by the
//! [`ExplanationService`](crate::ExplanationService) around each call.

mod circuit_breaker;
mod fallback;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::FallbackStrategy;
