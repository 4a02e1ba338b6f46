//! # trialscreen-runtime
//!
//! Optional LLM explanations for TrialScreen decisions.
//!
//! This crate turns an [`EligibilityDecision`](trialscreen_core::EligibilityDecision)
//! into a plain-language narrative using a pluggable [`LlmProvider`].
//!
//! ## Important
//!
//! This crate is OPTIONAL and strictly downstream. The decision is made by
//! `trialscreen-core`, which is fully deterministic and never calls a model.
//! A narrative that contradicts the decision is discarded, and the decision
//! is always displayable without one.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trialscreen_runtime::{ExplanationConfig, ExplanationService, FallbackStrategy};
//!
//! let service = ExplanationService::builder()
//!     .provider(Arc::new(my_provider))
//!     .config(ExplanationConfig::from_file("explain.yaml")?)
//!     .fallback(FallbackStrategy::RuleBased)
//!     .build()?;
//!
//! let report = service.screen(&patient, &trial, None).await;
//! println!("{}", report.decision.summary);
//! if let Some(narrative) = report.explanation.narrative() {
//!     println!("{}", narrative.summary);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod narrative;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod service;

pub use cache::{CacheKey, ExplanationCache};
pub use config::{CacheConfig, ConfigError, ExplanationConfig};
pub use narrative::{
    extract_json, ConsistencyCheck, Narrative, NarrativeError, NarrativeSource, NarrativeValidator,
};
pub use prompts::ExplanationRequest;
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, FallbackStrategy};
pub use service::{
    Explanation, ExplanationOutcome, ExplanationService, ExplanationServiceBuilder,
    ScreeningReport,
};

use thiserror::Error;

/// Errors from setting up the runtime.
///
/// Explaining itself never errors; failures become
/// [`ExplanationOutcome::Unavailable`].
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
