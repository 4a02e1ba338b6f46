//! Fallback strategies when an explanation cannot be produced.

use serde::{Deserialize, Serialize};

/// What to return when the provider fails, times out, is circuit-broken,
/// or produces a narrative that contradicts the decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Report that no explanation is available
    #[default]
    Unavailable,

    /// Build a narrative from the decision itself, marked as rule-based
    RuleBased,
}
