//! Explanation service: narrates decisions without touching them.
//!
//! The service implements:
//! - Per-attempt timeout and retry with exponential backoff
//! - Circuit breaker per provider
//! - Narrative validation against the decision
//! - Caching of validated narratives
//! - Degradation to "unavailable" or a rule-based narrative
//!
//! Every path returns an [`ExplanationOutcome`]. Nothing here can fail the
//! caller or change an [`EligibilityDecision`].

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use trialscreen_core::{evaluate, EligibilityDecision, Patient, TrialCriteria};

use crate::cache::{CacheKey, ExplanationCache};
use crate::config::ExplanationConfig;
use crate::narrative::{Narrative, NarrativeValidator};
use crate::prompts::{build_messages, ExplanationRequest};
use crate::providers::{ChatMessage, CompletionResponse, LlmProvider, ProviderError, TokenUsage};
use crate::resilience::{CircuitBreaker, FallbackStrategy};
use crate::RuntimeError;

/// Provider name recorded on rule-based narratives.
const RULE_BASED_PROVIDER: &str = "rule_based";

/// A narrative with where and when it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub narrative: Narrative,

    pub provider: String,

    pub model: String,

    pub generated_at: DateTime<Utc>,

    /// Tokens spent on this narrative; estimated when the provider does not report them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Served from the cache
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,

    /// Why the model narrative was replaced by a rule-based one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Result of asking for an explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExplanationOutcome {
    Narrated(Explanation),

    Unavailable { reason: String },
}

impl ExplanationOutcome {
    pub fn narrative(&self) -> Option<&Narrative> {
        match self {
            ExplanationOutcome::Narrated(explanation) => Some(&explanation.narrative),
            ExplanationOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ExplanationOutcome::Narrated(_))
    }
}

/// A decision paired with its explanation, for presentation.
///
/// The decision is displayable on its own when the explanation is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningReport {
    pub decision: EligibilityDecision,

    pub explanation: ExplanationOutcome,
}

impl ScreeningReport {
    /// A report narrated from the decision alone, without any model call.
    pub fn rule_based(decision: EligibilityDecision) -> Self {
        let explanation = ExplanationOutcome::Narrated(Explanation {
            narrative: Narrative::from_decision(&decision),
            provider: RULE_BASED_PROVIDER.to_string(),
            model: RULE_BASED_PROVIDER.to_string(),
            generated_at: Utc::now(),
            usage: None,
            cached: false,
            fallback_reason: None,
        });
        Self {
            decision,
            explanation,
        }
    }
}

/// The explanation service narrates decisions with an LLM provider.
///
/// # Architecture
/// - The decision is computed first, by `trialscreen-core`, and is input only
/// - Resilience: circuit breaker, retry, timeout per call
/// - Validation: narratives that contradict the decision are discarded
/// - Fallback: per [`FallbackStrategy`]
pub struct ExplanationService {
    provider: Arc<dyn LlmProvider>,

    config: ExplanationConfig,

    circuit_breaker: CircuitBreaker,

    cache: Option<ExplanationCache>,
}

impl ExplanationService {
    /// Create a new explanation service.
    pub fn new(provider: Arc<dyn LlmProvider>, config: ExplanationConfig) -> Self {
        let circuit_breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        let cache = config
            .cache
            .enabled
            .then(|| ExplanationCache::new(config.cache.max_entries, config.cache.ttl));

        Self {
            provider,
            config,
            circuit_breaker,
            cache,
        }
    }

    pub fn builder() -> ExplanationServiceBuilder {
        ExplanationServiceBuilder::new()
    }

    pub fn config(&self) -> &ExplanationConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Explain one decision.
    ///
    /// # Execution Flow
    /// 1. Cache lookup, re-validated against this decision
    /// 2. Circuit breaker check
    /// 3. Provider call with timeout and retry
    /// 4. Parse and validate the narrative
    /// 5. Cache the validated narrative
    ///
    /// Any failure degrades per the configured fallback strategy.
    pub async fn explain(&self, request: &ExplanationRequest) -> ExplanationOutcome {
        let provider = self.provider.name().to_string();
        let key = self
            .cache
            .as_ref()
            .and_then(|_| CacheKey::new(request, &self.config.model));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(narrative) = cache.get(key).await {
                match NarrativeValidator::new(&request.decision).validate(&narrative) {
                    Ok(()) => {
                        tracing::debug!(
                            trial_id = %request.decision.trial_id,
                            patient_id = %request.decision.patient_id,
                            "Explanation cache hit"
                        );
                        let model = self.config.model.clone();
                        return ExplanationOutcome::Narrated(
                            self.explanation(narrative, model, None, true),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            trial_id = %request.decision.trial_id,
                            patient_id = %request.decision.patient_id,
                            error = %e,
                            "Cached narrative does not match decision, discarding"
                        );
                        cache.invalidate(key).await;
                    }
                }
            }
        }

        if self.circuit_breaker.is_open(&provider) {
            return self.degrade(request, format!("circuit open for provider {}", provider));
        }

        let messages = match build_messages(request) {
            Ok(messages) => messages,
            Err(e) => return self.degrade(request, format!("failed to build prompt: {}", e)),
        };

        let prompt_tokens: u32 = messages
            .iter()
            .map(|m| self.provider.estimate_tokens(&m.content))
            .sum();

        let response = match self.complete_with_retry(messages).await {
            Ok(response) => {
                self.circuit_breaker.record_success(&provider);
                response
            }
            Err(e) => {
                self.circuit_breaker.record_failure(&provider);
                return self.degrade(request, e.to_string());
            }
        };

        let usage = if response.usage.total() == 0 {
            TokenUsage {
                prompt_tokens,
                completion_tokens: self.provider.estimate_tokens(&response.content),
            }
        } else {
            response.usage
        };
        tracing::debug!(
            provider = %provider,
            model = %response.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            stop_reason = ?response.stop_reason,
            "Explanation completed"
        );

        let narrative = match Narrative::parse(&response.content) {
            Ok(narrative) => narrative,
            Err(e) => return self.degrade(request, e.to_string()),
        };

        if let Err(e) = NarrativeValidator::new(&request.decision).validate(&narrative) {
            return self.degrade(request, e.to_string());
        }

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, narrative.clone()).await;
        }

        ExplanationOutcome::Narrated(self.explanation(narrative, response.model, Some(usage), false))
    }

    /// Explain many decisions concurrently, preserving input order.
    pub async fn explain_batch(&self, requests: &[ExplanationRequest]) -> Vec<ExplanationOutcome> {
        join_all(requests.iter().map(|request| self.explain(request))).await
    }

    /// Pair a decision with its explanation.
    pub async fn report(&self, request: &ExplanationRequest) -> ScreeningReport {
        ScreeningReport {
            decision: request.decision.clone(),
            explanation: self.explain(request).await,
        }
    }

    /// Evaluate a patient, then explain the decision.
    pub async fn screen(
        &self,
        patient: &Patient,
        trial: &TrialCriteria,
        clinical_note: Option<&str>,
    ) -> ScreeningReport {
        let decision = evaluate(patient, trial);
        let mut request = ExplanationRequest::new(patient.clone(), trial.clone(), decision);
        if let Some(note) = clinical_note {
            request = request.with_note(note);
        }
        self.report(&request).await
    }

    /// One provider call per attempt, each under the configured timeout.
    async fn complete_with_retry(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<CompletionResponse, ProviderError> {
        let provider = self.provider.as_ref();
        let completion = &self.config.completion_config();
        let messages = &messages;
        let timeout = self.config.timeout;

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.retry_min_delay)
            .with_max_times(self.config.max_retries);

        (|| async move {
            match tokio::time::timeout(timeout, provider.complete(messages.clone(), completion)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            }
        })
        .retry(backoff)
        .when(ProviderError::is_transient)
        .notify(|e: &ProviderError, delay: Duration| {
            tracing::warn!(
                provider = provider.name(),
                error = %e,
                retry_in = ?delay,
                "Explanation attempt failed, retrying"
            );
        })
        .await
    }

    fn explanation(
        &self,
        narrative: Narrative,
        model: String,
        usage: Option<TokenUsage>,
        cached: bool,
    ) -> Explanation {
        Explanation {
            narrative,
            provider: self.provider.name().to_string(),
            model,
            generated_at: Utc::now(),
            usage,
            cached,
            fallback_reason: None,
        }
    }

    fn degrade(&self, request: &ExplanationRequest, reason: String) -> ExplanationOutcome {
        tracing::warn!(
            trial_id = %request.decision.trial_id,
            patient_id = %request.decision.patient_id,
            provider = self.provider.name(),
            fallback = ?self.config.fallback,
            reason = %reason,
            "Explanation unavailable, degrading"
        );

        match self.config.fallback {
            FallbackStrategy::Unavailable => ExplanationOutcome::Unavailable { reason },
            FallbackStrategy::RuleBased => ExplanationOutcome::Narrated(Explanation {
                narrative: Narrative::from_decision(&request.decision),
                provider: RULE_BASED_PROVIDER.to_string(),
                model: RULE_BASED_PROVIDER.to_string(),
                generated_at: Utc::now(),
                usage: None,
                cached: false,
                fallback_reason: Some(reason),
            }),
        }
    }
}

/// Builder for ExplanationService.
pub struct ExplanationServiceBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    config: ExplanationConfig,
}

impl ExplanationServiceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            provider: None,
            config: ExplanationConfig::default(),
        }
    }

    /// Set the LLM provider.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: ExplanationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the fallback strategy.
    pub fn fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.config.fallback = fallback;
        self
    }

    /// Build the service.
    pub fn build(self) -> Result<ExplanationService, RuntimeError> {
        let provider = self
            .provider
            .ok_or_else(|| RuntimeError::ProviderNotConfigured("No provider set".to_string()))?;

        self.config.validate()?;

        Ok(ExplanationService::new(provider, self.config))
    }
}

impl Default for ExplanationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::NarrativeSource;
    use crate::providers::testing::ScriptedProvider;
    use crate::resilience::CircuitBreakerConfig;
    use trialscreen_core::{Criterion, CriterionKind, Diagnosis, EligibilityStatus};

    const ELIGIBLE_REPLY: &str = r#"```json
{
  "final_status": "Eligible",
  "summary": "The patient meets every listed criterion.",
  "criteria_matched": ["I1", "I2", "I3", "E1"],
  "criteria_violated": [],
  "missing_information": [],
  "recommended_next_questions": [],
  "safety_note": "Confirm with the study team."
}
```"#;

    const CONTRADICTING_REPLY: &str = r#"{
  "final_status": "Not eligible",
  "summary": "HbA1c looks too high.",
  "criteria_violated": ["I3"]
}"#;

    fn trial() -> TrialCriteria {
        TrialCriteria::new(
            "T2D-001",
            "GLP-1 add-on",
            vec![
                Criterion::new("I1", CriterionKind::min_age(18)),
                Criterion::new("I2", CriterionKind::required_diagnosis(Diagnosis::Type2Diabetes)),
                Criterion::new("I3", CriterionKind::hba1c_range(7.0, 10.0)),
                Criterion::new("E1", CriterionKind::PregnancyExclusion),
            ],
        )
        .unwrap()
    }

    fn patient(id: &str) -> Patient {
        let mut patient = Patient::new(id);
        patient.age_years = Some(45);
        patient.diagnoses = Some(vec![Diagnosis::Type2Diabetes]);
        patient.hba1c_percent = Some(8.2);
        patient.pregnant = Some(false);
        patient
    }

    fn request(id: &str) -> ExplanationRequest {
        let patient = patient(id);
        let decision = evaluate(&patient, &trial());
        ExplanationRequest::new(patient, trial(), decision)
    }

    fn config() -> ExplanationConfig {
        ExplanationConfig {
            retry_min_delay: Duration::from_millis(1),
            ..ExplanationConfig::new("test-model")
        }
    }

    fn service(provider: Arc<ScriptedProvider>, config: ExplanationConfig) -> ExplanationService {
        ExplanationService::builder()
            .provider(provider)
            .config(config)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_narrative_is_returned() {
        let provider = Arc::new(ScriptedProvider::replying("mock", ELIGIBLE_REPLY));
        let service = service(provider.clone(), config());

        let report = service.report(&request("P1")).await;

        assert_eq!(report.decision.status, EligibilityStatus::Eligible);
        match &report.explanation {
            ExplanationOutcome::Narrated(explanation) => {
                assert_eq!(explanation.narrative.source, NarrativeSource::Llm);
                assert_eq!(explanation.provider, "mock");
                assert_eq!(explanation.model, "test-model");
                assert!(!explanation.cached);
                // The scripted provider reports no usage, so it is estimated
                let usage = explanation.usage.unwrap();
                assert!(usage.prompt_tokens > 0);
                assert!(usage.completion_tokens > 0);
            }
            other => panic!("expected narration, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reported_usage_is_kept() {
        let usage = TokenUsage {
            prompt_tokens: 812,
            completion_tokens: 96,
        };
        let provider = Arc::new(ScriptedProvider::replying("mock", ELIGIBLE_REPLY).with_usage(usage));
        let service = service(provider, config());

        match service.explain(&request("P1")).await {
            ExplanationOutcome::Narrated(explanation) => assert_eq!(explanation.usage, Some(usage)),
            other => panic!("expected narration, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_contradicting_narrative_is_unavailable() {
        let provider = Arc::new(ScriptedProvider::replying("mock", CONTRADICTING_REPLY));
        let service = service(provider, config());
        let req = request("P1");

        let report = service.report(&req).await;

        match &report.explanation {
            ExplanationOutcome::Unavailable { reason } => assert!(reason.contains("contradicts")),
            other => panic!("expected unavailable, got {:?}", other),
        }
        // The decision is untouched
        assert_eq!(report.decision, req.decision);
    }

    #[tokio::test]
    async fn test_rule_based_fallback_mirrors_decision() {
        let provider = Arc::new(ScriptedProvider::replying("mock", CONTRADICTING_REPLY));
        let service = service(
            provider,
            ExplanationConfig {
                fallback: FallbackStrategy::RuleBased,
                ..config()
            },
        );

        let outcome = service.explain(&request("P1")).await;

        match outcome {
            ExplanationOutcome::Narrated(explanation) => {
                assert_eq!(explanation.narrative.source, NarrativeSource::RuleBased);
                assert_eq!(explanation.narrative.final_status, EligibilityStatus::Eligible);
                assert_eq!(explanation.provider, "rule_based");
                assert!(explanation.fallback_reason.is_some());
            }
            other => panic!("expected rule-based narration, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(
            ScriptedProvider::replying("mock", ELIGIBLE_REPLY)
                .then(Err(ProviderError::HttpError("connection reset".to_string())))
                .then(Err(ProviderError::RateLimited { retry_after: None })),
        );
        let service = service(provider.clone(), config());

        let outcome = service.explain(&request("P1")).await;

        assert!(outcome.is_available());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let provider = Arc::new(
            ScriptedProvider::replying("mock", ELIGIBLE_REPLY).then(Err(ProviderError::AuthError)),
        );
        let service = service(provider.clone(), config());

        let outcome = service.explain(&request("P1")).await;

        assert!(matches!(outcome, ExplanationOutcome::Unavailable { .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let provider = Arc::new(
            ScriptedProvider::replying("mock", ELIGIBLE_REPLY).with_delay(Duration::from_secs(60)),
        );
        let service = service(
            provider,
            ExplanationConfig {
                timeout: Duration::from_secs(1),
                max_retries: 0,
                ..config()
            },
        );

        let outcome = service.explain(&request("P1")).await;

        match outcome {
            ExplanationOutcome::Unavailable { reason } => assert!(reason.contains("Timeout")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_circuit_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new("flaky"));
        let service = service(
            provider.clone(),
            ExplanationConfig {
                max_retries: 0,
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: 1,
                    ..Default::default()
                },
                ..config()
            },
        );

        let first = service.explain(&request("P1")).await;
        assert!(!first.is_available());
        assert!(service.circuit_breaker().is_open("flaky"));

        let second = service.explain(&request("P2")).await;
        match second {
            ExplanationOutcome::Unavailable { reason } => assert!(reason.contains("circuit open")),
            other => panic!("expected open circuit, got {:?}", other),
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_repeated_request_served_from_cache() {
        let provider = Arc::new(ScriptedProvider::replying("mock", ELIGIBLE_REPLY));
        let service = service(provider.clone(), config());
        let req = request("P1");

        let first = service.explain(&req).await;
        let second = service.explain(&req).await;

        assert!(first.is_available());
        match second {
            ExplanationOutcome::Narrated(explanation) => assert!(explanation.cached),
            other => panic!("expected cached narration, got {:?}", other),
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_narrative_for_other_decision_is_discarded() {
        let provider = Arc::new(ScriptedProvider::replying("mock", ELIGIBLE_REPLY));
        let service = service(provider.clone(), config());
        let req = request("P1");

        // A colliding entry written for a Not eligible decision
        let mut stale = Narrative::from_decision(&req.decision);
        stale.final_status = EligibilityStatus::NotEligible;
        let key = CacheKey::new(&req, &service.config().model).unwrap();
        let cache = service.cache.as_ref().unwrap();
        cache.insert(key.clone(), stale).await;

        let outcome = service.explain(&req).await;

        match outcome {
            ExplanationOutcome::Narrated(explanation) => {
                assert!(!explanation.cached);
                assert_eq!(explanation.narrative.final_status, EligibilityStatus::Eligible);
            }
            other => panic!("expected fresh narration, got {:?}", other),
        }
        assert_eq!(provider.calls(), 1);
        // The fresh, validated narrative replaced the stale entry
        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached.final_status, EligibilityStatus::Eligible);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = Arc::new(ScriptedProvider::replying("mock", ELIGIBLE_REPLY));
        let service = service(provider, config());
        let requests = vec![request("P1"), request("P2"), request("P3")];

        let outcomes = service.explain_batch(&requests).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(ExplanationOutcome::is_available));
    }

    #[tokio::test]
    async fn test_screen_evaluates_before_explaining() {
        let provider = Arc::new(ScriptedProvider::replying("mock", ELIGIBLE_REPLY));
        let service = service(provider, config());
        let mut p = patient("P9");
        p.hba1c_percent = Some(6.0);

        let report = service.screen(&p, &trial(), Some("Recent labs attached")).await;

        // The model says Eligible; the decision does not move
        assert_eq!(report.decision.status, EligibilityStatus::NotEligible);
        assert!(!report.explanation.is_available());
    }

    #[test]
    fn test_builder_requires_provider() {
        let result = ExplanationService::builder().build();
        assert!(matches!(result, Err(RuntimeError::ProviderNotConfigured(_))));
    }

    #[test]
    fn test_rule_based_report() {
        let report = ScreeningReport::rule_based(request("P1").decision);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["explanation"]["outcome"], "narrated");
        assert_eq!(json["explanation"]["narrative"]["source"], "rule_based");
    }
}
