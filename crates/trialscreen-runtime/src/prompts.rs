//! Prompts for the explanation model.
//!
//! The system prompt is static and identical for every request, so
//! providers that support prompt caching can reuse it. Only the user
//! message varies.

use serde::Serialize;
use trialscreen_core::{EligibilityDecision, Patient, TrialCriteria};

use crate::providers::ChatMessage;

/// System prompt establishing the model as a narrator, not a decider.
pub const SYSTEM_PROMPT: &str = r#"
You explain clinical trial eligibility decisions.

A deterministic rule engine has already decided. Its status is final.

Your task:
- Restate the rule-based status exactly as given
- Say which criteria were met, which were violated, and which could not be assessed
- List the missing patient information, if any
- Suggest questions that would resolve the missing information

Constraints:
1. final_status MUST equal the rule-based status
2. criteria_violated may only contain ids the rule engine marked as failed
3. Never guess or infer clinical facts that are not in the patient record
4. If the status is "Uncertain", missing_information MUST NOT be empty
5. Quote thresholds exactly as written in the trial criteria

Return ONLY one JSON object matching the output schema. No markdown, no prose.
"#;

/// Output schema included in every request.
pub const OUTPUT_SCHEMA: &str = r#"{
  "final_status": "Eligible | Not eligible | Uncertain",
  "summary": "string",
  "criteria_matched": ["criterion id"],
  "criteria_violated": ["criterion id"],
  "missing_information": ["patient field"],
  "recommended_next_questions": ["string"],
  "consistency_check": {
    "rule_based_status": "string",
    "agrees": true,
    "notes": "string"
  },
  "safety_note": "string"
}"#;

/// Everything the model sees about one decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplanationRequest {
    pub patient: Patient,

    /// Free-text clinical note, if the data provider has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_note: Option<String>,

    pub trial: TrialCriteria,

    pub decision: EligibilityDecision,
}

impl ExplanationRequest {
    pub fn new(patient: Patient, trial: TrialCriteria, decision: EligibilityDecision) -> Self {
        Self {
            patient,
            clinical_note: None,
            trial,
            decision,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.clinical_note = Some(note.into());
        self
    }
}

#[derive(Serialize)]
struct UserPayload<'a> {
    patient_structured: &'a Patient,
    #[serde(skip_serializing_if = "Option::is_none")]
    patient_note_unstructured: Option<&'a str>,
    trial: &'a TrialCriteria,
    rule_based_result: &'a EligibilityDecision,
}

/// Build the user prompt for a request.
pub fn build_user_prompt(request: &ExplanationRequest) -> Result<String, serde_json::Error> {
    let payload = UserPayload {
        patient_structured: &request.patient,
        patient_note_unstructured: request.clinical_note.as_deref(),
        trial: &request.trial,
        rule_based_result: &request.decision,
    };

    Ok(format!(
        "INPUT:\n{}\n\nOUTPUT SCHEMA:\n{}\n\nReturn ONLY JSON.",
        serde_json::to_string_pretty(&payload)?,
        OUTPUT_SCHEMA
    ))
}

/// Build the full message list for a request.
pub fn build_messages(request: &ExplanationRequest) -> Result<Vec<ChatMessage>, serde_json::Error> {
    Ok(vec![
        ChatMessage::system(SYSTEM_PROMPT.trim()),
        ChatMessage::user(build_user_prompt(request)?),
    ])
}
