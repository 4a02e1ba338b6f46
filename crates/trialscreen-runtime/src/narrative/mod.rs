//! Narratives: the explanation text for a decision.
//!
//! Model output is untrusted. It is parsed into a [`Narrative`] and then
//! checked against the decision by [`NarrativeValidator`]. A narrative that
//! fails either step is discarded; it is never repaired.

mod validator;

pub use validator::NarrativeValidator;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trialscreen_core::{EligibilityDecision, EligibilityStatus, PatientField};

lazy_static! {
    /// First `{` through last `}`, across lines.
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

const SAFETY_NOTE: &str =
    "Screening support only. Eligibility must be confirmed by the study team.";

/// Errors from parsing or validating a narrative.
#[derive(Error, Debug)]
pub enum NarrativeError {
    #[error("No JSON object in model response")]
    NoJson,

    #[error("Invalid narrative JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unrecognized final_status: {0}")]
    UnknownStatus(String),

    #[error("Narrative status {found} contradicts decision status {expected}")]
    StatusMismatch {
        expected: EligibilityStatus,
        found: EligibilityStatus,
    },

    #[error("Narrative lists {criterion_id} as violated, but it did not fail")]
    UnfailedViolation { criterion_id: String },

    #[error("Narrative lists {criterion_id} as matched, but it failed")]
    FailedMatch { criterion_id: String },

    #[error("Decision is Uncertain but the narrative lists no missing information")]
    MissingInformationOmitted,

    #[error("Narrative disagrees with the rule-based decision: {0}")]
    Disagreement(String),

    #[error("Narrative summary is empty")]
    EmptySummary,
}

/// Who produced a narrative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    #[default]
    Llm,
    RuleBased,
}

/// The model's self-check against the rule-based result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    pub rule_based_status: String,

    #[serde(alias = "llm_agrees")]
    pub agrees: bool,

    #[serde(default)]
    pub notes: String,
}

/// A structured explanation of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub final_status: EligibilityStatus,

    pub summary: String,

    /// Criterion ids that passed
    pub criteria_matched: Vec<String>,

    /// Criterion ids that failed
    pub criteria_violated: Vec<String>,

    pub missing_information: Vec<String>,

    pub recommended_next_questions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_check: Option<ConsistencyCheck>,

    pub safety_note: String,

    #[serde(default)]
    pub source: NarrativeSource,
}

/// Shape of the model's JSON. The status is a free string until checked.
#[derive(Deserialize)]
struct RawNarrative {
    final_status: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    criteria_matched: Vec<String>,
    #[serde(default)]
    criteria_violated: Vec<String>,
    #[serde(default)]
    missing_information: Vec<String>,
    #[serde(default)]
    recommended_next_questions: Vec<String>,
    #[serde(default, alias = "consistency_check_with_rule_based")]
    consistency_check: Option<ConsistencyCheck>,
    #[serde(default)]
    safety_note: String,
}

/// Extract the JSON object from a model response.
///
/// Tolerates prose or markdown fences around the object.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    JSON_OBJECT.find(trimmed).map(|m| m.as_str())
}

impl Narrative {
    /// Parse a model response into a narrative.
    pub fn parse(text: &str) -> Result<Self, NarrativeError> {
        let json = extract_json(text).ok_or(NarrativeError::NoJson)?;
        let raw: RawNarrative = serde_json::from_str(json)?;

        let final_status = EligibilityStatus::from_label(&raw.final_status)
            .ok_or_else(|| NarrativeError::UnknownStatus(raw.final_status.clone()))?;

        Ok(Narrative {
            final_status,
            summary: raw.summary,
            criteria_matched: raw.criteria_matched,
            criteria_violated: raw.criteria_violated,
            missing_information: raw.missing_information,
            recommended_next_questions: raw.recommended_next_questions,
            consistency_check: raw.consistency_check,
            safety_note: if raw.safety_note.trim().is_empty() {
                SAFETY_NOTE.to_string()
            } else {
                raw.safety_note
            },
            source: NarrativeSource::Llm,
        })
    }

    /// Build a narrative from the decision alone.
    ///
    /// Always consistent with the decision by construction.
    pub fn from_decision(decision: &EligibilityDecision) -> Self {
        let ids = |ids: Vec<&str>| ids.into_iter().map(str::to_string).collect::<Vec<_>>();

        Narrative {
            final_status: decision.status,
            summary: decision.summary.clone(),
            criteria_matched: ids(decision.passed_ids()),
            criteria_violated: ids(decision.failed_ids()),
            missing_information: decision
                .missing_fields
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
            recommended_next_questions: decision
                .missing_fields
                .iter()
                .map(|f| question_for(*f))
                .collect(),
            consistency_check: Some(ConsistencyCheck {
                rule_based_status: decision.status.label().to_string(),
                agrees: true,
                notes: "Generated from the rule-based decision.".to_string(),
            }),
            safety_note: SAFETY_NOTE.to_string(),
            source: NarrativeSource::RuleBased,
        }
    }
}

fn question_for(field: PatientField) -> String {
    match field {
        PatientField::AgeYears => "What is the patient's age?".to_string(),
        PatientField::Diagnoses => "Which diagnoses are on record for the patient?".to_string(),
        PatientField::Hba1cPercent => "What is the patient's most recent HbA1c?".to_string(),
        PatientField::Medications => "Which medications is the patient currently taking?".to_string(),
        PatientField::Pregnant => "Is the patient pregnant?".to_string(),
        PatientField::RecentMiOrStrokeMonths => {
            "Has the patient had a myocardial infarction or stroke, and how long ago?".to_string()
        }
        other => format!(
            "Can you provide the patient's {}?",
            other.as_str().replace('_', " ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialscreen_core::{evaluate, Criterion, CriterionKind, Patient, TrialCriteria};

    const MODEL_REPLY: &str = r#"{
        "final_status": "Not eligible",
        "summary": "HbA1c is below the required range.",
        "criteria_matched": ["I1"],
        "criteria_violated": ["I3"],
        "missing_information": [],
        "recommended_next_questions": [],
        "consistency_check_with_rule_based": {
            "rule_based_status": "Not eligible",
            "llm_agrees": true,
            "notes": "Consistent."
        },
        "safety_note": "Confirm with the study team."
    }"#;

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let text = format!("Here you go:\n```json\n{}\n```\nThanks.", MODEL_REPLY);
        let json = extract_json(&text).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_extract_json_none_without_braces() {
        assert_eq!(extract_json("I cannot help with that."), None);
    }

    #[test]
    fn test_parse_model_reply() {
        let narrative = Narrative::parse(MODEL_REPLY).unwrap();
        assert_eq!(narrative.final_status, EligibilityStatus::NotEligible);
        assert_eq!(narrative.criteria_violated, vec!["I3"]);
        assert_eq!(narrative.source, NarrativeSource::Llm);
        assert!(narrative.consistency_check.unwrap().agrees);
    }

    #[test]
    fn test_parse_tolerates_status_spelling() {
        let narrative =
            Narrative::parse(r#"{"final_status": "NOT_ELIGIBLE", "summary": "x"}"#).unwrap();
        assert_eq!(narrative.final_status, EligibilityStatus::NotEligible);
        assert!(!narrative.safety_note.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_status() {
        let result = Narrative::parse(r#"{"final_status": "Probably", "summary": "x"}"#);
        assert!(matches!(result, Err(NarrativeError::UnknownStatus(s)) if s == "Probably"));
    }

    #[test]
    fn test_parse_rejects_broken_json() {
        let result = Narrative::parse(r#"{"final_status": "Eligible", "#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_decision_mirrors_decision() {
        let trial = TrialCriteria::new(
            "T1",
            "Trial",
            vec![
                Criterion::new("I1", CriterionKind::min_age(18)),
                Criterion::new("E1", CriterionKind::PregnancyExclusion),
            ],
        )
        .unwrap();
        let mut patient = Patient::new("P1");
        patient.age_years = Some(40);
        let decision = evaluate(&patient, &trial);

        let narrative = Narrative::from_decision(&decision);
        assert_eq!(narrative.final_status, EligibilityStatus::Uncertain);
        assert_eq!(narrative.criteria_matched, vec!["I1"]);
        assert_eq!(narrative.missing_information, vec!["pregnant"]);
        assert_eq!(narrative.recommended_next_questions, vec!["Is the patient pregnant?"]);
        assert_eq!(narrative.source, NarrativeSource::RuleBased);
        assert!(NarrativeValidator::new(&decision).validate(&narrative).is_ok());
    }
}
