//! Narrative validation keeps explanations consistent with the decision.
//!
//! The model produces TEXT, not VERDICTS.
//! If the text contradicts the decision we discard it. We never
//! "best-effort fix" a narrative.

use std::collections::HashSet;
use trialscreen_core::{EligibilityDecision, EligibilityStatus};

use super::{Narrative, NarrativeError};

/// Checks a narrative against the decision it claims to explain.
///
/// # Validation Steps
/// 1. `final_status` equals the decision status
/// 2. Every violated criterion id actually failed
/// 3. No matched criterion id failed
/// 4. An Uncertain decision lists missing information
/// 5. The model's own consistency check does not disagree
/// 6. The summary is not empty
///
/// # On Failure
/// Caller MUST degrade per its fallback strategy.
pub struct NarrativeValidator<'a> {
    decision: &'a EligibilityDecision,
    failed: HashSet<&'a str>,
}

impl<'a> NarrativeValidator<'a> {
    pub fn new(decision: &'a EligibilityDecision) -> Self {
        Self {
            decision,
            failed: decision.failed_ids().into_iter().collect(),
        }
    }

    /// Run every check, stopping at the first violation.
    pub fn validate(&self, narrative: &Narrative) -> Result<(), NarrativeError> {
        self.validate_status(narrative)?;
        self.validate_violations(narrative)?;
        self.validate_matches(narrative)?;
        self.validate_missing_information(narrative)?;
        self.validate_consistency_check(narrative)?;

        if narrative.summary.trim().is_empty() {
            return Err(NarrativeError::EmptySummary);
        }

        Ok(())
    }

    fn validate_status(&self, narrative: &Narrative) -> Result<(), NarrativeError> {
        if narrative.final_status != self.decision.status {
            return Err(NarrativeError::StatusMismatch {
                expected: self.decision.status,
                found: narrative.final_status,
            });
        }
        Ok(())
    }

    fn validate_violations(&self, narrative: &Narrative) -> Result<(), NarrativeError> {
        match narrative
            .criteria_violated
            .iter()
            .find(|id| !self.failed.contains(id.trim()))
        {
            Some(id) => Err(NarrativeError::UnfailedViolation {
                criterion_id: id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn validate_matches(&self, narrative: &Narrative) -> Result<(), NarrativeError> {
        match narrative
            .criteria_matched
            .iter()
            .find(|id| self.failed.contains(id.trim()))
        {
            Some(id) => Err(NarrativeError::FailedMatch {
                criterion_id: id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn validate_missing_information(&self, narrative: &Narrative) -> Result<(), NarrativeError> {
        let lists_missing = narrative
            .missing_information
            .iter()
            .any(|m| !m.trim().is_empty());

        if self.decision.status == EligibilityStatus::Uncertain && !lists_missing {
            return Err(NarrativeError::MissingInformationOmitted);
        }
        Ok(())
    }

    fn validate_consistency_check(&self, narrative: &Narrative) -> Result<(), NarrativeError> {
        match &narrative.consistency_check {
            Some(check) if !check.agrees => {
                let notes = if check.notes.trim().is_empty() {
                    "no reason given".to_string()
                } else {
                    check.notes.clone()
                };
                Err(NarrativeError::Disagreement(notes))
            }
            _ => Ok(()),
        }
    }
}


#[cfg(test)]
mod properties {
    use super::*;
    use crate::narrative::extract_json;
    use proptest::prelude::*;
    use trialscreen_core::{evaluate, Criterion, CriterionKind, Patient, TrialCriteria};

    fn trial() -> TrialCriteria {
        TrialCriteria::new(
            "T1",
            "Trial",
            vec![
                Criterion::new("I1", CriterionKind::min_age(18)),
                Criterion::new("I2", CriterionKind::hba1c_range(7.0, 10.5)),
                Criterion::new("I3", CriterionKind::required_medications(&["metformin"], Default::default())),
                Criterion::new("E1", CriterionKind::PregnancyExclusion),
            ],
        )
        .unwrap()
    }

    fn arb_patient() -> impl Strategy<Value = Patient> {
        (
            proptest::option::of(0u32..100),
            proptest::option::of(4.0f64..14.0),
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<bool>()),
        )
            .prop_map(|(age, hba1c, on_metformin, pregnant)| {
                let mut patient = Patient::new("P1");
                patient.age_years = age;
                patient.hba1c_percent = hba1c;
                patient.medications = on_metformin.map(|on| {
                    if on {
                        vec!["metformin".to_string()]
                    } else {
                        vec![]
                    }
                });
                patient.pregnant = pregnant;
                patient
            })
    }

    proptest! {
        #[test]
        fn rule_based_narrative_always_validates(patient in arb_patient()) {
            let decision = evaluate(&patient, &trial());
            let narrative = Narrative::from_decision(&decision);
            prop_assert!(NarrativeValidator::new(&decision).validate(&narrative).is_ok());
        }

        #[test]
        fn json_survives_surrounding_prose(prefix in "[a-zA-Z .:]{0,40}", suffix in "[a-zA-Z .]{0,40}") {
            let body = r#"{"final_status": "Eligible"}"#;
            let text = format!("{}{}{}", prefix, body, suffix);
            prop_assert_eq!(extract_json(&text), Some(body));
        }
    }
}
