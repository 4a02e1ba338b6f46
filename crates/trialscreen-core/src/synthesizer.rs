//! Synthesizer: aggregates criterion results into a trial-level status.
//!
//! The synthesizer applies strict, non-configurable precedence:
//! 1. If ANY criterion fails → NOT ELIGIBLE
//! 2. Else if ANY criterion is unknown → UNCERTAIN
//! 3. Else → ELIGIBLE
//!
//! A failure is decisive even when other data is missing; more data cannot
//! turn a failed check into a pass.

use std::collections::BTreeSet;

use crate::patient::PatientField;
use crate::types::{CriterionResult, EligibilityDecision, EligibilityStatus, Verdict};

/// The Synthesizer folds per-criterion results into an [`EligibilityDecision`].
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Synthesize criterion results into a decision.
    ///
    /// `results` must be in the trial's criterion order; it is kept as is.
    pub fn synthesize(
        &self,
        trial_id: &str,
        patient_id: &str,
        results: Vec<CriterionResult>,
    ) -> EligibilityDecision {
        let status = self.status_of(&results);
        let missing_fields = self.collect_missing(&results);
        let summary = self.build_summary(status, &results);

        EligibilityDecision {
            trial_id: trial_id.to_string(),
            patient_id: patient_id.to_string(),
            status,
            criterion_results: results,
            missing_fields,
            summary,
        }
    }

    /// Status by precedence: fail > unknown > pass.
    pub fn status_of(&self, results: &[CriterionResult]) -> EligibilityStatus {
        if results.iter().any(|r| r.verdict.is_fail()) {
            EligibilityStatus::NotEligible
        } else if results.iter().any(|r| r.verdict.is_unknown()) {
            EligibilityStatus::Uncertain
        } else {
            EligibilityStatus::Eligible
        }
    }

    /// Union of fields that unknown results were missing, deduplicated.
    fn collect_missing(&self, results: &[CriterionResult]) -> Vec<PatientField> {
        results
            .iter()
            .filter(|r| r.verdict.is_unknown())
            .flat_map(|r| r.missing_fields.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn build_summary(&self, status: EligibilityStatus, results: &[CriterionResult]) -> String {
        let failed = ids_with(results, Verdict::Fail);
        let unknown = ids_with(results, Verdict::Unknown);

        match status {
            EligibilityStatus::NotEligible => {
                let mut summary = format!("Not eligible: failed {}.", failed.join(", "));
                if !unknown.is_empty() {
                    summary.push_str(&format!(
                        " Also could not assess {}.",
                        unknown.join(", ")
                    ));
                }
                summary
            }
            EligibilityStatus::Uncertain => format!(
                "Uncertain: no criterion failed, but {} could not be assessed for missing data.",
                unknown.join(", ")
            ),
            EligibilityStatus::Eligible => format!(
                "Eligible: all {} criteria passed.",
                results.len()
            ),
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

fn ids_with(results: &[CriterionResult], verdict: Verdict) -> Vec<&str> {
    results
        .iter()
        .filter(|r| r.verdict == verdict)
        .map(|r| r.criterion_id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, verdict: Verdict) -> CriterionResult {
        CriterionResult {
            criterion_id: id.to_string(),
            verdict,
            rationale: String::new(),
            missing_fields: vec![],
            evidence: vec![],
        }
    }

    fn unknown(id: &str, field: PatientField) -> CriterionResult {
        CriterionResult {
            missing_fields: vec![field],
            ..result(id, Verdict::Unknown)
        }
    }

    #[test]
    fn test_all_pass_yields_eligible() {
        let synthesizer = Synthesizer::new();
        let decision = synthesizer.synthesize(
            "T1",
            "P1",
            vec![result("I1", Verdict::Pass), result("E1", Verdict::Pass)],
        );

        assert_eq!(decision.status, EligibilityStatus::Eligible);
        assert!(decision.missing_fields.is_empty());
        assert_eq!(decision.summary, "Eligible: all 2 criteria passed.");
    }

    #[test]
    fn test_fail_takes_priority_over_unknown() {
        let synthesizer = Synthesizer::new();
        let decision = synthesizer.synthesize(
            "T1",
            "P1",
            vec![
                unknown("I1", PatientField::AgeYears),
                result("I2", Verdict::Fail),
                result("I3", Verdict::Pass),
            ],
        );

        // NOT ELIGIBLE should take priority
        assert_eq!(decision.status, EligibilityStatus::NotEligible);
        assert!(decision.summary.contains("failed I2"));
        assert!(decision.summary.contains("I1"));
        assert_eq!(decision.missing_fields, vec![PatientField::AgeYears]);
    }

    #[test]
    fn test_unknown_when_no_fail() {
        let synthesizer = Synthesizer::new();
        let decision = synthesizer.synthesize(
            "T1",
            "P1",
            vec![result("I1", Verdict::Pass), unknown("I3", PatientField::Hba1cPercent)],
        );

        assert_eq!(decision.status, EligibilityStatus::Uncertain);
        assert!(decision.summary.contains("I3"));
    }

    #[test]
    fn test_missing_fields_deduplicated_and_ordered() {
        let synthesizer = Synthesizer::new();
        let decision = synthesizer.synthesize(
            "T1",
            "P1",
            vec![
                unknown("I2", PatientField::Hba1cPercent),
                unknown("I1", PatientField::AgeYears),
                unknown("I4", PatientField::AgeYears),
            ],
        );

        assert_eq!(
            decision.missing_fields,
            vec![PatientField::AgeYears, PatientField::Hba1cPercent]
        );
    }

    #[test]
    fn test_results_keep_criterion_order() {
        let synthesizer = Synthesizer::new();
        let decision = synthesizer.synthesize(
            "T1",
            "P1",
            vec![result("E1", Verdict::Pass), result("I1", Verdict::Pass)],
        );

        let ids: Vec<_> = decision
            .criterion_results
            .iter()
            .map(|r| r.criterion_id.as_str())
            .collect();
        assert_eq!(ids, vec!["E1", "I1"]);
    }
}
