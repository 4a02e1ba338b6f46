//! Text rendering for CLI output.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Write;
use trialscreen_core::{
    EligibilityDecision, RankedTrial, StatusCounts, TrialCriteria, Verdict,
};
use trialscreen_runtime::Narrative;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml,
}

/// Serialize a value for the machine-readable formats.
///
/// Returns `None` for [`Format::Text`]; callers render text themselves.
pub fn structured<T: Serialize>(value: &T, format: Format) -> Result<Option<String>> {
    Ok(match format {
        Format::Text => None,
        Format::Json => Some(serde_json::to_string_pretty(value)?),
        Format::Yaml => Some(serde_yaml::to_string(value)?),
    })
}

fn verdict_tag(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "PASS",
        Verdict::Fail => "FAIL",
        Verdict::Unknown => "????",
    }
}

/// One line per decision, for cohort listings.
pub fn decision_line(decision: &EligibilityDecision) -> String {
    let mut line = format!("  {:<10} {:<13}", decision.patient_id, decision.status.label());

    let failed = decision.failed_ids();
    if !failed.is_empty() {
        let _ = write!(line, " failed: {}", failed.join(", "));
    }
    if !decision.missing_fields.is_empty() {
        let missing: Vec<&str> = decision.missing_fields.iter().map(|f| f.as_str()).collect();
        let _ = write!(line, " missing: {}", missing.join(", "));
    }

    line.trim_end().to_string()
}

/// Header for a trial block.
pub fn trial_header(trial: &TrialCriteria) -> String {
    match trial.phase() {
        Some(phase) => format!("{} ({}) {}", trial.trial_id(), phase, trial.title()),
        None => format!("{} {}", trial.trial_id(), trial.title()),
    }
}

/// Tally line for a batch.
pub fn counts_line(counts: &StatusCounts) -> String {
    format!(
        "  {} screened: {} eligible, {} uncertain, {} not eligible",
        counts.total(),
        counts.eligible,
        counts.uncertain,
        counts.not_eligible
    )
}

/// Full per-criterion trace of one decision.
pub fn decision_detail(decision: &EligibilityDecision, trial: &TrialCriteria) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Patient {} / {}", decision.patient_id, trial_header(trial));
    let _ = writeln!(out, "Status: {}", decision.status);
    let _ = writeln!(out);

    for result in &decision.criterion_results {
        let kind = trial
            .criterion(&result.criterion_id)
            .map(|c| c.kind.name())
            .unwrap_or("");
        let _ = writeln!(
            out,
            "  [{}] {:<4} {:<38} {}",
            verdict_tag(result.verdict),
            result.criterion_id,
            kind,
            result.rationale
        );
    }

    if !decision.missing_fields.is_empty() {
        let missing: Vec<&str> = decision.missing_fields.iter().map(|f| f.as_str()).collect();
        let _ = writeln!(out);
        let _ = writeln!(out, "Missing: {}", missing.join(", "));
    }

    let _ = writeln!(out);
    let _ = write!(out, "{}", decision.summary);
    out
}

/// Ranked trials for one patient.
pub fn ranking(patient_id: &str, ranked: &[RankedTrial]) -> String {
    let mut out = format!("Trials for patient {}\n", patient_id);

    for entry in ranked {
        let closeness = if entry.closeness.is_finite() {
            format!("{:.2}", entry.closeness)
        } else {
            "n/a".to_string()
        };
        let _ = writeln!(
            out,
            "  {:>2}. {:<14} {:<13} pass {:>2}  fail {:>2}  unknown {:>2}  distance {:>6}  {}",
            entry.rank,
            entry.trial_id,
            entry.decision.status.label(),
            entry.decision.passed_ids().len(),
            entry.decision.failed_ids().len(),
            entry.decision.unknown_ids().len(),
            closeness,
            entry.title
        );
    }

    out.trim_end().to_string()
}

/// A narrative as plain text.
pub fn narrative(narrative: &Narrative) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Explanation ({:?}):", narrative.source);
    let _ = writeln!(out, "  {}", narrative.summary);

    if !narrative.missing_information.is_empty() {
        let _ = writeln!(out, "  Missing information:");
        for item in &narrative.missing_information {
            let _ = writeln!(out, "    - {}", item);
        }
    }
    if !narrative.recommended_next_questions.is_empty() {
        let _ = writeln!(out, "  Next questions:");
        for question in &narrative.recommended_next_questions {
            let _ = writeln!(out, "    - {}", question);
        }
    }
    let _ = write!(out, "  Note: {}", narrative.safety_note);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialscreen_core::{evaluate, Criterion, CriterionKind, Patient};

    fn trial() -> TrialCriteria {
        TrialCriteria::new(
            "T2D-001",
            "GLP-1 add-on",
            vec![
                Criterion::new("I1", CriterionKind::min_age(18)),
                Criterion::new("E1", CriterionKind::PregnancyExclusion),
            ],
        )
        .unwrap()
        .with_phase("Phase 3")
    }

    #[test]
    fn test_decision_line_lists_missing_fields() {
        let mut patient = Patient::new("P0001");
        patient.age_years = Some(40);

        let line = decision_line(&evaluate(&patient, &trial()));
        assert!(line.contains("P0001"));
        assert!(line.contains("Uncertain"));
        assert!(line.ends_with("missing: pregnant"));
    }

    #[test]
    fn test_decision_detail_shows_each_criterion() {
        let mut patient = Patient::new("P0001");
        patient.age_years = Some(16);

        let detail = decision_detail(&evaluate(&patient, &trial()), &trial());
        assert!(detail.contains("[FAIL] I1"));
        assert!(detail.contains("[????] E1"));
        assert!(detail.contains("T2D-001 (Phase 3) GLP-1 add-on"));
    }

    #[test]
    fn test_structured_text_is_none() {
        assert!(structured(&1, Format::Text).unwrap().is_none());
        assert_eq!(structured(&1, Format::Json).unwrap().as_deref(), Some("1"));
    }
}
