//! Decision types produced by the evaluator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::Evidence;
use crate::patient::PatientField;

/// Outcome of a single criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    /// A patient field the criterion depends on is not recorded
    Unknown,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Verdict::Unknown)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of evaluating one criterion for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion_id: String,

    pub verdict: Verdict,

    /// Short human-readable reason
    pub rationale: String,

    /// Fields whose absence made the verdict `unknown`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<PatientField>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

/// Overall eligibility status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EligibilityStatus {
    #[serde(rename = "Eligible")]
    Eligible,

    #[serde(rename = "Uncertain")]
    Uncertain,

    #[serde(rename = "Not eligible")]
    NotEligible,
}

impl EligibilityStatus {
    /// Display label used in reports and narratives.
    pub fn label(&self) -> &'static str {
        match self {
            EligibilityStatus::Eligible => "Eligible",
            EligibilityStatus::Uncertain => "Uncertain",
            EligibilityStatus::NotEligible => "Not eligible",
        }
    }

    /// Parse a label, tolerating case and the "NotEligible" spelling.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "eligible" => Some(EligibilityStatus::Eligible),
            "uncertain" => Some(EligibilityStatus::Uncertain),
            "noteligible" | "ineligible" => Some(EligibilityStatus::NotEligible),
            _ => None,
        }
    }

    /// Sort priority, lower is better.
    pub fn priority(&self) -> u8 {
        match self {
            EligibilityStatus::Eligible => 0,
            EligibilityStatus::Uncertain => 1,
            EligibilityStatus::NotEligible => 2,
        }
    }
}

impl fmt::Display for EligibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The decision for one patient against one trial.
///
/// Carries no timestamp: evaluating the same inputs twice yields equal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityDecision {
    pub trial_id: String,

    pub patient_id: String,

    pub status: EligibilityStatus,

    /// One result per criterion, in declaration order
    pub criterion_results: Vec<CriterionResult>,

    /// Sorted, de-duplicated fields that blocked a definite answer
    #[serde(default)]
    pub missing_fields: Vec<PatientField>,

    pub summary: String,
}

impl EligibilityDecision {
    /// Results with the given verdict, in order.
    pub fn results_with(&self, verdict: Verdict) -> impl Iterator<Item = &CriterionResult> {
        self.criterion_results
            .iter()
            .filter(move |r| r.verdict == verdict)
    }

    /// Ids of failing criteria, in order.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.results_with(Verdict::Fail)
            .map(|r| r.criterion_id.as_str())
            .collect()
    }

    /// Ids of criteria that could not be assessed, in order.
    pub fn unknown_ids(&self) -> Vec<&str> {
        self.results_with(Verdict::Unknown)
            .map(|r| r.criterion_id.as_str())
            .collect()
    }

    /// Ids of passing criteria, in order.
    pub fn passed_ids(&self) -> Vec<&str> {
        self.results_with(Verdict::Pass)
            .map(|r| r.criterion_id.as_str())
            .collect()
    }

    pub fn result(&self, criterion_id: &str) -> Option<&CriterionResult> {
        self.criterion_results
            .iter()
            .find(|r| r.criterion_id == criterion_id)
    }
}

/// Tally of statuses across a batch of decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub eligible: usize,
    pub uncertain: usize,
    pub not_eligible: usize,
}

impl StatusCounts {
    pub fn from_decisions<'a>(decisions: impl IntoIterator<Item = &'a EligibilityDecision>) -> Self {
        let mut counts = Self::default();
        for decision in decisions {
            counts.record(decision.status);
        }
        counts
    }

    pub fn record(&mut self, status: EligibilityStatus) {
        match status {
            EligibilityStatus::Eligible => self.eligible += 1,
            EligibilityStatus::Uncertain => self.uncertain += 1,
            EligibilityStatus::NotEligible => self.not_eligible += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.eligible + self.uncertain + self.not_eligible
    }
}
