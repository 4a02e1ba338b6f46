//! Ranking trials for a single patient.
//!
//! Trials are ordered by, in turn:
//! 1. status (Eligible, then Uncertain, then Not eligible)
//! 2. fewer failed criteria
//! 3. fewer unknown criteria
//! 4. closeness: summed distance from the patient's values to each numeric
//!    range; infinite when a ranged value is absent
//! 5. later phase first (Phase 3, Phase 2, Phase 1, anything else)
//! 6. more passed criteria
//!
//! The sort is stable, so equal trials keep catalog order.

use serde::Serialize;
use std::cmp::{Ordering, Reverse};

use crate::criteria::TrialCriteria;
use crate::evaluate;
use crate::patient::Patient;
use crate::types::{EligibilityDecision, Verdict};

/// A trial decision with its ranking inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTrial {
    /// 1-based position after sorting
    pub rank: usize,

    pub trial_id: String,

    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Summed range distance; `null` in JSON when a ranged value is absent
    pub closeness: f64,

    pub decision: EligibilityDecision,
}

impl RankedTrial {
    fn sort_key(&self) -> (u8, usize, usize, u8, Reverse<usize>) {
        let count = |v| self.decision.results_with(v).count();
        (
            self.decision.status.priority(),
            count(Verdict::Fail),
            count(Verdict::Unknown),
            phase_rank(self.phase.as_deref()),
            Reverse(count(Verdict::Pass)),
        )
    }

    fn ranking_cmp(&self, other: &Self) -> Ordering {
        let (status, fails, unknowns, phase, passes) = self.sort_key();
        let (o_status, o_fails, o_unknowns, o_phase, o_passes) = other.sort_key();

        status
            .cmp(&o_status)
            .then(fails.cmp(&o_fails))
            .then(unknowns.cmp(&o_unknowns))
            .then(self.closeness.total_cmp(&other.closeness))
            .then(phase.cmp(&o_phase))
            .then(passes.cmp(&o_passes))
    }
}

/// Evaluate a patient against every trial and order the results.
pub fn rank_trials(patient: &Patient, trials: &[TrialCriteria]) -> Vec<RankedTrial> {
    let mut ranked: Vec<RankedTrial> = trials
        .iter()
        .map(|trial| RankedTrial {
            rank: 0,
            trial_id: trial.trial_id().to_string(),
            title: trial.title().to_string(),
            phase: trial.phase().map(str::to_string),
            closeness: closeness(patient, trial),
            decision: evaluate(patient, trial),
        })
        .collect();

    ranked.sort_by(RankedTrial::ranking_cmp);

    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.rank = index + 1;
    }

    ranked
}

/// Sum of distances from the patient's values to each ranged criterion.
///
/// Zero when every ranged value is within bounds, infinite when one is absent.
pub fn closeness(patient: &Patient, trial: &TrialCriteria) -> f64 {
    trial
        .criteria()
        .iter()
        .filter_map(|c| c.kind.numeric_range().map(|range| (c.kind.field(), range)))
        .map(|(field, range)| match patient.measurement(field) {
            Some(value) => range.distance(value),
            None => f64::INFINITY,
        })
        .sum()
}

/// Lower is better: Phase 3 before Phase 2 before Phase 1.
///
/// The phase number is matched as a whole token, so "Phase IV" is not Phase 1.
pub fn phase_rank(phase: Option<&str>) -> u8 {
    let normalized = phase.unwrap_or_default().to_lowercase();
    let Some(rest) = normalized.trim().strip_prefix("phase") else {
        return 9;
    };
    let number: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();

    match number.as_str() {
        "3" | "iii" => 0,
        "2" | "ii" => 1,
        "1" | "i" => 2,
        _ => 9,
    }
}
