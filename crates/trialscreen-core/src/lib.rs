//! # trialscreen-core
//!
//! Deterministic clinical trial eligibility evaluation.
//!
//! Given a patient record and a trial's ordered criteria, this crate answers:
//! - Is the patient eligible, not eligible, or is it too early to tell?
//! - Which criteria passed, failed, or could not be assessed?
//! - Which patient fields are missing?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces the same decision
//! 2. **No LLM calls**: All evaluation is rule-based
//! 3. **Never guesses**: An absent field makes its criterion `unknown`
//! 4. **Fail-dominant**: Any failed criterion makes the patient not eligible
//!
//! ## Example
//!
//! ```rust,ignore
//! use trialscreen_core::{evaluate, EligibilityStatus, Patient, TrialCatalog};
//!
//! let catalog = TrialCatalog::from_file("trials.yaml")?;
//! let patient = Patient::from_json(r#"{"patient_id": "P0001", "age_years": 52}"#)?;
//!
//! for trial in catalog.trials() {
//!     let decision = evaluate(&patient, trial);
//!     match decision.status {
//!         EligibilityStatus::Eligible => println!("{}: eligible", trial.trial_id()),
//!         EligibilityStatus::Uncertain => println!("missing: {:?}", decision.missing_fields),
//!         EligibilityStatus::NotEligible => println!("{}", decision.summary),
//!     }
//! }
//! ```

pub mod checks;
pub mod criteria;
pub mod evidence;
pub mod patient;
pub mod ranking;
pub mod synthesizer;
pub mod types;

// Re-export main types at crate root
pub use checks::check_criterion;
pub use criteria::{
    CriteriaError, Criterion, CriterionKind, MatchMode, RangeBounds, SchemaError, TrialCatalog,
    TrialCriteria,
};
pub use evidence::{Evidence, EvidenceSource};
pub use patient::{cohort_from_json, load_cohort, Diagnosis, Patient, PatientError, PatientField};
pub use ranking::{rank_trials, RankedTrial};
pub use synthesizer::Synthesizer;
pub use types::{
    CriterionResult, EligibilityDecision, EligibilityStatus, StatusCounts, Verdict,
};

/// Evaluate a patient against a trial.
///
/// This is the main entry point for eligibility evaluation. It is total:
/// a [`TrialCriteria`] has already been validated, and missing patient data
/// is an `unknown` result rather than an error.
///
/// The returned decision has exactly one result per criterion, in the
/// trial's declaration order.
pub fn evaluate(patient: &Patient, trial: &TrialCriteria) -> EligibilityDecision {
    let results: Vec<CriterionResult> = trial
        .criteria()
        .iter()
        .map(|criterion| criterion.check(patient))
        .collect();

    let decision = Synthesizer::new().synthesize(trial.trial_id(), &patient.patient_id, results);

    tracing::debug!(
        trial_id = %decision.trial_id,
        patient_id = %decision.patient_id,
        status = %decision.status,
        missing = decision.missing_fields.len(),
        "Evaluated patient"
    );

    decision
}

/// Evaluate every patient against one trial, in input order.
pub fn evaluate_cohort(patients: &[Patient], trial: &TrialCriteria) -> Vec<EligibilityDecision> {
    let decisions: Vec<EligibilityDecision> =
        patients.iter().map(|patient| evaluate(patient, trial)).collect();

    let counts = StatusCounts::from_decisions(&decisions);
    tracing::debug!(
        trial_id = %trial.trial_id(),
        eligible = counts.eligible,
        uncertain = counts.uncertain,
        not_eligible = counts.not_eligible,
        "Screened cohort"
    );

    decisions
}

/// Evaluate one patient against every trial in a catalog, in catalog order.
pub fn screen_patient(patient: &Patient, catalog: &TrialCatalog) -> Vec<EligibilityDecision> {
    catalog
        .trials()
        .iter()
        .map(|trial| evaluate(patient, trial))
        .collect()
}
