//! Per-kind criterion checks.
//!
//! [`check_criterion`] is the dispatch table from [`CriterionKind`] to a pure
//! check function. Each check receives the patient value already unwrapped:
//! when the field is absent the check is never called and the result is
//! `unknown`. Adding a kind means adding a variant, a field mapping in
//! [`CriterionKind::field`] and one arm here.

use crate::criteria::{
    BoundCheck, ConditionExclusion, Criterion, CriterionKind, DiagnosisSet, EventWindow,
    ExcludedMedication, ExclusionFlag, MatchMode, MaxAge, MinAge, MinimumMonths, RangeBounds,
    RequiredMedication,
};
use crate::evidence::Evidence;
use crate::patient::{Diagnosis, Patient, PatientField};
use crate::types::{CriterionResult, Verdict};

/// A definite pass/fail from a check that had its data.
struct Decided {
    passed: bool,
    rationale: String,
    /// What was read from the patient record
    observed: String,
    /// The criterion parameter compared against, with its value
    against: Option<(&'static str, String)>,
}

impl Decided {
    fn new(passed: bool, rationale: impl Into<String>, observed: impl Into<String>) -> Self {
        Self {
            passed,
            rationale: rationale.into(),
            observed: observed.into(),
            against: None,
        }
    }

    fn against(mut self, parameter: &'static str, value: impl Into<String>) -> Self {
        self.against = Some((parameter, value.into()));
        self
    }
}

impl Criterion {
    /// Evaluate this criterion against a patient.
    pub fn check(&self, patient: &Patient) -> CriterionResult {
        check_criterion(self, patient)
    }
}

/// Evaluate one criterion against one patient.
pub fn check_criterion(criterion: &Criterion, patient: &Patient) -> CriterionResult {
    let decided = match &criterion.kind {
        CriterionKind::MinAge(p) => patient.age_years.map(|age| min_age(p, age)),
        CriterionKind::MaxAge(p) => patient.age_years.map(|age| max_age(p, age)),
        CriterionKind::RequiredDiagnosis(p) => patient
            .diagnoses
            .as_deref()
            .map(|ds| required_diagnosis(p, patient, ds)),
        CriterionKind::ExcludedDiagnosis(p) => patient
            .diagnoses
            .as_deref()
            .map(|ds| excluded_diagnosis(p, patient, ds)),
        CriterionKind::Hba1cRange(p) => patient
            .measurement(PatientField::Hba1cPercent)
            .map(|v| measurement_range("HbA1c", "%", p, v)),
        CriterionKind::BmiRange(p) => patient
            .measurement(PatientField::Bmi)
            .map(|v| measurement_range("BMI", "", p, v)),
        CriterionKind::EgfrRange(p) => patient
            .measurement(PatientField::Egfr)
            .map(|v| measurement_range("eGFR", "", p, v)),
        CriterionKind::UacrMinimum(p) => patient
            .measurement(PatientField::UacrMgG)
            .map(|v| measurement_range("UACR", " mg/g", &p.as_range(), v)),
        CriterionKind::RequiredMedication(p) => patient
            .medications
            .as_deref()
            .map(|meds| required_medication(p, patient, meds)),
        CriterionKind::ExcludedMedication(p) => patient
            .medications
            .as_deref()
            .map(|meds| excluded_medication(p, patient, meds)),
        CriterionKind::MetforminStableMonths(p) => patient
            .metformin_stable_months
            .map(|months| metformin_stable(p, months)),
        CriterionKind::PregnancyExclusion => patient.pregnant.map(pregnancy_exclusion),
        CriterionKind::RecentCardiovascularEventExclusion(p) => patient
            .recent_mi_or_stroke_months
            .map(|months| recent_event(p, months)),
        CriterionKind::ConditionExclusion(p) => {
            condition_flag(patient, p.condition).map(|present| condition_exclusion(p, present))
        }
    };

    let field = criterion.kind.field();

    match decided {
        Some(d) => {
            let mut evidence = vec![Evidence::from_patient(d.observed, field)];
            if let Some((parameter, value)) = d.against {
                evidence.push(Evidence::from_criterion(value, &criterion.id, parameter));
            }
            CriterionResult {
                criterion_id: criterion.id.clone(),
                verdict: if d.passed { Verdict::Pass } else { Verdict::Fail },
                rationale: d.rationale,
                missing_fields: vec![],
                evidence,
            }
        }
        None => CriterionResult {
            criterion_id: criterion.id.clone(),
            verdict: Verdict::Unknown,
            rationale: format!(
                "{} not recorded; cannot assess {}",
                field,
                criterion.kind.name()
            ),
            missing_fields: vec![field],
            evidence: vec![Evidence::absent(field)],
        },
    }
}

fn min_age(p: &MinAge, age: u32) -> Decided {
    let passed = if p.inclusive { age >= p.min } else { age > p.min };
    let op = match (passed, p.inclusive) {
        (true, true) => ">=",
        (true, false) => ">",
        (false, true) => "<",
        (false, false) => "<=",
    };
    Decided::new(passed, format!("Age {} {} {}", age, op, p.min), format!("age {}", age))
        .against("min", format!("minimum age {}", p.min))
}

fn max_age(p: &MaxAge, age: u32) -> Decided {
    let passed = if p.inclusive { age <= p.max } else { age < p.max };
    let op = match (passed, p.inclusive) {
        (true, true) => "<=",
        (true, false) => "<",
        (false, true) => ">",
        (false, false) => ">=",
    };
    Decided::new(passed, format!("Age {} {} {}", age, op, p.max), format!("age {}", age))
        .against("max", format!("maximum age {}", p.max))
}

fn diagnosis_list(diagnoses: &[Diagnosis]) -> String {
    if diagnoses.is_empty() {
        return "none".to_string();
    }
    diagnoses
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn required_diagnosis(p: &DiagnosisSet, patient: &Patient, diagnoses: &[Diagnosis]) -> Decided {
    let matched = p
        .any_of
        .iter()
        .find(|wanted| patient.has_diagnosis(wanted) == Some(true));
    let observed = format!("diagnoses: {}", diagnosis_list(diagnoses));
    match matched {
        Some(d) => Decided::new(true, format!("Has required diagnosis {}", d), observed),
        None => Decided::new(
            false,
            format!("Does not have required diagnosis ({})", diagnosis_list(&p.any_of)),
            observed,
        ),
    }
}

fn excluded_diagnosis(p: &DiagnosisSet, patient: &Patient, diagnoses: &[Diagnosis]) -> Decided {
    let matched = p
        .any_of
        .iter()
        .find(|excluded| patient.has_diagnosis(excluded) == Some(true));
    let observed = format!("diagnoses: {}", diagnosis_list(diagnoses));
    match matched {
        Some(d) => Decided::new(false, format!("Has excluded diagnosis {}", d), observed),
        None => Decided::new(true, "No excluded diagnosis", observed),
    }
}

fn measurement_range(label: &str, unit: &str, range: &RangeBounds, value: f64) -> Decided {
    let observed = format!("{} {}{}", label, value, unit);
    match range.check(value) {
        BoundCheck::Within => Decided::new(
            true,
            format!("{} {}{} within {}", label, value, unit, range),
            observed,
        ),
        BoundCheck::Below(min) => Decided::new(
            false,
            format!("{} {}{} below {}{}", label, value, unit, min, unit),
            observed,
        )
        .against("min", format!("lower bound {}{}", min, unit)),
        BoundCheck::Above(max) => Decided::new(
            false,
            format!("{} {}{} above {}{}", label, value, unit, max, unit),
            observed,
        )
        .against("max", format!("upper bound {}{}", max, unit)),
    }
}

fn medication_list(medications: &[String]) -> String {
    if medications.is_empty() {
        "none".to_string()
    } else {
        medications.join(", ")
    }
}

fn required_medication(p: &RequiredMedication, patient: &Patient, medications: &[String]) -> Decided {
    let takes = |name: &str| patient.takes(name) == Some(true);
    let observed = format!("medications: {}", medication_list(medications));
    match p.mode {
        MatchMode::AllOf => {
            let missing: Vec<&str> = p
                .medications
                .iter()
                .filter(|m| !takes(m.as_str()))
                .map(|m| m.as_str())
                .collect();
            if missing.is_empty() {
                Decided::new(true, "Takes all required medications", observed)
            } else {
                Decided::new(
                    false,
                    format!("Missing required medications: {}", missing.join(", ")),
                    observed,
                )
            }
        }
        MatchMode::AnyOf => match p.medications.iter().find(|m| takes(m.as_str())) {
            Some(m) => Decided::new(true, format!("Takes allowed background medication {}", m), observed),
            None => Decided::new(
                false,
                format!(
                    "Takes none of the allowed background medications ({})",
                    p.medications.join(", ")
                ),
                observed,
            ),
        },
    }
}

fn excluded_medication(p: &ExcludedMedication, patient: &Patient, medications: &[String]) -> Decided {
    let used: Vec<&str> = p
        .medications
        .iter()
        .filter(|m| patient.takes(m) == Some(true))
        .map(|m| m.as_str())
        .collect();
    let observed = format!("medications: {}", medication_list(medications));
    if used.is_empty() {
        Decided::new(true, "No excluded medications", observed)
    } else {
        Decided::new(
            false,
            format!("Uses excluded medications: {}", used.join(", ")),
            observed,
        )
    }
}

fn metformin_stable(p: &MinimumMonths, months: u32) -> Decided {
    let observed = format!("metformin stable {} months", months);
    if months >= p.min {
        Decided::new(true, format!("Metformin stable {} >= {} months", months, p.min), observed)
    } else {
        Decided::new(false, format!("Metformin stable {} < {} months", months, p.min), observed)
    }
}

fn pregnancy_exclusion(pregnant: bool) -> Decided {
    if pregnant {
        Decided::new(false, "Pregnant (exclusion)", "pregnant")
    } else {
        Decided::new(true, "Not pregnant", "not pregnant")
    }
}

fn recent_event(p: &EventWindow, months_ago: u32) -> Decided {
    let observed = format!("MI/stroke {} months ago", months_ago);
    if months_ago <= p.within_months {
        Decided::new(
            false,
            format!("MI/stroke {} months ago, within {} month window", months_ago, p.within_months),
            observed,
        )
        .against("within_months", format!("{} month window", p.within_months))
    } else {
        Decided::new(
            true,
            format!("MI/stroke {} months ago, outside {} month window", months_ago, p.within_months),
            observed,
        )
    }
}

fn condition_flag(patient: &Patient, flag: ExclusionFlag) -> Option<bool> {
    match flag {
        ExclusionFlag::Type1Diabetes => patient.type1_diabetes,
        ExclusionFlag::SevereRenalImpairment => patient.severe_renal_impairment,
        ExclusionFlag::Dialysis => patient.dialysis,
        ExclusionFlag::KidneyTransplant => patient.kidney_transplant,
        ExclusionFlag::EatingDisorder => patient.eating_disorder,
    }
}

fn condition_exclusion(p: &ConditionExclusion, present: bool) -> Decided {
    let name = p.condition.field().as_str();
    if present {
        Decided::new(false, format!("{} (exclusion)", name), name)
    } else {
        Decided::new(true, format!("{} not present", name), format!("no {}", name))
    }
}
