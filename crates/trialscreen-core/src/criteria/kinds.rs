//! The closed vocabulary of criterion kinds and their parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::parser::CriteriaError;
use crate::patient::{Diagnosis, PatientField};

fn inclusive_default() -> bool {
    true
}

/// Lower age bound in years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinAge {
    pub min: u32,

    #[serde(default = "inclusive_default")]
    pub inclusive: bool,
}

/// Upper age bound in years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxAge {
    pub max: u32,

    #[serde(default = "inclusive_default")]
    pub inclusive: bool,
}

/// Where a value fell relative to a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundCheck {
    Within,
    Below(f64),
    Above(f64),
}

/// A numeric range with optional ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    #[serde(default = "inclusive_default")]
    pub min_inclusive: bool,

    #[serde(default = "inclusive_default")]
    pub max_inclusive: bool,
}

impl RangeBounds {
    /// Closed range `[min, max]`.
    pub fn closed(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    pub fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    pub fn check(&self, value: f64) -> BoundCheck {
        if let Some(min) = self.min {
            let below = if self.min_inclusive { value < min } else { value <= min };
            if below {
                return BoundCheck::Below(min);
            }
        }
        if let Some(max) = self.max {
            let above = if self.max_inclusive { value > max } else { value >= max };
            if above {
                return BoundCheck::Above(max);
            }
        }
        BoundCheck::Within
    }

    /// Distance from `value` to the nearest violated bound, 0 when within.
    pub fn distance(&self, value: f64) -> f64 {
        match self.check(value) {
            BoundCheck::Within => 0.0,
            BoundCheck::Below(min) => min - value,
            BoundCheck::Above(max) => value - max,
        }
    }

    fn validate(&self, criterion_id: &str) -> Result<(), CriteriaError> {
        let invalid = |reason: String| CriteriaError::InvalidBound {
            criterion_id: criterion_id.to_string(),
            reason,
        };

        if self.min.is_none() && self.max.is_none() {
            return Err(invalid("range needs at least one of min or max".to_string()));
        }
        for bound in [self.min, self.max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(invalid(format!("bound {} is not finite", bound)));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(invalid(format!("min {} > max {}", min, max)));
            }
            if min == max && !(self.min_inclusive && self.max_inclusive) {
                return Err(invalid(format!("range around {} is empty", min)));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RangeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.min_inclusive && self.min.is_some() { '[' } else { '(' };
        let close = if self.max_inclusive && self.max.is_some() { ']' } else { ')' };
        let min = self.min.map_or_else(|| "-inf".to_string(), |v| v.to_string());
        let max = self.max.map_or_else(|| "inf".to_string(), |v| v.to_string());
        write!(f, "{}{}, {}{}", open, min, max, close)
    }
}

/// A lower bound on a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimumBound {
    pub min: f64,

    #[serde(default = "inclusive_default")]
    pub inclusive: bool,
}

impl MinimumBound {
    pub fn as_range(&self) -> RangeBounds {
        RangeBounds {
            min: Some(self.min),
            max: None,
            min_inclusive: self.inclusive,
            max_inclusive: true,
        }
    }
}

/// Minimum whole months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimumMonths {
    pub min: u32,
}

/// A set of diagnoses, any one of which matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisSet {
    pub any_of: Vec<Diagnosis>,
}

/// How a medication requirement combines its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    AllOf,
    AnyOf,
}

/// Medications the patient must be taking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredMedication {
    pub medications: Vec<String>,

    #[serde(default)]
    pub mode: MatchMode,
}

/// Medications that exclude the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedMedication {
    pub medications: Vec<String>,
}

/// Exclusion window for a past event, in months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWindow {
    pub within_months: u32,
}

/// Boolean conditions a trial can exclude on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionFlag {
    Type1Diabetes,
    SevereRenalImpairment,
    Dialysis,
    KidneyTransplant,
    EatingDisorder,
}

impl ExclusionFlag {
    pub fn field(&self) -> PatientField {
        match self {
            ExclusionFlag::Type1Diabetes => PatientField::Type1Diabetes,
            ExclusionFlag::SevereRenalImpairment => PatientField::SevereRenalImpairment,
            ExclusionFlag::Dialysis => PatientField::Dialysis,
            ExclusionFlag::KidneyTransplant => PatientField::KidneyTransplant,
            ExclusionFlag::EatingDisorder => PatientField::EatingDisorder,
        }
    }
}

/// Excludes patients with a flagged condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionExclusion {
    pub condition: ExclusionFlag,
}

/// Criterion kind with its parameters.
///
/// Unknown `kind` tags fail deserialization, so a trial definition with an
/// unsupported rule never reaches the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriterionKind {
    MinAge(MinAge),
    MaxAge(MaxAge),
    RequiredDiagnosis(DiagnosisSet),
    ExcludedDiagnosis(DiagnosisSet),
    Hba1cRange(RangeBounds),
    BmiRange(RangeBounds),
    EgfrRange(RangeBounds),
    UacrMinimum(MinimumBound),
    RequiredMedication(RequiredMedication),
    ExcludedMedication(ExcludedMedication),
    MetforminStableMonths(MinimumMonths),
    PregnancyExclusion,
    RecentCardiovascularEventExclusion(EventWindow),
    ConditionExclusion(ConditionExclusion),
}

impl CriterionKind {
    pub fn min_age(min: u32) -> Self {
        CriterionKind::MinAge(MinAge { min, inclusive: true })
    }

    pub fn max_age(max: u32) -> Self {
        CriterionKind::MaxAge(MaxAge { max, inclusive: true })
    }

    pub fn required_diagnosis(diagnosis: Diagnosis) -> Self {
        CriterionKind::RequiredDiagnosis(DiagnosisSet {
            any_of: vec![diagnosis],
        })
    }

    pub fn hba1c_range(min: f64, max: f64) -> Self {
        CriterionKind::Hba1cRange(RangeBounds::closed(min, max))
    }

    pub fn required_medications(medications: &[&str], mode: MatchMode) -> Self {
        CriterionKind::RequiredMedication(RequiredMedication {
            medications: medications.iter().map(|m| m.to_string()).collect(),
            mode,
        })
    }

    pub fn excluded_medications(medications: &[&str]) -> Self {
        CriterionKind::ExcludedMedication(ExcludedMedication {
            medications: medications.iter().map(|m| m.to_string()).collect(),
        })
    }

    /// The `kind` tag as written in trial files.
    pub fn name(&self) -> &'static str {
        match self {
            CriterionKind::MinAge(_) => "min_age",
            CriterionKind::MaxAge(_) => "max_age",
            CriterionKind::RequiredDiagnosis(_) => "required_diagnosis",
            CriterionKind::ExcludedDiagnosis(_) => "excluded_diagnosis",
            CriterionKind::Hba1cRange(_) => "hba1c_range",
            CriterionKind::BmiRange(_) => "bmi_range",
            CriterionKind::EgfrRange(_) => "egfr_range",
            CriterionKind::UacrMinimum(_) => "uacr_minimum",
            CriterionKind::RequiredMedication(_) => "required_medication",
            CriterionKind::ExcludedMedication(_) => "excluded_medication",
            CriterionKind::MetforminStableMonths(_) => "metformin_stable_months",
            CriterionKind::PregnancyExclusion => "pregnancy_exclusion",
            CriterionKind::RecentCardiovascularEventExclusion(_) => {
                "recent_cardiovascular_event_exclusion"
            }
            CriterionKind::ConditionExclusion(_) => "condition_exclusion",
        }
    }

    /// The patient field this criterion reads.
    pub fn field(&self) -> PatientField {
        match self {
            CriterionKind::MinAge(_) | CriterionKind::MaxAge(_) => PatientField::AgeYears,
            CriterionKind::RequiredDiagnosis(_) | CriterionKind::ExcludedDiagnosis(_) => {
                PatientField::Diagnoses
            }
            CriterionKind::Hba1cRange(_) => PatientField::Hba1cPercent,
            CriterionKind::BmiRange(_) => PatientField::Bmi,
            CriterionKind::EgfrRange(_) => PatientField::Egfr,
            CriterionKind::UacrMinimum(_) => PatientField::UacrMgG,
            CriterionKind::RequiredMedication(_) | CriterionKind::ExcludedMedication(_) => {
                PatientField::Medications
            }
            CriterionKind::MetforminStableMonths(_) => PatientField::MetforminStableMonths,
            CriterionKind::PregnancyExclusion => PatientField::Pregnant,
            CriterionKind::RecentCardiovascularEventExclusion(_) => {
                PatientField::RecentMiOrStrokeMonths
            }
            CriterionKind::ConditionExclusion(c) => c.condition.field(),
        }
    }

    /// The numeric range this criterion enforces, if it is a range check.
    ///
    /// Used for closeness ranking.
    pub fn numeric_range(&self) -> Option<RangeBounds> {
        match self {
            CriterionKind::MinAge(a) => Some(RangeBounds {
                min: Some(a.min as f64),
                max: None,
                min_inclusive: a.inclusive,
                max_inclusive: true,
            }),
            CriterionKind::MaxAge(a) => Some(RangeBounds {
                min: None,
                max: Some(a.max as f64),
                min_inclusive: true,
                max_inclusive: a.inclusive,
            }),
            CriterionKind::Hba1cRange(r) | CriterionKind::BmiRange(r) | CriterionKind::EgfrRange(r) => {
                Some(r.clone())
            }
            CriterionKind::UacrMinimum(m) => Some(m.as_range()),
            _ => None,
        }
    }

    /// Reject malformed parameters.
    pub fn validate(&self, criterion_id: &str) -> Result<(), CriteriaError> {
        let empty = || CriteriaError::EmptyValueSet {
            criterion_id: criterion_id.to_string(),
        };

        match self {
            CriterionKind::MaxAge(a) if a.max == 0 && !a.inclusive => {
                Err(CriteriaError::InvalidBound {
                    criterion_id: criterion_id.to_string(),
                    reason: "max_age below 0 admits no patient".to_string(),
                })
            }
            CriterionKind::Hba1cRange(r) | CriterionKind::BmiRange(r) | CriterionKind::EgfrRange(r) => {
                r.validate(criterion_id)
            }
            CriterionKind::UacrMinimum(m) if !m.min.is_finite() => Err(CriteriaError::InvalidBound {
                criterion_id: criterion_id.to_string(),
                reason: format!("bound {} is not finite", m.min),
            }),
            CriterionKind::RequiredDiagnosis(set) | CriterionKind::ExcludedDiagnosis(set) => {
                if set.any_of.is_empty() || set.any_of.iter().any(|d| d.as_str().trim().is_empty()) {
                    Err(empty())
                } else {
                    Ok(())
                }
            }
            CriterionKind::RequiredMedication(RequiredMedication { medications, .. })
            | CriterionKind::ExcludedMedication(ExcludedMedication { medications }) => {
                if medications.is_empty() || medications.iter().any(|m| m.trim().is_empty()) {
                    Err(empty())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_inclusive_and_exclusive() {
        let closed = RangeBounds::closed(7.0, 10.0);
        assert_eq!(closed.check(7.0), BoundCheck::Within);
        assert_eq!(closed.check(10.0), BoundCheck::Within);
        assert_eq!(closed.check(6.9), BoundCheck::Below(7.0));

        let half_open = RangeBounds {
            max_inclusive: false,
            ..RangeBounds::closed(7.0, 10.0)
        };
        assert_eq!(half_open.check(10.0), BoundCheck::Above(10.0));
        assert_eq!(half_open.to_string(), "[7, 10)");
    }

    #[test]
    fn test_range_distance() {
        let range = RangeBounds::closed(25.0, 40.0);
        assert_eq!(range.distance(30.0), 0.0);
        assert_eq!(range.distance(22.5), 2.5);
        assert_eq!(range.distance(43.0), 3.0);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let kind = CriterionKind::Hba1cRange(RangeBounds::closed(10.0, 7.0));
        assert!(matches!(
            kind.validate("I3"),
            Err(CriteriaError::InvalidBound { .. })
        ));
    }

    #[test]
    fn test_empty_medication_list_rejected() {
        let kind = CriterionKind::excluded_medications(&[]);
        assert!(matches!(
            kind.validate("E2"),
            Err(CriteriaError::EmptyValueSet { .. })
        ));
    }

    #[test]
    fn test_blank_diagnosis_name_rejected() {
        let kind = CriterionKind::ExcludedDiagnosis(DiagnosisSet {
            any_of: vec![Diagnosis::Type1Diabetes, Diagnosis::parse("  ")],
        });
        assert!(matches!(
            kind.validate("E1"),
            Err(CriteriaError::EmptyValueSet { .. })
        ));

        let kind = CriterionKind::required_diagnosis(Diagnosis::Other(String::new()));
        assert!(kind.validate("I2").is_err());

        let kind = CriterionKind::required_diagnosis(Diagnosis::parse("hypertension"));
        assert!(kind.validate("I2").is_ok());
    }

    #[test]
    fn test_kind_tag_roundtrip_names() {
        let kind = CriterionKind::hba1c_range(7.0, 10.0);
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], kind.name());

        let pregnancy = serde_json::to_value(CriterionKind::PregnancyExclusion).unwrap();
        assert_eq!(pregnancy["kind"], "pregnancy_exclusion");
    }

    #[test]
    fn test_unknown_kind_does_not_parse() {
        let result: Result<CriterionKind, _> =
            serde_json::from_value(serde_json::json!({"kind": "blood_type", "value": "A"}));
        assert!(result.is_err());
    }
}
