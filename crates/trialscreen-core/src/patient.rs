//! Patient records as supplied by the data provider.
//!
//! Every clinical attribute is an `Option`. `None` means the value was not
//! recorded; it is never read as zero, false or "not taking". Checks only see
//! a value once it is present, see [`crate::checks`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when loading patient records.
#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Failed to read patient file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse patient JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Patient record without patient_id at index {0}")]
    MissingId(usize),

    #[error("Duplicate patient_id: {0}")]
    DuplicateId(String),
}

/// A recorded diagnosis.
///
/// Free-text names are normalized on the way in, so "Type 2 diabetes",
/// "type2_diabetes" and "T2DM" are the same diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Diagnosis {
    Type2Diabetes,
    Type1Diabetes,
    Other(String),
}

impl Diagnosis {
    /// Normalize a free-text diagnosis name.
    pub fn parse(name: &str) -> Self {
        let spaced: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        let normalized = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.as_str() {
            "type 2 diabetes" | "type2 diabetes" | "type 2 diabetes mellitus" | "t2d" | "t2dm" => {
                Diagnosis::Type2Diabetes
            }
            "type 1 diabetes" | "type1 diabetes" | "type 1 diabetes mellitus" | "t1d" | "t1dm" => {
                Diagnosis::Type1Diabetes
            }
            _ => Diagnosis::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Diagnosis::Type2Diabetes => "type2_diabetes",
            Diagnosis::Type1Diabetes => "type1_diabetes",
            Diagnosis::Other(name) => name,
        }
    }
}

impl From<String> for Diagnosis {
    fn from(value: String) -> Self {
        Diagnosis::parse(&value)
    }
}

impl From<&str> for Diagnosis {
    fn from(value: &str) -> Self {
        Diagnosis::parse(value)
    }
}

impl From<Diagnosis> for String {
    fn from(value: Diagnosis) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The patient attributes criteria can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientField {
    AgeYears,
    Diagnoses,
    Hba1cPercent,
    Bmi,
    Egfr,
    UacrMgG,
    Medications,
    MetforminStableMonths,
    RecentMiOrStrokeMonths,
    Pregnant,
    Type1Diabetes,
    SevereRenalImpairment,
    Dialysis,
    KidneyTransplant,
    EatingDisorder,
}

impl PatientField {
    /// Every field, in record order.
    pub const ALL: [PatientField; 15] = [
        PatientField::AgeYears,
        PatientField::Diagnoses,
        PatientField::Hba1cPercent,
        PatientField::Bmi,
        PatientField::Egfr,
        PatientField::UacrMgG,
        PatientField::Medications,
        PatientField::MetforminStableMonths,
        PatientField::RecentMiOrStrokeMonths,
        PatientField::Pregnant,
        PatientField::Type1Diabetes,
        PatientField::SevereRenalImpairment,
        PatientField::Dialysis,
        PatientField::KidneyTransplant,
        PatientField::EatingDisorder,
    ];

    /// Key of this field in a patient record.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientField::AgeYears => "age_years",
            PatientField::Diagnoses => "diagnoses",
            PatientField::Hba1cPercent => "hba1c_percent",
            PatientField::Bmi => "bmi",
            PatientField::Egfr => "egfr",
            PatientField::UacrMgG => "uacr_mg_g",
            PatientField::Medications => "medications",
            PatientField::MetforminStableMonths => "metformin_stable_months",
            PatientField::RecentMiOrStrokeMonths => "recent_mi_or_stroke_months",
            PatientField::Pregnant => "pregnant",
            PatientField::Type1Diabetes => "type1_diabetes",
            PatientField::SevereRenalImpairment => "severe_renal_impairment",
            PatientField::Dialysis => "dialysis",
            PatientField::KidneyTransplant => "kidney_transplant",
            PatientField::EatingDisorder => "eating_disorder",
        }
    }
}

impl fmt::Display for PatientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (synthetic) patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Identifier assigned by the data provider (e.g., "P0001")
    pub patient_id: String,

    pub age_years: Option<u32>,

    pub sex: Option<String>,

    pub diagnoses: Option<Vec<Diagnosis>>,

    /// Most recent HbA1c, in percent
    pub hba1c_percent: Option<f64>,

    pub bmi: Option<f64>,

    /// eGFR in mL/min/1.73m2
    pub egfr: Option<f64>,

    /// Urine albumin-to-creatinine ratio, mg/g
    pub uacr_mg_g: Option<f64>,

    pub smoking_status: Option<String>,

    pub pregnant: Option<bool>,

    /// Current medication names
    pub medications: Option<Vec<String>>,

    /// Months on a stable metformin dose
    pub metformin_stable_months: Option<u32>,

    /// Months since the most recent myocardial infarction or stroke
    pub recent_mi_or_stroke_months: Option<u32>,

    pub type1_diabetes: Option<bool>,

    pub severe_renal_impairment: Option<bool>,

    pub dialysis: Option<bool>,

    pub kidney_transplant: Option<bool>,

    pub eating_disorder: Option<bool>,
}

impl Patient {
    /// Create a record with every clinical attribute absent.
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            age_years: None,
            sex: None,
            diagnoses: None,
            hba1c_percent: None,
            bmi: None,
            egfr: None,
            uacr_mg_g: None,
            smoking_status: None,
            pregnant: None,
            medications: None,
            metformin_stable_months: None,
            recent_mi_or_stroke_months: None,
            type1_diabetes: None,
            severe_renal_impairment: None,
            dialysis: None,
            kidney_transplant: None,
            eating_disorder: None,
        }
    }

    /// Whether the patient takes a medication.
    ///
    /// `None` when the medication list itself is absent.
    pub fn takes(&self, medication: &str) -> Option<bool> {
        let wanted = medication.trim();
        self.medications.as_ref().map(|meds| {
            meds.iter()
                .any(|m| m.trim().eq_ignore_ascii_case(wanted))
        })
    }

    /// Whether the patient has a diagnosis, `None` when diagnoses are absent.
    pub fn has_diagnosis(&self, diagnosis: &Diagnosis) -> Option<bool> {
        self.diagnoses
            .as_ref()
            .map(|ds| ds.iter().any(|d| d == diagnosis))
    }

    /// A numeric measurement, `None` when absent or not a finite number.
    pub fn measurement(&self, field: PatientField) -> Option<f64> {
        let value = match field {
            PatientField::AgeYears => self.age_years.map(f64::from),
            PatientField::Hba1cPercent => self.hba1c_percent,
            PatientField::Bmi => self.bmi,
            PatientField::Egfr => self.egfr,
            PatientField::UacrMgG => self.uacr_mg_g,
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    /// Whether a field is recorded.
    pub fn is_present(&self, field: PatientField) -> bool {
        match field {
            PatientField::AgeYears => self.age_years.is_some(),
            PatientField::Diagnoses => self.diagnoses.is_some(),
            PatientField::Hba1cPercent
            | PatientField::Bmi
            | PatientField::Egfr
            | PatientField::UacrMgG => self.measurement(field).is_some(),
            PatientField::Medications => self.medications.is_some(),
            PatientField::MetforminStableMonths => self.metformin_stable_months.is_some(),
            PatientField::RecentMiOrStrokeMonths => self.recent_mi_or_stroke_months.is_some(),
            PatientField::Pregnant => self.pregnant.is_some(),
            PatientField::Type1Diabetes => self.type1_diabetes.is_some(),
            PatientField::SevereRenalImpairment => self.severe_renal_impairment.is_some(),
            PatientField::Dialysis => self.dialysis.is_some(),
            PatientField::KidneyTransplant => self.kidney_transplant.is_some(),
            PatientField::EatingDisorder => self.eating_disorder.is_some(),
        }
    }

    /// A copy of this record with one field removed.
    pub fn without(&self, field: PatientField) -> Self {
        let mut patient = self.clone();
        match field {
            PatientField::AgeYears => patient.age_years = None,
            PatientField::Diagnoses => patient.diagnoses = None,
            PatientField::Hba1cPercent => patient.hba1c_percent = None,
            PatientField::Bmi => patient.bmi = None,
            PatientField::Egfr => patient.egfr = None,
            PatientField::UacrMgG => patient.uacr_mg_g = None,
            PatientField::Medications => patient.medications = None,
            PatientField::MetforminStableMonths => patient.metformin_stable_months = None,
            PatientField::RecentMiOrStrokeMonths => patient.recent_mi_or_stroke_months = None,
            PatientField::Pregnant => patient.pregnant = None,
            PatientField::Type1Diabetes => patient.type1_diabetes = None,
            PatientField::SevereRenalImpairment => patient.severe_renal_impairment = None,
            PatientField::Dialysis => patient.dialysis = None,
            PatientField::KidneyTransplant => patient.kidney_transplant = None,
            PatientField::EatingDisorder => patient.eating_disorder = None,
        }
        patient
    }

    /// Parse a single patient from JSON.
    pub fn from_json(json: &str) -> Result<Self, PatientError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Parse a JSON array of patients, rejecting blank or duplicate ids.
pub fn cohort_from_json(json: &str) -> Result<Vec<Patient>, PatientError> {
    let patients: Vec<Patient> = serde_json::from_str(json)?;

    let mut seen = HashSet::new();
    for (index, patient) in patients.iter().enumerate() {
        if patient.patient_id.trim().is_empty() {
            return Err(PatientError::MissingId(index));
        }
        if !seen.insert(patient.patient_id.as_str()) {
            return Err(PatientError::DuplicateId(patient.patient_id.clone()));
        }
    }

    Ok(patients)
}

/// Load a JSON array of patients from a file.
pub fn load_cohort(path: impl AsRef<Path>) -> Result<Vec<Patient>, PatientError> {
    let contents = fs::read_to_string(path)?;
    cohort_from_json(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnosis_normalization() {
        assert_eq!(Diagnosis::parse("Type 2 diabetes"), Diagnosis::Type2Diabetes);
        assert_eq!(Diagnosis::parse("type2_diabetes"), Diagnosis::Type2Diabetes);
        assert_eq!(Diagnosis::parse(" T2DM "), Diagnosis::Type2Diabetes);
        assert_eq!(Diagnosis::parse("type 1 diabetes"), Diagnosis::Type1Diabetes);
        assert_eq!(
            Diagnosis::parse("Hypertension"),
            Diagnosis::Other("hypertension".to_string())
        );
    }

    #[test]
    fn test_null_and_missing_fields_are_absent() {
        let patient = Patient::from_json(
            r#"{"patient_id": "P0001", "age_years": 52, "hba1c_percent": null}"#,
        )
        .unwrap();

        assert_eq!(patient.age_years, Some(52));
        assert!(patient.hba1c_percent.is_none());
        assert!(patient.pregnant.is_none());
        assert!(!patient.is_present(PatientField::Medications));
    }

    #[test]
    fn test_non_finite_measurement_is_not_recorded() {
        let mut patient = Patient::new("P1");
        patient.hba1c_percent = Some(f64::NAN);
        patient.bmi = Some(f64::INFINITY);
        patient.egfr = Some(62.0);

        assert_eq!(patient.measurement(PatientField::Hba1cPercent), None);
        assert_eq!(patient.measurement(PatientField::Bmi), None);
        assert_eq!(patient.measurement(PatientField::Egfr), Some(62.0));
        assert!(!patient.is_present(PatientField::Hba1cPercent));
    }

    #[test]
    fn test_takes_medication() {
        let mut patient = Patient::new("P1");
        assert_eq!(patient.takes("metformin"), None);

        patient.medications = Some(vec!["Metformin".to_string(), "statin".to_string()]);
        assert_eq!(patient.takes("metformin"), Some(true));
        assert_eq!(patient.takes("insulin"), Some(false));

        // An empty list is a recorded "no medications", not an absence
        patient.medications = Some(vec![]);
        assert_eq!(patient.takes("insulin"), Some(false));
    }

    #[test]
    fn test_without_clears_only_that_field() {
        let mut patient = Patient::new("P1");
        patient.age_years = Some(40);
        patient.pregnant = Some(false);

        let cleared = patient.without(PatientField::Pregnant);
        assert!(cleared.pregnant.is_none());
        assert_eq!(cleared.age_years, Some(40));
    }

    #[test]
    fn test_cohort_rejects_duplicate_ids() {
        let json = r#"[{"patient_id": "P1"}, {"patient_id": "P1"}]"#;
        assert!(matches!(
            cohort_from_json(json),
            Err(PatientError::DuplicateId(id)) if id == "P1"
        ));
    }

    #[test]
    fn test_diagnoses_deserialize_from_free_text() {
        let patient = Patient::from_json(
            r#"{"patient_id": "P2", "diagnoses": ["type 2 diabetes", "hypertension"]}"#,
        )
        .unwrap();

        assert_eq!(patient.has_diagnosis(&Diagnosis::Type2Diabetes), Some(true));
        assert_eq!(patient.has_diagnosis(&Diagnosis::Type1Diabetes), Some(false));
    }
}
