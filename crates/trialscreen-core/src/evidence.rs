//! Evidence linking for eligibility decisions.
//!
//! Every criterion result points at what it looked at: the patient field it
//! read (or found absent) and the criterion parameter it compared against.

use serde::{Deserialize, Serialize};

use crate::patient::PatientField;

/// Where a piece of evidence comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// A patient record field
    Patient,
    /// A trial criterion parameter
    Criterion,
}

/// A piece of evidence supporting a criterion result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// What this evidence supports
    pub claim: String,

    /// Where the evidence comes from
    pub source: EvidenceSource,

    /// Pointer to the location (e.g., "patient.hba1c_percent")
    pub pointer: String,
}

impl Evidence {
    /// Create evidence from a patient field.
    pub fn from_patient(claim: impl Into<String>, field: PatientField) -> Self {
        Self {
            claim: claim.into(),
            source: EvidenceSource::Patient,
            pointer: format!("patient.{}", field.as_str()),
        }
    }

    /// Create evidence from a criterion parameter.
    pub fn from_criterion(
        claim: impl Into<String>,
        criterion_id: &str,
        parameter: &str,
    ) -> Self {
        Self {
            claim: claim.into(),
            source: EvidenceSource::Criterion,
            pointer: format!("criteria[{}].{}", criterion_id, parameter),
        }
    }

    /// Evidence that a patient field is not recorded.
    pub fn absent(field: PatientField) -> Self {
        Self::from_patient(format!("{} not recorded", field.as_str()), field)
    }
}
