//! Trial criteria parsing from YAML/JSON.
//!
//! A [`TrialCriteria`] can only be obtained through a validating path:
//! [`TrialCriteria::new`], the file loaders, or serde (which goes through
//! `TryFrom<RawTrialCriteria>`). Evaluation therefore never sees a malformed
//! bound or an empty checklist.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::kinds::CriterionKind;
use super::schema::validate_trial_schema;

/// Errors that can occur when loading trial criteria.
#[derive(Error, Debug)]
pub enum CriteriaError {
    #[error("Failed to read trial file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Schema validation failed: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Duplicate criterion ID in trial {trial_id}: {criterion_id}")]
    DuplicateCriterionId {
        trial_id: String,
        criterion_id: String,
    },

    #[error("Duplicate trial ID: {0}")]
    DuplicateTrialId(String),

    #[error("Invalid bound in criterion {criterion_id}: {reason}")]
    InvalidBound {
        criterion_id: String,
        reason: String,
    },

    #[error("Criterion {criterion_id} has an empty value set")]
    EmptyValueSet { criterion_id: String },
}

/// A single eligibility criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Unique identifier within the trial (e.g., "I1", "E3")
    pub id: String,

    /// Original protocol wording
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub kind: CriterionKind,
}

impl Criterion {
    pub fn new(id: impl Into<String>, kind: CriterionKind) -> Self {
        Self {
            id: id.into(),
            description: None,
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Deserialize)]
struct RawTrialCriteria {
    trial_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    description: Option<String>,
    criteria: Vec<Criterion>,
}

/// A trial's ordered eligibility checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTrialCriteria")]
pub struct TrialCriteria {
    trial_id: String,

    title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    criteria: Vec<Criterion>,
}

impl TryFrom<RawTrialCriteria> for TrialCriteria {
    type Error = CriteriaError;

    fn try_from(raw: RawTrialCriteria) -> Result<Self, Self::Error> {
        let trial = TrialCriteria {
            trial_id: raw.trial_id,
            title: raw.title,
            phase: raw.phase,
            description: raw.description,
            criteria: raw.criteria,
        };
        trial.validate()?;
        Ok(trial)
    }
}

impl TrialCriteria {
    /// Build and validate a trial.
    pub fn new(
        trial_id: impl Into<String>,
        title: impl Into<String>,
        criteria: Vec<Criterion>,
    ) -> Result<Self, CriteriaError> {
        TrialCriteria::try_from(RawTrialCriteria {
            trial_id: trial_id.into(),
            title: title.into(),
            phase: None,
            description: None,
            criteria,
        })
    }

    /// Set the trial phase (e.g., "Phase 3").
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Parse a trial from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, CriteriaError> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a trial from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CriteriaError> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a trial from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a trial from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Schema-check, deserialize and validate a parsed document.
    pub fn from_value(value: JsonValue) -> Result<Self, CriteriaError> {
        validate_trial_schema(&value).map_err(CriteriaError::SchemaViolation)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Criteria in declaration order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    /// Validate the trial structure.
    fn validate(&self) -> Result<(), CriteriaError> {
        if self.trial_id.trim().is_empty() {
            return Err(CriteriaError::MissingField("trial_id".to_string()));
        }

        if self.criteria.is_empty() {
            return Err(CriteriaError::MissingField("criteria".to_string()));
        }

        self.validate_unique_criterion_ids()?;

        for criterion in &self.criteria {
            criterion.kind.validate(&criterion.id)?;
        }

        self.validate_age_window()?;

        Ok(())
    }

    /// Ensure criterion IDs are present and unique.
    fn validate_unique_criterion_ids(&self) -> Result<(), CriteriaError> {
        let mut seen = HashSet::new();

        for (index, criterion) in self.criteria.iter().enumerate() {
            if criterion.id.trim().is_empty() {
                return Err(CriteriaError::MissingField(format!("criteria[{}].id", index)));
            }
            if !seen.insert(criterion.id.as_str()) {
                return Err(CriteriaError::DuplicateCriterionId {
                    trial_id: self.trial_id.clone(),
                    criterion_id: criterion.id.clone(),
                });
            }
        }

        Ok(())
    }

    /// min_age and max_age criteria together must admit at least one whole age.
    fn validate_age_window(&self) -> Result<(), CriteriaError> {
        // Lowest and highest admissible whole ages, honoring exclusive bounds
        let lowest = self
            .criteria
            .iter()
            .filter_map(|c| match &c.kind {
                CriterionKind::MinAge(a) => {
                    Some((c, if a.inclusive { a.min } else { a.min.saturating_add(1) }))
                }
                _ => None,
            })
            .max_by_key(|(_, age)| *age);
        let highest = self
            .criteria
            .iter()
            .filter_map(|c| match &c.kind {
                CriterionKind::MaxAge(a) => {
                    Some((c, if a.inclusive { Some(a.max) } else { a.max.checked_sub(1) }))
                }
                _ => None,
            })
            .min_by_key(|(_, age)| *age);

        let empty = match (lowest, highest) {
            (_, Some((max_criterion, None))) => Some(max_criterion),
            (Some((min_criterion, lo)), Some((_, Some(hi)))) if lo > hi => Some(min_criterion),
            _ => None,
        };

        match empty {
            Some(criterion) => Err(CriteriaError::InvalidBound {
                criterion_id: criterion.id.clone(),
                reason: "min_age and max_age admit no age".to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// A set of trials with unique IDs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrialCatalog {
    trials: Vec<TrialCriteria>,
}

impl TrialCatalog {
    pub fn new(trials: Vec<TrialCriteria>) -> Result<Self, CriteriaError> {
        let mut seen = HashSet::new();
        for trial in &trials {
            if !seen.insert(trial.trial_id()) {
                return Err(CriteriaError::DuplicateTrialId(trial.trial_id().to_string()));
            }
        }
        Ok(Self { trials })
    }

    /// Accepts either a single trial document or `{ trials: [...] }`.
    pub fn from_value(value: JsonValue) -> Result<Self, CriteriaError> {
        match value {
            JsonValue::Object(mut map) if map.contains_key("trials") => {
                let trials = match map.remove("trials") {
                    Some(JsonValue::Array(items)) => items,
                    _ => {
                        return Err(CriteriaError::SchemaViolation(vec![
                            "trials must be an array".to_string(),
                        ]))
                    }
                };
                let parsed = trials
                    .into_iter()
                    .map(TrialCriteria::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Self::new(parsed)
            }
            other => Self::new(vec![TrialCriteria::from_value(other)?]),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, CriteriaError> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    pub fn from_json(json: &str) -> Result<Self, CriteriaError> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Load a catalog file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CriteriaError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn trials(&self) -> &[TrialCriteria] {
        &self.trials
    }

    pub fn get(&self, trial_id: &str) -> Option<&TrialCriteria> {
        self.trials.iter().find(|t| t.trial_id() == trial_id)
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}
