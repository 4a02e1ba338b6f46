//! JSON Schema validation for trial criteria.
//!
//! Trials are validated against schema/trial-criteria.schema.json before
//! deserialization, so structural problems surface with a JSON pointer.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded trial schema (loaded at compile time).
const TRIAL_SCHEMA_JSON: &str = include_str!("../../../../schema/trial-criteria.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

/// Get or initialize the compiled schema validator.
fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(TRIAL_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// Validate a single trial document against the schema.
///
/// Returns every violation, each suffixed with its instance path.
pub fn validate_trial_schema(trial_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(trial_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check if a trial document is valid against the schema.
pub fn is_valid_trial(trial_json: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(trial_json))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_trial_passes_schema() {
        let value = serde_json::json!({
            "trial_id": "T2D-001",
            "criteria": [
                { "id": "I1", "kind": "min_age", "min": 18 }
            ]
        });
        assert!(validate_trial_schema(&value).is_ok());
    }

    #[test]
    fn test_missing_criteria_fails() {
        let value = serde_json::json!({ "trial_id": "T2D-001" });
        let errors = validate_trial_schema(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_empty_criteria_fails() {
        let value = serde_json::json!({ "trial_id": "T2D-001", "criteria": [] });
        assert!(validate_trial_schema(&value).is_err());
    }

    #[test]
    fn test_unknown_kind_fails() {
        let value = serde_json::json!({
            "trial_id": "T1",
            "criteria": [ { "id": "I1", "kind": "shoe_size", "max": 44 } ]
        });
        assert!(validate_trial_schema(&value).is_err());
    }

    #[test]
    fn test_min_age_requires_min() {
        let value = serde_json::json!({
            "trial_id": "T1",
            "criteria": [ { "id": "I1", "kind": "min_age" } ]
        });
        assert!(validate_trial_schema(&value).is_err());
    }

    #[test]
    fn test_invalid_criterion_id_fails() {
        let value = serde_json::json!({
            "trial_id": "T1",
            "criteria": [ { "id": "1st", "kind": "pregnancy_exclusion" } ]
        });
        assert!(validate_trial_schema(&value).is_err());
    }

    #[test]
    fn test_additional_top_level_properties_fail() {
        let value = serde_json::json!({
            "trial_id": "T1",
            "criteria": [ { "id": "E1", "kind": "pregnancy_exclusion" } ],
            "inclusion": {}
        });
        assert!(!is_valid_trial(&value));
    }

    #[test]
    fn test_full_trial_passes_schema() {
        let value = serde_json::json!({
            "trial_id": "T2D-CKD-004",
            "title": "SGLT2 inhibitor in T2D with albuminuria",
            "phase": "Phase 3",
            "criteria": [
                { "id": "I1", "kind": "min_age", "min": 30, "inclusive": true },
                { "id": "I2", "kind": "max_age", "max": 80 },
                { "id": "I3", "kind": "required_diagnosis", "any_of": ["type 2 diabetes"] },
                { "id": "I4", "kind": "hba1c_range", "min": 6.5, "max": 10.5 },
                { "id": "I5", "kind": "egfr_range", "min": 25, "max": 75 },
                { "id": "I6", "kind": "uacr_minimum", "min": 200 },
                { "id": "I7", "kind": "required_medication", "medications": ["ace inhibitor", "arb"], "mode": "any_of" },
                { "id": "E1", "kind": "pregnancy_exclusion" },
                { "id": "E2", "kind": "condition_exclusion", "condition": "dialysis" },
                { "id": "E3", "kind": "recent_cardiovascular_event_exclusion", "within_months": 3 }
            ]
        });
        assert!(validate_trial_schema(&value).is_ok());
    }
}
