//! Trial criteria parsing and validation.
//!
//! Trial definitions are structured data validated against JSON Schema and
//! then checked for malformed bounds, empty value sets and duplicate IDs.
//! Every configuration defect is reported here, at load time.

mod kinds;
mod parser;
mod schema;

pub use kinds::{
    BoundCheck, ConditionExclusion, CriterionKind, DiagnosisSet, EventWindow, ExcludedMedication,
    ExclusionFlag, MatchMode, MaxAge, MinAge, MinimumBound, MinimumMonths, RangeBounds,
    RequiredMedication,
};
pub use parser::{CriteriaError, Criterion, TrialCatalog, TrialCriteria};
pub use schema::{is_valid_trial, validate_trial_schema, SchemaError};
