//! Shared fixtures for unit tests in this workspace.
//!
//! Compiled for this crate's tests and for dependents enabling the
//! `testing` feature.

use crate::registry::Registry;

/// A mapping document shaped like the one shipped with the model.
///
/// `occupation_skillScore` and `family_history` carry raw source codes that
/// the canonical overrides replace.
pub const SAMPLE_MAPPINGS: &str = r#"{
    "gender": {"1": "Male", "2": "Female"},
    "education": {"1": "None", "2": "Primary", "3": "Secondary", "4": "Higher"},
    "spouse_edu": {"1": "None", "2": "Primary", "3": "Secondary", "4": "Higher", "5": "No spouse"},
    "category": {"1": "A", "2": "B", "3": "C", "4": "D"},
    "religion": {"1": "Hindu", "2": "Muslim", "3": "Christian", "4": "Other"},
    "occupation_skillScore": {"1": "1", "2": "2", "3": "3", "4": "4"},
    "marital_status": {"1": "Married", "2": "Widowed", "3": "Never married", "4": "Separated"},
    "age_bin": {"1": "50-59", "2": "60-69", "3": "70-79", "4": "80+"},
    "family_history": {"0": "No", "1": "Yes"},
    "hhold_asset_bin": {"1": "Q1", "2": "Q2", "3": "Q3", "4": "Q4", "5": "Q5"}
}"#;

pub fn sample_registry() -> Registry {
    Registry::from_json_str(SAMPLE_MAPPINGS).expect("sample mappings are valid")
}
