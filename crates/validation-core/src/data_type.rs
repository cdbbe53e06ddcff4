//! DataType and Checklist reference data
//!
//! A DataType says which validation authors apply to a kind of submittable
//! and which constraints its references must satisfy.

use serde::{Deserialize, Serialize};

use crate::submittable::SubmittableKind;
use crate::validation_result::ValidationAuthor;

/// Constraint on the target of a reference field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRequirement {
    /// Kind of submittable the reference points at
    pub ref_type: SubmittableKind,
    /// DataType the target must carry
    pub data_type_id: String,
    /// Authors that must already have passed the target
    #[serde(default)]
    pub additional_required_validation_authors: Vec<ValidationAuthor>,
}

/// Per-kind validation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    pub id: String,
    pub display_name: String,
    pub submittable_kind: SubmittableKind,
    #[serde(default)]
    pub required_validation_authors: Vec<ValidationAuthor>,
    #[serde(default)]
    pub optional_validation_authors: Vec<ValidationAuthor>,
    #[serde(default)]
    pub ref_requirements: Vec<RefRequirement>,
}

impl DataType {
    /// Required and optional authors, without duplicates, required first.
    pub fn all_authors(&self) -> Vec<ValidationAuthor> {
        let mut authors: Vec<ValidationAuthor> = Vec::new();
        for author in self
            .required_validation_authors
            .iter()
            .chain(&self.optional_validation_authors)
        {
            if !authors.contains(author) {
                authors.push(*author);
            }
        }
        authors
    }

    pub fn requirement_for(&self, ref_type: SubmittableKind) -> Option<&RefRequirement> {
        self.ref_requirements.iter().find(|r| r.ref_type == ref_type)
    }
}

/// Checklist: a DataType specialised with its own content schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: String,
    pub data_type_id: String,
    pub display_name: String,
    #[serde(default)]
    pub validation_schema: Option<serde_json::Value>,
}
