//! Validation envelope
//!
//! Transient payload sent to every author: the entity, its round ticket and
//! the records its references resolved to. Never persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::submittable::{Submittable, SubmittableKind};

/// Resolved reference targets grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReferences(BTreeMap<SubmittableKind, Vec<Submittable>>);

impl ResolvedReferences {
    /// Add a target; a record already present (same id) is not repeated.
    pub fn insert(&mut self, target: Submittable) {
        let bucket = self.0.entry(target.kind()).or_default();
        if !bucket.iter().any(|s| s.id == target.id) {
            bucket.push(target);
        }
    }

    pub fn get(&self, kind: SubmittableKind) -> &[Submittable] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, kind: SubmittableKind) -> Option<&Submittable> {
        self.get(kind).first()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dispatch payload for one author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationEnvelope {
    pub validation_result_uuid: Uuid,
    pub version: u64,
    pub submission_id: String,
    #[serde(default)]
    pub data_type_id: Option<String>,
    #[serde(default)]
    pub checklist_id: Option<String>,
    pub entity: Submittable,
    #[serde(default)]
    pub resolved: ResolvedReferences,
}

impl ValidationEnvelope {
    pub fn entity_uuid(&self) -> Uuid {
        self.entity.id
    }

    pub fn study(&self) -> Option<&Submittable> {
        self.resolved.first(SubmittableKind::Study)
    }

    pub fn project(&self) -> Option<&Submittable> {
        self.resolved.first(SubmittableKind::Project)
    }

    pub fn samples(&self) -> &[Submittable] {
        self.resolved.get(SubmittableKind::Sample)
    }

    pub fn assays(&self) -> &[Submittable] {
        self.resolved.get(SubmittableKind::Assay)
    }

    pub fn protocols(&self) -> &[Submittable] {
        self.resolved.get(SubmittableKind::Protocol)
    }
}
