//! Port traits
//!
//! The engine operates exclusively through these traits. [`crate::memory`]
//! implements them in-process; the `database` feature adds a Postgres
//! ValidationResult store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::data_type::{Checklist, DataType};
use crate::error::CoordinatorError;
use crate::reference::TypedReference;
use crate::submittable::{Submittable, SubmittableKind};
use crate::validation_result::{SingleValidationResult, ValidationAuthor, ValidationResult};

/// Lookup capability used to resolve references of one kind.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn find_by_accession(&self, accession: &str) -> Result<Option<Submittable>>;

    /// All records with this (team, alias), newest first.
    async fn find_by_team_and_alias(&self, team: &str, alias: &str) -> Result<Vec<Submittable>>;
}

/// Per-kind submittable repository.
#[async_trait]
pub trait SubmittableRepository: ReferenceLookup {
    fn kind(&self) -> SubmittableKind;

    /// Every record of this kind in the submission.
    async fn find_by_submission(&self, submission_id: &str) -> Result<Vec<Submittable>>;

    /// Records in the submission whose own references point at `target`.
    async fn find_by_submission_and_reference(
        &self,
        submission_id: &str,
        target: &TypedReference,
    ) -> Result<Vec<Submittable>>;
}

/// ValidationResult document store.
///
/// Every mutating call is a single conditional read-modify-write on one
/// document; concurrent writers serialize on the version check.
#[async_trait]
pub trait ValidationResultStore: Send + Sync {
    /// Register an entity. Done upstream when the entity first enters the system.
    async fn insert(&self, result: &ValidationResult) -> Result<()>;

    async fn find_by_entity_uuid(&self, entity_uuid: Uuid) -> Result<Option<ValidationResult>>;

    /// Bump the version, set Pending and reseed `expected_results` with an
    /// empty list per author. Returns the updated document, or None when the
    /// entity was never registered.
    async fn open_round(
        &self,
        entity_uuid: Uuid,
        authors: &[ValidationAuthor],
    ) -> Result<Option<ValidationResult>>;

    /// Replace the author's list iff the stored version equals `version`.
    /// `None` skips the version check. Returns whether the write applied.
    async fn merge_author_results(
        &self,
        entity_uuid: Uuid,
        version: Option<u64>,
        author: ValidationAuthor,
        results: &[SingleValidationResult],
    ) -> Result<bool>;

    /// Set Complete iff the stored version still equals `version`.
    async fn mark_complete(&self, entity_uuid: Uuid, version: u64) -> Result<bool>;
}

/// Read-only DataType/Checklist reference collections.
#[async_trait]
pub trait ReferenceDataStore: Send + Sync {
    async fn find_data_type(&self, id: &str) -> Result<Option<DataType>>;
    async fn find_checklist(&self, id: &str) -> Result<Option<Checklist>>;
}

/// Outbound side of the message bus.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: serde_json::Value) -> Result<()>;
}

/// Registry of submittable repositories keyed by kind, built at startup.
#[derive(Clone, Default)]
pub struct SubmittableRegistry {
    repositories: BTreeMap<SubmittableKind, Arc<dyn SubmittableRepository>>,
}

impl SubmittableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, repository: Arc<dyn SubmittableRepository>) {
        self.repositories.insert(repository.kind(), repository);
    }

    pub fn with(mut self, repository: Arc<dyn SubmittableRepository>) -> Self {
        self.register(repository);
        self
    }

    pub fn get(
        &self,
        kind: SubmittableKind,
    ) -> std::result::Result<&Arc<dyn SubmittableRepository>, CoordinatorError> {
        self.repositories
            .get(&kind)
            .ok_or(CoordinatorError::NoRepository(kind))
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Arc<dyn SubmittableRepository>> {
        self.repositories.values()
    }

    pub fn kinds(&self) -> impl Iterator<Item = SubmittableKind> + '_ {
        self.repositories.keys().copied()
    }
}
