//! In-memory port implementations
//!
//! Used by tests and by the coordinator when no database is configured.
//! Each store guards its state with a single `RwLock`, so every mutating
//! call is atomic for its document the way a conditional update would be.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::ports::{
    MessagePublisher, ReferenceLookup, SubmittableRegistry, SubmittableRepository,
    ValidationResultStore,
};
use crate::reference::TypedReference;
use crate::submittable::{Submittable, SubmittableKind};
use crate::validation_result::{
    GlobalValidationStatus, SingleValidationResult, ValidationAuthor, ValidationResult,
};

/// Submittables of one kind
pub struct InMemorySubmittableRepository {
    kind: SubmittableKind,
    records: RwLock<Vec<Submittable>>,
}

impl InMemorySubmittableRepository {
    pub fn new(kind: SubmittableKind) -> Self {
        Self {
            kind,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace (by id).
    pub async fn save(&self, submittable: Submittable) {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|s| s.id == submittable.id) {
            Some(existing) => *existing = submittable,
            None => records.push(submittable),
        }
    }

    pub async fn remove(&self, id: Uuid) -> Option<Submittable> {
        let mut records = self.records.write().await;
        let index = records.iter().position(|s| s.id == id)?;
        Some(records.remove(index))
    }
}

#[async_trait]
impl ReferenceLookup for InMemorySubmittableRepository {
    async fn find_by_accession(&self, accession: &str) -> Result<Option<Submittable>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|s| s.accession.as_deref() == Some(accession))
            .cloned())
    }

    async fn find_by_team_and_alias(&self, team: &str, alias: &str) -> Result<Vec<Submittable>> {
        let records = self.records.read().await;
        let mut matches: Vec<Submittable> = records
            .iter()
            .filter(|s| s.team.as_deref() == Some(team) && s.alias.as_deref() == Some(alias))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }
}

#[async_trait]
impl SubmittableRepository for InMemorySubmittableRepository {
    fn kind(&self) -> SubmittableKind {
        self.kind
    }

    async fn find_by_submission(&self, submission_id: &str) -> Result<Vec<Submittable>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|s| s.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn find_by_submission_and_reference(
        &self,
        submission_id: &str,
        target: &TypedReference,
    ) -> Result<Vec<Submittable>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|s| s.submission_id == submission_id && s.references(target))
            .cloned()
            .collect())
    }
}

/// One repository per kind, plus the registry over them.
pub struct InMemorySubmittables {
    repositories: HashMap<SubmittableKind, Arc<InMemorySubmittableRepository>>,
}

impl InMemorySubmittables {
    pub fn new() -> Self {
        Self {
            repositories: SubmittableKind::ALL
                .iter()
                .map(|k| (*k, Arc::new(InMemorySubmittableRepository::new(*k))))
                .collect(),
        }
    }

    pub fn repository(&self, kind: SubmittableKind) -> Arc<InMemorySubmittableRepository> {
        Arc::clone(&self.repositories[&kind])
    }

    pub async fn save(&self, submittable: Submittable) {
        self.repositories[&submittable.kind()].save(submittable).await;
    }

    pub fn registry(&self) -> SubmittableRegistry {
        self.repositories
            .values()
            .fold(SubmittableRegistry::new(), |registry, repo| {
                registry.with(Arc::clone(repo) as Arc<dyn SubmittableRepository>)
            })
    }
}

impl Default for InMemorySubmittables {
    fn default() -> Self {
        Self::new()
    }
}

/// ValidationResult documents keyed by entity UUID
#[derive(Default)]
pub struct InMemoryValidationResultStore {
    documents: RwLock<HashMap<Uuid, ValidationResult>>,
}

impl InMemoryValidationResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ValidationResultStore for InMemoryValidationResultStore {
    async fn insert(&self, result: &ValidationResult) -> Result<()> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&result.entity_uuid) {
            anyhow::bail!(
                "duplicate validation result for entity {}",
                result.entity_uuid
            );
        }
        documents.insert(result.entity_uuid, result.clone());
        Ok(())
    }

    async fn find_by_entity_uuid(&self, entity_uuid: Uuid) -> Result<Option<ValidationResult>> {
        Ok(self.documents.read().await.get(&entity_uuid).cloned())
    }

    async fn open_round(
        &self,
        entity_uuid: Uuid,
        authors: &[ValidationAuthor],
    ) -> Result<Option<ValidationResult>> {
        let mut documents = self.documents.write().await;
        Ok(documents.get_mut(&entity_uuid).map(|doc| {
            doc.open_round(authors);
            doc.clone()
        }))
    }

    async fn merge_author_results(
        &self,
        entity_uuid: Uuid,
        version: Option<u64>,
        author: ValidationAuthor,
        results: &[SingleValidationResult],
    ) -> Result<bool> {
        let mut documents = self.documents.write().await;
        let Some(doc) = documents.get_mut(&entity_uuid) else {
            return Ok(false);
        };
        if version.is_some_and(|v| v != doc.version) {
            return Ok(false);
        }
        doc.record(author, results.to_vec());
        Ok(true)
    }

    async fn mark_complete(&self, entity_uuid: Uuid, version: u64) -> Result<bool> {
        let mut documents = self.documents.write().await;
        match documents.get_mut(&entity_uuid) {
            Some(doc) if doc.version == version => {
                doc.global_status = GlobalValidationStatus::Complete;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Publisher that records every message instead of sending it
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<(String, serde_json::Value)> {
        self.messages.lock().await.clone()
    }

    pub async fn routing_keys(&self) -> Vec<String> {
        self.messages
            .lock()
            .await
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, routing_key: &str, payload: serde_json::Value) -> Result<()> {
        self.messages
            .lock()
            .await
            .push((routing_key.to_string(), payload));
        Ok(())
    }
}
