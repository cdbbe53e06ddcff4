//! Validation Result Types
//!
//! One `ValidationResult` document exists per entity. Each validation round
//! bumps `version` and reseeds `expected_results` with an empty list per
//! author; authors fill their list in asynchronously.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// An independent validation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidationAuthor {
    Core,
    JsonSchema,
    FileReference,
    FileContent,
    Ena,
    Biosamples,
    Taxonomy,
    ArrayExpress,
    Eva,
    Ega,
    BioStudies,
}

impl ValidationAuthor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "Core",
            Self::JsonSchema => "JsonSchema",
            Self::FileReference => "FileReference",
            Self::FileContent => "FileContent",
            Self::Ena => "Ena",
            Self::Biosamples => "Biosamples",
            Self::Taxonomy => "Taxonomy",
            Self::ArrayExpress => "ArrayExpress",
            Self::Eva => "Eva",
            Self::Ega => "Ega",
            Self::BioStudies => "BioStudies",
        }
    }

    /// FileContent answers are requested on the file-upload cadence, not per
    /// entity round, so they are never bound to a version.
    pub fn is_version_bound(&self) -> bool {
        !matches!(self, Self::FileContent)
    }
}

impl std::fmt::Display for ValidationAuthor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ValidationAuthor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Core" => Ok(Self::Core),
            "JsonSchema" => Ok(Self::JsonSchema),
            "FileReference" => Ok(Self::FileReference),
            "FileContent" => Ok(Self::FileContent),
            "Ena" => Ok(Self::Ena),
            "Biosamples" => Ok(Self::Biosamples),
            "Taxonomy" => Ok(Self::Taxonomy),
            "ArrayExpress" => Ok(Self::ArrayExpress),
            "Eva" => Ok(Self::Eva),
            "Ega" => Ok(Self::Ega),
            "BioStudies" => Ok(Self::BioStudies),
            _ => Err(format!("Unknown validation author: {}", s)),
        }
    }
}

/// Verdict of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Pass,
    Warning,
    Error,
    Pending,
}

/// Aggregate status of a ValidationResult
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GlobalValidationStatus {
    #[default]
    Pending,
    Complete,
}

impl GlobalValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Complete => "Complete",
        }
    }
}

impl TryFrom<String> for GlobalValidationStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "Pending" => Ok(Self::Pending),
            "Complete" => Ok(Self::Complete),
            _ => Err(format!("Unknown global validation status: {}", s)),
        }
    }
}

/// One author's verdict on one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleValidationResult {
    pub author: ValidationAuthor,
    pub entity_uuid: Uuid,
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SingleValidationResult {
    pub fn pass(author: ValidationAuthor, entity_uuid: Uuid) -> Self {
        Self {
            author,
            entity_uuid,
            status: ValidationStatus::Pass,
            message: None,
        }
    }

    pub fn error(author: ValidationAuthor, entity_uuid: Uuid, message: impl Into<String>) -> Self {
        Self {
            author,
            entity_uuid,
            status: ValidationStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn warning(
        author: ValidationAuthor,
        entity_uuid: Uuid,
        message: impl Into<String>,
    ) -> Self {
        Self {
            author,
            entity_uuid,
            status: ValidationStatus::Warning,
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ValidationStatus::Error
    }
}

/// Per-entity validation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub uuid: Uuid,
    pub entity_uuid: Uuid,
    pub submission_id: String,
    pub version: u64,
    pub global_status: GlobalValidationStatus,
    pub expected_results: BTreeMap<ValidationAuthor, Vec<SingleValidationResult>>,
    pub updated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Registration record created when an entity first enters the system.
    pub fn new(entity_uuid: Uuid, submission_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            entity_uuid,
            submission_id: submission_id.into(),
            version: 0,
            global_status: GlobalValidationStatus::Pending,
            expected_results: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Start a new round: bump the version and expect an answer from each author.
    pub fn open_round(&mut self, authors: &[ValidationAuthor]) {
        self.version += 1;
        self.global_status = GlobalValidationStatus::Pending;
        self.expected_results = authors.iter().map(|a| (*a, Vec::new())).collect();
        self.updated_at = Utc::now();
    }

    /// Whether an answer for `author` tagged with `version` may be stored.
    pub fn accepts(&self, author: ValidationAuthor, version: u64) -> bool {
        !author.is_version_bound() || self.version == version
    }

    /// Replace the author's list with a fresh batch of results.
    pub fn record(&mut self, author: ValidationAuthor, results: Vec<SingleValidationResult>) {
        self.expected_results.insert(author, results);
        self.updated_at = Utc::now();
    }

    /// Every expected author has answered. A document no author was ever
    /// asked about is not complete.
    pub fn is_complete(&self) -> bool {
        !self.expected_results.is_empty() && self.expected_results.values().all(|r| !r.is_empty())
    }

    /// Every author in `authors` has answered for the current round.
    pub fn has_answers_from(&self, authors: &[ValidationAuthor]) -> bool {
        authors.iter().all(|a| {
            self.expected_results
                .get(a)
                .map(|r| !r.is_empty())
                .unwrap_or(false)
        })
    }

    pub fn has_error_from(&self, author: ValidationAuthor) -> bool {
        self.expected_results
            .get(&author)
            .map(|r| r.iter().any(SingleValidationResult::is_error))
            .unwrap_or(false)
    }
}
