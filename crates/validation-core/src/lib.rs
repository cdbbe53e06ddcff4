//! Validation Core
//!
//! Orchestration engine for validating draft submittables (samples, studies,
//! assays, ...) that reference one another. Independent validator services
//! weigh in asynchronously; this crate decides who must answer, collects
//! answers against a versioned round, and re-triggers dependents when an
//! entity changes.
//!
//! # Architecture
//!
//! ```text
//! change notification
//!        │
//!        ▼
//! SubmittableHandler ──► ValidationResultAggregator::request_new_round
//!        │
//!        ▼
//! EnvelopeExpander (ReferenceResolver per kind)
//!        │
//!        ▼
//! "<author>.<kind>.validation" ──► validators (incl. CoreValidator)
//!                                        │
//!                                        ▼
//!                    ValidationResultAggregator::handle_author_results
//!                                        │
//!                                        ▼
//!                           ChainedValidationService
//! ```
//!
//! All persistence and transport is reached through the port traits in
//! [`ports`]; [`memory`] provides in-process implementations and the
//! `database` feature adds a Postgres ValidationResult store.

pub mod aggregator;
pub mod catalog;
pub mod chained;
pub mod core_validator;
pub mod data_type;
pub mod envelope;
pub mod error;
pub mod file_reference;
pub mod handler;
pub mod memory;
pub mod messages;
pub mod ports;
pub mod reference;
pub mod reference_validator;
pub mod requirement_validator;
pub mod resolver;
pub mod submittable;
pub mod validation_result;

#[cfg(feature = "database")]
pub mod pg_store;

pub use aggregator::{AggregationOutcome, RoundTicket, ValidationResultAggregator};
pub use catalog::ReferenceDataCatalog;
pub use chained::{ChainedValidationService, RequeueTrigger};
pub use core_validator::CoreValidator;
pub use data_type::{Checklist, DataType, RefRequirement};
pub use envelope::{ResolvedReferences, ValidationEnvelope};
pub use error::CoordinatorError;
pub use file_reference::FileValidationService;
pub use handler::{SubmittableHandler, ValidationTrigger};
pub use reference::{Reference, ReferenceKey, TypedReference};
pub use reference_validator::ReferenceValidator;
pub use requirement_validator::{ReferenceRequirementValidator, WaitPolicy};
pub use resolver::{EnvelopeExpander, ReferenceResolver};
pub use submittable::{File, Submittable, SubmittableKind, SubmittableLinks};
pub use validation_result::{
    GlobalValidationStatus, SingleValidationResult, ValidationAuthor, ValidationResult,
    ValidationStatus,
};
