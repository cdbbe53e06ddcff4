//! Submittable Types
//!
//! Draft metadata records submitted for validation. Every variant shares the
//! same identity fields; the variant-specific part is the set of typed
//! references it declares to other submittables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::reference::{non_empty, Reference, TypedReference};

/// Kind of submittable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubmittableKind {
    Sample,
    Study,
    Assay,
    AssayData,
    Analysis,
    Project,
    Protocol,
    SampleGroup,
    EgaDac,
    EgaDacPolicy,
    EgaDataset,
}

impl SubmittableKind {
    pub const ALL: [SubmittableKind; 11] = [
        Self::Sample,
        Self::Study,
        Self::Assay,
        Self::AssayData,
        Self::Analysis,
        Self::Project,
        Self::Protocol,
        Self::SampleGroup,
        Self::EgaDac,
        Self::EgaDacPolicy,
        Self::EgaDataset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sample => "Sample",
            Self::Study => "Study",
            Self::Assay => "Assay",
            Self::AssayData => "AssayData",
            Self::Analysis => "Analysis",
            Self::Project => "Project",
            Self::Protocol => "Protocol",
            Self::SampleGroup => "SampleGroup",
            Self::EgaDac => "EgaDac",
            Self::EgaDacPolicy => "EgaDacPolicy",
            Self::EgaDataset => "EgaDataset",
        }
    }

    /// Lower-cased name used as the entity segment of routing keys.
    pub fn routing_segment(&self) -> String {
        self.as_str().to_lowercase()
    }

    /// Kinds whose entities carry file references.
    pub fn carries_files(&self) -> bool {
        matches!(self, Self::AssayData | Self::Analysis)
    }
}

impl std::fmt::Display for SubmittableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubmittableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("Unknown submittable kind: {}", s))
    }
}

/// Sample-to-sample relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRelationship {
    #[serde(flatten)]
    pub reference: Reference,
    #[serde(default)]
    pub nature: Option<String>,
}

/// Use of a sample by an assay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleUse {
    #[serde(flatten)]
    pub reference: Reference,
    #[serde(default)]
    pub role: Option<String>,
}

/// File declared on an assay-data or analysis record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLink {
    pub name: String,
    #[serde(default, rename = "type")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Variant-specific references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum SubmittableLinks {
    Sample {
        #[serde(default)]
        sample_relationships: Vec<SampleRelationship>,
    },
    Study {
        #[serde(default)]
        project_ref: Option<Reference>,
    },
    Assay {
        #[serde(default)]
        study_ref: Option<Reference>,
        #[serde(default)]
        sample_uses: Vec<SampleUse>,
        #[serde(default)]
        protocol_uses: Vec<Reference>,
    },
    AssayData {
        #[serde(default)]
        assay_refs: Vec<Reference>,
        #[serde(default)]
        sample_refs: Vec<Reference>,
        #[serde(default)]
        files: Vec<FileLink>,
    },
    Analysis {
        #[serde(default)]
        study_refs: Vec<Reference>,
        #[serde(default)]
        sample_refs: Vec<Reference>,
        #[serde(default)]
        assay_refs: Vec<Reference>,
        #[serde(default)]
        assay_data_refs: Vec<Reference>,
        #[serde(default)]
        analysis_refs: Vec<Reference>,
        #[serde(default)]
        files: Vec<FileLink>,
    },
    Project {},
    Protocol {},
    SampleGroup {
        #[serde(default)]
        sample_refs: Vec<Reference>,
    },
    EgaDac {},
    EgaDacPolicy {
        #[serde(default)]
        dac_ref: Option<Reference>,
    },
    EgaDataset {
        #[serde(default)]
        data_policy_ref: Option<Reference>,
    },
}

/// One reference-valued field of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceField<'a> {
    pub name: &'static str,
    pub target: SubmittableKind,
    pub references: Vec<&'a Reference>,
}

impl<'a> ReferenceField<'a> {
    fn new(
        name: &'static str,
        target: SubmittableKind,
        references: impl IntoIterator<Item = &'a Reference>,
    ) -> Self {
        Self {
            name,
            target,
            references: references.into_iter().collect(),
        }
    }
}

impl SubmittableLinks {
    pub fn kind(&self) -> SubmittableKind {
        match self {
            Self::Sample { .. } => SubmittableKind::Sample,
            Self::Study { .. } => SubmittableKind::Study,
            Self::Assay { .. } => SubmittableKind::Assay,
            Self::AssayData { .. } => SubmittableKind::AssayData,
            Self::Analysis { .. } => SubmittableKind::Analysis,
            Self::Project {} => SubmittableKind::Project,
            Self::Protocol {} => SubmittableKind::Protocol,
            Self::SampleGroup { .. } => SubmittableKind::SampleGroup,
            Self::EgaDac {} => SubmittableKind::EgaDac,
            Self::EgaDacPolicy { .. } => SubmittableKind::EgaDacPolicy,
            Self::EgaDataset { .. } => SubmittableKind::EgaDataset,
        }
    }

    /// Empty links for a kind.
    pub fn empty(kind: SubmittableKind) -> Self {
        match kind {
            SubmittableKind::Sample => Self::Sample {
                sample_relationships: Vec::new(),
            },
            SubmittableKind::Study => Self::Study { project_ref: None },
            SubmittableKind::Assay => Self::Assay {
                study_ref: None,
                sample_uses: Vec::new(),
                protocol_uses: Vec::new(),
            },
            SubmittableKind::AssayData => Self::AssayData {
                assay_refs: Vec::new(),
                sample_refs: Vec::new(),
                files: Vec::new(),
            },
            SubmittableKind::Analysis => Self::Analysis {
                study_refs: Vec::new(),
                sample_refs: Vec::new(),
                assay_refs: Vec::new(),
                assay_data_refs: Vec::new(),
                analysis_refs: Vec::new(),
                files: Vec::new(),
            },
            SubmittableKind::Project => Self::Project {},
            SubmittableKind::Protocol => Self::Protocol {},
            SubmittableKind::SampleGroup => Self::SampleGroup {
                sample_refs: Vec::new(),
            },
            SubmittableKind::EgaDac => Self::EgaDac {},
            SubmittableKind::EgaDacPolicy => Self::EgaDacPolicy { dac_ref: None },
            SubmittableKind::EgaDataset => Self::EgaDataset {
                data_policy_ref: None,
            },
        }
    }

    /// Every reference-valued field, in declaration order.
    pub fn reference_fields(&self) -> Vec<ReferenceField<'_>> {
        use SubmittableKind as K;
        match self {
            Self::Sample {
                sample_relationships,
            } => vec![ReferenceField::new(
                "sampleRelationships",
                K::Sample,
                sample_relationships.iter().map(|r| &r.reference),
            )],
            Self::Study { project_ref } => {
                vec![ReferenceField::new("projectRef", K::Project, project_ref)]
            }
            Self::Assay {
                study_ref,
                sample_uses,
                protocol_uses,
            } => vec![
                ReferenceField::new("studyRef", K::Study, study_ref),
                ReferenceField::new(
                    "sampleUses",
                    K::Sample,
                    sample_uses.iter().map(|u| &u.reference),
                ),
                ReferenceField::new("protocolUses", K::Protocol, protocol_uses),
            ],
            Self::AssayData {
                assay_refs,
                sample_refs,
                ..
            } => vec![
                ReferenceField::new("assayRefs", K::Assay, assay_refs),
                ReferenceField::new("sampleRefs", K::Sample, sample_refs),
            ],
            Self::Analysis {
                study_refs,
                sample_refs,
                assay_refs,
                assay_data_refs,
                analysis_refs,
                ..
            } => vec![
                ReferenceField::new("studyRefs", K::Study, study_refs),
                ReferenceField::new("sampleRefs", K::Sample, sample_refs),
                ReferenceField::new("assayRefs", K::Assay, assay_refs),
                ReferenceField::new("assayDataRefs", K::AssayData, assay_data_refs),
                ReferenceField::new("analysisRefs", K::Analysis, analysis_refs),
            ],
            Self::SampleGroup { sample_refs } => {
                vec![ReferenceField::new("sampleRefs", K::Sample, sample_refs)]
            }
            Self::EgaDacPolicy { dac_ref } => {
                vec![ReferenceField::new("dacRef", K::EgaDac, dac_ref)]
            }
            Self::EgaDataset { data_policy_ref } => vec![ReferenceField::new(
                "dataPolicyRef",
                K::EgaDacPolicy,
                data_policy_ref,
            )],
            Self::Project {} | Self::Protocol {} | Self::EgaDac {} => Vec::new(),
        }
    }

    /// Protocol uses declared by an assay; empty for every other kind.
    pub fn protocol_uses(&self) -> &[Reference] {
        match self {
            Self::Assay { protocol_uses, .. } => protocol_uses,
            _ => &[],
        }
    }

    pub fn files(&self) -> &[FileLink] {
        match self {
            Self::AssayData { files, .. } | Self::Analysis { files, .. } => files,
            _ => &[],
        }
    }
}

/// A draft metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submittable {
    pub id: Uuid,
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    pub submission_id: String,
    #[serde(default)]
    pub data_type_id: Option<String>,
    #[serde(default)]
    pub checklist_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub links: SubmittableLinks,
}

impl Submittable {
    /// New unaccessioned draft with no references.
    pub fn draft(
        kind: SubmittableKind,
        team: impl Into<String>,
        alias: impl Into<String>,
        submission_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            accession: None,
            alias: Some(alias.into()),
            team: Some(team.into()),
            submission_id: submission_id.into(),
            data_type_id: None,
            checklist_id: None,
            created_at: Utc::now(),
            attributes: BTreeMap::new(),
            links: SubmittableLinks::empty(kind),
        }
    }

    pub fn with_accession(mut self, accession: impl Into<String>) -> Self {
        self.accession = Some(accession.into());
        self
    }

    pub fn with_data_type(mut self, data_type_id: impl Into<String>) -> Self {
        self.data_type_id = Some(data_type_id.into());
        self
    }

    pub fn with_links(mut self, links: SubmittableLinks) -> Self {
        self.links = links;
        self
    }

    pub fn kind(&self) -> SubmittableKind {
        self.links.kind()
    }

    /// Accessioned records are published and visible across submissions.
    pub fn is_accessioned(&self) -> bool {
        non_empty(&self.accession).is_some()
    }

    /// Lightweight reference to this record, the way dependents declare it.
    pub fn to_reference(&self) -> TypedReference {
        let reference = if self.is_accessioned() {
            Reference {
                accession: self.accession.clone(),
                alias: None,
                team: None,
            }
        } else {
            Reference {
                accession: None,
                alias: self.alias.clone(),
                team: self.team.clone(),
            }
        };
        TypedReference {
            kind: self.kind(),
            reference,
        }
    }

    /// Whether a declared reference resolves to this record.
    pub fn answers_to(&self, declared: &Reference) -> bool {
        if let Some(accession) = non_empty(&declared.accession) {
            return non_empty(&self.accession) == Some(accession);
        }
        non_empty(&declared.alias).is_some()
            && non_empty(&declared.alias) == non_empty(&self.alias)
            && non_empty(&declared.team) == non_empty(&self.team)
    }

    /// Whether any reference field of this record points at `target`.
    pub fn references(&self, target: &TypedReference) -> bool {
        self.links.reference_fields().iter().any(|field| {
            field
                .references
                .iter()
                .any(|r| target.is_matched_by(field.target, r))
        })
    }

    /// Human label used in validation messages.
    pub fn label(&self) -> &str {
        non_empty(&self.alias)
            .or_else(|| non_empty(&self.accession))
            .unwrap_or("<unnamed>")
    }
}

/// Uploaded data file awaiting reference and content checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: Uuid,
    pub submission_id: String,
    pub filename: String,
    #[serde(default)]
    pub target_path: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}
