//! Reference Types
//!
//! A reference points at another submittable either by accession or by
//! (team, alias). Accession wins whenever it is present and non-empty.

use serde::{Deserialize, Serialize};

use crate::submittable::SubmittableKind;

/// Pointer to another submittable as declared on an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

/// How a reference is looked up
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceKey {
    Accession(String),
    TeamAlias { team: String, alias: String },
}

impl Reference {
    pub fn by_accession(accession: impl Into<String>) -> Self {
        Self {
            accession: Some(accession.into()),
            alias: None,
            team: None,
        }
    }

    pub fn by_alias(team: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            accession: None,
            alias: Some(alias.into()),
            team: Some(team.into()),
        }
    }

    /// Accession if present and non-empty, otherwise (team, alias) when both are set.
    pub fn key(&self) -> Option<ReferenceKey> {
        if let Some(accession) = non_empty(&self.accession) {
            return Some(ReferenceKey::Accession(accession.to_string()));
        }
        match (non_empty(&self.team), non_empty(&self.alias)) {
            (Some(team), Some(alias)) => Some(ReferenceKey::TeamAlias {
                team: team.to_string(),
                alias: alias.to_string(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accession(accession) => write!(f, "accession {}", accession),
            Self::TeamAlias { team, alias } => write!(f, "alias {} in team {}", alias, team),
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.key() {
            Some(key) => write!(f, "{}", key),
            None => write!(f, "an empty reference"),
        }
    }
}

/// A reference tagged with the kind of submittable it points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedReference {
    pub kind: SubmittableKind,
    #[serde(flatten)]
    pub reference: Reference,
}

impl TypedReference {
    /// Whether a declared reference of the same kind points at the same target.
    ///
    /// Accessioned targets match on accession only; drafts match on (team, alias).
    pub fn is_matched_by(&self, kind: SubmittableKind, declared: &Reference) -> bool {
        if kind != self.kind {
            return false;
        }
        if let Some(accession) = non_empty(&self.reference.accession) {
            return non_empty(&declared.accession) == Some(accession);
        }
        match (non_empty(&self.reference.team), non_empty(&self.reference.alias)) {
            (Some(team), Some(alias)) => {
                non_empty(&declared.accession).is_none()
                    && non_empty(&declared.team) == Some(team)
                    && non_empty(&declared.alias) == Some(alias)
            }
            _ => false,
        }
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
