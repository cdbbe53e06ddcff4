//! Reference data catalog
//!
//! DataTypes and Checklists loaded once from YAML and served read-only.
//!
//! ```yaml
//! data_types:
//!   - id: ena-study
//!     display_name: ENA study
//!     submittable_kind: Study
//!     required_validation_authors: [Core, JsonSchema]
//!     optional_validation_authors: [Ena]
//! checklists:
//!   - id: ena-study-checklist
//!     data_type_id: ena-study
//!     display_name: ENA study checklist
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::data_type::{Checklist, DataType};
use crate::ports::ReferenceDataStore;

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    data_types: Vec<DataType>,
    #[serde(default)]
    checklists: Vec<Checklist>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceDataCatalog {
    data_types: HashMap<String, DataType>,
    checklists: HashMap<String, Checklist>,
}

impl ReferenceDataCatalog {
    pub fn new(data_types: Vec<DataType>, checklists: Vec<Checklist>) -> Self {
        Self {
            data_types: data_types.into_iter().map(|dt| (dt.id.clone(), dt)).collect(),
            checklists: checklists.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    /// Load the catalog from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading reference data from {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Load the catalog from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        let catalog = Self::new(file.data_types, file.checklists);
        catalog.check_checklists()?;
        Ok(catalog)
    }

    pub fn data_type_count(&self) -> usize {
        self.data_types.len()
    }

    pub fn checklist_count(&self) -> usize {
        self.checklists.len()
    }

    /// Every checklist must specialise a DataType known to the catalog.
    fn check_checklists(&self) -> Result<()> {
        for checklist in self.checklists.values() {
            if !self.data_types.contains_key(&checklist.data_type_id) {
                anyhow::bail!(
                    "checklist {} refers to unknown data type {}",
                    checklist.id,
                    checklist.data_type_id
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceDataStore for ReferenceDataCatalog {
    async fn find_data_type(&self, id: &str) -> Result<Option<DataType>> {
        Ok(self.data_types.get(id).cloned())
    }

    async fn find_checklist(&self, id: &str) -> Result<Option<Checklist>> {
        Ok(self.checklists.get(id).cloned())
    }
}
