//! JSON seed files
//!
//! A seed is the ingestion payload for a whole graph:
//!
//! ```json
//! {
//!   "concepts": [{"id": "iam", "name": "IAM", "type": "fundamental"}],
//!   "relationships": [{"source": "iam", "target": "iam-roles", "type": "prerequisite"}]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::knowledge::{ConceptDraft, RelationshipDraft};
use crate::error::{Error, Result};

/// Concepts and relationships to ingest, in submission order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSeed {
    #[serde(default)]
    pub concepts: Vec<ConceptDraft>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDraft>,
}

impl GraphSeed {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::PersistenceUnavailable(format!("Failed to read seed {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.relationships.is_empty()
    }
}
