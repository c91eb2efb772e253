//! Relationships between concepts
//!
//! Relationships are directed edges keyed by `(source, target, type)`. Several
//! types may connect the same pair. `Prerequisite` edges additionally take
//! part in the acyclic prerequisite subgraph.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Unique key of a relationship
pub type RelationshipKey = (String, String, RelationshipType);

/// A directed relationship between two concepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    /// Strength of the relationship (0.0 to 1.0)
    pub strength: f64,
    /// Number of independent observations backing this edge (at least 1)
    pub evidence_count: u32,
    pub metadata: RelationshipMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fingerprints of every draft folded into this edge
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub draft_fingerprints: Vec<String>,
}

impl Relationship {
    /// Materialize a validated draft
    pub fn from_draft(draft: RelationshipDraft) -> Self {
        let now = Utc::now();
        let fingerprint = draft.fingerprint();
        Self {
            source: draft.source,
            target: draft.target,
            relationship_type: draft.relationship_type,
            strength: draft.strength,
            evidence_count: draft.evidence_count,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
            draft_fingerprints: vec![fingerprint],
        }
    }

    pub fn key(&self) -> RelationshipKey {
        (
            self.source.clone(),
            self.target.clone(),
            self.relationship_type,
        )
    }

    /// Whether a draft was already folded into this relationship
    ///
    /// True for any previously absorbed draft, or for a draft that restates
    /// the current aggregate exactly.
    pub fn matches_draft(&self, draft: &RelationshipDraft) -> bool {
        let restates_aggregate = self.source == draft.source
            && self.target == draft.target
            && self.relationship_type == draft.relationship_type
            && self.strength == draft.strength
            && self.evidence_count == draft.evidence_count
            && self.metadata == draft.metadata;
        restates_aggregate || self.draft_fingerprints.contains(&draft.fingerprint())
    }

    /// Fold further evidence for the same key into this relationship
    ///
    /// Strength becomes the evidence-weighted mean of both observations.
    /// Returns the previous strength.
    pub fn absorb(&mut self, draft: &RelationshipDraft) -> f64 {
        let old_strength = self.strength;
        let existing = self.evidence_count as f64;
        let incoming = draft.evidence_count as f64;

        self.strength = ((old_strength * existing + draft.strength * incoming)
            / (existing + incoming))
            .clamp(0.0, 1.0);
        self.evidence_count = self.evidence_count.saturating_add(draft.evidence_count);
        self.metadata.merge(&draft.metadata);
        self.updated_at = Utc::now();
        self.draft_fingerprints.push(draft.fingerprint());

        old_strength
    }

    /// Check if this relationship is bidirectional
    pub fn is_bidirectional(&self) -> bool {
        self.relationship_type.is_bidirectional()
    }
}

/// Ingestion payload for a relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDraft {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", alias = "relationship_type")]
    pub relationship_type: RelationshipType,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default = "default_evidence")]
    pub evidence_count: u32,
    #[serde(default)]
    pub metadata: RelationshipMetadata,
}

fn default_strength() -> f64 {
    0.5
}

fn default_evidence() -> u32 {
    1
}

impl RelationshipDraft {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship_type,
            strength: default_strength(),
            evidence_count: default_evidence(),
            metadata: RelationshipMetadata::default(),
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_evidence_count(mut self, count: u32) -> Self {
        self.evidence_count = count;
        self
    }

    pub fn with_metadata(mut self, metadata: RelationshipMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Content hash over every field of the draft
    ///
    /// Strength is hashed by its bit pattern, so `0.5` and `0.50000001`
    /// differ.
    pub fn fingerprint(&self) -> String {
        let strength = format!("{:016x}", self.strength.to_bits());
        let evidence = self.evidence_count.to_string();
        let metadata = serde_json::to_string(&self.metadata).unwrap_or_default();

        let mut hasher = Sha256::new();
        let parts: [&str; 6] = [
            &self.source,
            &self.target,
            self.relationship_type.as_str(),
            &strength,
            &evidence,
            &metadata,
        ];
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0x1f_u8]);
        }
        hex::encode(hasher.finalize())
    }

    pub fn validate(mut self) -> Result<Self> {
        self.source = self.source.trim().to_string();
        self.target = self.target.trim().to_string();

        if self.source.is_empty() || self.target.is_empty() {
            return Err(Error::InvalidInput(
                "Relationship endpoints cannot be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(Error::InvalidInput(format!(
                "Relationship {} -> {} strength {} is outside [0, 1]",
                self.source, self.target, self.strength
            )));
        }
        if self.evidence_count == 0 {
            return Err(Error::InvalidInput(format!(
                "Relationship {} -> {} needs at least one piece of evidence",
                self.source, self.target
            )));
        }
        if let Some(confidence) = self.metadata.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(Error::InvalidInput(format!(
                    "Relationship {} -> {} metadata confidence is outside [0, 1]",
                    self.source, self.target
                )));
            }
        }
        if self.relationship_type == RelationshipType::Prerequisite && self.source == self.target {
            return Err(Error::CycleDetected {
                from: self.source.clone(),
                to: self.target.clone(),
            });
        }
        Ok(self)
    }
}

/// Relationship metadata: recognized fields plus an open extension map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    /// Document the relationship was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
    /// Free-text justification from the extractor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Extractor confidence (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl RelationshipMetadata {
    pub fn with_source_document(mut self, document: impl Into<String>) -> Self {
        self.source_document = Some(document.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Merge newer metadata over this one; fields present in `other` win
    pub fn merge(&mut self, other: &RelationshipMetadata) {
        if other.source_document.is_some() {
            self.source_document = other.source_document.clone();
        }
        if other.rationale.is_some() {
            self.rationale = other.rationale.clone();
        }
        if other.confidence.is_some() {
            self.confidence = other.confidence;
        }
        for (key, value) in &other.extensions {
            self.extensions.insert(key.clone(), value.clone());
        }
    }
}

/// Types of relationships between concepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Source must be learned before target
    Prerequisite,
    /// Target extends what source teaches
    BuildsOn,
    /// Source is a component of target
    PartOf,
    /// Source is applied in target
    AppliesTo,
    /// Source is similar to target (bidirectional)
    SimilarTo,
    /// Source is commonly confused with target (bidirectional)
    ContrastsWith,
    /// Generic association (bidirectional)
    RelatedTo,
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prerequisite => "prerequisite",
            Self::BuildsOn => "builds_on",
            Self::PartOf => "part_of",
            Self::AppliesTo => "applies_to",
            Self::SimilarTo => "similar_to",
            Self::ContrastsWith => "contrasts_with",
            Self::RelatedTo => "related_to",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "prerequisite" | "prereq" | "requires" => Some(Self::Prerequisite),
            "builds_on" | "buildson" => Some(Self::BuildsOn),
            "part_of" | "partof" => Some(Self::PartOf),
            "applies_to" | "appliesto" => Some(Self::AppliesTo),
            "similar_to" | "similarto" => Some(Self::SimilarTo),
            "contrasts_with" | "contrastswith" => Some(Self::ContrastsWith),
            "related_to" | "relatedto" => Some(Self::RelatedTo),
            _ => None,
        }
    }

    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::Prerequisite,
            Self::BuildsOn,
            Self::PartOf,
            Self::AppliesTo,
            Self::SimilarTo,
            Self::ContrastsWith,
            Self::RelatedTo,
        ]
    }

    /// Check if this relationship type is bidirectional
    pub fn is_bidirectional(&self) -> bool {
        matches!(self, Self::SimilarTo | Self::ContrastsWith | Self::RelatedTo)
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
