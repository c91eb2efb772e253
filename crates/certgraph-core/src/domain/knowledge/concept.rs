//! Concept types for the certification knowledge graph
//!
//! Concepts are the nodes of the graph. They arrive as [`ConceptDraft`]s from
//! the ingestion collaborator and become immutable [`Concept`] records; only
//! the effectiveness statistics change afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A concept as seen by readers of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Stable identifier supplied by ingestion
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Kind of knowledge this concept represents
    pub concept_type: ConceptType,
    pub description: String,
    /// Bloom level a learner works at when studying this concept
    pub cognitive_level: CognitiveLevel,
    /// Difficulty (0.0 to 1.0)
    pub difficulty: f64,
    /// Declared prerequisite concept ids, in declaration order, without duplicates
    pub prerequisites: Vec<String>,
    /// Expected study time, always positive
    pub learning_time_minutes: f64,
    /// Rolling effectiveness (0.0 to 1.0)
    pub effectiveness_score: f64,
    /// Number of recorded outcomes
    pub usage_count: u64,
    /// Opaque embedding vector
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    /// Materialize a validated draft
    pub fn from_draft(draft: ConceptDraft, default_effectiveness: f64) -> Self {
        let now = Utc::now();
        Self {
            id: draft.id,
            name: draft.name,
            concept_type: draft.concept_type,
            description: draft.description,
            cognitive_level: draft.cognitive_level,
            difficulty: draft.difficulty,
            prerequisites: draft.prerequisites,
            learning_time_minutes: draft.learning_time_minutes,
            effectiveness_score: default_effectiveness.clamp(0.0, 1.0),
            usage_count: 0,
            embedding: draft.embedding,
            created_at: now,
            updated_at: now,
        }
    }

    /// The ingestion payload this concept was created from
    pub fn to_draft(&self) -> ConceptDraft {
        ConceptDraft {
            id: self.id.clone(),
            name: self.name.clone(),
            concept_type: self.concept_type,
            description: self.description.clone(),
            cognitive_level: self.cognitive_level,
            difficulty: self.difficulty,
            prerequisites: self.prerequisites.clone(),
            learning_time_minutes: self.learning_time_minutes,
            embedding: self.embedding.clone(),
        }
    }
}

/// Ingestion payload for a concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptDraft {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", alias = "concept_type")]
    pub concept_type: ConceptType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cognitive_level: CognitiveLevel,
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default = "default_learning_time")]
    pub learning_time_minutes: f64,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn default_difficulty() -> f64 {
    0.5
}

fn default_learning_time() -> f64 {
    30.0
}

impl ConceptDraft {
    /// Create a draft with neutral defaults
    pub fn new(id: impl Into<String>, name: impl Into<String>, concept_type: ConceptType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            concept_type,
            description: String::new(),
            cognitive_level: CognitiveLevel::default(),
            difficulty: default_difficulty(),
            prerequisites: Vec::new(),
            learning_time_minutes: default_learning_time(),
            embedding: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cognitive_level(mut self, level: CognitiveLevel) -> Self {
        self.cognitive_level = level;
        self
    }

    pub fn with_difficulty(mut self, difficulty: f64) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_learning_time(mut self, minutes: f64) -> Self {
        self.learning_time_minutes = minutes;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Validate and normalize the draft
    ///
    /// Duplicate prerequisite ids are dropped, keeping the first occurrence.
    /// A concept listing itself as a prerequisite is a one-node cycle.
    pub fn validate(mut self) -> Result<Self> {
        self.id = self.id.trim().to_string();
        if self.id.is_empty() {
            return Err(Error::InvalidInput("Concept id cannot be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput(format!("Concept '{}' has an empty name", self.id)));
        }
        if !(0.0..=1.0).contains(&self.difficulty) {
            return Err(Error::InvalidInput(format!(
                "Concept '{}' difficulty {} is outside [0, 1]",
                self.id, self.difficulty
            )));
        }
        if !(self.learning_time_minutes > 0.0) || !self.learning_time_minutes.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Concept '{}' learning time must be positive",
                self.id
            )));
        }
        if let Some(embedding) = &self.embedding {
            if embedding.is_empty() || embedding.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidInput(format!(
                    "Concept '{}' embedding must be non-empty and finite",
                    self.id
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        let mut prerequisites = Vec::with_capacity(self.prerequisites.len());
        for prereq in self.prerequisites.drain(..) {
            let prereq = prereq.trim().to_string();
            if prereq.is_empty() {
                continue;
            }
            if prereq == self.id {
                return Err(Error::CycleDetected {
                    from: prereq,
                    to: self.id.clone(),
                });
            }
            if seen.insert(prereq.clone()) {
                prerequisites.push(prereq);
            }
        }
        self.prerequisites = prerequisites;

        Ok(self)
    }
}

/// Kinds of certification-domain concepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptType {
    Fundamental,
    Derived,
    Applied,
    Abstract,
    Concrete,
    Procedural,
    Metacognitive,
}

impl ConceptType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fundamental => "fundamental",
            Self::Derived => "derived",
            Self::Applied => "applied",
            Self::Abstract => "abstract",
            Self::Concrete => "concrete",
            Self::Procedural => "procedural",
            Self::Metacognitive => "metacognitive",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fundamental" => Some(Self::Fundamental),
            "derived" => Some(Self::Derived),
            "applied" => Some(Self::Applied),
            "abstract" => Some(Self::Abstract),
            "concrete" => Some(Self::Concrete),
            "procedural" => Some(Self::Procedural),
            "metacognitive" => Some(Self::Metacognitive),
            _ => None,
        }
    }

    /// Get all concept types
    pub fn all() -> &'static [ConceptType] {
        &[
            Self::Fundamental,
            Self::Derived,
            Self::Applied,
            Self::Abstract,
            Self::Concrete,
            Self::Procedural,
            Self::Metacognitive,
        ]
    }
}

impl std::fmt::Display for ConceptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bloom's taxonomy levels, lowest first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveLevel {
    Remember,
    #[default]
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl CognitiveLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remember => "remember",
            Self::Understand => "understand",
            Self::Apply => "apply",
            Self::Analyze => "analyze",
            Self::Evaluate => "evaluate",
            Self::Create => "create",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "remember" | "knowledge" => Some(Self::Remember),
            "understand" | "comprehension" => Some(Self::Understand),
            "apply" | "application" => Some(Self::Apply),
            "analyze" | "analyse" | "analysis" => Some(Self::Analyze),
            "evaluate" | "evaluation" => Some(Self::Evaluate),
            "create" | "synthesis" => Some(Self::Create),
            _ => None,
        }
    }
}

impl std::fmt::Display for CognitiveLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_builder_and_materialize() {
        let draft = ConceptDraft::new("iam-roles", "IAM Roles", ConceptType::Fundamental)
            .with_description("Identity delegation")
            .with_difficulty(0.3)
            .with_prerequisites(["iam-basics"])
            .with_learning_time(45.0);

        let concept = Concept::from_draft(draft.clone().validate().unwrap(), 0.8);

        assert_eq!(concept.id, "iam-roles");
        assert_eq!(concept.effectiveness_score, 0.8);
        assert_eq!(concept.usage_count, 0);
        assert_eq!(concept.prerequisites, vec!["iam-basics".to_string()]);
        assert_eq!(concept.to_draft(), draft);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let too_hard = ConceptDraft::new("a", "A", ConceptType::Applied).with_difficulty(1.2);
        assert!(matches!(too_hard.validate(), Err(Error::InvalidInput(_))));

        let no_time = ConceptDraft::new("a", "A", ConceptType::Applied).with_learning_time(0.0);
        assert!(matches!(no_time.validate(), Err(Error::InvalidInput(_))));

        let nameless = ConceptDraft::new("a", "  ", ConceptType::Applied);
        assert!(matches!(nameless.validate(), Err(Error::InvalidInput(_))));

        let nan_embedding =
            ConceptDraft::new("a", "A", ConceptType::Applied).with_embedding(vec![f32::NAN]);
        assert!(matches!(nan_embedding.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_dedupes_prerequisites_in_order() {
        let draft = ConceptDraft::new("c", "C", ConceptType::Derived)
            .with_prerequisites(["b", "a", "b", " a ", ""]);

        let validated = draft.validate().unwrap();
        assert_eq!(validated.prerequisites, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_self_prerequisite_is_a_cycle() {
        let draft = ConceptDraft::new("loop", "Loop", ConceptType::Abstract).with_prerequisites(["loop"]);
        assert!(matches!(draft.validate(), Err(Error::CycleDetected { .. })));
    }

    #[test]
    fn test_draft_deserializes_with_defaults() {
        let json = r#"{"id": "vpc", "name": "VPC", "type": "concrete"}"#;
        let draft: ConceptDraft = serde_json::from_str(json).unwrap();

        assert_eq!(draft.concept_type, ConceptType::Concrete);
        assert_eq!(draft.cognitive_level, CognitiveLevel::Understand);
        assert_eq!(draft.difficulty, 0.5);
        assert_eq!(draft.learning_time_minutes, 30.0);
        assert!(draft.prerequisites.is_empty());
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!(ConceptType::parse("PROCEDURAL"), Some(ConceptType::Procedural));
        assert_eq!(ConceptType::parse("unknown"), None);
        assert_eq!(ConceptType::all().len(), 7);

        assert_eq!(CognitiveLevel::parse("analysis"), Some(CognitiveLevel::Analyze));
        assert!(CognitiveLevel::Remember < CognitiveLevel::Create);
    }
}
