//! Durable mirror of the knowledge graph
//!
//! The in-memory graph is authoritative. A [`GraphStore`] is loaded once at
//! startup and afterwards receives every committed mutation through the
//! [`MirrorQueue`], which retries with backoff and dead-letters what it
//! cannot write. Nothing on the query path ever waits for the store.

mod memory;
pub mod migrations;
mod mirror;
mod seed;
mod sqlite;

pub use memory::InMemoryGraphStore;
pub use mirror::{DeadLetter, MirrorQueue, RetryPolicy};
pub use seed::GraphSeed;
pub use sqlite::SqliteGraphStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::knowledge::{Concept, LearningPattern, Relationship};
use crate::error::Result;

/// A concept together with its buffered outcome scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConcept {
    pub concept: Concept,
    /// Recent outcome scores, oldest first
    #[serde(default)]
    pub outcome_window: Vec<f64>,
}

impl StoredConcept {
    pub fn new(concept: Concept, outcome_window: Vec<f64>) -> Self {
        Self {
            concept,
            outcome_window,
        }
    }
}

/// Everything a store holds, as returned by [`GraphStore::load_all`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub concepts: Vec<StoredConcept>,
    pub relationships: Vec<Relationship>,
    pub patterns: Vec<LearningPattern>,
}

impl GraphSnapshot {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.relationships.is_empty() && self.patterns.is_empty()
    }
}

/// A committed change to be mirrored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Mutation {
    UpsertConcept(StoredConcept),
    UpsertRelationship(Relationship),
    UpsertPattern(LearningPattern),
}

impl Mutation {
    /// Short human-readable label, used in logs and events
    pub fn describe(&self) -> String {
        match self {
            Self::UpsertConcept(stored) => format!("concept {}", stored.concept.id),
            Self::UpsertRelationship(r) => {
                format!("relationship {} -[{}]-> {}", r.source, r.relationship_type, r.target)
            }
            Self::UpsertPattern(p) => format!("pattern {}", p.path_key()),
        }
    }
}

/// Durable graph store the in-memory graph is mirrored to
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Read the whole graph; called once at startup
    async fn load_all(&self) -> Result<GraphSnapshot>;

    async fn upsert_concept(&self, concept: &StoredConcept) -> Result<()>;

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<()>;

    async fn upsert_pattern(&self, pattern: &LearningPattern) -> Result<()>;

    /// Apply a single mirrored mutation
    async fn apply(&self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::UpsertConcept(concept) => self.upsert_concept(concept).await,
            Mutation::UpsertRelationship(relationship) => {
                self.upsert_relationship(relationship).await
            }
            Mutation::UpsertPattern(pattern) => self.upsert_pattern(pattern).await,
        }
    }
}
