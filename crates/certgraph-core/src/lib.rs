//! Certgraph Core Library
//!
//! This crate provides the core functionality for Certgraph, including:
//! - Concept graph (concepts, typed relationships, prerequisite DAG)
//! - Learning path discovery and scoring
//! - Next-concept recommendations
//! - Outcome-driven effectiveness tracking
//! - Pattern mining over high-effectiveness sequences
//! - Persistence (SQLite mirror with retry and dead-letter JSONL)

pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod learning;
pub mod path;
pub mod persistence;
pub mod recommend;
pub mod service;

pub use error::{Error, Result};
pub use service::{GraphStats, KnowledgeGraph, PathRequest, SeedReport, StorageMode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::knowledge::{
        CognitiveLevel, Concept, ConceptDraft, ConceptType, KnowledgeEvent, LearnerProfile,
        LearningPattern, Relationship, RelationshipDraft, RelationshipType,
    };
    pub use crate::error::{Error, Result};
    pub use crate::graph::{SubmitOutcome, TraversalDirection};
    pub use crate::path::{LearningPath, PathOutcome};
    pub use crate::persistence::{GraphSeed, GraphStore, SqliteGraphStore};
    pub use crate::recommend::Recommendation;
    pub use crate::service::{KnowledgeGraph, PathRequest, StorageMode};
}
