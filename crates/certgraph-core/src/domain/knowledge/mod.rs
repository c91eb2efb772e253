//! Certification knowledge model
//!
//! - **Concept**: an atomic unit of certification-domain knowledge
//! - **Relationship**: a typed, weighted edge between two concepts
//! - **LearningPattern**: a concept sequence associated with high effectiveness
//! - **LearnerProfile**: caller-supplied learner characteristics
//! - **KnowledgeEvent**: notifications published after committed mutations

mod concept;
mod event;
mod pattern;
mod profile;
mod relationship;

pub use concept::{CognitiveLevel, Concept, ConceptDraft, ConceptType};
pub use event::KnowledgeEvent;
pub use pattern::{LearningPattern, PatternType, path_key};
pub use profile::LearnerProfile;
pub use relationship::{
    Relationship, RelationshipDraft, RelationshipKey, RelationshipMetadata, RelationshipType,
};
