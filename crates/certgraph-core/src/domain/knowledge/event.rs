//! Domain events for the knowledge graph
//!
//! Events are published after the in-memory mutation has committed. They are
//! informational: nothing in the graph depends on anyone receiving them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::concept::ConceptType;
use super::relationship::RelationshipType;

/// Events that can occur in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum KnowledgeEvent {
    /// A new concept was ingested
    ConceptCreated {
        concept_id: String,
        concept_type: ConceptType,
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// A new relationship was ingested
    RelationshipCreated {
        source: String,
        target: String,
        relationship_type: RelationshipType,
        timestamp: DateTime<Utc>,
    },
    /// Further evidence was merged into an existing relationship
    RelationshipStrengthened {
        source: String,
        target: String,
        relationship_type: RelationshipType,
        old_strength: f64,
        new_strength: f64,
        timestamp: DateTime<Utc>,
    },
    /// A learner outcome was folded into a concept's effectiveness
    OutcomeRecorded {
        concept_id: String,
        success: bool,
        effectiveness_score: f64,
        samples: usize,
        timestamp: DateTime<Utc>,
    },
    /// The pattern miner emitted a new pattern
    PatternDiscovered {
        pattern_id: String,
        sequence: Vec<String>,
        effectiveness: f64,
        timestamp: DateTime<Utc>,
    },
    /// A mirror write exhausted its retries
    MutationDeadLettered {
        mutation: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl KnowledgeEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ConceptCreated { timestamp, .. }
            | Self::RelationshipCreated { timestamp, .. }
            | Self::RelationshipStrengthened { timestamp, .. }
            | Self::OutcomeRecorded { timestamp, .. }
            | Self::PatternDiscovered { timestamp, .. }
            | Self::MutationDeadLettered { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::ConceptCreated { .. } => "concept_created",
            Self::RelationshipCreated { .. } => "relationship_created",
            Self::RelationshipStrengthened { .. } => "relationship_strengthened",
            Self::OutcomeRecorded { .. } => "outcome_recorded",
            Self::PatternDiscovered { .. } => "pattern_discovered",
            Self::MutationDeadLettered { .. } => "mutation_dead_lettered",
        }
    }

    /// Get the primary concept id for this event, if any
    pub fn concept_id(&self) -> Option<&str> {
        match self {
            Self::ConceptCreated { concept_id, .. } | Self::OutcomeRecorded { concept_id, .. } => {
                Some(concept_id)
            }
            Self::RelationshipCreated { target, .. }
            | Self::RelationshipStrengthened { target, .. } => Some(target),
            Self::PatternDiscovered { sequence, .. } => sequence.last().map(String::as_str),
            Self::MutationDeadLettered { .. } => None,
        }
    }

    pub fn concept_created(
        concept_id: impl Into<String>,
        concept_type: ConceptType,
        name: impl Into<String>,
    ) -> Self {
        Self::ConceptCreated {
            concept_id: concept_id.into(),
            concept_type,
            name: name.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn relationship_created(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self::RelationshipCreated {
            source: source.into(),
            target: target.into(),
            relationship_type,
            timestamp: Utc::now(),
        }
    }
}
