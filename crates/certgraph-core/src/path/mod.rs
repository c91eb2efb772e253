//! Learning path discovery and scoring

mod finder;
mod scorer;

pub use finder::{PathFinder, is_valid};
pub use scorer::{PathScorer, ScoreBreakdown, weighted_mean};

use serde::{Deserialize, Serialize};

use crate::graph::{GraphState, NodeIdx};

/// Whether a learning path could be built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathOutcome {
    Found,
    /// No learnable sequence leads to the target; the path is empty
    Unreachable,
}

/// Result of a learning path query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub concept_ids: Vec<String>,
    pub score: f64,
    /// Whether the prerequisite fallback produced this path
    pub used_fallback: bool,
    pub outcome: PathOutcome,
    pub breakdown: ScoreBreakdown,
}

impl LearningPath {
    pub fn unreachable() -> Self {
        Self {
            concept_ids: Vec::new(),
            score: 0.0,
            used_fallback: false,
            outcome: PathOutcome::Unreachable,
            breakdown: ScoreBreakdown::default(),
        }
    }

    fn found(graph: &GraphState, path: Vec<NodeIdx>, breakdown: ScoreBreakdown, used_fallback: bool) -> Self {
        Self {
            concept_ids: path.into_iter().map(|i| graph.id_of(i).to_string()).collect(),
            score: breakdown.score,
            used_fallback,
            outcome: PathOutcome::Found,
            breakdown,
        }
    }

    pub fn is_found(&self) -> bool {
        self.outcome == PathOutcome::Found
    }
}
