//! Learner profiles supplied by callers

use serde::{Deserialize, Serialize};

use super::concept::CognitiveLevel;

/// Caller-supplied learner characteristics that influence path scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_id: Option<String>,
    /// Cognitive level the learner is working towards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cognitive_level: Option<CognitiveLevel>,
}

impl LearnerProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_learner_id(mut self, learner_id: impl Into<String>) -> Self {
        self.learner_id = Some(learner_id.into());
        self
    }

    pub fn targeting(mut self, level: CognitiveLevel) -> Self {
        self.target_cognitive_level = Some(level);
        self
    }
}
