//! Pattern mining
//!
//! A mining pass looks at one concept that has just become due (enough
//! samples, effectiveness at or above the threshold) and emits a
//! `prerequisite_sequence` pattern: the concept's transitive prerequisites in
//! learnable order followed by the concept itself. Passes run on a background
//! worker owned by the facade; this module holds the pure parts.

use std::collections::HashMap;

use tracing::debug;

use crate::config::LearningConfig;
use crate::domain::knowledge::{LearnerProfile, LearningPattern, PatternType, path_key};
use crate::error::{Error, Result};
use crate::graph::GraphState;

/// Request for a mining pass over one concept
#[derive(Debug, Clone)]
pub struct MiningJob {
    pub concept_id: String,
    /// Profile of the learner whose outcome triggered the pass
    pub profile: Option<LearnerProfile>,
}

/// Append-only collection of discovered patterns, keyed by sequence
#[derive(Debug, Default)]
pub struct PatternBook {
    patterns: Vec<LearningPattern>,
    by_key: HashMap<String, usize>,
}

impl PatternBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern unless one with the same sequence already exists
    pub fn insert(&mut self, pattern: LearningPattern) -> bool {
        let key = pattern.path_key();
        if self.by_key.contains_key(&key) {
            return false;
        }
        self.by_key.insert(key, self.patterns.len());
        self.patterns.push(pattern);
        true
    }

    /// Recorded effectiveness of an exact concept sequence
    pub fn effectiveness_for(&self, key: &str) -> Option<f64> {
        self.by_key.get(key).map(|&i| self.patterns[i].effectiveness)
    }

    pub fn patterns(&self) -> &[LearningPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Detects concept sequences associated with high effectiveness
#[derive(Debug, Clone)]
pub struct PatternMiner {
    config: LearningConfig,
}

impl PatternMiner {
    pub fn new(config: LearningConfig) -> Self {
        Self { config }
    }

    /// Run one mining pass against a graph snapshot
    ///
    /// Returns `Ok(None)` when the concept no longer qualifies, which happens
    /// when further outcomes arrived between scheduling and running.
    pub fn mine(&self, graph: &GraphState, job: &MiningJob) -> Result<Option<LearningPattern>> {
        let idx = graph.index_of(&job.concept_id).ok_or_else(|| {
            Error::PatternMiningFailed(format!("Concept '{}' is not in the graph", job.concept_id))
        })?;
        let stats = &graph.node(idx).stats;

        let score = stats.score();
        let samples = stats.sample_count();
        if samples < self.config.min_samples_for_mining || score < self.config.pattern_threshold {
            debug!(
                concept_id = %job.concept_id,
                score,
                samples,
                "Concept does not qualify for a pattern"
            );
            return Ok(None);
        }

        // Direct prerequisites in declared order, then the concept itself
        let mut sequence: Vec<String> = graph
            .prerequisite_ids(idx)
            .into_iter()
            .map(str::to_string)
            .collect();
        sequence.push(job.concept_id.clone());

        let mut pattern = LearningPattern::new(PatternType::PrerequisiteSequence, sequence, score)
            .with_context("trigger_concept", serde_json::json!(job.concept_id))
            .with_context("samples", serde_json::json!(samples));
        if let Some(profile) = &job.profile {
            if let Some(level) = profile.target_cognitive_level {
                pattern = pattern.with_context("cognitive_level", serde_json::json!(level));
            }
            if let Some(learner) = &profile.learner_id {
                pattern = pattern.with_context("learner_id", serde_json::json!(learner));
            }
        }

        debug!(key = %path_key(&pattern.sequence), "Mined pattern candidate");
        Ok(Some(pattern))
    }
}
