//! Learning patterns discovered from outcome history

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A concept sequence empirically associated with high effectiveness
///
/// Patterns are append-only and only ever created by the pattern miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPattern {
    pub id: String,
    pub pattern_type: PatternType,
    /// Ordered concept ids, learnable front to back
    pub sequence: Vec<String>,
    /// Effectiveness observed when the pattern was mined (0.0 to 1.0)
    pub effectiveness: f64,
    pub context: BTreeMap<String, serde_json::Value>,
    pub discovered_at: DateTime<Utc>,
    pub usage_count: u64,
}

impl LearningPattern {
    pub fn new(pattern_type: PatternType, sequence: Vec<String>, effectiveness: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pattern_type,
            sequence,
            effectiveness: effectiveness.clamp(0.0, 1.0),
            context: BTreeMap::new(),
            discovered_at: Utc::now(),
            usage_count: 0,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Key under which this pattern's effectiveness is looked up for paths
    pub fn path_key(&self) -> String {
        path_key(&self.sequence)
    }
}

/// Canonical key of a concept sequence
pub fn path_key<S: AsRef<str>>(sequence: &[S]) -> String {
    sequence
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join("->")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Transitive prerequisites of a concept followed by the concept
    PrerequisiteSequence,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrerequisiteSequence => "prerequisite_sequence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prerequisite_sequence" => Some(Self::PrerequisiteSequence),
            _ => None,
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_key() {
        let pattern = LearningPattern::new(
            PatternType::PrerequisiteSequence,
            vec!["a".into(), "b".into(), "c".into()],
            1.3,
        )
        .with_context("trigger", serde_json::json!("c"));

        assert_eq!(pattern.path_key(), "a->b->c");
        assert_eq!(pattern.effectiveness, 1.0);
        assert_eq!(pattern.context.len(), 1);
        assert_eq!(path_key(&["x"]), "x");
    }

    #[test]
    fn test_pattern_type_roundtrip() {
        let t = PatternType::PrerequisiteSequence;
        assert_eq!(PatternType::parse(t.as_str()), Some(t));
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            "\"prerequisite_sequence\""
        );
    }
}
