//! Path scoring
//!
//! A path's score is the weighted mean of whichever factors have data. A
//! factor with nothing to say is left out rather than counted as zero, so a
//! short or freshly ingested path is not penalised for missing history.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::domain::knowledge::{LearnerProfile, path_key};
use crate::graph::{GraphState, NodeIdx};
use crate::learning::PatternBook;

/// Per-factor contributions to a path score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Effectiveness recorded for this exact sequence by the pattern miner
    pub historical_effectiveness: Option<f64>,
    /// `1 - stddev` of consecutive difficulty deltas
    pub difficulty_progression: Option<f64>,
    /// Mean strength of the hops along the path
    pub relationship_strength: Option<f64>,
    /// Share of concepts at the learner's target cognitive level
    pub profile_alignment: f64,
    /// Weighted mean of the factors above
    pub score: f64,
}

/// Pure scoring function for candidate paths
#[derive(Debug, Clone)]
pub struct PathScorer {
    config: ScoringConfig,
}

impl PathScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(
        &self,
        graph: &GraphState,
        path: &[NodeIdx],
        profile: Option<&LearnerProfile>,
        patterns: &PatternBook,
    ) -> ScoreBreakdown {
        let ids: Vec<&str> = path.iter().map(|&i| graph.id_of(i)).collect();

        let historical_effectiveness = patterns.effectiveness_for(&path_key(&ids));
        let difficulty_progression = self.difficulty_progression(graph, path);
        let relationship_strength = self.relationship_strength(graph, path);
        let profile_alignment = self.profile_alignment(graph, path, profile);

        let score = weighted_mean(&[
            (historical_effectiveness, self.config.historical_weight),
            (difficulty_progression, self.config.progression_weight),
            (relationship_strength, self.config.strength_weight),
            (Some(profile_alignment), self.config.alignment_weight),
        ]);

        ScoreBreakdown {
            historical_effectiveness,
            difficulty_progression,
            relationship_strength,
            profile_alignment,
            score,
        }
    }

    fn difficulty_progression(&self, graph: &GraphState, path: &[NodeIdx]) -> Option<f64> {
        if path.len() < 2 {
            return None;
        }
        let deltas: Vec<f64> = path
            .windows(2)
            .map(|w| graph.node(w[1]).concept.difficulty - graph.node(w[0]).concept.difficulty)
            .collect();
        let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
        let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / deltas.len() as f64;
        Some((1.0 - variance.sqrt()).clamp(0.0, 1.0))
    }

    /// Hops without an explicit relationship (declared prerequisites and
    /// fallback jumps) count at the neutral strength
    fn relationship_strength(&self, graph: &GraphState, path: &[NodeIdx]) -> Option<f64> {
        if path.len() < 2 {
            return None;
        }
        let total: f64 = path
            .windows(2)
            .map(|w| {
                graph
                    .edge_strength(w[0], w[1])
                    .unwrap_or(self.config.neutral_strength)
            })
            .sum();
        Some(total / (path.len() - 1) as f64)
    }

    fn profile_alignment(
        &self,
        graph: &GraphState,
        path: &[NodeIdx],
        profile: Option<&LearnerProfile>,
    ) -> f64 {
        let Some(level) = profile.and_then(|p| p.target_cognitive_level) else {
            return 0.5;
        };
        if path.is_empty() {
            return 0.5;
        }
        let matching = path
            .iter()
            .filter(|&&i| graph.node(i).concept.cognitive_level == level)
            .count();
        matching as f64 / path.len() as f64
    }
}

/// Weighted mean over the factors that are present
///
/// Returns 0.0 when no factor carries weight.
pub fn weighted_mean(factors: &[(Option<f64>, f64)]) -> f64 {
    let (sum, weight) = factors
        .iter()
        .filter_map(|(value, weight)| value.map(|v| (v, *weight)))
        .filter(|(_, weight)| *weight > 0.0)
        .fold((0.0, 0.0), |(sum, total), (v, w)| (sum + v * w, total + w));
    if weight > 0.0 { sum / weight } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{
        CognitiveLevel, ConceptDraft, ConceptType, LearningPattern, PatternType, RelationshipDraft,
        RelationshipType,
    };
    use crate::learning::ConceptStats;

    fn graph() -> GraphState {
        let mut graph = GraphState::default();
        for (id, difficulty, level) in [
            ("a", 0.1, CognitiveLevel::Remember),
            ("b", 0.4, CognitiveLevel::Apply),
            ("c", 0.7, CognitiveLevel::Apply),
        ] {
            let draft = ConceptDraft::new(id, id, ConceptType::Applied)
                .with_difficulty(difficulty)
                .with_cognitive_level(level)
                .validate()
                .unwrap();
            graph.add_concept(draft, ConceptStats::new(0.8, 20)).unwrap();
        }
        let rel = RelationshipDraft::new("a", "b", RelationshipType::BuildsOn)
            .with_strength(0.9)
            .validate()
            .unwrap();
        graph.add_relationship(rel).unwrap();
        graph
    }

    fn idx(graph: &GraphState, ids: &[&str]) -> Vec<NodeIdx> {
        ids.iter().map(|id| graph.index_of(id).unwrap()).collect()
    }

    #[test]
    fn test_even_progression_scores_high() {
        let graph = graph();
        let scorer = PathScorer::new(ScoringConfig::default());

        let breakdown = scorer.score(&graph, &idx(&graph, &["a", "b", "c"]), None, &PatternBook::new());

        assert!((breakdown.difficulty_progression.unwrap() - 1.0).abs() < 1e-9);
        // 0.9 explicit, 0.5 neutral
        assert!((breakdown.relationship_strength.unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(breakdown.profile_alignment, 0.5);
        assert!(breakdown.historical_effectiveness.is_none());
        assert!((breakdown.score - (1.0 + 0.7 + 0.5) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_concept_omits_hop_factors() {
        let graph = graph();
        let scorer = PathScorer::new(ScoringConfig::default());

        let breakdown = scorer.score(&graph, &idx(&graph, &["c"]), None, &PatternBook::new());

        assert!(breakdown.difficulty_progression.is_none());
        assert!(breakdown.relationship_strength.is_none());
        assert_eq!(breakdown.score, 0.5);
    }

    #[test]
    fn test_profile_alignment_and_history() {
        let graph = graph();
        let scorer = PathScorer::new(ScoringConfig::default());
        let mut patterns = PatternBook::new();
        patterns.insert(LearningPattern::new(
            PatternType::PrerequisiteSequence,
            vec!["a".into(), "b".into()],
            0.95,
        ));
        let profile = LearnerProfile::new().targeting(CognitiveLevel::Apply);

        let breakdown = scorer.score(&graph, &idx(&graph, &["a", "b"]), Some(&profile), &patterns);

        assert_eq!(breakdown.historical_effectiveness, Some(0.95));
        assert_eq!(breakdown.profile_alignment, 0.5);
        assert_eq!(breakdown.relationship_strength, Some(0.9));
    }

    #[test]
    fn test_weighted_mean_skips_missing_and_zero_weight() {
        assert_eq!(weighted_mean(&[(Some(1.0), 1.0), (None, 1.0), (Some(0.0), 0.0)]), 1.0);
        assert_eq!(weighted_mean(&[(Some(1.0), 3.0), (Some(0.0), 1.0)]), 0.75);
        assert_eq!(weighted_mean(&[(None, 1.0)]), 0.0);
    }
}
