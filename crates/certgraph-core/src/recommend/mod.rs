//! Next-concept recommendations
//!
//! Candidates are concepts the learner has not covered whose prerequisites
//! are all covered. Each candidate is scored on connectivity to what the
//! learner already knows, embedding similarity, its own effectiveness, and
//! how well its difficulty fits one step past the learner's current level.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::graph::{GraphState, NodeIdx};
use crate::path::weighted_mean;

/// A ranked next-concept suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub concept_id: String,
    pub score: f64,
}

/// Ranks concepts a learner is ready for
#[derive(Debug, Clone)]
pub struct Recommender {
    config: ScoringConfig,
}

impl Recommender {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn suggest(&self, graph: &GraphState, learned: &[String], n: usize) -> Vec<Recommendation> {
        if n == 0 {
            return Vec::new();
        }

        let learned_ids: HashSet<&str> = learned.iter().map(String::as_str).collect();
        let learned_idx: HashSet<NodeIdx> = learned_ids
            .iter()
            .filter_map(|id| graph.index_of(id))
            .collect();

        let baseline = if learned_idx.is_empty() {
            0.0
        } else {
            learned_idx
                .iter()
                .map(|&i| graph.node(i).concept.difficulty)
                .sum::<f64>()
                / learned_idx.len() as f64
        };
        let target_difficulty = baseline + self.config.difficulty_step;

        let learned_embeddings: Vec<&[f32]> = learned_idx
            .iter()
            .filter_map(|&i| graph.node(i).concept.embedding.as_deref())
            .collect();

        let mut scored: Vec<(NodeIdx, f64)> = graph
            .nodes()
            .filter(|(_, node)| !learned_ids.contains(node.concept.id.as_str()))
            .filter(|(idx, _)| {
                graph
                    .prerequisite_ids(*idx)
                    .iter()
                    .all(|p| learned_ids.contains(p))
            })
            .map(|(idx, node)| {
                let connectivity = (!learned_ids.is_empty()).then(|| {
                    let touching = graph.connection_count(idx, &learned_idx);
                    (touching as f64 / learned_ids.len() as f64).min(1.0)
                });
                let similarity = node
                    .concept
                    .embedding
                    .as_deref()
                    .and_then(|own| mean_similarity(own, &learned_embeddings));
                let effectiveness = node.stats.score();
                let difficulty_fit =
                    (1.0 - (node.concept.difficulty - target_difficulty).abs()).max(0.0);

                let score = weighted_mean(&[
                    (connectivity, self.config.connectivity_weight),
                    (similarity, self.config.similarity_weight),
                    (Some(effectiveness), self.config.effectiveness_weight),
                    (Some(difficulty_fit), self.config.difficulty_fit_weight),
                ]);
                (idx, score)
            })
            .collect();

        scored.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    graph
                        .node(*a)
                        .stats
                        .usage_count()
                        .cmp(&graph.node(*b).stats.usage_count())
                })
                .then_with(|| graph.id_of(*a).cmp(graph.id_of(*b)))
        });
        scored.truncate(n);

        debug!(learned = learned.len(), returned = scored.len(), "Ranked recommendations");

        scored
            .into_iter()
            .map(|(idx, score)| Recommendation {
                concept_id: graph.id_of(idx).to_string(),
                score,
            })
            .collect()
    }
}

/// Mean cosine similarity to the learned embeddings, floored at zero
fn mean_similarity(own: &[f32], learned: &[&[f32]]) -> Option<f64> {
    let sims: Vec<f64> = learned
        .iter()
        .filter(|other| other.len() == own.len())
        .map(|other| cosine_similarity(own, other) as f64)
        .collect();
    if sims.is_empty() {
        return None;
    }
    Some((sims.iter().sum::<f64>() / sims.len() as f64).max(0.0))
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
