//! Learning path search
//!
//! Search runs in two stages. Direct search enumerates simple directed paths
//! from each start concept to the target, bounded by depth and by the number
//! of candidates, and keeps those whose every step has its prerequisites
//! covered. If none survive, the prerequisite fallback grows a learned set
//! from the start ids one eligible concept at a time until the target is
//! learned or nothing more can be added.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use super::scorer::{PathScorer, ScoreBreakdown};
use super::LearningPath;
use crate::config::GraphConfig;
use crate::domain::knowledge::{LearnerProfile, path_key};
use crate::graph::{GraphState, NodeIdx};
use crate::learning::PatternBook;

/// Upper bound on DFS node expansions per query
const MAX_EXPANSIONS: usize = 100_000;

/// Finds and ranks learning paths towards a target concept
#[derive(Debug, Clone)]
pub struct PathFinder {
    config: GraphConfig,
}

impl PathFinder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn find(
        &self,
        graph: &GraphState,
        scorer: &PathScorer,
        patterns: &PatternBook,
        start_ids: &[String],
        target: &str,
        profile: Option<&LearnerProfile>,
    ) -> LearningPath {
        let Some(target_idx) = graph.index_of(target) else {
            debug!(target, "Target concept is unknown");
            return LearningPath::unreachable();
        };

        let learned: HashSet<&str> = start_ids.iter().map(String::as_str).collect();
        if learned.contains(target) {
            let breakdown = scorer.score(graph, &[target_idx], profile, patterns);
            return LearningPath::found(graph, vec![target_idx], breakdown, false);
        }

        let mut starts: Vec<NodeIdx> = learned.iter().filter_map(|id| graph.index_of(id)).collect();
        starts.sort_by(|a, b| graph.id_of(*a).cmp(graph.id_of(*b)));

        let candidates = self.direct_paths(graph, &starts, target_idx, &learned);
        debug!(target, candidates = candidates.len(), "Direct search finished");

        let best = candidates
            .into_iter()
            .map(|path| {
                let breakdown = scorer.score(graph, &path, profile, patterns);
                (path, breakdown)
            })
            .max_by(|a, b| compare_candidates(graph, a, b));

        if let Some((path, breakdown)) = best {
            return LearningPath::found(graph, path, breakdown, false);
        }

        match self.prerequisite_fallback(graph, target_idx, &learned) {
            Some(path) => {
                let breakdown = scorer.score(graph, &path, profile, patterns);
                LearningPath::found(graph, path, breakdown, true)
            }
            None => {
                debug!(target, "No learnable path to target");
                LearningPath {
                    used_fallback: true,
                    ..LearningPath::unreachable()
                }
            }
        }
    }

    fn direct_paths(
        &self,
        graph: &GraphState,
        starts: &[NodeIdx],
        target: NodeIdx,
        learned: &HashSet<&str>,
    ) -> Vec<Vec<NodeIdx>> {
        let mut search = DirectSearch {
            graph,
            target,
            max_depth: self.config.max_path_depth,
            max_paths: self.config.max_candidate_paths,
            expansions: 0,
            found: Vec::new(),
        };
        for &start in starts {
            let mut path = vec![start];
            let mut on_path = HashSet::from([start]);
            search.walk(&mut path, &mut on_path);
            if search.exhausted() {
                break;
            }
        }

        search
            .found
            .into_iter()
            .filter(|path| is_valid(graph, path, learned))
            .collect()
    }

    fn prerequisite_fallback(
        &self,
        graph: &GraphState,
        target: NodeIdx,
        start_ids: &HashSet<&str>,
    ) -> Option<Vec<NodeIdx>> {
        // Everything reachable backward from the target through unmet prerequisites
        let mut needed = HashSet::new();
        let mut stack = vec![target];
        while let Some(idx) = stack.pop() {
            if start_ids.contains(graph.id_of(idx)) || !needed.insert(idx) {
                continue;
            }
            stack.extend(graph.prerequisites_of(idx).iter().copied());
        }

        let mut learned: HashSet<&str> = start_ids.clone();
        let mut path = Vec::new();
        while !learned.contains(graph.id_of(target)) {
            let next = needed
                .iter()
                .copied()
                .filter(|&idx| !learned.contains(graph.id_of(idx)))
                .filter(|&idx| {
                    graph
                        .prerequisite_ids(idx)
                        .iter()
                        .all(|p| learned.contains(p))
                })
                .min_by(|&a, &b| graph.learning_order(a, b))?;
            learned.insert(graph.id_of(next));
            path.push(next);
        }
        Some(path)
    }
}

struct DirectSearch<'a> {
    graph: &'a GraphState,
    target: NodeIdx,
    max_depth: usize,
    max_paths: usize,
    expansions: usize,
    found: Vec<Vec<NodeIdx>>,
}

impl DirectSearch<'_> {
    fn exhausted(&self) -> bool {
        self.found.len() >= self.max_paths || self.expansions >= MAX_EXPANSIONS
    }

    fn walk(&mut self, path: &mut Vec<NodeIdx>, on_path: &mut HashSet<NodeIdx>) {
        let Some(&current) = path.last() else {
            return;
        };
        if current == self.target {
            self.found.push(path.clone());
            return;
        }
        if path.len() > self.max_depth {
            return;
        }

        for next in self.graph.successors(current) {
            if self.exhausted() {
                return;
            }
            if on_path.contains(&next) {
                continue;
            }
            self.expansions += 1;
            path.push(next);
            on_path.insert(next);
            self.walk(path, on_path);
            on_path.remove(&next);
            path.pop();
        }
    }
}

/// Every step after the first has its prerequisites among earlier steps or
/// the learner's start ids
pub fn is_valid(graph: &GraphState, path: &[NodeIdx], start_ids: &HashSet<&str>) -> bool {
    let mut covered: HashSet<&str> = start_ids.clone();
    for (i, &idx) in path.iter().enumerate() {
        if i > 0
            && !graph
                .prerequisite_ids(idx)
                .iter()
                .all(|p| covered.contains(p))
        {
            return false;
        }
        covered.insert(graph.id_of(idx));
    }
    true
}

/// Higher score wins, then the shorter path, then the lexically smaller key
fn compare_candidates(
    graph: &GraphState,
    (a_path, a_score): &(Vec<NodeIdx>, ScoreBreakdown),
    (b_path, b_score): &(Vec<NodeIdx>, ScoreBreakdown),
) -> Ordering {
    let key = |path: &[NodeIdx]| path_key(&path.iter().map(|&i| graph.id_of(i)).collect::<Vec<_>>());
    a_score
        .score
        .partial_cmp(&b_score.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b_path.len().cmp(&a_path.len()))
        .then_with(|| key(b_path).cmp(&key(a_path)))
}
