//! Arena-backed concept store and relationship index
//!
//! Concepts live in a dense `Vec` addressed by [`NodeIdx`]; a side table maps
//! string ids to indices. Relationships live in a second arena and adjacency
//! lists hold edge indices, so the cyclic graph never needs shared ownership.
//!
//! The prerequisite subgraph is kept resolved in `prereqs_of` /
//! `dependents_of`. Declared prerequisites naming concepts that have not
//! arrived yet wait in `pending` and are wired up when that concept is added.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::domain::knowledge::{
    Concept, ConceptDraft, Relationship, RelationshipDraft, RelationshipKey, RelationshipType,
};
use crate::error::{Error, Result};
use crate::learning::ConceptStats;

/// Index of a concept in the arena
pub type NodeIdx = usize;

/// Index of a relationship in the arena
pub type EdgeIdx = usize;

/// A stored concept and its learning statistics
#[derive(Debug)]
pub struct ConceptNode {
    /// Immutable ingested content; effectiveness fields reflect creation time
    pub concept: Concept,
    pub stats: Arc<ConceptStats>,
}

impl ConceptNode {
    /// Current view of the concept with live statistics applied
    pub fn snapshot(&self) -> Concept {
        let mut concept = self.concept.clone();
        concept.effectiveness_score = self.stats.score();
        concept.usage_count = self.stats.usage_count();
        if concept.usage_count > 0 {
            concept.updated_at = self.stats.updated_at();
        }
        concept
    }
}

/// Direction for graph traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
    /// Follow outgoing edges (source -> target)
    Outgoing,
    /// Follow incoming edges (target -> source)
    Incoming,
    /// Follow edges in both directions
    Both,
}

/// Outcome of an idempotent submission
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitOutcome {
    Created,
    /// Identical content was already present
    Unchanged,
    /// Further evidence was merged into an existing relationship
    Updated { old_strength: f64, new_strength: f64 },
}

impl SubmitOutcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Concepts, relationships, and the resolved prerequisite DAG
#[derive(Debug, Default)]
pub struct GraphState {
    nodes: Vec<ConceptNode>,
    ids: HashMap<String, NodeIdx>,
    edges: Vec<Relationship>,
    edge_keys: HashMap<RelationshipKey, EdgeIdx>,
    outgoing: Vec<Vec<EdgeIdx>>,
    incoming: Vec<Vec<EdgeIdx>>,
    prereqs_of: Vec<Vec<NodeIdx>>,
    dependents_of: Vec<Vec<NodeIdx>>,
    /// Unresolved declared prerequisite id -> concepts waiting on it
    pending: HashMap<String, Vec<NodeIdx>>,
    embedding_dimensions: Option<usize>,
}

impl GraphState {
    /// Create an empty graph, optionally pinning the embedding length
    pub fn new(embedding_dimensions: Option<usize>) -> Self {
        Self {
            embedding_dimensions,
            ..Default::default()
        }
    }

    // ========== Concept Operations ==========

    /// Add a validated concept draft
    ///
    /// Identical resubmission is a no-op. A different concept under an
    /// existing id fails with `DuplicateConcept`; a declared prerequisite that
    /// closes a cycle fails with `CycleDetected` and leaves the graph as it was.
    pub fn add_concept(&mut self, draft: ConceptDraft, stats: ConceptStats) -> Result<SubmitOutcome> {
        if let Some(&idx) = self.ids.get(&draft.id) {
            return if self.nodes[idx].concept.to_draft() == draft {
                Ok(SubmitOutcome::Unchanged)
            } else {
                Err(Error::DuplicateConcept(draft.id))
            };
        }

        if let Some(embedding) = &draft.embedding {
            if let Some(expected) = self.embedding_dimensions {
                if embedding.len() != expected {
                    return Err(Error::InvalidInput(format!(
                        "Concept '{}' embedding has {} dimensions, expected {}",
                        draft.id,
                        embedding.len(),
                        expected
                    )));
                }
            }
        }

        let resolved: Vec<NodeIdx> = draft
            .prerequisites
            .iter()
            .filter_map(|p| self.ids.get(p).copied())
            .collect();

        // Concepts already declaring this one as a prerequisite, and their
        // dependents, would all sit downstream of the new node.
        if let Some(waiting) = self.pending.get(&draft.id) {
            let downstream = self.reachable(waiting.iter().copied(), |idx| &self.dependents_of[idx]);
            if let Some(&culprit) = resolved.iter().find(|r| downstream.contains(r)) {
                return Err(Error::CycleDetected {
                    from: self.nodes[culprit].concept.id.clone(),
                    to: draft.id,
                });
            }
        }

        if self.embedding_dimensions.is_none() {
            self.embedding_dimensions = draft.embedding.as_ref().map(Vec::len);
        }

        let idx = self.nodes.len();
        let unresolved: Vec<String> = draft
            .prerequisites
            .iter()
            .filter(|p| !self.ids.contains_key(*p))
            .cloned()
            .collect();
        let id = draft.id.clone();
        let mut concept = Concept::from_draft(draft, stats.score());
        concept.usage_count = stats.usage_count();

        self.nodes.push(ConceptNode {
            concept,
            stats: Arc::new(stats),
        });
        self.ids.insert(id.clone(), idx);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.prereqs_of.push(Vec::new());
        self.dependents_of.push(Vec::new());

        for prereq in resolved {
            self.link_prerequisite(prereq, idx);
        }
        for missing in unresolved {
            self.pending.entry(missing).or_default().push(idx);
        }
        if let Some(waiting) = self.pending.remove(&id) {
            for dependent in waiting {
                self.link_prerequisite(idx, dependent);
            }
        }

        Ok(SubmitOutcome::Created)
    }

    /// Restore a persisted concept, keeping its timestamps
    pub fn restore_concept(&mut self, concept: Concept, stats: ConceptStats) -> Result<SubmitOutcome> {
        let created_at = concept.created_at;
        let updated_at = concept.updated_at;
        let id = concept.id.clone();
        let outcome = self.add_concept(concept.to_draft().validate()?, stats)?;
        if outcome == SubmitOutcome::Created {
            if let Some(&idx) = self.ids.get(&id) {
                let node = &mut self.nodes[idx];
                node.concept.created_at = created_at;
                node.concept.updated_at = updated_at;
            }
        }
        Ok(outcome)
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIdx> {
        self.ids.get(id).copied()
    }

    pub fn node(&self, idx: NodeIdx) -> &ConceptNode {
        &self.nodes[idx]
    }

    pub fn get(&self, id: &str) -> Option<&ConceptNode> {
        self.index_of(id).map(|idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &ConceptNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn id_of(&self, idx: NodeIdx) -> &str {
        &self.nodes[idx].concept.id
    }

    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.embedding_dimensions
    }

    // ========== Relationship Operations ==========

    /// Add or merge a validated relationship draft
    ///
    /// Returns the outcome and the stored relationship after the change.
    pub fn add_relationship(
        &mut self,
        draft: RelationshipDraft,
    ) -> Result<(SubmitOutcome, Relationship)> {
        let source = self
            .index_of(&draft.source)
            .ok_or_else(|| Error::UnknownConcept(draft.source.clone()))?;
        let target = self
            .index_of(&draft.target)
            .ok_or_else(|| Error::UnknownConcept(draft.target.clone()))?;

        let key = (draft.source.clone(), draft.target.clone(), draft.relationship_type);
        if let Some(&edge) = self.edge_keys.get(&key) {
            let existing = &mut self.edges[edge];
            if existing.matches_draft(&draft) {
                return Ok((SubmitOutcome::Unchanged, existing.clone()));
            }
            let old_strength = existing.absorb(&draft);
            let outcome = SubmitOutcome::Updated {
                old_strength,
                new_strength: existing.strength,
            };
            return Ok((outcome, existing.clone()));
        }

        if draft.relationship_type == RelationshipType::Prerequisite
            && !self.prereqs_of[target].contains(&source)
            && (source == target || self.descendants(target).contains(&source))
        {
            return Err(Error::CycleDetected {
                from: draft.source,
                to: draft.target,
            });
        }

        let relationship = Relationship::from_draft(draft);
        let edge = self.edges.len();
        self.edges.push(relationship.clone());
        self.edge_keys.insert(key, edge);
        self.outgoing[source].push(edge);
        self.incoming[target].push(edge);

        if relationship.relationship_type == RelationshipType::Prerequisite {
            self.link_prerequisite(source, target);
        }

        Ok((SubmitOutcome::Created, relationship))
    }

    /// Restore a persisted relationship, keeping its counters and timestamps
    pub fn restore_relationship(&mut self, relationship: Relationship) -> Result<SubmitOutcome> {
        let draft = RelationshipDraft {
            source: relationship.source.clone(),
            target: relationship.target.clone(),
            relationship_type: relationship.relationship_type,
            strength: relationship.strength,
            evidence_count: relationship.evidence_count,
            metadata: relationship.metadata.clone(),
        }
        .validate()?;
        let (outcome, _) = self.add_relationship(draft)?;
        if outcome == SubmitOutcome::Created {
            if let Some(&edge) = self.edge_keys.get(&relationship.key()) {
                let restored = &mut self.edges[edge];
                restored.created_at = relationship.created_at;
                restored.updated_at = relationship.updated_at;
                if !relationship.draft_fingerprints.is_empty() {
                    restored.draft_fingerprints = relationship.draft_fingerprints;
                }
            }
        }
        Ok(outcome)
    }

    pub fn relationship(&self, key: &RelationshipKey) -> Option<&Relationship> {
        self.edge_keys.get(key).map(|&edge| &self.edges[edge])
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.edges
    }

    pub fn relationship_count(&self) -> usize {
        self.edges.len()
    }

    /// Relationships touching a concept in the given direction
    pub fn neighbors(&self, idx: NodeIdx, direction: TraversalDirection) -> Vec<&Relationship> {
        let out = matches!(direction, TraversalDirection::Outgoing | TraversalDirection::Both);
        let inc = matches!(direction, TraversalDirection::Incoming | TraversalDirection::Both);

        let mut result = Vec::new();
        if out {
            result.extend(self.outgoing[idx].iter().map(|&e| &self.edges[e]));
        }
        if inc {
            result.extend(self.incoming[idx].iter().map(|&e| &self.edges[e]));
        }
        result
    }

    /// Strongest explicit relationship from `from` to `to`, of any type
    pub fn edge_strength(&self, from: NodeIdx, to: NodeIdx) -> Option<f64> {
        let target = self.id_of(to);
        self.outgoing[from]
            .iter()
            .map(|&e| &self.edges[e])
            .filter(|r| r.target == target)
            .map(|r| r.strength)
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
    }

    /// Whether `from` is a declared prerequisite of `to`
    pub fn is_declared_prerequisite(&self, from: NodeIdx, to: NodeIdx) -> bool {
        let from_id = self.id_of(from);
        self.nodes[to].concept.prerequisites.iter().any(|p| p == from_id)
    }

    /// Forward hops used by direct path search: relationship targets plus
    /// implicit edges from declared prerequisites to their dependents
    pub fn successors(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut next: Vec<NodeIdx> = self.outgoing[idx]
            .iter()
            .filter_map(|&e| self.index_of(&self.edges[e].target))
            .chain(
                self.dependents_of[idx]
                    .iter()
                    .copied()
                    .filter(|&d| self.is_declared_prerequisite(idx, d)),
            )
            .collect();
        next.sort_by(|a, b| self.id_of(*a).cmp(self.id_of(*b)));
        next.dedup();
        next
    }

    /// Number of links between a concept and a set of other concepts
    ///
    /// Counts every explicit relationship in either direction plus declared
    /// prerequisite links that no explicit `Prerequisite` edge duplicates.
    pub fn connection_count(&self, idx: NodeIdx, others: &HashSet<NodeIdx>) -> usize {
        let explicit = self
            .neighbors(idx, TraversalDirection::Both)
            .into_iter()
            .filter_map(|r| {
                let other = if r.source == self.id_of(idx) { &r.target } else { &r.source };
                self.index_of(other)
            })
            .filter(|other| others.contains(other))
            .count();

        let implicit = others
            .iter()
            .filter(|&&other| {
                let (from, to) = if self.is_declared_prerequisite(other, idx) {
                    (other, idx)
                } else if self.is_declared_prerequisite(idx, other) {
                    (idx, other)
                } else {
                    return false;
                };
                let key = (
                    self.id_of(from).to_string(),
                    self.id_of(to).to_string(),
                    RelationshipType::Prerequisite,
                );
                !self.edge_keys.contains_key(&key)
            })
            .count();

        explicit + implicit
    }

    // ========== Prerequisite DAG ==========

    /// All prerequisite ids of a concept: declared ones (resolved or not)
    /// followed by sources of incoming `Prerequisite` relationships
    pub fn prerequisite_ids(&self, idx: NodeIdx) -> Vec<&str> {
        let declared = &self.nodes[idx].concept.prerequisites;
        let mut ids: Vec<&str> = declared.iter().map(String::as_str).collect();
        for &p in &self.prereqs_of[idx] {
            let id = self.id_of(p);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Resolved direct prerequisites
    pub fn prerequisites_of(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.prereqs_of[idx]
    }

    /// Declared prerequisite ids that name no known concept
    pub fn unresolved_prerequisites(&self, idx: NodeIdx) -> Vec<&str> {
        self.nodes[idx]
            .concept
            .prerequisites
            .iter()
            .filter(|p| !self.ids.contains_key(p.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Every concept that transitively requires `idx`
    pub fn descendants(&self, idx: NodeIdx) -> HashSet<NodeIdx> {
        self.reachable(self.dependents_of[idx].iter().copied(), |n| &self.dependents_of[n])
    }

    /// Every resolved transitive prerequisite of `idx`
    pub fn ancestors(&self, idx: NodeIdx) -> HashSet<NodeIdx> {
        self.reachable(self.prereqs_of[idx].iter().copied(), |n| &self.prereqs_of[n])
    }

    /// Transitive prerequisites of `idx` in a learnable order
    ///
    /// Each concept appears after all of its own prerequisites. Among
    /// concepts that are ready at the same time, easier ones come first,
    /// then lower ids.
    pub fn prerequisite_order(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let members = self.ancestors(idx);
        let mut remaining: HashMap<NodeIdx, usize> = members
            .iter()
            .map(|&m| {
                let within = self.prereqs_of[m].iter().filter(|p| members.contains(p)).count();
                (m, within)
            })
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .filter(|(_, deps)| **deps == 0)
                .map(|(&m, _)| m)
                .min_by(|&a, &b| self.learning_order(a, b));
            let Some(next) = next else {
                break;
            };
            remaining.remove(&next);
            order.push(next);
            for dependent in &self.dependents_of[next] {
                if let Some(deps) = remaining.get_mut(dependent) {
                    *deps = deps.saturating_sub(1);
                }
            }
        }
        order
    }

    /// Ordering used whenever several concepts could be learned next
    pub fn learning_order(&self, a: NodeIdx, b: NodeIdx) -> std::cmp::Ordering {
        let (ca, cb) = (&self.nodes[a].concept, &self.nodes[b].concept);
        ca.difficulty
            .partial_cmp(&cb.difficulty)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ca.id.cmp(&cb.id))
    }

    fn link_prerequisite(&mut self, prereq: NodeIdx, dependent: NodeIdx) {
        if !self.prereqs_of[dependent].contains(&prereq) {
            self.prereqs_of[dependent].push(prereq);
            self.dependents_of[prereq].push(dependent);
        }
    }

    fn reachable<'a, I, F>(&'a self, start: I, next: F) -> HashSet<NodeIdx>
    where
        I: IntoIterator<Item = NodeIdx>,
        F: Fn(NodeIdx) -> &'a Vec<NodeIdx>,
    {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeIdx> = start.into_iter().collect();
        while let Some(idx) = queue.pop_front() {
            if seen.insert(idx) {
                queue.extend(next(idx).iter().copied().filter(|n| !seen.contains(n)));
            }
        }
        seen
    }

    /// Concepts within `max_distance` hops over any relationship or
    /// prerequisite link, in either direction
    ///
    /// Returns `(idx, distance, strongest edge seen on arrival)`; the origin
    /// is excluded.
    pub fn within_distance(&self, idx: NodeIdx, max_distance: usize) -> Vec<(NodeIdx, usize, f64)> {
        let mut best: HashMap<NodeIdx, (usize, f64)> = HashMap::new();
        best.insert(idx, (0, 1.0));
        let mut frontier = vec![idx];

        for distance in 1..=max_distance {
            let mut next_frontier = Vec::new();
            for &node in &frontier {
                for (other, strength) in self.adjacent(node) {
                    match best.get_mut(&other) {
                        Some((d, s)) if *d == distance => *s = s.max(strength),
                        Some(_) => {}
                        None => {
                            best.insert(other, (distance, strength));
                            next_frontier.push(other);
                        }
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        best.into_iter()
            .filter(|(n, _)| *n != idx)
            .map(|(n, (d, s))| (n, d, s))
            .collect()
    }

    fn adjacent(&self, idx: NodeIdx) -> Vec<(NodeIdx, f64)> {
        let id = self.id_of(idx);
        let mut result: Vec<(NodeIdx, f64)> = self
            .neighbors(idx, TraversalDirection::Both)
            .into_iter()
            .filter_map(|r| {
                let other = if r.source == id { &r.target } else { &r.source };
                self.index_of(other).map(|o| (o, r.strength))
            })
            .collect();
        // Implicit prerequisite links carry no strength of their own
        result.extend(self.prereqs_of[idx].iter().map(|&p| (p, 0.0)));
        result.extend(self.dependents_of[idx].iter().map(|&d| (d, 0.0)));
        result
    }
}
