//! Knowledge graph facade
//!
//! [`KnowledgeGraph`] owns the in-memory graph and composes the concept
//! store, effectiveness tracker, path finder, recommender and pattern miner
//! into the public contract. It also owns two background workers:
//!
//! - the mirror worker, which writes committed mutations to the durable store
//! - the miner worker, which turns high-effectiveness concepts into patterns
//!
//! Structural mutations take the graph's write lock. Queries and outcome
//! recording share the read lock; each concept's outcome window has its own
//! mutex, so outcomes for different concepts never contend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::knowledge::{
    Concept, ConceptDraft, KnowledgeEvent, LearnerProfile, LearningPattern, Relationship,
    RelationshipDraft,
};
use crate::error::{Error, Result};
use crate::graph::{GraphState, SubmitOutcome, TraversalDirection};
use crate::learning::{
    ConceptStats, EffectivenessTracker, MiningJob, OutcomeSummary, PatternBook, PatternMiner,
};
use crate::path::{LearningPath, PathFinder, PathScorer};
use crate::persistence::{
    DeadLetter, GraphSeed, GraphSnapshot, GraphStore, MirrorQueue, Mutation, RetryPolicy,
    StoredConcept,
};
use crate::recommend::{Recommendation, Recommender};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How the graph relates to its durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Loaded from the store; mutations are mirrored back
    Durable,
    /// The store could not be read; the graph runs from a seed or empty and
    /// nothing is mirrored
    Degraded,
    /// No store was configured
    InMemory,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Degraded => "degraded",
            Self::InMemory => "in_memory",
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A learning path query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathRequest {
    /// Concepts the learner already knows
    #[serde(default)]
    pub start_ids: Vec<String>,
    pub target: String,
    #[serde(default)]
    pub profile: Option<LearnerProfile>,
}

impl PathRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn from_start<I, S>(mut self, start_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_ids = start_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_profile(mut self, profile: LearnerProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Summary counts over the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub concepts: usize,
    pub relationships: usize,
    pub patterns: usize,
    pub concepts_by_type: BTreeMap<String, usize>,
    pub relationships_by_type: BTreeMap<String, usize>,
    /// Mean effectiveness over all concepts, 0.0 for an empty graph
    pub average_effectiveness: f64,
    /// Outcomes recorded across all concepts
    pub total_outcomes: u64,
    pub storage_mode: StorageMode,
    pub dead_letters: usize,
}

/// Result of ingesting a seed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    pub created: usize,
    pub unchanged: usize,
    pub updated: usize,
    /// `(record, reason)` for every draft that was refused
    pub rejected: Vec<(String, String)>,
}

enum MinerCommand {
    Mine(MiningJob),
    Flush(oneshot::Sender<()>),
}

/// State shared with the miner worker
struct GraphCore {
    state: RwLock<GraphState>,
    patterns: RwLock<PatternBook>,
    config: Config,
    tracker: EffectivenessTracker,
    miner: PatternMiner,
    scorer: PathScorer,
    finder: PathFinder,
    recommender: Recommender,
    events: broadcast::Sender<KnowledgeEvent>,
    mode: StorageMode,
}

impl GraphCore {
    fn new(config: Config, state: GraphState, patterns: PatternBook, mode: StorageMode) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(state),
            patterns: RwLock::new(patterns),
            tracker: EffectivenessTracker::new(config.learning.clone()),
            miner: PatternMiner::new(config.learning.clone()),
            scorer: PathScorer::new(config.scoring.clone()),
            finder: PathFinder::new(config.graph.clone()),
            recommender: Recommender::new(config.scoring.clone()),
            config,
            events,
            mode,
        }
    }

    fn new_stats(&self) -> ConceptStats {
        ConceptStats::new(
            self.config.graph.default_effectiveness,
            self.config.learning.window_capacity,
        )
    }

    fn publish(&self, event: KnowledgeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// The adaptive certification knowledge graph
pub struct KnowledgeGraph {
    core: Arc<GraphCore>,
    mirror: Option<MirrorQueue>,
    miner_tx: mpsc::UnboundedSender<MinerCommand>,
    mirror_handle: Option<JoinHandle<()>>,
    miner_handle: JoinHandle<()>,
}

impl KnowledgeGraph {
    /// Create an empty graph with no durable store
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        validate_config(&config)?;
        let state = GraphState::new(config.graph.embedding_dimensions);
        Ok(Self::assemble(config, state, PatternBook::new(), StorageMode::InMemory, None))
    }

    /// Load the graph from a durable store and mirror to it from then on
    ///
    /// If the store cannot be read, the graph starts from the configured seed
    /// file (or empty) in degraded mode and nothing is mirrored.
    pub async fn open(config: Config, store: Arc<dyn GraphStore>) -> Result<Self> {
        validate_config(&config)?;

        match store.load_all().await {
            Ok(snapshot) => {
                let (state, patterns) = restore_snapshot(&config, snapshot);
                info!(
                    concepts = state.len(),
                    relationships = state.relationship_count(),
                    patterns = patterns.len(),
                    "Knowledge graph loaded"
                );
                Ok(Self::assemble(config, state, patterns, StorageMode::Durable, Some(store)))
            }
            Err(e) => {
                warn!(error = %e, "Durable store unavailable, starting in degraded mode");
                Self::degraded(config).await
            }
        }
    }

    /// Start without a durable store after it failed to open or load
    ///
    /// The graph starts from `persistence.seed_path` when one is configured
    /// and readable, otherwise empty. Nothing is mirrored.
    pub async fn degraded(config: Config) -> Result<Self> {
        validate_config(&config)?;
        let graph = Self::assemble(
            config.clone(),
            GraphState::new(config.graph.embedding_dimensions),
            PatternBook::new(),
            StorageMode::Degraded,
            None,
        );
        if let Some(path) = &config.persistence.seed_path {
            match GraphSeed::load(path) {
                Ok(seed) => {
                    let report = graph.load_seed(&seed).await;
                    info!(
                        path = %path.display(),
                        created = report.created,
                        rejected = report.rejected.len(),
                        "Loaded local seed"
                    );
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Seed unavailable, starting empty"),
            }
        }
        Ok(graph)
    }

    fn assemble(
        config: Config,
        state: GraphState,
        patterns: PatternBook,
        mode: StorageMode,
        store: Option<Arc<dyn GraphStore>>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.persistence);
        let dead_letter_path = config.persistence.dead_letter_path.clone();
        let core = Arc::new(GraphCore::new(config, state, patterns, mode));

        let (mirror, mirror_handle) = match store {
            Some(store) => {
                let (queue, handle) =
                    MirrorQueue::spawn(store, retry, dead_letter_path, core.events.clone());
                (Some(queue), Some(handle))
            }
            None => (None, None),
        };

        let (miner_tx, miner_rx) = mpsc::unbounded_channel();
        let miner_handle = tokio::spawn(run_miner(Arc::clone(&core), mirror.clone(), miner_rx));

        Self {
            core,
            mirror,
            miner_tx,
            mirror_handle,
            miner_handle,
        }
    }

    // ========== Ingestion ==========

    /// Submit a concept; idempotent by id
    pub async fn submit_concept(&self, draft: ConceptDraft) -> Result<SubmitOutcome> {
        let draft = draft.validate()?;
        let stats = self.core.new_stats();

        let mut state = self.core.state.write().await;
        let outcome = state.add_concept(draft.clone(), stats)?;
        if outcome != SubmitOutcome::Created {
            return Ok(outcome);
        }
        let stored = state
            .get(&draft.id)
            .map(|node| StoredConcept::new(node.snapshot(), Vec::new()));
        drop(state);

        info!(concept_id = %draft.id, concept_type = %draft.concept_type, "Concept created");
        if let Some(stored) = stored {
            self.mirror(Mutation::UpsertConcept(stored));
        }
        self.core
            .publish(KnowledgeEvent::concept_created(&draft.id, draft.concept_type, &draft.name));
        Ok(outcome)
    }

    /// Submit a relationship; idempotent by `(source, target, type)`
    ///
    /// Resubmitting an existing key with different content merges the
    /// evidence into the stored relationship.
    pub async fn submit_relationship(&self, draft: RelationshipDraft) -> Result<SubmitOutcome> {
        let draft = draft.validate()?;

        let (outcome, relationship) = self.core.state.write().await.add_relationship(draft)?;

        let event = match outcome {
            SubmitOutcome::Unchanged => return Ok(outcome),
            SubmitOutcome::Created => {
                debug!(
                    source = %relationship.source,
                    target = %relationship.target,
                    relationship_type = %relationship.relationship_type,
                    "Relationship created"
                );
                KnowledgeEvent::relationship_created(
                    &relationship.source,
                    &relationship.target,
                    relationship.relationship_type,
                )
            }
            SubmitOutcome::Updated {
                old_strength,
                new_strength,
            } => {
                debug!(
                    source = %relationship.source,
                    target = %relationship.target,
                    old_strength,
                    new_strength,
                    evidence_count = relationship.evidence_count,
                    "Relationship strengthened"
                );
                KnowledgeEvent::RelationshipStrengthened {
                    source: relationship.source.clone(),
                    target: relationship.target.clone(),
                    relationship_type: relationship.relationship_type,
                    old_strength,
                    new_strength,
                    timestamp: relationship.updated_at,
                }
            }
        };

        self.mirror(Mutation::UpsertRelationship(relationship));
        self.core.publish(event);
        Ok(outcome)
    }

    /// Ingest a whole seed: concepts first, then relationships
    ///
    /// Individual refusals are collected in the report rather than aborting
    /// the load.
    pub async fn load_seed(&self, seed: &GraphSeed) -> SeedReport {
        let mut report = SeedReport::default();

        for draft in &seed.concepts {
            let label = draft.id.clone();
            let result = self.submit_concept(draft.clone()).await;
            report.tally(label, result);
        }
        for draft in &seed.relationships {
            let label = format!("{} -[{}]-> {}", draft.source, draft.relationship_type, draft.target);
            let result = self.submit_relationship(draft.clone()).await;
            report.tally(label, result);
        }

        report
    }

    // ========== Queries ==========

    /// Current view of a concept, including live effectiveness statistics
    pub async fn get_concept(&self, id: &str) -> Option<Concept> {
        self.core.state.read().await.get(id).map(|node| node.snapshot())
    }

    /// Relationships touching a concept; empty for an unknown id
    pub async fn neighbors(&self, id: &str, direction: TraversalDirection) -> Vec<Relationship> {
        let state = self.core.state.read().await;
        match state.index_of(id) {
            Some(idx) => state.neighbors(idx, direction).into_iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn get_learning_path(&self, request: &PathRequest) -> LearningPath {
        self.find_learning_path(&request.start_ids, &request.target, request.profile.as_ref())
            .await
    }

    /// Best learning path from what the learner knows to `target`
    ///
    /// An unreachable target yields an empty path with
    /// [`PathOutcome::Unreachable`](crate::path::PathOutcome::Unreachable).
    pub async fn find_learning_path(
        &self,
        start_ids: &[String],
        target: &str,
        profile: Option<&LearnerProfile>,
    ) -> LearningPath {
        let state = self.core.state.read().await;
        let patterns = self.core.patterns.read().await;
        let path = self
            .core
            .finder
            .find(&state, &self.core.scorer, &patterns, start_ids, target, profile);

        debug!(
            target,
            length = path.concept_ids.len(),
            score = path.score,
            used_fallback = path.used_fallback,
            "Learning path computed"
        );
        path
    }

    /// Up to `n` concepts the learner is ready for, best first
    pub async fn get_recommendations(&self, learned: &[String], n: usize) -> Vec<Recommendation> {
        let state = self.core.state.read().await;
        self.core.recommender.suggest(&state, learned, n)
    }

    /// Transitive prerequisites of a concept in learnable order
    pub async fn get_prerequisites(&self, id: &str) -> Vec<String> {
        let state = self.core.state.read().await;
        match state.index_of(id) {
            Some(idx) => state
                .prerequisite_order(idx)
                .into_iter()
                .map(|i| state.id_of(i).to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Concepts within `max_distance` hops, nearest and most strongly
    /// connected first
    pub async fn get_related_concepts(&self, id: &str, max_distance: usize, limit: usize) -> Vec<String> {
        let state = self.core.state.read().await;
        let Some(idx) = state.index_of(id) else {
            return Vec::new();
        };

        let mut related = state.within_distance(idx, max_distance);
        related.sort_by(|(a, a_dist, a_strength), (b, b_dist, b_strength)| {
            a_dist
                .cmp(b_dist)
                .then_with(|| {
                    b_strength
                        .partial_cmp(a_strength)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| state.id_of(*a).cmp(state.id_of(*b)))
        });
        related
            .into_iter()
            .take(limit)
            .map(|(i, _, _)| state.id_of(i).to_string())
            .collect()
    }

    // ========== Feedback ==========

    /// Fold a learner outcome into a concept's effectiveness
    pub async fn record_outcome(
        &self,
        concept_id: &str,
        success: bool,
        minutes_taken: f64,
        profile: Option<LearnerProfile>,
    ) -> Result<OutcomeSummary> {
        let (base, stats) = {
            let state = self.core.state.read().await;
            let node = state
                .get(concept_id)
                .ok_or_else(|| Error::UnknownConcept(concept_id.to_string()))?;
            (node.concept.clone(), Arc::clone(&node.stats))
        };

        let summary =
            self.core
                .tracker
                .record(&stats, base.learning_time_minutes, success, minutes_taken)?;

        debug!(
            concept_id,
            success,
            minutes_taken,
            effectiveness = summary.effectiveness_score,
            samples = summary.samples,
            "Outcome recorded"
        );

        if summary.mining_due && stats.try_schedule_mining() {
            let job = MiningJob {
                concept_id: concept_id.to_string(),
                profile,
            };
            if self.miner_tx.send(MinerCommand::Mine(job)).is_err() {
                stats.finish_mining();
            }
        }

        if self.mirror.is_some() {
            let mut concept = base;
            concept.effectiveness_score = stats.score();
            concept.usage_count = stats.usage_count();
            concept.updated_at = stats.updated_at();
            self.mirror(Mutation::UpsertConcept(StoredConcept::new(concept, stats.window())));
        }

        self.core.publish(KnowledgeEvent::OutcomeRecorded {
            concept_id: concept_id.to_string(),
            success,
            effectiveness_score: summary.effectiveness_score,
            samples: summary.samples,
            timestamp: chrono::Utc::now(),
        });
        Ok(summary)
    }

    // ========== Introspection ==========

    /// Discovered patterns in discovery order
    pub async fn patterns(&self) -> Vec<LearningPattern> {
        self.core.patterns.read().await.patterns().to_vec()
    }

    pub async fn stats(&self) -> GraphStats {
        let state = self.core.state.read().await;
        let patterns = self.core.patterns.read().await.len();

        let mut concepts_by_type = BTreeMap::new();
        let mut effectiveness_sum = 0.0;
        let mut total_outcomes = 0;
        for (_, node) in state.nodes() {
            *concepts_by_type
                .entry(node.concept.concept_type.to_string())
                .or_insert(0) += 1;
            effectiveness_sum += node.stats.score();
            total_outcomes += node.stats.usage_count();
        }

        let mut relationships_by_type = BTreeMap::new();
        for relationship in state.relationships() {
            *relationships_by_type
                .entry(relationship.relationship_type.to_string())
                .or_insert(0) += 1;
        }

        GraphStats {
            concepts: state.len(),
            relationships: state.relationship_count(),
            patterns,
            concepts_by_type,
            relationships_by_type,
            average_effectiveness: if state.is_empty() {
                0.0
            } else {
                effectiveness_sum / state.len() as f64
            },
            total_outcomes,
            storage_mode: self.core.mode,
            dead_letters: self.mirror.as_ref().map_or(0, MirrorQueue::dead_letter_count),
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.core.mode
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Receive events for mutations committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<KnowledgeEvent> {
        self.core.events.subscribe()
    }

    /// Mirror writes that exhausted their retries
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.mirror
            .as_ref()
            .map(MirrorQueue::dead_letters)
            .unwrap_or_default()
    }

    /// Wait for queued mining passes and mirror writes to finish
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.miner_tx.send(MinerCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        if let Some(mirror) = &self.mirror {
            mirror.flush().await;
        }
    }

    /// Stop the background workers, draining their queues
    ///
    /// Each worker gets `persistence.shutdown_timeout_secs` to finish.
    pub async fn shutdown(self) -> Result<()> {
        let timeout = Duration::from_secs(self.core.config.persistence.shutdown_timeout_secs);
        info!("Shutting down knowledge graph");

        // The miner holds a mirror handle, so it has to stop first
        drop(self.miner_tx);
        await_worker("miner", self.miner_handle, timeout).await?;

        drop(self.mirror);
        if let Some(handle) = self.mirror_handle {
            await_worker("mirror", handle, timeout).await?;
        }

        info!("Knowledge graph shut down");
        Ok(())
    }

    fn mirror(&self, mutation: Mutation) {
        if let Some(mirror) = &self.mirror {
            mirror.submit(mutation);
        }
    }
}

impl SeedReport {
    fn tally(&mut self, label: String, result: Result<SubmitOutcome>) {
        match result {
            Ok(SubmitOutcome::Created) => self.created += 1,
            Ok(SubmitOutcome::Unchanged) => self.unchanged += 1,
            Ok(SubmitOutcome::Updated { .. }) => self.updated += 1,
            Err(e) => {
                warn!(record = %label, error = %e, "Seed record rejected");
                self.rejected.push((label, e.to_string()));
            }
        }
    }
}

fn validate_config(config: &Config) -> Result<()> {
    config
        .validate()
        .map_err(|e| Error::ConfigError(e.to_string()))
}

/// Rebuild graph state from a store snapshot, skipping records that no
/// longer validate
fn restore_snapshot(config: &Config, snapshot: GraphSnapshot) -> (GraphState, PatternBook) {
    let mut state = GraphState::new(config.graph.embedding_dimensions);
    let capacity = config.learning.window_capacity;

    for stored in snapshot.concepts {
        let concept = stored.concept;
        let stats = ConceptStats::restore(
            concept.effectiveness_score,
            concept.usage_count,
            stored.outcome_window,
            capacity,
            concept.updated_at,
        );
        let id = concept.id.clone();
        if let Err(e) = state.restore_concept(concept, stats) {
            warn!(concept_id = %id, error = %e, "Skipping stored concept");
        }
    }

    for relationship in snapshot.relationships {
        let key = format!("{} -> {}", relationship.source, relationship.target);
        if let Err(e) = state.restore_relationship(relationship) {
            warn!(relationship = %key, error = %e, "Skipping stored relationship");
        }
    }

    let mut patterns = PatternBook::new();
    for pattern in snapshot.patterns {
        patterns.insert(pattern);
    }

    (state, patterns)
}

async fn run_miner(
    core: Arc<GraphCore>,
    mirror: Option<MirrorQueue>,
    mut rx: mpsc::UnboundedReceiver<MinerCommand>,
) {
    while let Some(command) = rx.recv().await {
        let job = match command {
            MinerCommand::Mine(job) => job,
            MinerCommand::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let mined = {
            let state = core.state.read().await;
            let result = core.miner.mine(&state, &job);
            if let Some(node) = state.get(&job.concept_id) {
                node.stats.finish_mining();
            }
            result
        };

        let pattern = match mined {
            Ok(Some(pattern)) => pattern,
            Ok(None) => continue,
            Err(e) => {
                warn!(concept_id = %job.concept_id, error = %e, "Pattern mining failed");
                continue;
            }
        };

        if !core.patterns.write().await.insert(pattern.clone()) {
            debug!(key = %pattern.path_key(), "Pattern already known");
            continue;
        }

        info!(
            pattern_id = %pattern.id,
            sequence = %pattern.path_key(),
            effectiveness = pattern.effectiveness,
            "Pattern discovered"
        );
        core.publish(KnowledgeEvent::PatternDiscovered {
            pattern_id: pattern.id.clone(),
            sequence: pattern.sequence.clone(),
            effectiveness: pattern.effectiveness,
            timestamp: pattern.discovered_at,
        });
        if let Some(mirror) = &mirror {
            mirror.submit(Mutation::UpsertPattern(pattern));
        }
    }
    debug!("Miner worker stopped");
}

async fn await_worker(name: &str, handle: JoinHandle<()>, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Other(format!("{} worker panicked: {}", name, e))),
        Err(_) => {
            warn!(worker = name, timeout_secs = timeout.as_secs(), "Worker did not drain in time");
            Err(Error::Other(format!("{} worker did not stop within {:?}", name, timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{ConceptType, RelationshipType};
    use crate::path::PathOutcome;
    use crate::persistence::InMemoryGraphStore;

    fn concept(id: &str, difficulty: f64, prereqs: &[&str]) -> ConceptDraft {
        ConceptDraft::new(id, id.to_uppercase(), ConceptType::Fundamental)
            .with_difficulty(difficulty)
            .with_prerequisites(prereqs.iter().copied())
    }

    async fn chain(graph: &KnowledgeGraph) {
        graph.submit_concept(concept("a", 0.1, &[])).await.unwrap();
        graph.submit_concept(concept("b", 0.4, &["a"])).await.unwrap();
        graph.submit_concept(concept("c", 0.8, &["b"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_concept_emits_event_once() {
        let graph = KnowledgeGraph::new(Config::default()).unwrap();
        let mut events = graph.subscribe();

        assert_eq!(
            graph.submit_concept(concept("a", 0.1, &[])).await.unwrap(),
            SubmitOutcome::Created
        );
        assert_eq!(
            graph.submit_concept(concept("a", 0.1, &[])).await.unwrap(),
            SubmitOutcome::Unchanged
        );

        assert_eq!(events.recv().await.unwrap().event_type_name(), "concept_created");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_learning_path_and_prerequisites() {
        let graph = KnowledgeGraph::new(Config::default()).unwrap();
        chain(&graph).await;

        let path = graph.get_learning_path(&PathRequest::new("c")).await;
        assert_eq!(path.concept_ids, vec!["a", "b", "c"]);
        assert!(path.used_fallback);

        assert_eq!(graph.get_prerequisites("c").await, vec!["a", "b"]);
        assert!(graph.get_prerequisites("unknown").await.is_empty());

        let path = graph.get_learning_path(&PathRequest::new("zzz")).await;
        assert_eq!(path.outcome, PathOutcome::Unreachable);
    }

    #[tokio::test]
    async fn test_relationship_events() {
        let graph = KnowledgeGraph::new(Config::default()).unwrap();
        chain(&graph).await;
        let mut events = graph.subscribe();

        let draft = RelationshipDraft::new("a", "c", RelationshipType::AppliesTo);
        graph.submit_relationship(draft.clone()).await.unwrap();
        graph.submit_relationship(draft.clone()).await.unwrap();
        let outcome = graph
            .submit_relationship(draft.with_strength(0.9))
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Updated { .. }));
        assert_eq!(events.recv().await.unwrap().event_type_name(), "relationship_created");
        assert_eq!(
            events.recv().await.unwrap().event_type_name(),
            "relationship_strengthened"
        );
        assert_eq!(graph.neighbors("a", TraversalDirection::Outgoing).await.len(), 1);
    }

    #[tokio::test]
    async fn test_related_concepts_order() {
        let graph = KnowledgeGraph::new(Config::default()).unwrap();
        for id in ["hub", "weak", "strong", "far"] {
            graph.submit_concept(concept(id, 0.5, &[])).await.unwrap();
        }
        for (source, target, strength) in [
            ("hub", "weak", 0.2),
            ("hub", "strong", 0.9),
            ("strong", "far", 0.5),
        ] {
            graph
                .submit_relationship(
                    RelationshipDraft::new(source, target, RelationshipType::RelatedTo)
                        .with_strength(strength),
                )
                .await
                .unwrap();
        }

        assert_eq!(
            graph.get_related_concepts("hub", 2, 10).await,
            vec!["strong", "weak", "far"]
        );
        assert_eq!(graph.get_related_concepts("hub", 1, 1).await, vec!["strong"]);
        assert!(graph.get_related_concepts("nope", 3, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_record_outcome_unknown_concept() {
        let graph = KnowledgeGraph::new(Config::default()).unwrap();
        let result = graph.record_outcome("ghost", true, 10.0, None).await;
        assert!(matches!(result, Err(Error::UnknownConcept(_))));
    }

    #[tokio::test]
    async fn test_mining_after_tenth_sample() {
        let graph = KnowledgeGraph::new(Config::default()).unwrap();
        chain(&graph).await;

        for _ in 0..10 {
            graph.record_outcome("c", true, 30.0, None).await.unwrap();
        }
        graph.flush().await;

        let patterns = graph.patterns().await;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].sequence, vec!["b", "c"]);

        // A path walking exactly the mined sequence carries its effectiveness
        let path = graph.get_learning_path(&PathRequest::new("c").from_start(["b"])).await;
        assert_eq!(path.concept_ids, vec!["b", "c"]);
        assert_eq!(path.breakdown.historical_effectiveness, Some(1.0));

        let longer = graph.get_learning_path(&PathRequest::new("c")).await;
        assert_eq!(longer.concept_ids, vec!["a", "b", "c"]);
        assert_eq!(longer.breakdown.historical_effectiveness, None);
    }

    #[tokio::test]
    async fn test_open_restores_and_mirrors() {
        let store = Arc::new(InMemoryGraphStore::new());

        let graph = KnowledgeGraph::open(Config::default(), store.clone()).await.unwrap();
        assert_eq!(graph.storage_mode(), StorageMode::Durable);
        chain(&graph).await;
        graph.record_outcome("a", false, 30.0, None).await.unwrap();
        graph.shutdown().await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.concepts.len(), 3);
        assert_eq!(snapshot.concepts[0].outcome_window, vec![0.0]);

        let reopened = KnowledgeGraph::open(Config::default(), store).await.unwrap();
        let a = reopened.get_concept("a").await.unwrap();
        assert_eq!(a.effectiveness_score, 0.0);
        assert_eq!(a.usage_count, 1);
        assert_eq!(reopened.get_prerequisites("c").await, vec!["a", "b"]);
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_degraded_start_uses_seed() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.json");
        std::fs::write(
            &seed_path,
            r#"{"concepts": [{"id": "a", "name": "A", "type": "fundamental"}]}"#,
        )
        .unwrap();

        let store = Arc::new(InMemoryGraphStore::new());
        store.set_offline(true);
        let mut config = Config::default();
        config.persistence.seed_path = Some(seed_path);

        let graph = KnowledgeGraph::open(config, store.clone()).await.unwrap();

        assert_eq!(graph.storage_mode(), StorageMode::Degraded);
        assert!(graph.get_concept("a").await.is_some());
        graph.submit_concept(concept("b", 0.2, &["a"])).await.unwrap();
        graph.flush().await;
        assert_eq!(store.write_attempts(), 0);
        assert_eq!(graph.stats().await.storage_mode, StorageMode::Degraded);
    }

    #[tokio::test]
    async fn test_degraded_without_store_loads_seed() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.json");
        std::fs::write(
            &seed_path,
            r#"{"concepts": [
                {"id": "a", "name": "A", "type": "fundamental"},
                {"id": "b", "name": "B", "type": "derived", "prerequisites": ["a"]}
            ]}"#,
        )
        .unwrap();
        let mut config = Config::default();
        config.persistence.seed_path = Some(seed_path);

        let graph = KnowledgeGraph::degraded(config).await.unwrap();
        assert_eq!(graph.storage_mode(), StorageMode::Degraded);
        assert_eq!(graph.stats().await.concepts, 2);
        assert_eq!(graph.get_prerequisites("b").await, vec!["a"]);
        graph.shutdown().await.unwrap();

        // A missing seed file leaves the graph empty rather than failing
        let mut config = Config::default();
        config.persistence.seed_path = Some(dir.path().join("absent.json"));
        let graph = KnowledgeGraph::degraded(config).await.unwrap();
        assert_eq!(graph.stats().await.concepts, 0);
        graph.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats() {
        let graph = KnowledgeGraph::new(Config::default()).unwrap();
        chain(&graph).await;
        graph
            .submit_relationship(RelationshipDraft::new("a", "c", RelationshipType::BuildsOn))
            .await
            .unwrap();
        graph.record_outcome("a", true, 30.0, None).await.unwrap();

        let stats = graph.stats().await;
        assert_eq!(stats.concepts, 3);
        assert_eq!(stats.relationships, 1);
        assert_eq!(stats.concepts_by_type.get("fundamental"), Some(&3));
        assert_eq!(stats.relationships_by_type.get("builds_on"), Some(&1));
        assert_eq!(stats.total_outcomes, 1);
        assert!((stats.average_effectiveness - (1.0 + 0.8 + 0.8) / 3.0).abs() < 1e-9);
        assert_eq!(stats.storage_mode, StorageMode::InMemory);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.graph.max_path_depth = 0;
        assert!(matches!(KnowledgeGraph::new(config), Err(Error::ConfigError(_))));
    }
}
