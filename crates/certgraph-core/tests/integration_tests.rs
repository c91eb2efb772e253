//! Certgraph Core Integration Tests

use std::collections::HashSet;
use std::sync::Arc;

use certgraph_core::{
    Error, KnowledgeGraph, PathRequest, StorageMode,
    config::Config,
    domain::knowledge::{
        CognitiveLevel, ConceptDraft, ConceptType, KnowledgeEvent, LearnerProfile,
        RelationshipDraft, RelationshipType,
    },
    graph::{SubmitOutcome, TraversalDirection},
    path::PathOutcome,
    persistence::{GraphSeed, InMemoryGraphStore, SqliteGraphStore},
};

fn concept(id: &str, difficulty: f64, prereqs: &[&str]) -> ConceptDraft {
    ConceptDraft::new(id, id.to_uppercase(), ConceptType::Fundamental)
        .with_difficulty(difficulty)
        .with_prerequisites(prereqs.iter().copied())
}

fn fast_retry_config() -> Config {
    let mut config = Config::default();
    config.persistence.backoff_base_ms = 1;
    config
}

async fn abc(graph: &KnowledgeGraph) {
    graph.submit_concept(concept("A", 0.1, &[])).await.unwrap();
    graph.submit_concept(concept("B", 0.3, &["A"])).await.unwrap();
    graph.submit_concept(concept("C", 0.6, &["B"])).await.unwrap();
}

/// Prerequisites the graph holds for a concept: declared plus incoming
/// `Prerequisite` relationships
async fn prerequisites(graph: &KnowledgeGraph, id: &str) -> HashSet<String> {
    let mut ids: HashSet<String> = graph
        .get_concept(id)
        .await
        .map(|c| c.prerequisites.into_iter().collect())
        .unwrap_or_default();
    for rel in graph.neighbors(id, TraversalDirection::Incoming).await {
        if rel.relationship_type == RelationshipType::Prerequisite {
            ids.insert(rel.source);
        }
    }
    ids
}

#[tokio::test]
async fn test_fallback_path_orders_prerequisites() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    abc(&graph).await;

    let path = graph.get_learning_path(&PathRequest::new("C")).await;

    assert_eq!(path.outcome, PathOutcome::Found);
    assert_eq!(path.concept_ids, vec!["A", "B", "C"]);
    assert!(path.used_fallback);

    let path = graph
        .get_learning_path(&PathRequest::new("C").from_start(["A"]))
        .await;
    assert_eq!(path.concept_ids.last().map(String::as_str), Some("C"));
    assert!(!path.concept_ids.is_empty());
}

#[tokio::test]
async fn test_successful_outcome_on_time_scores_one() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    graph
        .submit_concept(concept("A", 0.1, &[]).with_learning_time(30.0))
        .await
        .unwrap();

    let summary = graph.record_outcome("A", true, 30.0, None).await.unwrap();
    assert_eq!(summary.effectiveness_score, 1.0);
    assert_eq!(summary.samples, 1);

    let fast = graph.record_outcome("A", true, 5.0, None).await.unwrap();
    assert_eq!(fast.sample, 1.0);

    let slow = graph.record_outcome("A", false, 120.0, None).await.unwrap();
    assert_eq!(slow.sample, 0.0);
    assert!((slow.effectiveness_score - 2.0 / 3.0).abs() < 1e-9);

    let concept = graph.get_concept("A").await.unwrap();
    assert_eq!(concept.usage_count, 3);

    let invalid = graph.record_outcome("A", true, f64::NAN, None).await;
    assert!(matches!(invalid, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_prerequisite_relationship_cycle_is_rejected() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    graph.submit_concept(concept("A", 0.1, &[])).await.unwrap();
    graph.submit_concept(concept("B", 0.2, &[])).await.unwrap();

    graph
        .submit_relationship(RelationshipDraft::new("A", "B", RelationshipType::Prerequisite))
        .await
        .unwrap();
    let result = graph
        .submit_relationship(RelationshipDraft::new("B", "A", RelationshipType::Prerequisite))
        .await;

    assert!(matches!(result, Err(Error::CycleDetected { .. })));
    assert_eq!(graph.stats().await.relationships, 1);

    // Non-prerequisite edges may close loops
    graph
        .submit_relationship(RelationshipDraft::new("B", "A", RelationshipType::RelatedTo))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_declared_prerequisite_cycle_is_rejected() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    graph.submit_concept(concept("A", 0.1, &["B"])).await.unwrap();

    let result = graph.submit_concept(concept("B", 0.2, &["A"])).await;

    assert!(matches!(result, Err(Error::CycleDetected { .. })));
    assert!(graph.get_concept("B").await.is_none());
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    abc(&graph).await;
    let draft = RelationshipDraft::new("A", "C", RelationshipType::BuildsOn).with_strength(0.6);
    graph.submit_relationship(draft.clone()).await.unwrap();

    let before = graph.stats().await;
    assert_eq!(
        graph.submit_concept(concept("B", 0.3, &["A"])).await.unwrap(),
        SubmitOutcome::Unchanged
    );
    assert_eq!(
        graph.submit_relationship(draft).await.unwrap(),
        SubmitOutcome::Unchanged
    );
    assert_eq!(graph.stats().await, before);

    let conflicting = graph.submit_concept(concept("B", 0.9, &[])).await;
    assert!(matches!(conflicting, Err(Error::DuplicateConcept(_))));
}

#[tokio::test]
async fn test_merged_relationship_resubmission_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("graph.db");
    let first = RelationshipDraft::new("A", "C", RelationshipType::BuildsOn).with_strength(0.5);
    let second = RelationshipDraft::new("A", "C", RelationshipType::BuildsOn).with_strength(0.9);

    {
        let store = Arc::new(SqliteGraphStore::connect(&db_path).await.unwrap());
        let graph = KnowledgeGraph::open(Config::default(), store).await.unwrap();
        abc(&graph).await;

        graph.submit_relationship(first.clone()).await.unwrap();
        let merged = graph.submit_relationship(second.clone()).await.unwrap();
        assert!(matches!(merged, SubmitOutcome::Updated { .. }));
        assert_eq!(
            graph.submit_relationship(second.clone()).await.unwrap(),
            SubmitOutcome::Unchanged
        );

        let edge = graph.neighbors("A", TraversalDirection::Outgoing).await;
        assert_eq!(edge.len(), 1);
        assert_eq!(edge[0].evidence_count, 2);
        graph.shutdown().await.unwrap();
    }

    // Absorbed drafts are remembered across a restart
    let store = Arc::new(SqliteGraphStore::connect(&db_path).await.unwrap());
    let graph = KnowledgeGraph::open(Config::default(), store).await.unwrap();
    assert_eq!(
        graph.submit_relationship(first).await.unwrap(),
        SubmitOutcome::Unchanged
    );
    assert_eq!(
        graph.submit_relationship(second).await.unwrap(),
        SubmitOutcome::Unchanged
    );
    let edge = graph.neighbors("A", TraversalDirection::Outgoing).await;
    assert_eq!(edge[0].evidence_count, 2);
    graph.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_endpoints_are_rejected() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    graph.submit_concept(concept("A", 0.1, &[])).await.unwrap();

    let result = graph
        .submit_relationship(RelationshipDraft::new("A", "ghost", RelationshipType::BuildsOn))
        .await;
    assert!(matches!(result, Err(Error::UnknownConcept(id)) if id == "ghost"));
}

#[tokio::test]
async fn test_concurrent_outcomes_are_not_lost() {
    let graph = Arc::new(KnowledgeGraph::new(Config::default()).unwrap());
    graph.submit_concept(concept("A", 0.1, &[])).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let graph = Arc::clone(&graph);
        tasks.push(tokio::spawn(async move {
            graph.record_outcome("A", i % 2 == 0, 30.0, None).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let concept = graph.get_concept("A").await.unwrap();
    assert_eq!(concept.usage_count, 16);
    assert!((concept.effectiveness_score - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_found_paths_are_sound_and_valid() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();

    // Deterministic pseudo-random DAG over twelve concepts
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    let ids: Vec<String> = (0..12).map(|i| format!("c{:02}", i)).collect();
    for (i, id) in ids.iter().enumerate() {
        let prereqs: Vec<&str> = (0..i)
            .filter(|_| next() % 4 == 0)
            .map(|j| ids[j].as_str())
            .collect();
        let difficulty = (next() % 100) as f64 / 100.0;
        graph.submit_concept(concept(id, difficulty, &prereqs)).await.unwrap();
    }
    for _ in 0..20 {
        let (a, b) = ((next() % 12) as usize, (next() % 12) as usize);
        if a == b {
            continue;
        }
        let kind = match next() % 3 {
            0 => RelationshipType::BuildsOn,
            1 => RelationshipType::RelatedTo,
            _ => RelationshipType::Prerequisite,
        };
        let (source, target) = if kind == RelationshipType::Prerequisite {
            (a.min(b), a.max(b))
        } else {
            (a, b)
        };
        let strength = (next() % 100) as f64 / 100.0;
        graph
            .submit_relationship(
                RelationshipDraft::new(&ids[source], &ids[target], kind).with_strength(strength),
            )
            .await
            .unwrap();
    }

    for start in [vec![], vec![ids[0].clone()], vec![ids[0].clone(), ids[3].clone()]] {
        for target in &ids {
            let path = graph
                .find_learning_path(&start, target, None)
                .await;
            if !path.is_found() {
                assert!(path.concept_ids.is_empty());
                continue;
            }

            assert_eq!(path.concept_ids.last(), Some(target));
            let unique: HashSet<&String> = path.concept_ids.iter().collect();
            assert_eq!(unique.len(), path.concept_ids.len(), "path repeats a concept");

            let mut covered: HashSet<String> = start.iter().cloned().collect();
            for (i, id) in path.concept_ids.iter().enumerate() {
                if i > 0 {
                    let missing: Vec<String> = prerequisites(&graph, id)
                        .await
                        .into_iter()
                        .filter(|p| !covered.contains(p))
                        .collect();
                    assert!(missing.is_empty(), "{} reached before {:?}", id, missing);
                }
                covered.insert(id.clone());
            }
        }
    }
}

#[tokio::test]
async fn test_profile_alignment_prefers_matching_route() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    for (id, level) in [
        ("start", CognitiveLevel::Understand),
        ("theory", CognitiveLevel::Understand),
        ("lab", CognitiveLevel::Apply),
        ("goal", CognitiveLevel::Apply),
    ] {
        graph
            .submit_concept(
                ConceptDraft::new(id, id, ConceptType::Applied).with_cognitive_level(level),
            )
            .await
            .unwrap();
    }
    for (source, target) in [("start", "theory"), ("theory", "goal"), ("start", "lab"), ("lab", "goal")] {
        graph
            .submit_relationship(RelationshipDraft::new(source, target, RelationshipType::BuildsOn))
            .await
            .unwrap();
    }

    let profile = LearnerProfile::new().targeting(CognitiveLevel::Apply);
    let request = PathRequest::new("goal")
        .from_start(["start"])
        .with_profile(profile);
    let path = graph.get_learning_path(&request).await;

    assert_eq!(path.concept_ids, vec!["start", "lab", "goal"]);
    assert!(!path.used_fallback);
}

#[tokio::test]
async fn test_recommendations_skip_learned_and_blocked() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    abc(&graph).await;
    graph.submit_concept(concept("D", 0.2, &[])).await.unwrap();

    let learned = vec!["A".to_string()];
    let ids: Vec<String> = graph
        .get_recommendations(&learned, 10)
        .await
        .into_iter()
        .map(|r| r.concept_id)
        .collect();

    assert!(ids.contains(&"B".to_string()));
    assert!(ids.contains(&"D".to_string()));
    assert!(!ids.contains(&"A".to_string()));
    assert!(!ids.contains(&"C".to_string()));
    assert!(graph.get_recommendations(&learned, 0).await.is_empty());
}

#[tokio::test]
async fn test_pattern_discovered_after_ten_successes() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    abc(&graph).await;
    let mut events = graph.subscribe();

    for _ in 0..10 {
        graph.record_outcome("C", true, 30.0, None).await.unwrap();
    }
    graph.flush().await;

    let patterns = graph.patterns().await;
    assert_eq!(patterns.len(), 1);
    // Direct prerequisites of C, then C itself
    assert_eq!(patterns[0].sequence, vec!["B", "C"]);
    assert_eq!(patterns[0].effectiveness, 1.0);

    let mut discovered = 0;
    while let Ok(event) = events.try_recv() {
        if let KnowledgeEvent::PatternDiscovered { sequence, .. } = event {
            assert_eq!(sequence, vec!["B", "C"]);
            discovered += 1;
        }
    }
    assert_eq!(discovered, 1);

    // A further success keeps the score above threshold; no new pattern
    graph.record_outcome("C", true, 30.0, None).await.unwrap();
    graph.flush().await;
    assert_eq!(graph.patterns().await.len(), 1);
}

#[tokio::test]
async fn test_no_pattern_below_threshold() {
    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    abc(&graph).await;

    for i in 0..10 {
        graph.record_outcome("C", i % 2 == 0, 30.0, None).await.unwrap();
    }
    graph.flush().await;

    assert!(graph.patterns().await.is_empty());
}

#[tokio::test]
async fn test_degraded_start_when_store_offline() {
    let store = Arc::new(InMemoryGraphStore::new());
    store.set_offline(true);

    let graph = KnowledgeGraph::open(Config::default(), store.clone())
        .await
        .unwrap();

    assert_eq!(graph.storage_mode(), StorageMode::Degraded);
    assert_eq!(graph.stats().await.concepts, 0);

    // The graph still serves reads and writes
    abc(&graph).await;
    let path = graph.get_learning_path(&PathRequest::new("C")).await;
    assert_eq!(path.concept_ids, vec!["A", "B", "C"]);
    graph.shutdown().await.unwrap();
    assert_eq!(store.write_attempts(), 0);
}

#[tokio::test]
async fn test_mirror_failures_are_dead_lettered() {
    let dir = tempfile::tempdir().unwrap();
    let dead_letter_path = dir.path().join("dead-letters.jsonl");
    let mut config = fast_retry_config();
    config.persistence.dead_letter_path = Some(dead_letter_path.clone());

    let store = Arc::new(InMemoryGraphStore::new());
    let graph = KnowledgeGraph::open(config, store.clone()).await.unwrap();
    let mut events = graph.subscribe();

    store.set_offline(true);
    graph.submit_concept(concept("A", 0.1, &[])).await.unwrap();
    graph.flush().await;

    // The in-memory graph is unaffected
    assert!(graph.get_concept("A").await.is_some());

    let letters = graph.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 3);
    assert_eq!(graph.stats().await.dead_letters, 1);

    let mut saw_dead_letter = false;
    while let Ok(event) = events.try_recv() {
        saw_dead_letter |= event.event_type_name() == "mutation_dead_lettered";
    }
    assert!(saw_dead_letter);

    let content = std::fs::read_to_string(&dead_letter_path).unwrap();
    assert_eq!(content.lines().count(), 1);

    graph.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_transient_mirror_failure_recovers() {
    let store = Arc::new(InMemoryGraphStore::new());
    let graph = KnowledgeGraph::open(fast_retry_config(), store.clone())
        .await
        .unwrap();

    store.fail_next_writes(2);
    graph.submit_concept(concept("A", 0.1, &[])).await.unwrap();
    graph.flush().await;

    assert!(graph.dead_letters().is_empty());
    assert_eq!(store.snapshot().concepts.len(), 1);
    graph.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sqlite_restart_restores_graph() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("graph.db");

    {
        let store = Arc::new(SqliteGraphStore::connect(&db_path).await.unwrap());
        let graph = KnowledgeGraph::open(Config::default(), store).await.unwrap();
        assert_eq!(graph.storage_mode(), StorageMode::Durable);

        abc(&graph).await;
        graph
            .submit_relationship(
                RelationshipDraft::new("A", "C", RelationshipType::AppliesTo).with_strength(0.7),
            )
            .await
            .unwrap();
        for _ in 0..10 {
            graph.record_outcome("C", true, 30.0, None).await.unwrap();
        }
        graph.shutdown().await.unwrap();
    }

    let store = Arc::new(SqliteGraphStore::connect(&db_path).await.unwrap());
    let graph = KnowledgeGraph::open(Config::default(), store).await.unwrap();

    let stats = graph.stats().await;
    assert_eq!(stats.concepts, 3);
    assert_eq!(stats.relationships, 1);
    assert_eq!(stats.patterns, 1);

    let c = graph.get_concept("C").await.unwrap();
    assert_eq!(c.usage_count, 10);
    assert_eq!(c.effectiveness_score, 1.0);

    // The window survives, so one failure averages over eleven samples
    let summary = graph.record_outcome("C", false, 30.0, None).await.unwrap();
    assert_eq!(summary.samples, 11);

    assert_eq!(graph.get_prerequisites("C").await, vec!["A", "B"]);
    graph.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_seed_ingestion_reports_rejections() {
    let seed = GraphSeed::from_json(
        r#"{
            "concepts": [
                {"id": "vpc", "name": "VPC", "type": "fundamental", "difficulty": 0.2},
                {"id": "subnets", "name": "Subnets", "type": "derived", "prerequisites": ["vpc"]},
                {"id": "bad", "name": "Bad", "type": "abstract", "difficulty": 4.0}
            ],
            "relationships": [
                {"source": "vpc", "target": "subnets", "type": "part_of", "strength": 0.9},
                {"source": "vpc", "target": "missing", "type": "related_to"}
            ]
        }"#,
    )
    .unwrap();

    let graph = KnowledgeGraph::new(Config::default()).unwrap();
    let report = graph.load_seed(&seed).await;

    assert_eq!(report.created, 3);
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(report.rejected[0].0, "bad");

    let again = graph.load_seed(&seed).await;
    assert_eq!(again.created, 0);
    assert_eq!(again.unchanged, 3);
}
