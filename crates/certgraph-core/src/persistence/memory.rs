//! In-memory GraphStore
//!
//! Keeps records in insertion order. Outages can be simulated, which makes it
//! the store of choice for exercising degraded startup and mirror retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{GraphSnapshot, GraphStore, StoredConcept};
use crate::domain::knowledge::{LearningPattern, Relationship, RelationshipKey};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Records {
    snapshot: GraphSnapshot,
    concepts: HashMap<String, usize>,
    relationships: HashMap<RelationshipKey, usize>,
    patterns: HashMap<String, usize>,
}

/// Volatile store holding a [`GraphSnapshot`]
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    records: Mutex<Records>,
    offline: AtomicBool,
    failing_writes: AtomicU32,
    write_attempts: AtomicU64,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a snapshot
    pub fn with_snapshot(snapshot: GraphSnapshot) -> Self {
        let store = Self::new();
        {
            let mut records = store.lock();
            for concept in snapshot.concepts {
                records.put_concept(concept);
            }
            for relationship in snapshot.relationships {
                records.put_relationship(relationship);
            }
            for pattern in snapshot.patterns {
                records.put_pattern(pattern);
            }
        }
        store
    }

    /// While offline every call fails with `PersistenceUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of upserts attempted, including failed ones
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Copy of the stored records
    pub fn snapshot(&self) -> GraphSnapshot {
        self.lock().snapshot.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::PersistenceUnavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    fn begin_write(&self) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(Error::PersistenceUnavailable("injected write failure".into()));
        }
        Ok(())
    }
}

impl Records {
    fn put_concept(&mut self, concept: StoredConcept) {
        match self.concepts.get(&concept.concept.id) {
            Some(&i) => self.snapshot.concepts[i] = concept,
            None => {
                self.concepts
                    .insert(concept.concept.id.clone(), self.snapshot.concepts.len());
                self.snapshot.concepts.push(concept);
            }
        }
    }

    fn put_relationship(&mut self, relationship: Relationship) {
        match self.relationships.get(&relationship.key()) {
            Some(&i) => self.snapshot.relationships[i] = relationship,
            None => {
                self.relationships
                    .insert(relationship.key(), self.snapshot.relationships.len());
                self.snapshot.relationships.push(relationship);
            }
        }
    }

    fn put_pattern(&mut self, pattern: LearningPattern) {
        match self.patterns.get(&pattern.id) {
            Some(&i) => self.snapshot.patterns[i] = pattern,
            None => {
                self.patterns.insert(pattern.id.clone(), self.snapshot.patterns.len());
                self.snapshot.patterns.push(pattern);
            }
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn load_all(&self) -> Result<GraphSnapshot> {
        self.check_online()?;
        Ok(self.snapshot())
    }

    async fn upsert_concept(&self, concept: &StoredConcept) -> Result<()> {
        self.begin_write()?;
        self.lock().put_concept(concept.clone());
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.begin_write()?;
        self.lock().put_relationship(relationship.clone());
        Ok(())
    }

    async fn upsert_pattern(&self, pattern: &LearningPattern) -> Result<()> {
        self.begin_write()?;
        self.lock().put_pattern(pattern.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Concept, ConceptDraft, ConceptType};

    fn stored(id: &str) -> StoredConcept {
        let draft = ConceptDraft::new(id, id, ConceptType::Abstract);
        StoredConcept::new(Concept::from_draft(draft, 0.8), vec![])
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryGraphStore::new();
        store.upsert_concept(&stored("a")).await.unwrap();
        store.upsert_concept(&stored("b")).await.unwrap();

        let mut updated = stored("a");
        updated.outcome_window = vec![1.0];
        store.upsert_concept(&updated).await.unwrap();

        let snapshot = store.load_all().await.unwrap();
        assert_eq!(snapshot.concepts.len(), 2);
        assert_eq!(snapshot.concepts[0].outcome_window, vec![1.0]);
        assert_eq!(store.write_attempts(), 3);
    }

    #[tokio::test]
    async fn test_offline_and_injected_failures() {
        let store = InMemoryGraphStore::new();

        store.set_offline(true);
        assert!(matches!(store.load_all().await, Err(Error::PersistenceUnavailable(_))));
        store.set_offline(false);

        store.fail_next_writes(2);
        assert!(store.upsert_concept(&stored("a")).await.is_err());
        assert!(store.upsert_concept(&stored("a")).await.is_err());
        assert!(store.upsert_concept(&stored("a")).await.is_ok());
        assert_eq!(store.snapshot().concepts.len(), 1);
    }
}
