//! Background mirroring with bounded retry
//!
//! Mutations are queued on an unbounded channel and applied in order by a
//! single worker task. Each write gets `max_attempts` tries with exponential
//! backoff; a write that still fails is dead-lettered: logged, kept in memory,
//! appended to the dead-letter JSONL file when one is configured, and
//! announced as a `MutationDeadLettered` event.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{GraphStore, Mutation};
use crate::config::PersistenceConfig;
use crate::domain::knowledge::KnowledgeEvent;
use crate::error::Error;

/// Retry schedule for mirror writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PersistenceConfig::default())
    }
}

/// A mutation that exhausted its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub mutation: Mutation,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

enum MirrorCommand {
    Apply(Mutation),
    Flush(oneshot::Sender<()>),
}

/// Handle for queueing mutations to the background mirror
///
/// Clones share the same worker. The worker exits once every handle is dropped
/// and the queue has drained.
#[derive(Debug, Clone)]
pub struct MirrorQueue {
    tx: mpsc::UnboundedSender<MirrorCommand>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl std::fmt::Debug for MirrorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply(m) => write!(f, "Apply({})", m.describe()),
            Self::Flush(_) => write!(f, "Flush"),
        }
    }
}

impl MirrorQueue {
    /// Start the mirror worker on the current runtime
    pub fn spawn(
        store: Arc<dyn GraphStore>,
        policy: RetryPolicy,
        dead_letter_path: Option<PathBuf>,
        events: broadcast::Sender<KnowledgeEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dead_letters = Arc::new(Mutex::new(Vec::new()));

        let worker = MirrorWorker {
            store,
            policy,
            dead_letter_path,
            events,
            dead_letters: Arc::clone(&dead_letters),
        };
        let handle = tokio::spawn(worker.run(rx));

        (Self { tx, dead_letters }, handle)
    }

    /// Queue a mutation; never blocks
    pub fn submit(&self, mutation: Mutation) {
        if let Err(e) = self.tx.send(MirrorCommand::Apply(mutation)) {
            if let MirrorCommand::Apply(mutation) = e.0 {
                warn!(mutation = %mutation.describe(), "Mirror worker has stopped, dropping mutation");
            }
        }
    }

    /// Wait until everything queued before this call has been handled
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(MirrorCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct MirrorWorker {
    store: Arc<dyn GraphStore>,
    policy: RetryPolicy,
    dead_letter_path: Option<PathBuf>,
    events: broadcast::Sender<KnowledgeEvent>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl MirrorWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<MirrorCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                MirrorCommand::Apply(mutation) => self.apply(mutation).await,
                MirrorCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Mirror worker stopped");
    }

    async fn apply(&self, mutation: Mutation) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.apply(&mutation).await {
                Ok(()) => {
                    debug!(mutation = %mutation.describe(), attempt, "Mutation mirrored");
                    return;
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        mutation = %mutation.describe(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Mirror write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let failure = Error::PersistenceMirrorFailed(format!(
                        "{} gave up after {} attempts: {}",
                        mutation.describe(),
                        attempt,
                        e
                    ));
                    self.dead_letter(mutation, failure, attempt).await;
                    return;
                }
            }
        }
    }

    async fn dead_letter(&self, mutation: Mutation, failure: Error, attempts: u32) {
        error!(
            mutation = %mutation.describe(),
            attempts,
            code = failure.code(),
            error = %failure,
            "Mirror write exhausted retries"
        );

        let letter = DeadLetter {
            mutation,
            error: failure.to_string(),
            attempts,
            failed_at: Utc::now(),
        };

        if let Some(path) = &self.dead_letter_path {
            if let Err(e) = append_jsonl(path, &letter).await {
                warn!(path = %path.display(), error = %e, "Failed to append dead letter");
            }
        }

        let _ = self.events.send(KnowledgeEvent::MutationDeadLettered {
            mutation: letter.mutation.describe(),
            error: letter.error.clone(),
            timestamp: letter.failed_at,
        });

        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(letter);
    }
}

async fn append_jsonl(path: &Path, letter: &DeadLetter) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut line = serde_json::to_string(letter)?;
    line.push('\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Concept, ConceptDraft, ConceptType};
    use crate::persistence::{InMemoryGraphStore, StoredConcept};

    fn mutation(id: &str) -> Mutation {
        let draft = ConceptDraft::new(id, id, ConceptType::Applied);
        Mutation::UpsertConcept(StoredConcept::new(Concept::from_draft(draft, 0.8), vec![]))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(InMemoryGraphStore::new());
        store.fail_next_writes(2);
        let (events, _) = broadcast::channel(16);
        let (queue, handle) = MirrorQueue::spawn(store.clone(), policy(), None, events);

        queue.submit(mutation("a"));
        queue.flush().await;

        assert_eq!(store.write_attempts(), 3);
        assert_eq!(store.snapshot().concepts.len(), 1);
        assert_eq!(queue.dead_letter_count(), 0);

        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_dead_lettered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.jsonl");
        let store = Arc::new(InMemoryGraphStore::new());
        store.set_offline(true);
        let (events, mut rx) = broadcast::channel(16);
        let (queue, handle) =
            MirrorQueue::spawn(store.clone(), policy(), Some(path.clone()), events);

        queue.submit(mutation("a"));
        queue.submit(mutation("b"));
        queue.flush().await;

        let letters = queue.dead_letters();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].attempts, 3);
        assert!(letters[0].error.starts_with("Persistence mirror failed: "));
        assert!(letters[0].error.contains("after 3 attempts"));
        assert_eq!(store.write_attempts(), 6);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type_name(), "mutation_dead_lettered");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: DeadLetter = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.mutation, letters[1].mutation);

        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_when_handles_drop() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (events, _) = broadcast::channel(16);
        let (queue, handle) = MirrorQueue::spawn(store.clone(), policy(), None, events);
        let clone = queue.clone();

        clone.submit(mutation("a"));
        drop(clone);
        drop(queue);
        handle.await.unwrap();

        assert_eq!(store.snapshot().concepts.len(), 1);
    }
}
