//! SQLite implementation of the GraphStore

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use super::migrations::run_migrations;
use super::{GraphSnapshot, GraphStore, StoredConcept};
use crate::domain::knowledge::{
    CognitiveLevel, Concept, ConceptType, LearningPattern, PatternType, Relationship,
    RelationshipType,
};
use crate::error::{Error, Result};

/// Default maximum connections in the pool
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite-backed durable graph store
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Wrap an existing pool; migrations must already have run
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and run migrations
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        info!(path = %path.display(), "Connected to graph database");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        run_migrations(pool)
            .await
            .map_err(|e| Error::PersistenceUnavailable(format!("Migration failed: {:#}", e)))
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn load_all(&self) -> Result<GraphSnapshot> {
        let concept_rows: Vec<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        let relationship_rows: Vec<RelationshipRow> =
            sqlx::query_as("SELECT * FROM relationships ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        let pattern_rows: Vec<PatternRow> =
            sqlx::query_as("SELECT * FROM learning_patterns ORDER BY discovered_at, id")
                .fetch_all(&self.pool)
                .await?;

        let snapshot = GraphSnapshot {
            concepts: concept_rows
                .into_iter()
                .map(ConceptRow::into_stored)
                .collect::<Result<_>>()?,
            relationships: relationship_rows
                .into_iter()
                .map(RelationshipRow::into_relationship)
                .collect::<Result<_>>()?,
            patterns: pattern_rows
                .into_iter()
                .map(PatternRow::into_pattern)
                .collect::<Result<_>>()?,
        };

        debug!(
            concepts = snapshot.concepts.len(),
            relationships = snapshot.relationships.len(),
            patterns = snapshot.patterns.len(),
            "Loaded graph snapshot"
        );
        Ok(snapshot)
    }

    async fn upsert_concept(&self, stored: &StoredConcept) -> Result<()> {
        let concept = &stored.concept;
        let prerequisites = serde_json::to_string(&concept.prerequisites)?;
        let window = serde_json::to_string(&stored.outcome_window)?;
        let embedding: Option<Vec<u8>> = concept
            .embedding
            .as_ref()
            .map(|e| e.iter().flat_map(|f| f.to_le_bytes()).collect());

        sqlx::query(
            r#"
            INSERT INTO concepts (
                id, name, concept_type, description, cognitive_level, difficulty,
                prerequisites, learning_time_minutes, effectiveness_score, usage_count,
                embedding, outcome_window, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                effectiveness_score = excluded.effectiveness_score,
                usage_count = excluded.usage_count,
                outcome_window = excluded.outcome_window,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&concept.id)
        .bind(&concept.name)
        .bind(concept.concept_type.as_str())
        .bind(&concept.description)
        .bind(concept.cognitive_level.as_str())
        .bind(concept.difficulty)
        .bind(&prerequisites)
        .bind(concept.learning_time_minutes)
        .bind(concept.effectiveness_score)
        .bind(concept.usage_count as i64)
        .bind(embedding)
        .bind(&window)
        .bind(concept.created_at.to_rfc3339())
        .bind(concept.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(concept_id = %concept.id, "Concept upserted");
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let metadata = serde_json::to_string(&relationship.metadata)?;
        let fingerprints = serde_json::to_string(&relationship.draft_fingerprints)?;

        sqlx::query(
            r#"
            INSERT INTO relationships (
                source, target, relationship_type, strength, evidence_count,
                metadata, created_at, updated_at, draft_fingerprints
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, target, relationship_type) DO UPDATE SET
                strength = excluded.strength,
                evidence_count = excluded.evidence_count,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at,
                draft_fingerprints = excluded.draft_fingerprints
            "#,
        )
        .bind(&relationship.source)
        .bind(&relationship.target)
        .bind(relationship.relationship_type.as_str())
        .bind(relationship.strength)
        .bind(relationship.evidence_count as i64)
        .bind(&metadata)
        .bind(relationship.created_at.to_rfc3339())
        .bind(relationship.updated_at.to_rfc3339())
        .bind(&fingerprints)
        .execute(&self.pool)
        .await?;

        debug!(
            source = %relationship.source,
            target = %relationship.target,
            relationship_type = %relationship.relationship_type,
            "Relationship upserted"
        );
        Ok(())
    }

    async fn upsert_pattern(&self, pattern: &LearningPattern) -> Result<()> {
        let sequence = serde_json::to_string(&pattern.sequence)?;
        let context = serde_json::to_string(&pattern.context)?;

        sqlx::query(
            r#"
            INSERT INTO learning_patterns (
                id, pattern_type, sequence, effectiveness, context, discovered_at, usage_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                usage_count = excluded.usage_count
            "#,
        )
        .bind(&pattern.id)
        .bind(pattern.pattern_type.as_str())
        .bind(&sequence)
        .bind(pattern.effectiveness)
        .bind(&context)
        .bind(pattern.discovered_at.to_rfc3339())
        .bind(pattern.usage_count as i64)
        .execute(&self.pool)
        .await?;

        debug!(pattern_id = %pattern.id, "Pattern upserted");
        Ok(())
    }
}

// ========== Database Row Types ==========

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[derive(Debug, FromRow)]
struct ConceptRow {
    id: String,
    name: String,
    concept_type: String,
    description: String,
    cognitive_level: String,
    difficulty: f64,
    prerequisites: String,
    learning_time_minutes: f64,
    effectiveness_score: f64,
    usage_count: i64,
    embedding: Option<Vec<u8>>,
    outcome_window: String,
    created_at: String,
    updated_at: String,
}

impl ConceptRow {
    fn into_stored(self) -> Result<StoredConcept> {
        let concept_type = ConceptType::parse(&self.concept_type)
            .ok_or_else(|| Error::Other(format!("Invalid concept type: {}", self.concept_type)))?;
        let cognitive_level = CognitiveLevel::parse(&self.cognitive_level).ok_or_else(|| {
            Error::Other(format!("Invalid cognitive level: {}", self.cognitive_level))
        })?;
        let prerequisites: Vec<String> = serde_json::from_str(&self.prerequisites)?;
        let outcome_window: Vec<f64> = serde_json::from_str(&self.outcome_window)?;
        let embedding = self.embedding.map(|bytes| {
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect()
        });

        let concept = Concept {
            id: self.id,
            name: self.name,
            concept_type,
            description: self.description,
            cognitive_level,
            difficulty: self.difficulty,
            prerequisites,
            learning_time_minutes: self.learning_time_minutes,
            effectiveness_score: self.effectiveness_score,
            usage_count: self.usage_count.max(0) as u64,
            embedding,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        };
        Ok(StoredConcept::new(concept, outcome_window))
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRow {
    source: String,
    target: String,
    relationship_type: String,
    strength: f64,
    evidence_count: i64,
    metadata: String,
    created_at: String,
    updated_at: String,
    draft_fingerprints: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> Result<Relationship> {
        let relationship_type = RelationshipType::parse(&self.relationship_type).ok_or_else(|| {
            Error::Other(format!("Invalid relationship type: {}", self.relationship_type))
        })?;

        Ok(Relationship {
            source: self.source,
            target: self.target,
            relationship_type,
            strength: self.strength,
            evidence_count: self.evidence_count.clamp(1, u32::MAX as i64) as u32,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            draft_fingerprints: serde_json::from_str(&self.draft_fingerprints)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct PatternRow {
    id: String,
    pattern_type: String,
    sequence: String,
    effectiveness: f64,
    context: String,
    discovered_at: String,
    usage_count: i64,
}

impl PatternRow {
    fn into_pattern(self) -> Result<LearningPattern> {
        let pattern_type = PatternType::parse(&self.pattern_type)
            .ok_or_else(|| Error::Other(format!("Invalid pattern type: {}", self.pattern_type)))?;

        Ok(LearningPattern {
            id: self.id,
            pattern_type,
            sequence: serde_json::from_str(&self.sequence)?,
            effectiveness: self.effectiveness,
            context: serde_json::from_str(&self.context)?,
            discovered_at: parse_timestamp(&self.discovered_at),
            usage_count: self.usage_count.max(0) as u64,
        })
    }
}
