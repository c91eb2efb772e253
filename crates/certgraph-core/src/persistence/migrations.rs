//! Database migrations
//!
//! Versioned SQLite schema for the durable graph mirror. Migrations are
//! applied automatically when a store connects.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Concepts, relationships, learning patterns
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS concepts (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        concept_type TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        cognitive_level TEXT NOT NULL DEFAULT 'understand',
        difficulty REAL NOT NULL CHECK (difficulty >= 0.0 AND difficulty <= 1.0),
        prerequisites TEXT NOT NULL DEFAULT '[]',
        learning_time_minutes REAL NOT NULL CHECK (learning_time_minutes > 0.0),
        effectiveness_score REAL NOT NULL DEFAULT 0.8,
        usage_count INTEGER NOT NULL DEFAULT 0,
        embedding BLOB,
        outcome_window TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_concepts_type ON concepts(concept_type);

    -- No foreign keys: the in-memory graph is authoritative and mirror
    -- writes may arrive after a concept write was dead-lettered
    CREATE TABLE IF NOT EXISTS relationships (
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        relationship_type TEXT NOT NULL,
        strength REAL NOT NULL CHECK (strength >= 0.0 AND strength <= 1.0),
        evidence_count INTEGER NOT NULL DEFAULT 1,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (source, target, relationship_type)
    );

    CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target);

    CREATE TABLE IF NOT EXISTS learning_patterns (
        id TEXT PRIMARY KEY NOT NULL,
        pattern_type TEXT NOT NULL,
        sequence TEXT NOT NULL,
        effectiveness REAL NOT NULL,
        context TEXT NOT NULL DEFAULT '{}',
        discovered_at TEXT NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 0
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_learning_patterns_sequence
        ON learning_patterns(pattern_type, sequence);
"#;

/// Migration 2: Fingerprints of drafts merged into each relationship
const MIGRATION_V2: &str = r#"
    ALTER TABLE relationships ADD COLUMN draft_fingerprints TEXT NOT NULL DEFAULT '[]';
"#;

/// Get the current schema version
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    // MAX over an empty table yields a single NULL row
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Knowledge graph schema");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Relationship draft fingerprints");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_migrations_apply_once() {
        let pool = pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert_eq!(get_current_version(&pool).await.unwrap(), CURRENT_VERSION);
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, CURRENT_VERSION as i64);
    }

    #[tokio::test]
    async fn test_schema_tables_exist() {
        let pool = pool().await;
        run_migrations(&pool).await.unwrap();

        for table in ["concepts", "relationships", "learning_patterns"] {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_optional(&pool)
                    .await
                    .unwrap();
            assert!(row.is_some(), "missing table {}", table);
        }
    }
}
