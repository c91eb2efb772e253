//! Error types for Certgraph

use thiserror::Error;

/// Result type alias using Certgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Certgraph error types with helpful messages and suggestions
///
/// Structural errors (`DuplicateConcept`, `UnknownConcept`, `CycleDetected`,
/// `InvalidInput`) are returned synchronously to the caller that attempted the
/// mutation. Mirror and mining failures are only ever logged; they exist as
/// variants so background workers can report them uniformly.
#[derive(Error, Debug)]
pub enum Error {
    // Structural errors (E001-E099)
    #[error("Concept '{0}' already exists with different content. Concepts are immutable once ingested.")]
    DuplicateConcept(String),

    #[error("Concept '{0}' not found. Submit it before referencing it.")]
    UnknownConcept(String),

    #[error("Prerequisite edge {from} -> {to} would close a prerequisite cycle")]
    CycleDetected { from: String, to: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Persistence errors (E100-E199)
    #[error("Persistence mirror failed: {0}")]
    PersistenceMirrorFailed(String),

    #[error("Persistence store unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Learning errors (E200-E299)
    #[error("Pattern mining failed: {0}")]
    PatternMiningFailed(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateConcept(_) => "E001",
            Self::UnknownConcept(_) => "E002",
            Self::CycleDetected { .. } => "E003",
            Self::InvalidInput(_) => "E004",
            Self::PersistenceMirrorFailed(_) => "E100",
            Self::PersistenceUnavailable(_) => "E101",
            Self::DatabaseError(_) => "E102",
            Self::PatternMiningFailed(_) => "E200",
            Self::ConfigError(_) => "E600",
            Self::Serialization(_) => "E900",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Whether this error reflects a rejected structural mutation
    ///
    /// Structural errors are never retried automatically.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateConcept(_)
                | Self::UnknownConcept(_)
                | Self::CycleDetected { .. }
                | Self::InvalidInput(_)
        )
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnknownConcept(id) => Some(format!("certgraph load <seed.json> (missing '{}')", id)),
            Self::DuplicateConcept(id) => {
                Some(format!("Submit changes to '{}' under a new concept id", id))
            }
            Self::PersistenceUnavailable(_) | Self::DatabaseError(_) => {
                Some("certgraph config get persistence.database_path".to_string())
            }
            Self::ConfigError(_) => Some("certgraph config list".to_string()),
            _ => None,
        }
    }
}
