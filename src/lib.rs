//! # PitchDB - embedded persistence for a football-management companion
//!
//! PitchDB keeps a manager's downloaded match, player and league data in one
//! embedded SQLite database per user profile.
//!
//! PitchDB provides:
//! - A generic table mapper driven by per-column descriptors
//! - A single-connection manager with a shared prepared-statement cache
//! - A two-stage schema migrator (legacy version patches, then versioned scripts)
//! - A registry that bootstraps, upgrades and hands out typed table accessors

pub mod collab;
pub mod config;
#[macro_use]
pub mod entities;
pub mod migration;
pub mod profile;
pub mod registry;
pub mod storage;
pub mod ui;

// Re-exports for convenient access
pub use collab::{BackupService, UserDialog};
pub use migration::{MigrationPlan, MigrationReport, MigrationState, RunMode};
pub use profile::UserProfile;
pub use registry::{Registry, RegistryOptions, Startup};
pub use storage::{ColumnDescriptor, ConnectionManager, SqlType, StatementCache, Table};

/// Result type alias for PitchDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for PitchDB operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database already in use: {0}")]
    Locked(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Failed to prepare statement `{sql}`: {source}")]
    Prepare {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Schema error on {table}: {message}")]
    Schema { table: String, message: String },

    #[error("Inconsistent data in {table}.{column}: {message}")]
    DataInconsistency {
        table: String,
        column: String,
        message: String,
    },

    #[error("Invalid column definition: {0}")]
    InvalidColumn(String),

    #[error("Mapping error on {table}: {message}")]
    Mapping { table: String, message: String },

    #[error("Query on {table} failed: {source} [{sql}]")]
    Query {
        table: String,
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database version {found} is too old, upgrade to version {oldest} first")]
    VersionTooOld { found: i64, oldest: i64 },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Startup aborted: {0}")]
    Fatal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error families used by callers deciding how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Schema,
    Mapping,
    Migration,
    Query,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connection(_)
            | Error::Locked(_)
            | Error::ConnectionClosed
            | Error::Prepare { .. }
            | Error::Fatal(_)
            | Error::Io(_) => ErrorCategory::Connection,
            Error::Schema { .. } | Error::DataInconsistency { .. } => ErrorCategory::Schema,
            Error::InvalidColumn(_) | Error::Mapping { .. } => ErrorCategory::Mapping,
            Error::VersionTooOld { .. } | Error::Migration(_) => ErrorCategory::Migration,
            Error::Query { .. } | Error::Storage(_) => ErrorCategory::Query,
        }
    }

    /// Whether the failure comes from another process holding the store
    pub fn is_locked(&self) -> bool {
        matches!(self, Error::Locked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::ConnectionClosed.category(), ErrorCategory::Connection);
        assert_eq!(
            Error::VersionTooOld { found: 200, oldest: 300 }.category(),
            ErrorCategory::Migration
        );
        assert_eq!(
            Error::Mapping { table: "T".into(), message: "arity".into() }.category(),
            ErrorCategory::Mapping
        );
        let prepare = Error::Prepare {
            sql: "SELEC 1".into(),
            source: rusqlite::Error::InvalidQuery,
        };
        assert_eq!(prepare.category(), ErrorCategory::Connection);
        assert!(Error::Locked("pitch.db".into()).is_locked());
    }

    #[test]
    fn test_too_old_message_names_oldest_version() {
        let msg = Error::VersionTooOld { found: 120, oldest: 300 }.to_string();
        assert!(msg.contains("120"));
        assert!(msg.contains("300"));
    }
}
