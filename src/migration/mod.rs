//! Schema migration
//!
//! Databases are upgraded in two stages with separate numbering:
//! 1. the legacy bridge, a version-gated chain of patches driven by the
//!    `DBVersion` configuration value;
//! 2. the declarative stage, ordered `V<n>__<desc>.sql` scripts tracked in
//!    the `SCHEMA_HISTORY` table.

pub mod declarative;
pub mod history;
pub mod legacy;
pub mod plan;
pub mod scripts;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::{Error, Result};

pub use declarative::{DeclarativeMigrator, DeclarativeRun};
pub use history::{HISTORY_TABLE, HistoryEntry, HistoryKind};
pub use legacy::{
    LEGACY_PATCHES, LEGACY_TARGET_VERSION, LegacyPatch, OLDEST_SUPPORTED_VERSION, PREVIOUS_LEGACY_VERSION,
    PatchContext,
};
pub use plan::MigrationPlan;
pub use scripts::{MigrationScript, ScriptSet};

/// How the application was started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Release,
    /// Stored version is never advanced so the newest patches run on every start
    Development,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Release => "release",
            RunMode::Development => "development",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, RunMode::Development)
    }
}

impl FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(RunMode::Release),
            "development" | "dev" => Ok(RunMode::Development),
            _ => Err(Error::Migration(format!("unknown run mode '{s}'"))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one migration run; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    NeedsLegacyBridge,
    LegacyBridged,
    Baselined,
    UpToDate,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::NeedsLegacyBridge => "needs-legacy-bridge",
            MigrationState::LegacyBridged => "legacy-bridged",
            MigrationState::Baselined => "baselined",
            MigrationState::UpToDate => "up-to-date",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of what the legacy patches changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchemaChanges {
    pub columns_added: usize,
    pub columns_dropped: usize,
    pub columns_renamed: usize,
    pub indexes_created: usize,
    pub tables_created: usize,
    pub rows_rewritten: usize,
    pub rows_purged: usize,
}

impl SchemaChanges {
    /// Number of DDL changes, ignoring row rewrites and purges
    pub fn structural(&self) -> usize {
        self.columns_added + self.columns_dropped + self.columns_renamed + self.indexes_created + self.tables_created
    }
}

/// The path one migration run took
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_mode: RunMode,
    /// Stored legacy version before the run; `None` for a fresh database
    pub from_version: Option<i64>,
    /// Legacy version stored after the run
    pub stored_version: i64,
    pub patches: Vec<String>,
    pub changes: SchemaChanges,
    /// Backup taken before the legacy patches ran
    pub backup: Option<PathBuf>,
    pub baselined: bool,
    pub scripts_applied: Vec<u32>,
    pub states: Vec<MigrationState>,
}

impl MigrationReport {
    pub(crate) fn new(run_mode: RunMode, from_version: Option<i64>, start: MigrationState) -> Self {
        Self {
            run_mode,
            from_version,
            stored_version: from_version.unwrap_or_default(),
            patches: Vec::new(),
            changes: SchemaChanges::default(),
            backup: None,
            baselined: false,
            scripts_applied: Vec::new(),
            states: vec![start],
        }
    }

    pub fn state(&self) -> MigrationState {
        self.states.last().copied().unwrap_or(MigrationState::NeedsLegacyBridge)
    }

    pub(crate) fn advance(&mut self, next: MigrationState) -> Result<()> {
        let current = self.state();
        if next < current {
            return Err(Error::Migration(format!("illegal state transition {current} -> {next}")));
        }
        if next != current {
            tracing::debug!(from = %current, to = %next, "migration state");
            self.states.push(next);
        }
        Ok(())
    }

    /// Whether anything was changed
    pub fn is_noop(&self) -> bool {
        self.patches.is_empty() && self.scripts_applied.is_empty() && !self.baselined
    }
}
