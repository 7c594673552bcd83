//! Declarative stage - ordered scripts tracked in the history table

use std::collections::HashSet;
use std::time::Instant;

use super::history::{HISTORY_TABLE, HistoryEntry, HistoryKind};
use super::scripts::{MigrationScript, ScriptSet};
use crate::entities::Entity;
use crate::storage::{ConnectionManager, Table, TableAccess};
use crate::{Error, Result};

/// Version an existing, bridged schema is adopted at
pub const BASELINE_VERSION: i64 = 1;
const BASELINE_DESCRIPTION: &str = "<< Baseline >>";

/// Outcome of one declarative run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarativeRun {
    pub baselined: bool,
    pub applied: Vec<u32>,
}

pub struct DeclarativeMigrator {
    scripts: ScriptSet,
    history: Table<HistoryEntry>,
}

impl DeclarativeMigrator {
    pub fn new(scripts: ScriptSet) -> Result<Self> {
        Ok(Self {
            scripts,
            history: HistoryEntry::table()?,
        })
    }

    pub fn scripts(&self) -> &ScriptSet {
        &self.scripts
    }

    /// Bring the schema up to the newest script
    ///
    /// A database without history is baselined first unless it was created
    /// in this run (`fresh`), in which case every script applies.
    pub fn migrate(&self, cm: &ConnectionManager, fresh: bool) -> Result<DeclarativeRun> {
        let history = TableAccess::new(&self.history, cm);
        let mut run = DeclarativeRun::default();

        if !cm.table_exists(HISTORY_TABLE)? {
            self.history.create_table(cm)?;
            if !fresh {
                let mut baseline = HistoryEntry::new(
                    HistoryKind::Baseline,
                    BASELINE_VERSION,
                    BASELINE_DESCRIPTION,
                    BASELINE_DESCRIPTION,
                );
                history.record(&mut baseline)?;
                run.baselined = true;
                tracing::info!(version = BASELINE_VERSION, "baselined existing schema");
            }
        }

        let entries = history.entries()?;
        self.validate(&entries)?;

        let baseline = history.baseline_version()?.unwrap_or(0);
        let applied: HashSet<i64> = entries
            .iter()
            .filter(|e| e.kind == HistoryKind::Sql.as_str() && e.success)
            .map(|e| e.version)
            .collect();

        for script in self.scripts.iter() {
            let version = i64::from(script.version);
            if version <= baseline || applied.contains(&version) {
                continue;
            }
            self.apply(cm, &history, script)?;
            run.applied.push(script.version);
        }

        if run.applied.is_empty() {
            tracing::debug!("schema scripts up to date");
        }
        Ok(run)
    }

    /// Applied scripts must still match their recorded checksum
    fn validate(&self, entries: &[HistoryEntry]) -> Result<()> {
        for entry in entries.iter().filter(|e| e.kind == HistoryKind::Sql.as_str()) {
            let local = u32::try_from(entry.version)
                .ok()
                .and_then(|v| self.scripts.get(v));
            let Some(script) = local else {
                tracing::warn!(version = entry.version, script = %entry.script, "applied script not found locally");
                continue;
            };
            let checksum = script.checksum();
            if entry.checksum.as_deref() != Some(checksum.as_str()) {
                return Err(Error::Migration(format!(
                    "checksum mismatch for applied script {} (version {})",
                    script.file_name, script.version
                )));
            }
        }
        Ok(())
    }

    fn apply(&self, cm: &ConnectionManager, history: &TableAccess<'_, HistoryEntry>, script: &MigrationScript) -> Result<()> {
        tracing::info!(version = script.version, script = %script.file_name, "applying schema script");
        let started = Instant::now();
        cm.in_transaction(|cm| {
            cm.execute_batch(&script.sql)?;
            let mut entry = HistoryEntry::new(
                HistoryKind::Sql,
                i64::from(script.version),
                &script.description,
                &script.file_name,
            );
            entry.checksum = Some(script.checksum());
            entry.execution_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
            history.record(&mut entry)
        })
        .map_err(|e| {
            tracing::error!(script = %script.file_name, error = %e, "schema script failed");
            Error::Migration(format!("script {} failed: {e}", script.file_name))
        })
    }
}
