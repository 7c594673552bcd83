//! Applied-script history, one row per baseline or script run

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};

use crate::entities::Entity;
use crate::storage::{ColumnBuilder, SqlType, TableAccess, column};
use crate::{Error, Result};

pub const HISTORY_TABLE: &str = "SCHEMA_HISTORY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    /// Marks the version an existing schema was adopted at
    Baseline,
    Sql,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Baseline => "BASELINE",
            HistoryKind::Sql => "SQL",
        }
    }
}

impl FromStr for HistoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BASELINE" => Ok(HistoryKind::Baseline),
            "SQL" => Ok(HistoryKind::Sql),
            _ => Err(Error::Migration(format!("unknown history entry type '{s}'"))),
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntry {
    pub installed_rank: i64,
    pub version: i64,
    pub description: String,
    pub kind: String,
    pub script: String,
    pub checksum: Option<String>,
    pub installed_on: NaiveDateTime,
    pub execution_time_ms: i64,
    pub success: bool,
    stored: bool,
}

storable!(HistoryEntry);

impl HistoryEntry {
    pub fn new(kind: HistoryKind, version: i64, description: &str, script: &str) -> Self {
        Self {
            version,
            description: description.to_string(),
            kind: kind.as_str().to_string(),
            script: script.to_string(),
            installed_on: Utc::now().naive_utc(),
            success: true,
            ..Self::default()
        }
    }

    pub fn kind(&self) -> Result<HistoryKind> {
        self.kind.parse()
    }
}

impl Entity for HistoryEntry {
    const TABLE_NAME: &'static str = HISTORY_TABLE;
    const ID_COLUMN_COUNT: usize = 1;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("installed_rank", SqlType::Integer)
                .nullable(false)
                .primary_key(true)
                .accessors(|e: &Self| e.installed_rank, |e, v| e.installed_rank = v),
            column("version", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.version, |e, v| e.version = v),
            column("description", SqlType::Varchar)
                .length(200)
                .nullable(false)
                .accessors(|e: &Self| e.description.clone(), |e, v| e.description = v),
            column("type", SqlType::Varchar)
                .length(20)
                .nullable(false)
                .accessors(|e: &Self| e.kind.clone(), |e, v| e.kind = v),
            column("script", SqlType::Varchar)
                .length(1000)
                .nullable(false)
                .accessors(|e: &Self| e.script.clone(), |e, v| e.script = v),
            column("checksum", SqlType::Varchar)
                .length(64)
                .accessors(|e: &Self| e.checksum.clone(), |e, v| e.checksum = v),
            column("installed_on", SqlType::Timestamp)
                .nullable(false)
                .accessors(|e: &Self| e.installed_on, |e, v| e.installed_on = v),
            column("execution_time_ms", SqlType::BigInt)
                .nullable(false)
                .accessors(|e: &Self| e.execution_time_ms, |e, v| e.execution_time_ms = v),
            column("success", SqlType::Boolean)
                .nullable(false)
                .accessors(|e: &Self| e.success, |e, v| e.success = v),
        ]
    }
}

impl TableAccess<'_, HistoryEntry> {
    /// All entries in installation order
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let sql = self.table().select_statement("ORDER BY installed_rank");
        self.load(&sql, &[])
    }

    /// Append `entry` with the next free rank
    pub fn record(&self, entry: &mut HistoryEntry) -> Result<()> {
        let ranks = self.connection().execute_query(
            &format!("SELECT COALESCE(MAX(installed_rank), 0) FROM {HISTORY_TABLE}"),
            |row| row.get::<_, i64>(0).map_err(Error::from),
        )?;
        entry.installed_rank = ranks.first().copied().unwrap_or_default() + 1;
        self.store(entry)?;
        Ok(())
    }

    /// Version of the most recent baseline, if any
    pub fn baseline_version(&self) -> Result<Option<i64>> {
        Ok(self
            .entries()?
            .iter()
            .filter(|e| e.kind == HistoryKind::Baseline.as_str())
            .map(|e| e.version)
            .max())
    }
}
