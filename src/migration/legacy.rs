//! Legacy bridge - version-gated patches over the stored `DBVersion`
//!
//! A run from stored version `V` to target `T` applies every patch with
//! `V < version <= T`, in table order. Every patch checks the current schema
//! before changing it, so reapplying a patch is harmless.

use super::SchemaChanges;
use crate::registry::Tables;
use crate::storage::{ConnectionManager, SchemaTable, TableAccess};
use crate::{Error, Result};

/// Databases older than this cannot be bridged
pub const OLDEST_SUPPORTED_VERSION: i64 = 300;
/// Version a fully bridged database carries
pub const LEGACY_TARGET_VERSION: i64 = 400;
/// Version development builds seed, so the newest patches keep reapplying
pub const PREVIOUS_LEGACY_VERSION: i64 = 301;

pub type PatchFn = fn(&mut PatchContext<'_>) -> Result<()>;

#[derive(Clone, Copy)]
pub struct LegacyPatch {
    pub version: i64,
    pub name: &'static str,
    pub apply: PatchFn,
}

impl std::fmt::Debug for LegacyPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyPatch")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The patch chain, ordered by version
pub const LEGACY_PATCHES: &[LegacyPatch] = &[
    LegacyPatch { version: 301, name: "purge_team_analyzer_layout", apply: purge_team_analyzer_layout },
    LegacyPatch { version: 301, name: "match_metadata_columns", apply: match_metadata_columns },
    LegacyPatch { version: 301, name: "player_names", apply: player_names },
    LegacyPatch { version: 301, name: "purge_foreign_fixtures", apply: purge_foreign_fixtures },
    LegacyPatch { version: 301, name: "highlight_event_ids", apply: highlight_event_ids },
    LegacyPatch { version: 301, name: "match_indexes", apply: match_indexes },
    LegacyPatch { version: 400, name: "reset_lineup_layout", apply: reset_lineup_layout },
    LegacyPatch { version: 400, name: "season_and_event_details", apply: season_and_event_details },
    LegacyPatch { version: 400, name: "future_player_training", apply: future_player_training },
];

/// Patches a run from `from` to `to` applies
pub fn pending(patches: &[LegacyPatch], from: i64, to: i64) -> impl Iterator<Item = &LegacyPatch> {
    patches.iter().filter(move |p| p.version > from && p.version <= to)
}

/// Result of running the chain
#[derive(Debug, Default)]
pub struct LegacyRun {
    pub applied: Vec<&'static str>,
    pub changes: SchemaChanges,
}

/// Apply the pending part of `patches`
pub fn run_chain(
    cm: &ConnectionManager,
    tables: &Tables,
    patches: &[LegacyPatch],
    from: i64,
    to: i64,
) -> Result<LegacyRun> {
    let mut ctx = PatchContext::new(cm, tables);
    let mut applied = Vec::new();
    for patch in pending(patches, from, to) {
        tracing::info!(version = patch.version, patch = patch.name, "applying legacy patch");
        (patch.apply)(&mut ctx).map_err(|e| {
            tracing::error!(version = patch.version, patch = patch.name, error = %e, "legacy patch failed");
            Error::Migration(format!("patch {} (version {}) failed: {e}", patch.name, patch.version))
        })?;
        applied.push(patch.name);
    }
    Ok(LegacyRun {
        applied,
        changes: ctx.changes,
    })
}

/// Guarded schema operations available to patches
pub struct PatchContext<'a> {
    cm: &'a ConnectionManager,
    tables: &'a Tables,
    changes: SchemaChanges,
}

impl<'a> PatchContext<'a> {
    pub fn new(cm: &'a ConnectionManager, tables: &'a Tables) -> Self {
        Self {
            cm,
            tables,
            changes: SchemaChanges::default(),
        }
    }

    pub fn connection(&self) -> &'a ConnectionManager {
        self.cm
    }

    pub fn tables(&self) -> &'a Tables {
        self.tables
    }

    pub fn changes(&self) -> SchemaChanges {
        self.changes
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        self.cm.column_exists(table, column)
    }

    fn definition(&self, table: &str) -> Result<&'a dyn SchemaTable> {
        self.tables
            .by_name(table)
            .ok_or_else(|| Error::Migration(format!("no definition for table {table}")))
    }

    /// Add `column` with its declared type unless it exists
    pub fn add_column(&mut self, table: &str, column: &str) -> Result<bool> {
        if self.cm.column_exists(table, column)? {
            return Ok(false);
        }
        let column_type = self
            .definition(table)?
            .column_type(column, self.cm.db_info()?)
            .ok_or_else(|| Error::Migration(format!("no definition for column {table}.{column}")))?;
        self.cm
            .execute_update(&format!("ALTER TABLE {table} ADD COLUMN {column} {column_type}"))?;
        tracing::debug!(table, column, "added column");
        self.changes.columns_added += 1;
        Ok(true)
    }

    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<bool> {
        if !self.cm.column_exists(table, column)? {
            return Ok(false);
        }
        self.cm.execute_update(&format!("ALTER TABLE {table} DROP COLUMN {column}"))?;
        tracing::debug!(table, column, "dropped column");
        self.changes.columns_dropped += 1;
        Ok(true)
    }

    /// Rename `from` to `to` when only `from` exists
    pub fn rename_column(&mut self, table: &str, from: &str, to: &str) -> Result<bool> {
        if !self.cm.column_exists(table, from)? || self.cm.column_exists(table, to)? {
            return Ok(false);
        }
        self.cm
            .execute_update(&format!("ALTER TABLE {table} RENAME COLUMN {from} TO {to}"))?;
        tracing::debug!(table, from, to, "renamed column");
        self.changes.columns_renamed += 1;
        Ok(true)
    }

    pub fn create_index(&mut self, name: &str, table: &str, columns: &str) -> Result<bool> {
        if self.cm.index_exists(name)? {
            return Ok(false);
        }
        self.cm
            .execute_update(&format!("CREATE INDEX {name} ON {table} ({columns})"))?;
        self.changes.indexes_created += 1;
        Ok(true)
    }

    /// Create a known table and its indexes unless it exists
    pub fn create_table(&mut self, table: &str) -> Result<bool> {
        if self.cm.table_exists(table)? {
            return Ok(false);
        }
        let definition = self.definition(table)?;
        definition.create_table(self.cm)?;
        self.changes.indexes_created += definition.create_indexes(self.cm)?;
        self.changes.tables_created += 1;
        Ok(true)
    }

    /// Remove stale preference rows
    pub fn purge_config_keys(&mut self, keys: &[&str]) -> Result<usize> {
        let removed = TableAccess::new(&self.tables.config, self.cm).remove_keys(keys)?;
        self.changes.rows_purged += removed;
        Ok(removed)
    }

    /// Run a data-rewriting statement
    pub fn rewrite(&mut self, sql: &str) -> Result<usize> {
        let changed = self.cm.execute_update(sql)?;
        self.changes.rows_rewritten += changed;
        Ok(changed)
    }

    pub fn count_purged(&mut self, rows: usize) {
        self.changes.rows_purged += rows;
    }
}

// ========== Version 301 ==========

fn purge_team_analyzer_layout(ctx: &mut PatchContext<'_>) -> Result<()> {
    ctx.purge_config_keys(&[
        "teamAnalyzer_LowerLefSplitPane",
        "teamAnalyzer_UpperLeftSplitPane",
        "teamAnalyzer_MainSplitPane",
        "teamAnalyzer_BottomSplitPane",
    ])?;
    Ok(())
}

fn match_metadata_columns(ctx: &mut PatchContext<'_>) -> Result<()> {
    for column in ["ArenaId", "RegionId", "Weather", "WeatherForecast", "isDerby", "isNeutral"] {
        ctx.add_column("MATCHESKURZINFO", column)?;
    }
    Ok(())
}

fn player_names(ctx: &mut PatchContext<'_>) -> Result<()> {
    ctx.add_column("SPIELER", "FirstName")?;
    ctx.add_column("SPIELER", "NickName")?;
    if !ctx.rename_column("SPIELER", "Name", "LastName")? {
        ctx.add_column("SPIELER", "LastName")?;
    }
    for column in ["LastMatchDate", "LastMatchRating", "LastMatchId"] {
        ctx.add_column("SPIELER", column)?;
    }
    Ok(())
}

/// Keep only fixture lists of leagues the own team played in
fn purge_foreign_fixtures(ctx: &mut PatchContext<'_>) -> Result<()> {
    let cm = ctx.connection();
    let team_ids = cm.execute_query("SELECT TeamID FROM BASICS ORDER BY Datum DESC LIMIT 1", |row| {
        row.get::<_, i32>(0).map_err(Error::from)
    })?;
    let Some(team_id) = team_ids.first().copied() else {
        tracing::debug!("no team snapshot, keeping all fixture lists");
        return Ok(());
    };

    let tables = ctx.tables();
    let fixtures = TableAccess::new(&tables.fixtures, cm);
    let pairings = TableAccess::new(&tables.pairings, cm);
    let own = pairings.leagues_of_team(team_id)?;

    let mut purged = 0;
    for plan in fixtures.load_all()? {
        if own.contains(&(plan.league_id, plan.season)) {
            continue;
        }
        purged += pairings.delete_for_league(plan.league_id, plan.season)?;
        purged += fixtures.delete(&plan.key())?;
    }
    ctx.count_purged(purged);
    Ok(())
}

fn highlight_event_ids(ctx: &mut PatchContext<'_>) -> Result<()> {
    if ctx.add_column("MATCHHIGHLIGHTS", "EVENT_INDEX")? {
        ctx.rewrite(
            "UPDATE MATCHHIGHLIGHTS SET EVENT_INDEX = (SELECT COUNT(*) FROM MATCHHIGHLIGHTS h \
             WHERE h.MatchID = MATCHHIGHLIGHTS.MatchID AND h.rowid < MATCHHIGHLIGHTS.rowid) \
             WHERE EVENT_INDEX IS NULL",
        )?;
    }
    ctx.add_column("MATCHHIGHLIGHTS", "INJURY_TYPE")?;
    ctx.add_column("MATCHHIGHLIGHTS", "MATCH_EVENT_ID")?;

    if ctx.column_exists("MATCHHIGHLIGHTS", "TYP")? {
        let code = if ctx.column_exists("MATCHHIGHLIGHTS", "SUBTYP")? {
            "(TYP * 100) + SUBTYP"
        } else {
            "TYP * 100"
        };
        ctx.rewrite(&format!(
            "UPDATE MATCHHIGHLIGHTS SET MATCH_EVENT_ID = {code} WHERE MATCH_EVENT_ID IS NULL"
        ))?;
    }
    for column in ["TYP", "SUBTYP", "HEIMTORE", "GASTTORE"] {
        ctx.drop_column("MATCHHIGHLIGHTS", column)?;
    }
    Ok(())
}

fn match_indexes(ctx: &mut PatchContext<'_>) -> Result<()> {
    ctx.create_index("matchkurzinfo_heimid_idx", "MATCHESKURZINFO", "HeimID")?;
    ctx.create_index("matchkurzinfo_gastid_idx", "MATCHESKURZINFO", "GastID")?;
    ctx.create_index("matchhighlights_teamid_idx", "MATCHHIGHLIGHTS", "TeamID")?;
    ctx.create_index("matchhighlights_eventid_idx", "MATCHHIGHLIGHTS", "MATCH_EVENT_ID")?;
    Ok(())
}

// ========== Version 400 ==========

fn reset_lineup_layout(ctx: &mut PatchContext<'_>) -> Result<()> {
    ctx.purge_config_keys(&[
        "aufstellungsPanel_verticalSplitPane",
        "aufstellungsPanel_horizontalLeftSplitPane",
        "aufstellungsPanel_horizontalRightSplitPane",
        "spielerUebersichtsPanel_horizontalRightSplitPane",
    ])?;
    let reset = TableAccess::new(&ctx.tables().user_columns, ctx.connection()).reset_range(2000, 4000)?;
    ctx.count_purged(reset);
    Ok(())
}

fn season_and_event_details(ctx: &mut PatchContext<'_>) -> Result<()> {
    ctx.add_column("BASICS", "SeasonOffset")?;
    ctx.add_column("MATCHESKURZINFO", "Duration")?;
    ctx.add_column("MATCHHIGHLIGHTS", "MatchPart")?;
    ctx.add_column("MATCHHIGHLIGHTS", "EventVariation")?;
    Ok(())
}

fn future_player_training(ctx: &mut PatchContext<'_>) -> Result<()> {
    ctx.create_table("FUTUREPLAYERTRAINING")?;
    Ok(())
}

/// Tables a version-300 database has, in their version-300 shape
#[cfg(test)]
pub(crate) const VERSION_300_SCHEMA: &str = "
    CREATE TABLE USERCONFIGURATION (CONFIG_KEY VARCHAR(50) NOT NULL PRIMARY KEY, CONFIG_VALUE VARCHAR(256));
    CREATE TABLE BASICS (HRF_ID INTEGER NOT NULL PRIMARY KEY, TeamID INTEGER NOT NULL, TeamName VARCHAR(127),
        Manager VARCHAR(127), Datum TIMESTAMP NOT NULL, Season INTEGER NOT NULL, Spieltag INTEGER NOT NULL);
    CREATE INDEX IBASICS_2 ON BASICS(Datum);
    CREATE TABLE SPIELPLAN (LigaID INTEGER NOT NULL, Saison INTEGER NOT NULL, LigaName VARCHAR(256),
        FetchDate TIMESTAMP NOT NULL);
    CREATE TABLE PAARUNG (LigaID INTEGER NOT NULL, Saison INTEGER NOT NULL, MatchID INTEGER NOT NULL,
        Spieltag INTEGER NOT NULL, HeimName VARCHAR(256), HeimID INTEGER NOT NULL, GastName VARCHAR(256),
        GastID INTEGER NOT NULL, Datum TIMESTAMP, ToreHeim INTEGER, ToreGast INTEGER);
    CREATE INDEX IPAARUNG_1 ON PAARUNG(LigaID, Saison);
    CREATE TABLE MATCHESKURZINFO (MatchID INTEGER NOT NULL, MatchTyp INTEGER NOT NULL, HeimName VARCHAR(256),
        HeimID INTEGER NOT NULL, GastName VARCHAR(256), GastID INTEGER NOT NULL, MatchDate TIMESTAMP,
        HeimTore INTEGER, GastTore INTEGER, Status INTEGER);
    CREATE TABLE MATCHHIGHLIGHTS (MatchID INTEGER NOT NULL, MatchTyp INTEGER, Minute INTEGER, TYP INTEGER,
        SUBTYP INTEGER, HEIMTORE INTEGER, GASTTORE INTEGER, MATCH_EVENT_ID INTEGER, TeamID INTEGER,
        SpielerID INTEGER, SpielerName VARCHAR(256), SpielerHeim BOOLEAN, GehilfeID INTEGER,
        GehilfeName VARCHAR(256), EventText TEXT);
    CREATE TABLE SPIELER (HRF_ID INTEGER NOT NULL, SpielerID INTEGER NOT NULL, Name VARCHAR(100),
        Datum TIMESTAMP NOT NULL, Age INTEGER, Form INTEGER, Kondition INTEGER, Rating INTEGER);
    CREATE INDEX ISPIELER_1 ON SPIELER(SpielerID);
    CREATE TABLE USERCOLUMNS (COLUMN_ID INTEGER NOT NULL PRIMARY KEY, MODELL_INDEX INTEGER NOT NULL,
        TABLE_INDEX INTEGER NOT NULL, COLUMN_WIDTH INTEGER);
";

#[cfg(test)]
pub(crate) fn seed_version_300(cm: &ConnectionManager) {
    cm.execute_batch(VERSION_300_SCHEMA).unwrap();
    cm.execute_batch(
        "INSERT INTO USERCONFIGURATION VALUES ('DBVersion', '300');
         INSERT INTO USERCONFIGURATION VALUES ('teamAnalyzer_MainSplitPane', '240');
         INSERT INTO USERCONFIGURATION VALUES ('aufstellungsPanel_verticalSplitPane', '310');
         INSERT INTO USERCONFIGURATION VALUES ('lastLogin', '2024-05-01');
         INSERT INTO BASICS VALUES (1, 77, 'Eintracht Hinterdorf', 'Udo', '2024-04-01 09:00:00', 88, 3);
         INSERT INTO SPIELPLAN VALUES (10, 88, 'VI.34', '2024-04-01 09:00:00');
         INSERT INTO SPIELPLAN VALUES (11, 88, 'VI.35', '2024-04-01 09:00:00');
         INSERT INTO PAARUNG VALUES (10, 88, 1000, 1, 'Eintracht Hinterdorf', 77, 'SV Nord', 78, NULL, NULL, NULL);
         INSERT INTO PAARUNG VALUES (11, 88, 2000, 1, 'FC Fremd', 90, 'SV Fremd', 91, NULL, NULL, NULL);
         INSERT INTO MATCHESKURZINFO VALUES (1000, 1, 'Eintracht Hinterdorf', 77, 'SV Nord', 78,
             '2024-04-02 15:00:00', 2, 1, 1);
         INSERT INTO MATCHHIGHLIGHTS (MatchID, Minute, TYP, SUBTYP, TeamID) VALUES (1000, 12, 4, 21, 77);
         INSERT INTO MATCHHIGHLIGHTS (MatchID, Minute, TYP, SUBTYP, TeamID) VALUES (1000, 80, 5, 52, 78);
         INSERT INTO SPIELER VALUES (1, 501, 'Rahn', '2024-04-01 09:00:00', 24, 7, 8, 6);
         INSERT INTO USERCOLUMNS VALUES (1001, 1, 0, 80);
         INSERT INTO USERCOLUMNS VALUES (2100, 2, 1, 60);
         INSERT INTO USERCOLUMNS VALUES (3100, 3, 2, 60);",
    )
    .unwrap();
}
