//! Registry - the process-lifetime entry point to the store
//!
//! Acquiring a [`Registry`] prepares the database directory, opens the
//! connection, creates or migrates the schema and then hands out one typed
//! accessor per entity kind.

use std::fs;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::collab::{BackupService, UserDialog};
use crate::entities::{
    Basics, CONFIG_VERSION_KEY, ConfigEntry, Entity, FuturePlayerTraining, LeagueFixtures, MatchHighlight,
    MatchSummary, Pairing, Player, UserColumn,
};
use crate::migration::{MigrationPlan, MigrationReport, RunMode, ScriptSet};
use crate::profile::UserProfile;
use crate::storage::{ConnectOptions, ConnectionManager, SchemaTable, Table, TableAccess};
use crate::{Error, Result};

/// Layout version of the configuration rows seeded into a fresh database
pub const CONFIG_LAYOUT_VERSION: i64 = 9;

/// One table definition per entity kind
pub struct Tables {
    pub config: Table<ConfigEntry>,
    pub basics: Table<Basics>,
    pub fixtures: Table<LeagueFixtures>,
    pub pairings: Table<Pairing>,
    pub matches: Table<MatchSummary>,
    pub highlights: Table<MatchHighlight>,
    pub players: Table<Player>,
    pub user_columns: Table<UserColumn>,
    pub future_training: Table<FuturePlayerTraining>,
}

impl Tables {
    /// Build every definition; a defective definition fails here
    pub fn define() -> Result<Self> {
        Ok(Self {
            config: ConfigEntry::table()?,
            basics: Basics::table()?,
            fixtures: LeagueFixtures::table()?,
            pairings: Pairing::table()?,
            matches: MatchSummary::table()?,
            highlights: MatchHighlight::table()?,
            players: Player::table()?,
            user_columns: UserColumn::table()?,
            future_training: FuturePlayerTraining::table()?,
        })
    }

    /// All definitions in creation order
    pub fn all(&self) -> Vec<&dyn SchemaTable> {
        vec![
            &self.config,
            &self.basics,
            &self.fixtures,
            &self.pairings,
            &self.matches,
            &self.highlights,
            &self.players,
            &self.user_columns,
            &self.future_training,
        ]
    }

    /// Definition by table name, ignoring case
    pub fn by_name(&self, name: &str) -> Option<&dyn SchemaTable> {
        self.all().into_iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.all().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub run_mode: RunMode,
    pub statement_cache: bool,
    /// Single-owner lock; a second process opening the store fails fast
    pub exclusive: bool,
    pub scripts: ScriptSet,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Release,
            statement_cache: true,
            exclusive: true,
            scripts: ScriptSet::empty(),
        }
    }
}

/// How the schema was brought up during acquisition
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Startup {
    Created { tables: usize, report: MigrationReport },
    Migrated(MigrationReport),
}

impl Startup {
    pub fn report(&self) -> &MigrationReport {
        match self {
            Startup::Created { report, .. } => report,
            Startup::Migrated(report) => report,
        }
    }
}

pub struct Registry {
    cm: ConnectionManager,
    tables: Tables,
    profile: UserProfile,
    startup: Startup,
}

impl Registry {
    /// Open the profile's store, creating or migrating its schema
    ///
    /// Fatal problems are shown through `dialog` before the error returns.
    pub fn acquire(
        profile: &UserProfile,
        options: RegistryOptions,
        dialog: &dyn UserDialog,
        backup: &dyn BackupService,
    ) -> Result<Self> {
        let tables = Tables::define()?;
        prepare_folder(profile, dialog)?;

        let cm = open_connection(profile, &options, dialog, backup)?;
        cm.set_cache_enabled(options.statement_cache);

        let plan = MigrationPlan::new(options.run_mode, options.scripts);
        let existing = cm.all_table_names()?;
        let fresh = !existing.iter().any(|name| name.eq_ignore_ascii_case(tables.config.name()));

        let startup = if fresh {
            tracing::info!(profile = %profile.name, "creating database");
            create_schema(&cm, &tables, plan.seed_version())?;
            Startup::Created {
                tables: tables.len(),
                report: plan.initialize_fresh(&cm)?,
            }
        } else {
            let stored = TableAccess::new(&tables.config, &cm).db_version()?.unwrap_or(0);
            tracing::debug!(stored, tables = existing.len(), "found existing database");
            match plan.upgrade(&cm, &tables, stored, backup, profile.db_folder()) {
                Ok(report) => Startup::Migrated(report),
                Err(e @ Error::VersionTooOld { .. }) => {
                    dialog.fatal(
                        "Database too old",
                        &format!("{e}. Upgrade with an intermediate release first, then start again."),
                    );
                    return Err(e);
                }
                Err(e @ Error::Fatal(_)) => {
                    dialog.fatal("Backup failed", &format!("{e}. The database was left untouched."));
                    return Err(e);
                }
                Err(e) => {
                    dialog.fatal("Database migration failed", &e.to_string());
                    return Err(e);
                }
            }
        };

        Ok(Self {
            cm,
            tables,
            profile: profile.clone(),
            startup,
        })
    }

    /// Whether this acquisition created the database
    pub fn is_first_start(&self) -> bool {
        matches!(self.startup, Startup::Created { .. })
    }

    pub fn startup(&self) -> &Startup {
        &self.startup
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.cm
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Row count per table, in creation order
    pub fn table_counts(&self) -> Result<Vec<(String, usize)>> {
        self.tables
            .all()
            .into_iter()
            .map(|t| Ok((t.name().to_string(), t.count(&self.cm)?)))
            .collect()
    }

    /// Stored legacy schema version
    pub fn schema_version(&self) -> Result<Option<i64>> {
        self.config().db_version()
    }

    pub fn disconnect(&mut self) {
        self.cm.disconnect();
    }

    // ========== Typed Accessors ==========

    pub fn config(&self) -> TableAccess<'_, ConfigEntry> {
        TableAccess::new(&self.tables.config, &self.cm)
    }

    pub fn basics(&self) -> TableAccess<'_, Basics> {
        TableAccess::new(&self.tables.basics, &self.cm)
    }

    pub fn fixtures(&self) -> TableAccess<'_, LeagueFixtures> {
        TableAccess::new(&self.tables.fixtures, &self.cm)
    }

    pub fn pairings(&self) -> TableAccess<'_, Pairing> {
        TableAccess::new(&self.tables.pairings, &self.cm)
    }

    pub fn matches(&self) -> TableAccess<'_, MatchSummary> {
        TableAccess::new(&self.tables.matches, &self.cm)
    }

    pub fn highlights(&self) -> TableAccess<'_, MatchHighlight> {
        TableAccess::new(&self.tables.highlights, &self.cm)
    }

    pub fn players(&self) -> TableAccess<'_, Player> {
        TableAccess::new(&self.tables.players, &self.cm)
    }

    pub fn user_columns(&self) -> TableAccess<'_, UserColumn> {
        TableAccess::new(&self.tables.user_columns, &self.cm)
    }

    pub fn future_training(&self) -> TableAccess<'_, FuturePlayerTraining> {
        TableAccess::new(&self.tables.future_training, &self.cm)
    }
}

// ========== Bootstrap ==========

/// Create the database folder and check that this process can write to it
fn prepare_folder(profile: &UserProfile, dialog: &dyn UserDialog) -> Result<()> {
    let folder = profile.db_folder();
    let problem = match fs::create_dir_all(folder) {
        Err(e) => Some(format!("cannot create {}: {e}", folder.display())),
        Ok(()) => match NamedTempFile::new_in(folder) {
            Ok(_) => None,
            Err(e) => Some(format!("{} is not writable: {e}", folder.display())),
        },
    };
    if let Some(message) = problem {
        dialog.fatal("Database folder unavailable", &message);
        return Err(Error::Fatal(message));
    }
    Ok(())
}

fn connect(profile: &UserProfile, options: &RegistryOptions) -> Result<ConnectionManager> {
    let mut cm = ConnectionManager::with_options(ConnectOptions {
        exclusive: options.exclusive,
    });
    cm.connect(&profile.db_url(), &profile.user, &profile.password, &profile.driver)?;
    Ok(cm)
}

/// Connect, offering one backup-then-retry round on failure
fn open_connection(
    profile: &UserProfile,
    options: &RegistryOptions,
    dialog: &dyn UserDialog,
    backup: &dyn BackupService,
) -> Result<ConnectionManager> {
    let err = match connect(profile, options) {
        Ok(cm) => return Ok(cm),
        Err(e) => e,
    };

    if err.is_locked() {
        let message = format!("{err}. Close the other program using this profile and start again.");
        dialog.fatal("Database in use", &message);
        return Err(Error::Fatal(message));
    }

    tracing::error!(error = %err, folder = %profile.db_folder().display(), "cannot open database");
    dialog.fatal("Cannot open database", &err.to_string());
    if !dialog.confirm("Back up the database folder and try again?") {
        return Err(Error::Fatal(format!("database not opened: {err}")));
    }

    let saved = backup.backup(profile.db_folder()).map_err(|e| {
        dialog.fatal("Backup failed", &e.to_string());
        Error::Fatal(format!("backup failed: {e}"))
    })?;
    tracing::info!(backup = %saved.display(), "retrying connection after backup");

    connect(profile, options).map_err(|e| {
        dialog.fatal("Cannot open database", &e.to_string());
        Error::Fatal(format!("database not opened after backup: {e}"))
    })
}

/// Create every table and index and seed the configuration rows, atomically
fn create_schema(cm: &ConnectionManager, tables: &Tables, seed_version: i64) -> Result<()> {
    cm.in_transaction(|cm| {
        let mut indexes = 0;
        for table in tables.all() {
            table.create_table(cm)?;
            indexes += table.create_indexes(cm)?;
        }
        let config = TableAccess::new(&tables.config, cm);
        config.set_db_version(seed_version)?;
        config.store_value(CONFIG_VERSION_KEY, CONFIG_LAYOUT_VERSION)?;
        tracing::info!(tables = tables.len(), indexes, version = seed_version, "schema created");
        Ok(())
    })
}
