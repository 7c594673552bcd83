//! Migration plan - the legacy bridge followed by the declarative stage

use std::path::Path;

use super::declarative::DeclarativeMigrator;
use super::legacy::{
    LEGACY_PATCHES, LEGACY_TARGET_VERSION, LegacyPatch, OLDEST_SUPPORTED_VERSION, PREVIOUS_LEGACY_VERSION, pending,
    run_chain,
};
use super::scripts::ScriptSet;
use super::{MigrationReport, MigrationState, RunMode};
use crate::collab::BackupService;
use crate::registry::Tables;
use crate::storage::{ConnectionManager, TableAccess};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct MigrationPlan {
    run_mode: RunMode,
    target: i64,
    patches: &'static [LegacyPatch],
    scripts: ScriptSet,
}

impl MigrationPlan {
    pub fn new(run_mode: RunMode, scripts: ScriptSet) -> Self {
        Self {
            run_mode,
            target: LEGACY_TARGET_VERSION,
            patches: LEGACY_PATCHES,
            scripts,
        }
    }

    /// Use another patch chain; patches must be ordered and within `target`
    pub fn with_patches(mut self, patches: &'static [LegacyPatch], target: i64) -> Result<Self> {
        if !patches.windows(2).all(|w| w[0].version <= w[1].version) {
            return Err(Error::Migration("legacy patches are not ordered by version".to_string()));
        }
        if let Some(late) = patches.iter().find(|p| p.version > target) {
            return Err(Error::Migration(format!(
                "patch {} (version {}) is beyond target {target}",
                late.name, late.version
            )));
        }
        self.patches = patches;
        self.target = target;
        Ok(self)
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn scripts(&self) -> &ScriptSet {
        &self.scripts
    }

    /// Version written into a freshly created database
    pub fn seed_version(&self) -> i64 {
        if self.run_mode.is_development() {
            PREVIOUS_LEGACY_VERSION
        } else {
            self.target
        }
    }

    /// Legacy patches an upgrade from `stored` would apply
    pub fn pending_patches(&self, stored: i64) -> impl Iterator<Item = &LegacyPatch> {
        pending(self.patches, stored, self.target)
    }

    /// Upgrade an existing database whose stored version is `stored`
    ///
    /// The folder in `db_folder` is backed up before any legacy patch runs;
    /// a failed backup aborts the upgrade with [`Error::Fatal`].
    pub fn upgrade(
        &self,
        cm: &ConnectionManager,
        tables: &Tables,
        stored: i64,
        backup: &dyn BackupService,
        db_folder: &Path,
    ) -> Result<MigrationReport> {
        if stored < OLDEST_SUPPORTED_VERSION {
            return Err(Error::VersionTooOld {
                found: stored,
                oldest: OLDEST_SUPPORTED_VERSION,
            });
        }

        let mut report = MigrationReport::new(self.run_mode, Some(stored), MigrationState::NeedsLegacyBridge);
        if stored > self.target {
            tracing::warn!(stored, target = self.target, "stored version is newer than this build");
        } else {
            if self.pending_patches(stored).next().is_some() {
                let saved = backup
                    .backup(db_folder)
                    .map_err(|e| Error::Fatal(format!("backup before legacy upgrade failed: {e}")))?;
                report.backup = Some(saved);
            }
            let persist = !self.run_mode.is_development() && stored < self.target;
            let run = cm.in_transaction(|cm| {
                let run = run_chain(cm, tables, self.patches, stored, self.target)?;
                if persist {
                    TableAccess::new(&tables.config, cm).set_db_version(self.target)?;
                }
                Ok(run)
            })?;
            report.patches = run.applied.iter().map(|name| name.to_string()).collect();
            report.changes = run.changes;
            if persist {
                report.stored_version = self.target;
            }
            if !report.patches.is_empty() {
                tracing::info!(
                    from = stored,
                    to = report.stored_version,
                    patches = report.patches.len(),
                    "legacy bridge complete"
                );
            }
        }
        report.advance(MigrationState::LegacyBridged)?;

        self.run_declarative(cm, false, &mut report)?;
        Ok(report)
    }

    /// Finish a database whose tables were just created
    pub fn initialize_fresh(&self, cm: &ConnectionManager) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(self.run_mode, None, MigrationState::LegacyBridged);
        report.stored_version = self.seed_version();
        self.run_declarative(cm, true, &mut report)?;
        Ok(report)
    }

    fn run_declarative(&self, cm: &ConnectionManager, fresh: bool, report: &mut MigrationReport) -> Result<()> {
        let run = DeclarativeMigrator::new(self.scripts.clone())?.migrate(cm, fresh)?;
        if run.baselined {
            report.baselined = true;
            report.advance(MigrationState::Baselined)?;
        }
        report.scripts_applied = run.applied;
        report.advance(MigrationState::UpToDate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ConfigEntry, DB_VERSION_KEY, Entity};
    use crate::migration::HISTORY_TABLE;
    use crate::migration::legacy::seed_version_300;
    use std::cell::Cell;
    use std::path::PathBuf;

    /// Counts backups; fails them when `broken`
    #[derive(Default)]
    struct CountingBackup {
        calls: Cell<usize>,
        broken: bool,
    }

    impl BackupService for CountingBackup {
        fn backup(&self, db_folder: &Path) -> Result<PathBuf> {
            self.calls.set(self.calls.get() + 1);
            if self.broken {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            Ok(db_folder.join("backups").join("pitch-test.db"))
        }
    }

    fn folder() -> &'static Path {
        Path::new("/profiles/test")
    }

    fn setup() -> (ConnectionManager, Tables) {
        let cm = ConnectionManager::open_in_memory().unwrap();
        seed_version_300(&cm);
        cm.execute_update("INSERT INTO USERCONFIGURATION VALUES ('lineupPanel_verticalSplitPane', '100')")
            .unwrap();
        (cm, Tables::define().unwrap())
    }

    fn stored_version(cm: &ConnectionManager) -> Option<i64> {
        let table = ConfigEntry::table().unwrap();
        TableAccess::new(&table, cm).db_version().unwrap()
    }

    #[test]
    fn test_upgrade_from_oldest_supported() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::embedded().unwrap());
        let report = plan.upgrade(&cm, &tables, 300, &CountingBackup::default(), folder()).unwrap();

        assert_eq!(report.from_version, Some(300));
        assert_eq!(report.stored_version, 400);
        assert_eq!(report.patches.len(), LEGACY_PATCHES.len());
        assert!(report.baselined);
        assert_eq!(report.scripts_applied, vec![2, 3]);
        assert_eq!(
            report.states,
            vec![
                MigrationState::NeedsLegacyBridge,
                MigrationState::LegacyBridged,
                MigrationState::Baselined,
                MigrationState::UpToDate
            ]
        );
        assert_eq!(stored_version(&cm), Some(400));
        assert!(cm.index_exists("matchkurzinfo_matchdate_idx").unwrap());
        let config = TableAccess::new(&tables.config, &cm);
        assert_eq!(config.value("lineupPanel_verticalSplitPane").unwrap(), None);
    }

    #[test]
    fn test_second_upgrade_is_noop() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::embedded().unwrap());
        plan.upgrade(&cm, &tables, 300, &CountingBackup::default(), folder()).unwrap();

        let report = plan.upgrade(&cm, &tables, 400, &CountingBackup::default(), folder()).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.state(), MigrationState::UpToDate);
        assert_eq!(stored_version(&cm), Some(400));
    }

    #[test]
    fn test_too_old_touches_nothing() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::embedded().unwrap());
        let err = plan.upgrade(&cm, &tables, 200, &CountingBackup::default(), folder()).unwrap_err();
        assert!(matches!(err, Error::VersionTooOld { found: 200, oldest: 300 }));
        assert!(!cm.table_exists(HISTORY_TABLE).unwrap());
        assert!(cm.column_exists("MATCHHIGHLIGHTS", "TYP").unwrap());
    }

    #[test]
    fn test_newer_stored_version_skips_bridge() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::empty());
        let report = plan.upgrade(&cm, &tables, 500, &CountingBackup::default(), folder()).unwrap();
        assert!(report.patches.is_empty());
        assert_eq!(report.stored_version, 500);
        assert!(cm.column_exists("MATCHHIGHLIGHTS", "TYP").unwrap());
    }

    #[test]
    fn test_development_never_advances_version() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Development, ScriptSet::empty());
        assert_eq!(plan.seed_version(), PREVIOUS_LEGACY_VERSION);

        let report = plan.upgrade(&cm, &tables, 300, &CountingBackup::default(), folder()).unwrap();
        assert_eq!(report.patches.len(), LEGACY_PATCHES.len());
        assert_eq!(report.stored_version, 300);
        assert_eq!(stored_version(&cm), Some(300));

        cm.execute_update(&format!("UPDATE USERCONFIGURATION SET CONFIG_VALUE = '301' WHERE CONFIG_KEY = '{DB_VERSION_KEY}'"))
            .unwrap();
        let rerun = plan.upgrade(&cm, &tables, 301, &CountingBackup::default(), folder()).unwrap();
        assert_eq!(rerun.patches.len(), 3);
        assert_eq!(rerun.changes.structural(), 0);
        assert_eq!(stored_version(&cm), Some(301));
    }

    #[test]
    fn test_backup_taken_before_patches() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::empty());
        assert_eq!(plan.pending_patches(300).count(), LEGACY_PATCHES.len());

        let backup = CountingBackup::default();
        let report = plan.upgrade(&cm, &tables, 300, &backup, folder()).unwrap();
        assert_eq!(backup.calls.get(), 1);
        assert_eq!(report.backup, Some(folder().join("backups").join("pitch-test.db")));
    }

    #[test]
    fn test_no_backup_without_pending_patches() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::empty());
        plan.upgrade(&cm, &tables, 300, &CountingBackup::default(), folder()).unwrap();

        let backup = CountingBackup::default();
        let report = plan.upgrade(&cm, &tables, 400, &backup, folder()).unwrap();
        assert_eq!(backup.calls.get(), 0);
        assert_eq!(report.backup, None);

        plan.upgrade(&cm, &tables, 500, &backup, folder()).unwrap();
        assert_eq!(backup.calls.get(), 0);
    }

    #[test]
    fn test_failed_backup_aborts_upgrade() {
        let (cm, tables) = setup();
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::embedded().unwrap());
        let backup = CountingBackup { broken: true, ..CountingBackup::default() };

        let err = plan.upgrade(&cm, &tables, 300, &backup, folder()).unwrap_err();
        assert!(matches!(err, Error::Fatal(_)));
        assert!(cm.column_exists("MATCHHIGHLIGHTS", "TYP").unwrap());
        assert!(!cm.table_exists(HISTORY_TABLE).unwrap());
        assert_eq!(stored_version(&cm), Some(300));
    }

    #[test]
    fn test_patch_order_checked() {
        let plan = MigrationPlan::new(RunMode::Release, ScriptSet::empty());
        assert!(plan.clone().with_patches(LEGACY_PATCHES, 400).is_ok());
        assert!(plan.with_patches(LEGACY_PATCHES, 301).is_err());
    }
}
