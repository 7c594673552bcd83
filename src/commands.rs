use crate::{ConsoleDialog, OutputMode, Settings, emit_success};
use owo_colors::OwoColorize;
use pitchdb::collab::FileCopyBackup;
use pitchdb::config::{self, PitchConfig};
use pitchdb::migration::ScriptSet;
use pitchdb::ui::{self, Icons, section, success};
use pitchdb::{MigrationReport, Registry, RegistryOptions, Startup};
use std::path::PathBuf;
use std::time::Instant;

fn acquire(settings: &Settings, options: RegistryOptions, output_mode: OutputMode) -> anyhow::Result<Registry> {
    let profile = settings.config.profile(&settings.base);
    let dialog = ConsoleDialog::new(output_mode);
    let registry = Registry::acquire(&profile, options, &dialog, &FileCopyBackup)?;
    Ok(registry)
}

fn print_report(report: &MigrationReport) {
    ui::summary_row("Legacy version:", &ui::version_change(report.from_version, report.stored_version));
    ui::summary_row("Run mode:", report.run_mode.as_str());
    if let Some(backup) = &report.backup {
        ui::status(Icons::BACKUP, "Backup", &backup.display().to_string());
    }
    if !report.patches.is_empty() {
        ui::summary_row("Patches:", &report.patches.join(", "));
        let c = &report.changes;
        ui::summary_row(
            "Changes:",
            &format!(
                "+{} columns, -{} columns, {} renamed, {} indexes, {} tables, {} rows rewritten, {} purged",
                c.columns_added,
                c.columns_dropped,
                c.columns_renamed,
                c.indexes_created,
                c.tables_created,
                c.rows_rewritten,
                c.rows_purged
            ),
        );
    }
    if report.baselined {
        ui::summary_row("Baseline:", "existing schema adopted");
    }
    ui::summary_row("Scripts:", &ui::script_list(&report.scripts_applied));
    ui::summary_row("States:", &ui::state_path(&report.states));
}

pub fn run_init(settings: &Settings, output_mode: OutputMode) -> anyhow::Result<()> {
    let started = Instant::now();
    let registry = acquire(settings, settings.config.registry_options()?, output_mode)?;

    if output_mode.is_human() {
        ui::header(&format!("Profile {}", registry.profile().name.bold()));
        ui::status(Icons::DATABASE, "Database", &registry.profile().db_file().display().to_string());
        match registry.startup() {
            Startup::Created { tables, report } => {
                success(&format!("Created {tables} tables"));
                print_report(report);
            }
            Startup::Migrated(report) if report.is_noop() => success("Database is up to date"),
            Startup::Migrated(report) => {
                success("Database upgraded");
                print_report(report);
            }
        }
        ui::timing(&format!("{:.2?}", started.elapsed()));
    } else {
        emit_success(output_mode, "init", registry.startup())?;
    }
    Ok(())
}

pub fn run_status(settings: &Settings, output_mode: OutputMode) -> anyhow::Result<()> {
    let registry = acquire(settings, settings.config.registry_options()?, output_mode)?;
    let version = registry.schema_version()?;
    let config_version = registry.config().int_value(pitchdb::entities::CONFIG_VERSION_KEY)?;
    let report = registry.startup().report();

    if output_mode.is_human() {
        ui::header(&format!("Profile {}", registry.profile().name.bold()));
        let version = version.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
        let config_version = config_version.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
        let engine = registry
            .connection()
            .db_info()?
            .engine_version()
            .unwrap_or("unknown")
            .to_string();
        let cache = if registry.connection().monitor().is_cache_enabled() { "enabled" } else { "disabled" };
        let db_file = registry.profile().db_file().display().to_string();
        println!(
            "{}",
            ui::stats_table(&[
                ("Database", db_file.as_str()),
                ("SQLite", engine.as_str()),
                ("Schema version", version.as_str()),
                ("Config version", config_version.as_str()),
                ("State", report.state().as_str()),
                ("Run mode", report.run_mode.as_str()),
                ("Statement cache", cache),
            ])
        );
        if registry.is_first_start() {
            ui::info("First start", "database was created by this run");
        }
    } else {
        emit_success(
            output_mode,
            "status",
            serde_json::json!({
                "profile": registry.profile(),
                "schema_version": version,
                "config_version": config_version,
                "first_start": registry.is_first_start(),
                "startup": registry.startup(),
            }),
        )?;
    }
    Ok(())
}

pub fn run_tables(settings: &Settings, output_mode: OutputMode) -> anyhow::Result<()> {
    let registry = acquire(settings, settings.config.registry_options()?, output_mode)?;
    let counts = registry.table_counts()?;

    if output_mode.is_human() {
        section(&format!(" {} Tables ", Icons::STATS));
        println!("{}", ui::count_table(&counts));
    } else {
        let data: serde_json::Map<String, serde_json::Value> =
            counts.into_iter().map(|(name, rows)| (name, rows.into())).collect();
        emit_success(output_mode, "tables", data)?;
    }
    Ok(())
}

pub fn run_migrate(settings: &Settings, scripts: Option<PathBuf>, output_mode: OutputMode) -> anyhow::Result<()> {
    let mut options = settings.config.registry_options()?;
    if let Some(dir) = scripts {
        options.scripts = ScriptSet::from_dir(&dir)?;
    }
    let script_count = options.scripts.len();
    let registry = acquire(settings, options, output_mode)?;
    let report = registry.startup().report();

    if output_mode.is_human() {
        ui::header(&format!("Migrating {} ({script_count} scripts known)", registry.profile().name.bold()));
        if report.is_noop() {
            success("Nothing to migrate");
        } else {
            success("Migration complete");
        }
        print_report(report);
    } else {
        emit_success(output_mode, "migrate", report)?;
    }
    Ok(())
}

pub fn run_cache(settings: &Settings, disabled: bool, output_mode: OutputMode) -> anyhow::Result<()> {
    let mut options = settings.config.registry_options()?;
    if disabled {
        options.statement_cache = false;
    }
    let registry = acquire(settings, options, output_mode)?;
    // one pass over every table so the cache shows the steady-state statements
    registry.table_counts()?;
    registry.config().db_version()?;

    let monitor = registry.connection().monitor();
    registry.connection().statement_cache().dump_stats();
    let mut stats: Vec<_> = monitor.statistics().into_iter().collect();
    stats.sort_by(|a, b| a.0.cmp(&b.0));

    if output_mode.is_human() {
        section(&format!(" {} Statement cache ", Icons::BOLT));
        ui::info("Enabled", &monitor.is_cache_enabled().to_string());
        ui::info("Statements", &monitor.cached_statement_count().to_string());
        if !stats.is_empty() {
            println!("{}", ui::cache_table(&stats));
        }
    } else {
        let data: serde_json::Map<String, serde_json::Value> = stats
            .iter()
            .map(|(sql, s)| Ok::<_, anyhow::Error>((sql.clone(), serde_json::to_value(s)?)))
            .collect::<anyhow::Result<_>>()?;
        emit_success(
            output_mode,
            "cache",
            serde_json::json!({ "enabled": monitor.is_cache_enabled(), "statements": data }),
        )?;
    }
    Ok(())
}

pub fn run_config_init(settings: &Settings, force: bool, output_mode: OutputMode) -> anyhow::Result<()> {
    let config = PitchConfig::starter(&settings.base);
    config::ensure_db_dir(&settings.config_path)?;
    config::write_config(&settings.config_path, &config, force)?;

    if output_mode.is_human() {
        success(&format!("Wrote {}", settings.config_path.display()));
        ui::summary_row("Profile:", config.profile_name());
        ui::summary_row(
            "Database folder:",
            &config.profile(&settings.base).db_folder().display().to_string(),
        );
    } else {
        emit_success(
            output_mode,
            "config-init",
            serde_json::json!({ "path": settings.config_path, "config": config }),
        )?;
    }
    Ok(())
}
