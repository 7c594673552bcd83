//! Collaborators the registry reports to during bootstrap
//!
//! The persistence layer never talks to the user directly; it asks a
//! [`UserDialog`] and, when the user agrees, a [`BackupService`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::Result;
use crate::profile::DB_FILE_NAME;

/// User-facing prompts raised while opening a database
pub trait UserDialog {
    /// Show an unrecoverable problem
    fn fatal(&self, title: &str, message: &str);

    /// Ask a yes/no question
    fn confirm(&self, question: &str) -> bool;
}

/// Saves a copy of a database folder before a recovery attempt
pub trait BackupService {
    /// Returns the path of the backup written
    fn backup(&self, db_folder: &Path) -> Result<PathBuf>;
}

/// Dialog for unattended runs: logs and declines every question
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessDialog;

impl UserDialog for HeadlessDialog {
    fn fatal(&self, title: &str, message: &str) {
        tracing::error!(title, "{message}");
    }

    fn confirm(&self, question: &str) -> bool {
        tracing::warn!(question, "declining question in headless mode");
        false
    }
}

/// Copies the database file into `<folder>/backups/`
#[derive(Debug, Default, Clone, Copy)]
pub struct FileCopyBackup;

impl BackupService for FileCopyBackup {
    fn backup(&self, db_folder: &Path) -> Result<PathBuf> {
        let source = db_folder.join(DB_FILE_NAME);
        let target_dir = db_folder.join("backups");
        fs::create_dir_all(&target_dir)?;
        let target = target_dir.join(format!("pitch-{}.db", Local::now().format("%Y%m%d-%H%M%S")));
        fs::copy(&source, &target)?;
        tracing::info!(backup = %target.display(), "database backed up");
        Ok(target)
    }
}
