//! User profile - where a manager's database lives and how to open it

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::storage::SQLITE_DRIVER;

pub const DB_FILE_NAME: &str = "pitch.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub db_folder: PathBuf,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub driver: String,
}

impl UserProfile {
    pub fn new(name: &str, db_folder: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            db_folder: db_folder.into(),
            user: "sa".to_string(),
            password: String::new(),
            driver: SQLITE_DRIVER.to_string(),
        }
    }

    pub fn db_folder(&self) -> &Path {
        &self.db_folder
    }

    pub fn db_file(&self) -> PathBuf {
        self.db_folder.join(DB_FILE_NAME)
    }

    /// Connection URL handed to the connection manager
    pub fn db_url(&self) -> String {
        format!("sqlite:{}", self.db_file().display())
    }
}
