use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::migration::{RunMode, ScriptSet};
use crate::profile::UserProfile;
use crate::registry::RegistryOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PitchConfig {
    pub profile: Option<String>,
    pub database_folder: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub development: Option<bool>,
    pub statement_cache: Option<bool>,
    pub migrations: Option<String>,
    pub exclusive_lock: Option<bool>,
}

pub const DEFAULT_PROFILE: &str = "default";

pub fn default_config_path() -> PathBuf {
    PathBuf::from("pitchdb.toml")
}

pub fn default_database_folder_in(base: &Path, profile: &str) -> PathBuf {
    base.join(".pitchdb").join("db").join(profile)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<PitchConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: PitchConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &PitchConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl PitchConfig {
    /// Starter file written by `config-init`
    pub fn starter(base: &Path) -> Self {
        Self {
            profile: Some(DEFAULT_PROFILE.to_string()),
            database_folder: Some(default_database_folder_in(base, DEFAULT_PROFILE).display().to_string()),
            user: Some("sa".to_string()),
            password: None,
            development: Some(false),
            statement_cache: Some(true),
            migrations: None,
            exclusive_lock: Some(true),
        }
    }

    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }

    /// Profile with the configured folder and credentials
    pub fn profile(&self, base: &Path) -> UserProfile {
        let name = self.profile_name();
        let folder = self
            .database_folder
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_database_folder_in(base, name));
        let mut profile = UserProfile::new(name, folder);
        if let Some(user) = &self.user {
            profile.user = user.clone();
        }
        if let Some(password) = &self.password {
            profile.password = password.clone();
        }
        profile
    }

    pub fn run_mode(&self) -> RunMode {
        if self.development.unwrap_or(false) {
            RunMode::Development
        } else {
            RunMode::Release
        }
    }

    /// Scripts from the configured directory, or the embedded set
    pub fn scripts(&self) -> anyhow::Result<ScriptSet> {
        let scripts = match &self.migrations {
            Some(dir) => ScriptSet::from_dir(Path::new(dir))?,
            None => ScriptSet::embedded()?,
        };
        Ok(scripts)
    }

    pub fn registry_options(&self) -> anyhow::Result<RegistryOptions> {
        Ok(RegistryOptions {
            run_mode: self.run_mode(),
            statement_cache: self.statement_cache.unwrap_or(true),
            exclusive: self.exclusive_lock.unwrap_or(true),
            scripts: self.scripts()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("pitchdb.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pitchdb.toml");
        let config = PitchConfig::starter(dir.path());
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.profile_name(), DEFAULT_PROFILE);
        assert_eq!(
            loaded.profile(dir.path()).db_folder(),
            default_database_folder_in(dir.path(), DEFAULT_PROFILE)
        );
    }

    #[test]
    fn test_partial_config_defaults() {
        let config: PitchConfig = toml::from_str("profile = \"weekend\"\ndevelopment = true\n").unwrap();
        let base = Path::new("/srv");
        let profile = config.profile(base);
        assert_eq!(profile.name, "weekend");
        assert_eq!(profile.db_folder(), Path::new("/srv/.pitchdb/db/weekend"));
        assert_eq!(profile.user, "sa");

        let options = config.registry_options().unwrap();
        assert!(options.run_mode.is_development());
        assert!(options.statement_cache);
        assert!(options.exclusive);
        assert_eq!(options.scripts.len(), 3);

        let shared: PitchConfig = toml::from_str("exclusive_lock = false\n").unwrap();
        assert!(!shared.registry_options().unwrap().exclusive);
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("a").join("b").join("pitch.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
