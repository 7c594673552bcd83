//! Versioned migration scripts named `V<version>__<description>.sql`

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

static SCRIPT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^V(\d+)__(.+)\.sql$").expect("script name pattern is valid"));

/// One ordered schema script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: u32,
    pub description: String,
    pub file_name: String,
    pub sql: String,
}

impl MigrationScript {
    /// Parse the file name; `None` when it does not follow the naming scheme
    /// or the version does not fit a `u32`
    pub fn parse(file_name: &str, sql: impl Into<String>) -> Option<Self> {
        let caps = SCRIPT_NAME.captures(file_name)?;
        let version = caps[1].parse().ok()?;
        Some(Self {
            version,
            description: caps[2].replace('_', " "),
            file_name: file_name.to_string(),
            sql: sql.into(),
        })
    }

    /// Content hash recorded in the history table
    pub fn checksum(&self) -> String {
        blake3::hash(self.sql.as_bytes()).to_hex().to_string()
    }
}

/// Scripts sorted by version, versions unique
#[derive(Debug, Clone, Default)]
pub struct ScriptSet {
    scripts: Vec<MigrationScript>,
}

impl ScriptSet {
    pub fn new(mut scripts: Vec<MigrationScript>) -> Result<Self> {
        scripts.sort_by_key(|s| s.version);
        if let Some(zero) = scripts.iter().find(|s| s.version == 0) {
            return Err(Error::Migration(format!("script {} uses reserved version 0", zero.file_name)));
        }
        if let Some(pair) = scripts.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(Error::Migration(format!(
                "scripts {} and {} share version {}",
                pair[0].file_name, pair[1].file_name, pair[0].version
            )));
        }
        Ok(Self { scripts })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Scripts compiled into the binary
    pub fn embedded() -> Result<Self> {
        let files = [
            ("V1__baseline.sql", include_str!("../../migrations/V1__baseline.sql")),
            ("V2__match_date_index.sql", include_str!("../../migrations/V2__match_date_index.sql")),
            ("V3__purge_lineup_layout.sql", include_str!("../../migrations/V3__purge_lineup_layout.sql")),
        ];
        let scripts = files
            .into_iter()
            .map(|(name, sql)| {
                MigrationScript::parse(name, sql)
                    .ok_or_else(|| Error::Migration(format!("bad embedded script name {name}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(scripts)
    }

    /// Load every `V<n>__*.sql` file in `dir`; other files are ignored
    ///
    /// A file that looks like a script but cannot be parsed is an error.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut scripts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !SCRIPT_NAME.is_match(name) {
                tracing::debug!(file = name, "skipping non-migration file");
                continue;
            }
            let sql = fs::read_to_string(&path)?;
            let script = MigrationScript::parse(name, sql).ok_or_else(|| {
                Error::Migration(format!("invalid script name {name}: version is out of range"))
            })?;
            scripts.push(script);
        }
        tracing::debug!(dir = %dir.display(), count = scripts.len(), "loaded migration scripts");
        Self::new(scripts)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationScript> {
        self.scripts.iter()
    }

    pub fn get(&self, version: u32) -> Option<&MigrationScript> {
        self.scripts.iter().find(|s| s.version == version)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn latest_version(&self) -> Option<u32> {
        self.scripts.last().map(|s| s.version)
    }
}
