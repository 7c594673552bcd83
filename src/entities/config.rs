//! User configuration - a key to string store for preferences and versions

use rusqlite::types::Value;

use super::Entity;
use crate::storage::{ColumnBuilder, SqlType, TableAccess, column};
use crate::{Error, Result};

/// Stored legacy schema version
pub const DB_VERSION_KEY: &str = "DBVersion";
/// Stored version of the configuration layout
pub const CONFIG_VERSION_KEY: &str = "DBConfigVersion";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Option<String>,
    stored: bool,
}

storable!(ConfigEntry);

impl ConfigEntry {
    pub fn new(key: &str, value: Option<String>) -> Self {
        Self {
            key: key.to_string(),
            value,
            stored: false,
        }
    }
}

impl Entity for ConfigEntry {
    const TABLE_NAME: &'static str = "USERCONFIGURATION";
    const ID_COLUMN_COUNT: usize = 1;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("CONFIG_KEY", SqlType::Varchar)
                .length(50)
                .nullable(false)
                .primary_key(true)
                .accessors(|e: &Self| e.key.clone(), |e, v| e.key = v),
            column("CONFIG_VALUE", SqlType::Varchar)
                .length(256)
                .accessors(|e: &Self| e.value.clone(), |e, v| e.value = v),
        ]
    }
}

impl TableAccess<'_, ConfigEntry> {
    pub fn value(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .load_by_key(&[Value::Text(key.to_string())])?
            .and_then(|entry| entry.value))
    }

    /// Integer value of `key`; a stored value that is not a number is an error
    pub fn int_value(&self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.value(key)? else {
            return Ok(None);
        };
        raw.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| Error::DataInconsistency {
                table: ConfigEntry::TABLE_NAME.to_string(),
                column: "CONFIG_VALUE".to_string(),
                message: format!("{key}={raw}: {e}"),
            })
    }

    /// Insert or overwrite `key`
    pub fn store_value(&self, key: &str, value: impl ToString) -> Result<()> {
        let mut entry = ConfigEntry::new(key, Some(value.to_string()));
        self.upsert(&mut entry)?;
        Ok(())
    }

    /// Remove the given keys; returns how many rows went away
    pub fn remove_keys(&self, keys: &[&str]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            removed += self.delete(&[Value::Text((*key).to_string())])?;
        }
        Ok(removed)
    }

    pub fn db_version(&self) -> Result<Option<i64>> {
        self.int_value(DB_VERSION_KEY)
    }

    pub fn set_db_version(&self, version: i64) -> Result<()> {
        self.store_value(DB_VERSION_KEY, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConnectionManager, Table};

    fn setup() -> (ConnectionManager, Table<ConfigEntry>) {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = ConfigEntry::table().unwrap();
        table.create_table(&cm).unwrap();
        (cm, table)
    }

    #[test]
    fn test_store_and_read_values() {
        let (cm, table) = setup();
        let config = TableAccess::new(&table, &cm);

        assert_eq!(config.value("lastLogin").unwrap(), None);
        config.store_value("lastLogin", "2024-05-01").unwrap();
        config.store_value("lastLogin", "2024-06-01").unwrap();
        assert_eq!(config.value("lastLogin").unwrap().as_deref(), Some("2024-06-01"));
        assert_eq!(config.count().unwrap(), 1);
    }

    #[test]
    fn test_db_version() {
        let (cm, table) = setup();
        let config = TableAccess::new(&table, &cm);

        assert_eq!(config.db_version().unwrap(), None);
        config.set_db_version(400).unwrap();
        assert_eq!(config.db_version().unwrap(), Some(400));

        config.store_value(DB_VERSION_KEY, "four hundred").unwrap();
        assert!(matches!(config.db_version(), Err(Error::DataInconsistency { .. })));
    }

    #[test]
    fn test_remove_keys() {
        let (cm, table) = setup();
        let config = TableAccess::new(&table, &cm);
        config.store_value("a", 1).unwrap();
        config.store_value("b", 2).unwrap();
        config.store_value("c", 3).unwrap();

        assert_eq!(config.remove_keys(&["a", "c", "missing"]).unwrap(), 2);
        assert_eq!(config.count().unwrap(), 1);
    }
}
