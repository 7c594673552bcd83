//! Engine dialect and catalog metadata

use rusqlite::{Connection, OptionalExtension};

use super::column::SqlType;
use crate::Result;

/// Maps portable column types to engine-specific type names
pub trait Dialect {
    fn type_name(&self, sql_type: SqlType) -> &'static str;
}

/// Metadata about the connected SQLite engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInfo {
    version: Option<String>,
}

impl DbInfo {
    /// Metadata resolved against a live connection
    pub fn from_connection(conn: &Connection) -> Result<Self> {
        let version: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
        Ok(Self { version: Some(version) })
    }

    /// Metadata without an engine behind it, for DDL generation only
    pub fn offline() -> Self {
        Self { version: None }
    }

    /// Engine version string, if resolved against a connection
    pub fn engine_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    // ========== Catalog Operations ==========

    /// Names of all user tables
    pub fn all_table_names(&self, conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, conn: &Connection, table: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn column_exists(&self, conn: &Connection, table: &str, column: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE",
            [table, column],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn index_exists(&self, conn: &Connection, index: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1 COLLATE NOCASE",
                [index],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl Dialect for DbInfo {
    fn type_name(&self, sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::Bit => "BOOLEAN",
            SqlType::LongVarchar => "TEXT",
            other => other.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        let info = DbInfo::offline();
        assert_eq!(info.type_name(SqlType::TinyInt), "TINYINT");
        assert_eq!(info.type_name(SqlType::Bit), "BOOLEAN");
        assert_eq!(info.type_name(SqlType::LongVarchar), "TEXT");
        assert_eq!(info.type_name(SqlType::Timestamp), "TIMESTAMP");
        assert_eq!(info.engine_version(), None);
    }

    #[test]
    fn test_catalog_queries() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE TEST (ID INTEGER PRIMARY KEY, NAME VARCHAR(20));
             CREATE INDEX test_name_idx ON TEST (NAME);",
        )
        .unwrap();

        let info = DbInfo::from_connection(&conn).unwrap();
        assert!(info.engine_version().is_some());
        assert_eq!(info.all_table_names(&conn).unwrap(), vec!["TEST".to_string()]);
        assert!(info.table_exists(&conn, "test").unwrap());
        assert!(!info.table_exists(&conn, "OTHER").unwrap());
        assert!(info.column_exists(&conn, "TEST", "name").unwrap());
        assert!(!info.column_exists(&conn, "TEST", "AGE").unwrap());
        assert!(info.index_exists(&conn, "test_name_idx").unwrap());
        assert!(!info.index_exists(&conn, "test_age_idx").unwrap());
    }
}
