//! Connection manager - one physical connection and its statement cache

use std::cell::OnceCell;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, Row, Rows, params_from_iter};

use super::cache::{COMPILED_STATEMENT_CAPACITY, PreparedStatement, StatementCache};
use super::dialect::DbInfo;
use super::monitor::{self, CacheSlot, StatementCacheMonitor};
use crate::{Error, Result};

/// The only supported driver id
pub const SQLITE_DRIVER: &str = "sqlite";

/// URL of a private in-memory database
pub const MEMORY_URL: &str = "sqlite::memory:";

/// Location of a database, parsed from `sqlite::memory:` or `sqlite:<path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    Memory,
    File(PathBuf),
}

impl FromStr for DatabaseUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.strip_prefix("sqlite:") {
            Some(":memory:") => Ok(DatabaseUrl::Memory),
            Some(path) if !path.is_empty() => Ok(DatabaseUrl::File(PathBuf::from(path))),
            _ => Err(Error::Connection(format!("unsupported database url '{s}'"))),
        }
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseUrl::Memory => f.write_str(MEMORY_URL),
            DatabaseUrl::File(path) => write!(f, "sqlite:{}", path.display()),
        }
    }
}

/// Connection settings beyond the URL
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    /// Hold an exclusive file lock for the connection's lifetime
    pub exclusive: bool,
}

/// Owns the single connection to the store
///
/// All queries go through here. Ad hoc SQL runs uncached; prepared SQL goes
/// through the [`StatementCache`] scoped to the current connection.
pub struct ConnectionManager {
    connection: Option<Connection>,
    cache: CacheSlot,
    db_info: OnceCell<DbInfo>,
    options: ConnectOptions,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_options(ConnectOptions::default())
    }

    pub fn with_options(options: ConnectOptions) -> Self {
        Self {
            connection: None,
            cache: Arc::new(RwLock::new(Arc::new(StatementCache::new()))),
            db_info: OnceCell::new(),
            options,
        }
    }

    /// Connected manager over a private in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let mut manager = Self::new();
        manager.connect(MEMORY_URL, "", "", SQLITE_DRIVER)?;
        Ok(manager)
    }

    // ========== Connection Lifecycle ==========

    /// Open `url` with the given driver, replacing any current connection
    ///
    /// Credentials are accepted for interface compatibility; SQLite ignores them.
    pub fn connect(&mut self, url: &str, user: &str, _password: &str, driver: &str) -> Result<()> {
        if !driver.eq_ignore_ascii_case(SQLITE_DRIVER) {
            return Err(Error::Connection(format!("unsupported driver '{driver}'")));
        }
        let target: DatabaseUrl = url.parse()?;
        tracing::debug!(url, user, exclusive = self.options.exclusive, "connecting");

        let conn = match &target {
            DatabaseUrl::Memory => Connection::open_in_memory(),
            DatabaseUrl::File(path) => Connection::open(path),
        }
        .map_err(|e| Error::Connection(format!("cannot open {target}: {e}")))?;

        self.connect_with(conn)
    }

    /// Adopt an already opened connection, replacing any current one
    pub fn connect_with(&mut self, conn: Connection) -> Result<()> {
        if self.options.exclusive {
            acquire_exclusive(&conn)?;
        }
        verify(&conn)?;
        conn.set_prepared_statement_cache_capacity(COMPILED_STATEMENT_CAPACITY);

        if self.connection.replace(conn).is_some() {
            tracing::debug!("replaced previous connection");
        }

        let mut slot = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let enabled = slot.is_enabled();
        slot.invalidate();
        let fresh = StatementCache::new();
        if !enabled {
            fresh.set_enabled(false);
        }
        *slot = Arc::new(fresh);
        drop(slot);

        self.db_info = OnceCell::new();
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The live connection, or `ConnectionClosed`
    pub fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::ConnectionClosed)
    }

    /// Flush statements, optimize and close; a no-op when already closed
    pub fn disconnect(&mut self) {
        let Some(conn) = self.connection.take() else {
            return;
        };

        self.statement_cache().invalidate();
        conn.flush_prepared_statement_cache();
        if let Err(e) = conn.execute_batch("PRAGMA optimize;") {
            tracing::warn!(error = %e, "optimize on shutdown failed");
        }
        if let Err((_, e)) = conn.close() {
            tracing::error!(error = %e, "failed to close connection");
        }
        self.db_info = OnceCell::new();
        tracing::debug!("disconnected");
    }

    // ========== Ad Hoc Execution ==========

    /// Run an unparameterized query, mapping every row with `f`
    pub fn execute_query<T, F>(&self, sql: &str, f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> Result<T>,
    {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql).map_err(|e| sql_error(sql, e))?;
        let rows = stmt.query([]).map_err(|e| sql_error(sql, e))?;
        collect_rows(rows, f)
    }

    /// Run an unparameterized DML/DDL statement; returns the affected row count
    pub fn execute_update(&self, sql: &str) -> Result<usize> {
        let conn = self.connection()?;
        conn.execute(sql, []).map_err(|e| sql_error(sql, e))
    }

    /// Run a multi-statement script
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(sql).map_err(|e| sql_error(sql, e))
    }

    // ========== Prepared Execution ==========

    /// Fetch-or-prepare `sql` through the statement cache
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement<'_>> {
        let conn = self.connection()?;
        self.statement_cache().get_prepared_statement(conn, sql)
    }

    /// Run a parameterized query, binding `params` by position
    pub fn execute_prepared_query<T, F>(&self, sql: &str, params: &[Value], f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> Result<T>,
    {
        let mut stmt = self.prepare(sql)?;
        let rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| sql_error(sql, e))?;
        collect_rows(rows, f)
    }

    /// Run a parameterized DML statement; returns the affected row count
    pub fn execute_prepared_update(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute(params_from_iter(params.iter()))
            .map_err(|e| sql_error(sql, e))
    }

    /// Run `f` inside a transaction, rolling back when it fails
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.connection()?.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    // ========== Metadata ==========

    /// Dialect metadata, resolved once per connection
    pub fn db_info(&self) -> Result<&DbInfo> {
        if let Some(info) = self.db_info.get() {
            return Ok(info);
        }
        let info = DbInfo::from_connection(self.connection()?)?;
        Ok(self.db_info.get_or_init(|| info))
    }

    pub fn all_table_names(&self) -> Result<Vec<String>> {
        self.db_info()?.all_table_names(self.connection()?)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.db_info()?.table_exists(self.connection()?, table)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        self.db_info()?.column_exists(self.connection()?, table, column)
    }

    pub fn index_exists(&self, index: &str) -> Result<bool> {
        self.db_info()?.index_exists(self.connection()?, index)
    }

    // ========== Statement Cache ==========

    /// Cache of the current connection
    pub fn statement_cache(&self) -> Arc<StatementCache> {
        monitor::current(&self.cache)
    }

    /// Enable or disable statement caching; disabling flushes compiled statements now
    pub fn set_cache_enabled(&self, enabled: bool) {
        let cache = self.statement_cache();
        cache.set_enabled(enabled);
        if let Some(conn) = &self.connection {
            if cache.take_flush_request() {
                conn.flush_prepared_statement_cache();
            }
        }
    }

    /// Management view that follows the cache across reconnects
    pub fn monitor(&self) -> StatementCacheMonitor {
        StatementCacheMonitor::new(Arc::clone(&self.cache))
    }
}

fn collect_rows<T, F>(mut rows: Rows<'_>, mut f: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> Result<T>,
{
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(f(row)?);
    }
    Ok(out)
}

fn sql_error(sql: &str, e: rusqlite::Error) -> Error {
    tracing::debug!(sql, error = %e, "statement failed");
    Error::Storage(e)
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn classify_open_error(e: rusqlite::Error) -> Error {
    if is_busy(&e) {
        Error::Locked(e.to_string())
    } else {
        Error::Connection(e.to_string())
    }
}

fn acquire_exclusive(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::ZERO).map_err(classify_open_error)?;
    conn.execute_batch("PRAGMA locking_mode = EXCLUSIVE; BEGIN EXCLUSIVE; COMMIT;")
        .map_err(classify_open_error)
}

/// Touch the schema so unreadable files fail at connect time
fn verify(conn: &Connection) -> Result<()> {
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
        .map_err(classify_open_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;
    use crate::storage::dialect::Dialect;
    use crate::storage::SqlType;

    fn setup() -> ConnectionManager {
        let manager = ConnectionManager::open_in_memory().unwrap();
        manager
            .execute_update("CREATE TABLE TEST (ID INTEGER PRIMARY KEY, NAME VARCHAR(20))")
            .unwrap();
        manager
    }

    fn name_of(row: &Row<'_>) -> Result<String> {
        Ok(row.get("NAME")?)
    }

    #[test]
    fn test_parse_urls() {
        assert_eq!("sqlite::memory:".parse::<DatabaseUrl>().unwrap(), DatabaseUrl::Memory);
        assert_eq!(
            "sqlite:/tmp/pitch.db".parse::<DatabaseUrl>().unwrap(),
            DatabaseUrl::File(PathBuf::from("/tmp/pitch.db"))
        );
        assert!("jdbc:hsqldb:file:db".parse::<DatabaseUrl>().is_err());
        assert!("sqlite:".parse::<DatabaseUrl>().is_err());
        assert_eq!(DatabaseUrl::Memory.to_string(), MEMORY_URL);
    }

    #[test]
    fn test_unsupported_driver() {
        let mut manager = ConnectionManager::new();
        let err = manager.connect(MEMORY_URL, "sa", "", "hsqldb").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_execute_update_returns_counts() {
        let manager = setup();
        assert_eq!(manager.execute_update("INSERT INTO TEST VALUES (1, 'Netzer')").unwrap(), 1);
        assert_eq!(manager.execute_update("INSERT INTO TEST VALUES (2, 'Overath')").unwrap(), 1);
        assert_eq!(manager.execute_update("UPDATE TEST SET NAME = 'Günter' WHERE ID = 1").unwrap(), 1);
        assert_eq!(manager.execute_update("DELETE FROM TEST").unwrap(), 2);
    }

    #[test]
    fn test_execute_query_returns_rows() {
        let manager = setup();
        manager.execute_update("INSERT INTO TEST VALUES (1, 'Netzer')").unwrap();

        let names = manager.execute_query("SELECT * FROM TEST", name_of).unwrap();
        assert_eq!(names, vec!["Netzer".to_string()]);
    }

    #[test]
    fn test_execute_query_invalid_sql() {
        let manager = setup();
        let result = manager.execute_query("SELECT * FROM NOPE", name_of);
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_closed_connection() {
        let mut manager = setup();
        manager.disconnect();
        assert!(!manager.is_connected());

        let result = manager.execute_query("SELECT * FROM TEST", name_of);
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert!(matches!(manager.execute_update("DELETE FROM TEST"), Err(Error::ConnectionClosed)));
        assert!(matches!(
            manager.execute_prepared_update("DELETE FROM TEST", &[]),
            Err(Error::ConnectionClosed)
        ));

        // idempotent
        manager.disconnect();
    }

    #[test]
    fn test_prepared_query_and_update() {
        let manager = setup();
        let inserted = manager
            .execute_prepared_update(
                "INSERT INTO TEST (ID, NAME) VALUES (?, ?)",
                &[Value::Integer(7), Value::Text("Breitner".into())],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let names = manager
            .execute_prepared_query("SELECT NAME FROM TEST WHERE ID = ?", &[Value::Integer(7)], name_of)
            .unwrap();
        assert_eq!(names, vec!["Breitner".to_string()]);

        let stats = manager.statement_cache().statement_stats();
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn test_prepared_param_count_mismatch() {
        let manager = setup();
        let result = manager.execute_prepared_update("INSERT INTO TEST (ID, NAME) VALUES (?, ?)", &[Value::Integer(1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_db_info_and_catalog() {
        let manager = setup();
        let info = manager.db_info().unwrap();
        assert_eq!(info.type_name(SqlType::TinyInt), "TINYINT");
        assert_eq!(manager.all_table_names().unwrap(), vec!["TEST".to_string()]);
        assert!(manager.table_exists("TEST").unwrap());
        assert!(manager.column_exists("TEST", "NAME").unwrap());
        assert!(!manager.index_exists("test_name_idx").unwrap());
    }

    #[test]
    fn test_reconnect_replaces_cache() {
        let mut manager = setup();
        let sql = "SELECT NAME FROM TEST WHERE ID = ?";
        manager.execute_prepared_query(sql, &[Value::Integer(1)], name_of).unwrap();
        let old_handle = manager.statement_cache().handle(sql).unwrap();

        let monitor = manager.monitor();
        assert_eq!(monitor.cached_statement_count(), 1);

        manager.connect(MEMORY_URL, "", "", SQLITE_DRIVER).unwrap();
        assert!(old_handle.is_closed());
        assert_eq!(monitor.cached_statement_count(), 0);
        // fresh in-memory database
        assert!(manager.all_table_names().unwrap().is_empty());
    }

    #[test]
    fn test_cache_toggle_through_manager() {
        let manager = setup();
        let sql = "SELECT NAME FROM TEST";
        manager.execute_prepared_query(sql, &[], name_of).unwrap();
        manager.execute_prepared_query(sql, &[], name_of).unwrap();
        assert_eq!(manager.monitor().statistics()[sql].use_count(), 2);

        manager.set_cache_enabled(false);
        assert!(manager.monitor().statistics().is_empty());
        manager.execute_prepared_query(sql, &[], name_of).unwrap();
        assert!(!manager.monitor().is_cache_enabled());
        assert_eq!(manager.monitor().cached_statement_count(), 0);

        manager.monitor().set_cache_enabled(true);
        manager.execute_prepared_query(sql, &[], name_of).unwrap();
        assert_eq!(manager.monitor().statistics()[sql].use_count(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let manager = setup();
        let result: Result<()> = manager.in_transaction(|cm| {
            cm.execute_update("INSERT INTO TEST VALUES (1, 'Maier')")?;
            cm.execute_update("INSERT INTO NOPE VALUES (1)")?;
            Ok(())
        });
        assert!(result.is_err());

        let names = manager.execute_query("SELECT NAME FROM TEST", name_of).unwrap();
        assert!(names.is_empty());

        manager
            .in_transaction(|cm| cm.execute_update("INSERT INTO TEST VALUES (1, 'Maier')"))
            .unwrap();
        assert_eq!(manager.execute_query("SELECT NAME FROM TEST", name_of).unwrap().len(), 1);
    }

    #[test]
    fn test_file_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("pitch.db").display());

        let mut manager = ConnectionManager::new();
        manager.connect(&url, "sa", "", SQLITE_DRIVER).unwrap();
        manager.execute_update("CREATE TABLE TEST (ID INTEGER, NAME VARCHAR(20))").unwrap();
        manager.execute_update("INSERT INTO TEST VALUES (1, 'Vogts')").unwrap();
        manager.disconnect();

        manager.connect(&url, "sa", "", SQLITE_DRIVER).unwrap();
        let names = manager.execute_query("SELECT NAME FROM TEST", name_of).unwrap();
        assert_eq!(names, vec!["Vogts".to_string()]);
    }
}
