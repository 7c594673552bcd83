//! Prepared-statement cache keyed by exact SQL text
//!
//! The cache tracks one logical handle and one usage record per distinct SQL
//! string. Compiled statements themselves stay in the connection's own
//! statement cache; a hit here means the connection hands back the already
//! compiled statement instead of parsing the SQL again.
//!
//! The cache is shared behind an `Arc` so a monitor can enumerate statistics
//! from another thread while queries run on the connection's thread.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{CachedStatement, Connection, Statement};
use serde::Serialize;

use crate::{Error, Result};

/// Capacity of the connection-level compiled statement cache
///
/// rusqlite's cache below is an LRU and may recompile an evicted statement.
/// Entries of [`StatementCache`] are never evicted: a handle and its stats
/// live until the cache is disabled or the connection is replaced.
pub const COMPILED_STATEMENT_CAPACITY: usize = 256;

/// Usage record of one cached statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CachedStatementStats {
    created: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    use_count: u64,
}

impl CachedStatementStats {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            last_accessed: now,
            use_count: 1,
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Utc::now();
        self.use_count += 1;
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }
}

impl fmt::Display for CachedStatementStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={}, last_accessed={}, count={}",
            self.created.to_rfc3339(),
            self.last_accessed.to_rfc3339(),
            self.use_count
        )
    }
}

/// Logical handle of a prepared statement
///
/// Cached handles are shared between hits on the same SQL and get closed when
/// the cache is disabled or its connection is replaced.
#[derive(Debug)]
pub struct PreparedHandle {
    id: u64,
    sql: String,
    cached: bool,
    closed: AtomicBool,
}

pub type StatementHandle = Arc<PreparedHandle>;

impl PreparedHandle {
    fn new(id: u64, sql: &str, cached: bool) -> Self {
        Self {
            id,
            sql: sql.to_string(),
            cached,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

enum Compiled<'conn> {
    Cached(CachedStatement<'conn>),
    Fresh(Statement<'conn>),
}

/// A compiled statement ready for binding, plus its logical handle
pub struct PreparedStatement<'conn> {
    handle: StatementHandle,
    compiled: Compiled<'conn>,
}

impl PreparedStatement<'_> {
    pub fn handle(&self) -> &StatementHandle {
        &self.handle
    }
}

impl<'conn> Deref for PreparedStatement<'conn> {
    type Target = Statement<'conn>;

    fn deref(&self) -> &Self::Target {
        match &self.compiled {
            Compiled::Cached(stmt) => &**stmt,
            Compiled::Fresh(stmt) => stmt,
        }
    }
}

impl DerefMut for PreparedStatement<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.compiled {
            Compiled::Cached(stmt) => &mut **stmt,
            Compiled::Fresh(stmt) => stmt,
        }
    }
}

#[derive(Default)]
struct CacheMaps {
    enabled: bool,
    handles: HashMap<String, StatementHandle>,
    stats: HashMap<String, CachedStatementStats>,
}

/// Statement cache scoped to one connection
pub struct StatementCache {
    maps: Mutex<CacheMaps>,
    flush_pending: AtomicBool,
    next_id: AtomicU64,
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementCache {
    /// New, enabled, empty cache
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(CacheMaps {
                enabled: true,
                ..CacheMaps::default()
            }),
            flush_pending: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    fn maps(&self) -> MutexGuard<'_, CacheMaps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.maps().enabled
    }

    /// Fetch the statement for `sql`, preparing it on a miss
    pub fn get_prepared_statement<'conn>(
        &self,
        conn: &'conn Connection,
        sql: &str,
    ) -> Result<PreparedStatement<'conn>> {
        if self.flush_pending.swap(false, Ordering::AcqRel) {
            conn.flush_prepared_statement_cache();
        }

        let mut maps = self.maps();
        if !maps.enabled {
            drop(maps);
            let stmt = conn.prepare(sql).map_err(|e| prepare_error(sql, e))?;
            return Ok(PreparedStatement {
                handle: Arc::new(PreparedHandle::new(self.next_id(), sql, false)),
                compiled: Compiled::Fresh(stmt),
            });
        }

        let stmt = conn.prepare_cached(sql).map_err(|e| prepare_error(sql, e))?;
        let existing = maps.handles.get(sql).filter(|h| !h.is_closed()).cloned();
        let handle = match existing {
            Some(handle) => {
                if let Some(stats) = maps.stats.get_mut(sql) {
                    stats.touch();
                }
                handle
            }
            None => {
                tracing::debug!(sql, "caching prepared statement");
                let handle = Arc::new(PreparedHandle::new(self.next_id(), sql, true));
                maps.handles.insert(sql.to_string(), Arc::clone(&handle));
                maps.stats.insert(sql.to_string(), CachedStatementStats::new());
                handle
            }
        };

        Ok(PreparedStatement {
            handle,
            compiled: Compiled::Cached(stmt),
        })
    }

    /// Enable or disable caching
    ///
    /// Disabling logs every record, closes every handle and empties the cache.
    pub fn set_enabled(&self, enabled: bool) {
        let mut maps = self.maps();
        maps.enabled = enabled;
        if !enabled {
            self.clear_locked(&mut maps);
        }
        tracing::info!(enabled, "statement cache toggled");
    }

    /// Close and drop every entry, keeping the enabled flag
    pub fn invalidate(&self) {
        let mut maps = self.maps();
        self.clear_locked(&mut maps);
    }

    fn clear_locked(&self, maps: &mut CacheMaps) {
        log_stats(&maps.stats);
        for handle in maps.handles.values() {
            handle.close();
        }
        maps.handles.clear();
        maps.stats.clear();
        self.flush_pending.store(true, Ordering::Release);
    }

    /// Whether compiled statements on the connection still need flushing
    pub fn take_flush_request(&self) -> bool {
        self.flush_pending.swap(false, Ordering::AcqRel)
    }

    /// Snapshot of all usage records
    pub fn statement_stats(&self) -> HashMap<String, CachedStatementStats> {
        self.maps().stats.clone()
    }

    pub fn stats_for(&self, sql: &str) -> Option<CachedStatementStats> {
        self.maps().stats.get(sql).copied()
    }

    pub fn handle(&self, sql: &str) -> Option<StatementHandle> {
        self.maps().handles.get(sql).cloned()
    }

    pub fn len(&self) -> usize {
        self.maps().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log every usage record
    pub fn dump_stats(&self) {
        log_stats(&self.maps().stats);
    }
}

fn log_stats(stats: &HashMap<String, CachedStatementStats>) {
    let mut entries: Vec<_> = stats.iter().collect();
    entries.sort_by(|a, b| b.1.use_count.cmp(&a.1.use_count).then(a.0.cmp(b.0)));
    for (sql, record) in entries {
        tracing::info!(target: "pitchdb::statement_cache", sql = %sql, "{record}");
    }
}

fn prepare_error(sql: &str, source: rusqlite::Error) -> Error {
    tracing::error!(sql, error = %source, "failed to prepare statement");
    Error::Prepare {
        sql: sql.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    const SELECT_BY_ID: &str = "SELECT ID, NAME FROM TEST WHERE ID = ?1";
    const SELECT_ALL: &str = "SELECT ID, NAME FROM TEST";

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE TEST (ID INTEGER PRIMARY KEY, NAME VARCHAR(20));
             INSERT INTO TEST VALUES (1, 'Müller');
             INSERT INTO TEST VALUES (2, 'Beckenbauer');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_hit_returns_same_handle_and_counts_uses() {
        let conn = setup();
        let cache = StatementCache::new();

        let first = cache.get_prepared_statement(&conn, SELECT_BY_ID).unwrap().handle().clone();
        assert_eq!(cache.stats_for(SELECT_BY_ID).unwrap().use_count(), 1);

        let second = cache.get_prepared_statement(&conn, SELECT_BY_ID).unwrap().handle().clone();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats_for(SELECT_BY_ID).unwrap().use_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_statement_executes_with_bound_params() {
        let conn = setup();
        let cache = StatementCache::new();

        let mut stmt = cache.get_prepared_statement(&conn, SELECT_BY_ID).unwrap();
        let name: String = stmt.query_row([2], |row| row.get(1)).unwrap();
        assert_eq!(name, "Beckenbauer");
    }

    #[test]
    fn test_stats_timestamps() {
        let conn = setup();
        let cache = StatementCache::new();
        let before = Utc::now();

        cache.get_prepared_statement(&conn, SELECT_ALL).unwrap();
        cache.get_prepared_statement(&conn, SELECT_ALL).unwrap();

        let stats = cache.stats_for(SELECT_ALL).unwrap();
        assert!(stats.created() >= before);
        assert!(stats.last_accessed() >= stats.created());
        assert!(stats.to_string().contains("count=2"));
    }

    #[test]
    fn test_disabled_cache_prepares_fresh() {
        let conn = setup();
        let cache = StatementCache::new();
        cache.set_enabled(false);

        let first = cache.get_prepared_statement(&conn, SELECT_ALL).unwrap().handle().clone();
        let second = cache.get_prepared_statement(&conn, SELECT_ALL).unwrap().handle().clone();

        assert!(!first.is_cached());
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.statement_stats().is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disable_closes_and_clears() {
        let conn = setup();
        let cache = StatementCache::new();

        let by_id = cache.get_prepared_statement(&conn, SELECT_BY_ID).unwrap().handle().clone();
        let all = cache.get_prepared_statement(&conn, SELECT_ALL).unwrap().handle().clone();
        assert_eq!(cache.statement_stats().len(), 2);

        cache.set_enabled(false);
        assert!(by_id.is_closed());
        assert!(all.is_closed());
        assert!(cache.statement_stats().is_empty());
        assert!(cache.handle(SELECT_BY_ID).is_none());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_reenable_starts_over() {
        let conn = setup();
        let cache = StatementCache::new();

        let old = cache.get_prepared_statement(&conn, SELECT_BY_ID).unwrap().handle().clone();
        cache.get_prepared_statement(&conn, SELECT_BY_ID).unwrap();
        cache.set_enabled(false);
        cache.set_enabled(true);

        let new = cache.get_prepared_statement(&conn, SELECT_BY_ID).unwrap().handle().clone();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!new.is_closed());
        assert_eq!(cache.stats_for(SELECT_BY_ID).unwrap().use_count(), 1);
    }

    #[test]
    fn test_entries_outlive_compiled_lru() {
        let conn = setup();
        conn.set_prepared_statement_cache_capacity(4);
        let cache = StatementCache::new();

        let first = cache.get_prepared_statement(&conn, "SELECT 0").unwrap().handle().clone();
        for i in 1..20 {
            cache.get_prepared_statement(&conn, &format!("SELECT {i}")).unwrap();
        }
        let again = cache.get_prepared_statement(&conn, "SELECT 0").unwrap().handle().clone();

        assert_eq!(cache.len(), 20);
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!again.is_closed());
        assert_eq!(cache.stats_for("SELECT 0").unwrap().use_count(), 2);
    }

    #[test]
    fn test_prepare_failure_is_not_cached() {
        let conn = setup();
        let cache = StatementCache::new();

        let err = cache.get_prepared_statement(&conn, "SELEKT * FROM TEST").err().unwrap();
        assert!(matches!(err, Error::Prepare { ref sql, .. } if sql == "SELEKT * FROM TEST"));
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_readable_while_queries_run() {
        let conn = setup();
        let cache = Arc::new(StatementCache::new());

        std::thread::scope(|scope| {
            let reader = Arc::clone(&cache);
            scope.spawn(move || {
                for _ in 0..200 {
                    let stats = reader.statement_stats();
                    assert!(stats.len() <= 2);
                    assert!(stats.values().all(|s| s.use_count() >= 1));
                }
            });

            for i in 0..200 {
                let sql = if i % 2 == 0 { SELECT_BY_ID } else { SELECT_ALL };
                let mut stmt = cache.get_prepared_statement(&conn, sql).unwrap();
                if sql == SELECT_BY_ID {
                    let _: String = stmt.query_row([1], |row| row.get(1)).unwrap();
                } else {
                    let rows = stmt.query_map([], |row| row.get::<_, i64>(0)).unwrap();
                    assert_eq!(rows.count(), 2);
                }
            }
        });

        assert_eq!(cache.stats_for(SELECT_BY_ID).unwrap().use_count(), 100);
        assert_eq!(cache.stats_for(SELECT_ALL).unwrap().use_count(), 100);
    }
}
