//! Storage Layer - SQLite-backed persistence
//!
//! - `column`: per-field storage shape and typed accessors
//! - `table`: generic row mapper built from column descriptors
//! - `connection`: the single connection and its execution channels
//! - `cache` / `monitor`: prepared-statement cache and its management view
//! - `dialect`: engine type names and catalog queries

pub mod cache;
pub mod column;
pub mod connection;
pub mod dialect;
pub mod monitor;
pub mod table;

pub use cache::{CachedStatementStats, PreparedHandle, PreparedStatement, StatementCache, StatementHandle};
pub use column::{ColumnBuilder, ColumnDescriptor, SqlType, column};
pub use connection::{ConnectOptions, ConnectionManager, DatabaseUrl, MEMORY_URL, SQLITE_DRIVER};
pub use dialect::{DbInfo, Dialect};
pub use monitor::StatementCacheMonitor;
pub use table::{SchemaTable, Storable, Table, TableAccess, placeholders};
