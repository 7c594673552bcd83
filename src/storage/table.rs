//! Generic table mapper
//!
//! A [`Table`] is an ordered list of column descriptors whose first
//! `id_column_count` columns form the logical key. All row SQL (insert,
//! update, delete, existence check, select) is generated once at
//! construction, so the set of prepared statements per table is fixed.

use std::collections::HashSet;

use rusqlite::types::Value;
use rusqlite::{Row, Statement};

use super::column::{ColumnBuilder, ColumnDescriptor};
use super::connection::ConnectionManager;
use super::dialect::Dialect;
use crate::{Error, Result};

/// Entities that remember whether they already have a row
pub trait Storable {
    fn is_stored(&self) -> bool;
    fn set_stored(&mut self, stored: bool);
}

/// Comma-separated positional placeholders
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

#[derive(Debug)]
struct RowSql {
    insert: String,
    update: Option<String>,
    delete: String,
    exists: String,
    select: String,
    select_by_key: String,
    count: String,
}

impl RowSql {
    fn generate(table: &str, columns: &[&str], id_column_count: usize) -> Self {
        let all = columns.join(",");
        let key_predicate = columns[..id_column_count]
            .iter()
            .map(|c| format!("{c}=?"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let assignments = columns[id_column_count..]
            .iter()
            .map(|c| format!("{c}=?"))
            .collect::<Vec<_>>()
            .join(",");

        Self {
            insert: format!(
                "INSERT INTO {table} ({all}) VALUES ({})",
                placeholders(columns.len())
            ),
            update: (!assignments.is_empty())
                .then(|| format!("UPDATE {table} SET {assignments} WHERE {key_predicate}")),
            delete: format!("DELETE FROM {table} WHERE {key_predicate}"),
            exists: format!("SELECT COUNT(*) FROM {table} WHERE {key_predicate}"),
            select: format!("SELECT {all} FROM {table}"),
            select_by_key: format!("SELECT {all} FROM {table} WHERE {key_predicate}"),
            count: format!("SELECT COUNT(*) FROM {table}"),
        }
    }
}

/// Mapping between entity type `E` and one database table
#[derive(Debug)]
pub struct Table<E> {
    name: String,
    columns: Vec<ColumnDescriptor<E>>,
    id_column_count: usize,
    index_statements: Vec<String>,
    sql: RowSql,
}

impl<E: Default + Storable + 'static> Table<E> {
    /// Build and validate a table definition
    ///
    /// Fails when a column is incomplete, names repeat, the key prefix does
    /// not fit the column list, or a primary key lies outside the key prefix.
    pub fn new(name: &str, columns: Vec<ColumnBuilder<E>>, id_column_count: usize) -> Result<Self> {
        let mapping = |message: String| Error::Mapping {
            table: name.to_string(),
            message,
        };

        let columns = columns
            .into_iter()
            .map(ColumnBuilder::build)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| match e {
                Error::InvalidColumn(message) => mapping(message),
                other => other,
            })?;

        if columns.is_empty() {
            return Err(mapping("no columns defined".to_string()));
        }
        if id_column_count == 0 || id_column_count > columns.len() {
            return Err(mapping(format!(
                "{id_column_count} key columns declared for {} columns",
                columns.len()
            )));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name().to_ascii_uppercase()) {
                return Err(mapping(format!("duplicate column {}", column.name())));
            }
        }

        if let Some(column) = columns[id_column_count..].iter().find(|c| c.is_primary_key()) {
            return Err(mapping(format!("primary key {} outside the key columns", column.name())));
        }
        if columns.iter().filter(|c| c.is_primary_key()).count() > 1 {
            return Err(mapping("more than one column-level primary key".to_string()));
        }

        let names: Vec<&str> = columns.iter().map(|c| c.name()).collect();
        let sql = RowSql::generate(name, &names, id_column_count);

        Ok(Self {
            name: name.to_string(),
            columns,
            id_column_count,
            index_statements: Vec::new(),
            sql,
        })
    }

    /// Attach secondary-index DDL
    pub fn with_indexes(mut self, statements: Vec<String>) -> Self {
        self.index_statements = statements;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor<E>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor<E>> {
        self.columns.iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn id_column_count(&self) -> usize {
        self.id_column_count
    }

    // ========== Schema Operations ==========

    pub fn create_table_statement(&self, dialect: &dyn Dialect) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.create_string(dialect)).collect();
        format!("CREATE TABLE {} ({})", self.name, columns.join(","))
    }

    pub fn create_table(&self, cm: &ConnectionManager) -> Result<()> {
        let sql = self.create_table_statement(cm.db_info()?);
        cm.execute_update(&sql).map_err(|e| self.schema_error(&sql, e))?;
        tracing::debug!(table = %self.name, "created table");
        Ok(())
    }

    pub fn drop_table(&self, cm: &ConnectionManager) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.name);
        cm.execute_update(&sql).map_err(|e| self.schema_error(&sql, e))?;
        Ok(())
    }

    pub fn create_index_statements(&self) -> &[String] {
        &self.index_statements
    }

    /// Run every secondary-index statement; returns how many ran
    pub fn create_indexes(&self, cm: &ConnectionManager) -> Result<usize> {
        for sql in &self.index_statements {
            cm.execute_update(sql).map_err(|e| self.schema_error(sql, e))?;
        }
        Ok(self.index_statements.len())
    }

    // ========== Row Operations ==========

    /// Insert when the entity is not yet stored, update otherwise
    pub fn store(&self, cm: &ConnectionManager, entity: &mut E) -> Result<usize> {
        let changed = if entity.is_stored() {
            match &self.sql.update {
                Some(sql) => {
                    let mut params = self.values(entity, self.id_column_count..self.columns.len())?;
                    params.extend(self.key_values(entity)?);
                    cm.execute_prepared_update(sql, &params)
                        .map_err(|e| self.query_error(sql, e))?
                }
                None => 0,
            }
        } else {
            let params = self.values(entity, 0..self.columns.len())?;
            cm.execute_prepared_update(&self.sql.insert, &params)
                .map_err(|e| self.query_error(&self.sql.insert, e))?
        };
        entity.set_stored(true);
        Ok(changed)
    }

    /// Look up the entity's key, then store
    pub fn upsert(&self, cm: &ConnectionManager, entity: &mut E) -> Result<usize> {
        let keys = self.key_values(entity)?;
        let exists = self.is_stored(cm, &keys)?;
        entity.set_stored(exists);
        self.store(cm, entity)
    }

    /// Key values of `entity`, in declared order
    pub fn key_values(&self, entity: &E) -> Result<Vec<Value>> {
        self.values(entity, 0..self.id_column_count)
    }

    fn values(&self, entity: &E, range: std::ops::Range<usize>) -> Result<Vec<Value>> {
        self.columns[range]
            .iter()
            .map(|column| {
                column.read(entity).map_err(|e| Error::Mapping {
                    table: self.name.clone(),
                    message: format!("cannot read {}: {e}", column.name()),
                })
            })
            .collect()
    }

    /// `SELECT <all columns> FROM <table> <suffix>`
    pub fn select_statement(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            self.sql.select.clone()
        } else {
            format!("{} {suffix}", self.sql.select)
        }
    }

    /// One entity per row of `sql`
    pub fn load(&self, cm: &ConnectionManager, sql: &str, params: &[Value]) -> Result<Vec<E>> {
        cm.execute_prepared_query(sql, params, |row| self.row_to_entity(row))
            .map_err(|e| self.query_error(sql, e))
    }

    /// First entity of `sql`, if any
    pub fn load_one(&self, cm: &ConnectionManager, sql: &str, params: &[Value]) -> Result<Option<E>> {
        Ok(self.load(cm, sql, params)?.into_iter().next())
    }

    pub fn load_by_key(&self, cm: &ConnectionManager, keys: &[Value]) -> Result<Option<E>> {
        self.check_keys(keys)?;
        self.load_one(cm, &self.sql.select_by_key, keys)
    }

    pub fn load_all(&self, cm: &ConnectionManager) -> Result<Vec<E>> {
        self.load(cm, &self.sql.select, &[])
    }

    pub fn execute_prepared_delete(&self, cm: &ConnectionManager, keys: &[Value]) -> Result<usize> {
        self.check_keys(keys)?;
        cm.execute_prepared_update(&self.sql.delete, keys)
            .map_err(|e| self.query_error(&self.sql.delete, e))
    }

    /// Delete rows matching `predicate`
    pub fn delete_where(&self, cm: &ConnectionManager, predicate: &str, params: &[Value]) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {predicate}", self.name);
        cm.execute_prepared_update(&sql, params)
            .map_err(|e| self.query_error(&sql, e))
    }

    pub fn is_stored(&self, cm: &ConnectionManager, keys: &[Value]) -> Result<bool> {
        self.check_keys(keys)?;
        let counts = cm
            .execute_prepared_query(&self.sql.exists, keys, |row| Ok(row.get::<_, i64>(0)?))
            .map_err(|e| self.query_error(&self.sql.exists, e))?;
        Ok(counts.first().is_some_and(|&n| n > 0))
    }

    pub fn count(&self, cm: &ConnectionManager) -> Result<usize> {
        let counts = cm
            .execute_prepared_query(&self.sql.count, &[], |row| Ok(row.get::<_, i64>(0)?))
            .map_err(|e| self.query_error(&self.sql.count, e))?;
        Ok(counts.first().map_or(0, |&n| usize::try_from(n).unwrap_or(0)))
    }

    /// Build an entity from a result row, matching columns by name
    pub fn row_to_entity(&self, row: &Row<'_>) -> Result<E> {
        let stmt: &Statement<'_> = row.as_ref();
        let mut entity = E::default();
        for column in &self.columns {
            let index = stmt
                .column_index(column.name())
                .map_err(|_| self.inconsistency(column, "column missing from result set".to_string()))?;
            let value = row.get_ref(index)?;
            column
                .write(&mut entity, value)
                .map_err(|e| self.inconsistency(column, e.to_string()))?;
        }
        entity.set_stored(true);
        Ok(entity)
    }

    fn check_keys(&self, keys: &[Value]) -> Result<()> {
        if keys.len() != self.id_column_count {
            return Err(Error::Mapping {
                table: self.name.clone(),
                message: format!("expected {} key values, got {}", self.id_column_count, keys.len()),
            });
        }
        Ok(())
    }

    fn inconsistency(&self, column: &ColumnDescriptor<E>, message: String) -> Error {
        tracing::error!(table = %self.name, column = column.name(), %message, "inconsistent row");
        Error::DataInconsistency {
            table: self.name.clone(),
            column: column.name().to_string(),
            message,
        }
    }

    fn query_error(&self, sql: &str, err: Error) -> Error {
        match err {
            Error::Storage(source) => {
                tracing::error!(table = %self.name, sql, error = %source, "statement failed");
                Error::Query {
                    table: self.name.clone(),
                    sql: sql.to_string(),
                    source,
                }
            }
            other => other,
        }
    }

    fn schema_error(&self, sql: &str, err: Error) -> Error {
        tracing::error!(table = %self.name, sql, error = %err, "schema statement failed");
        Error::Schema {
            table: self.name.clone(),
            message: err.to_string(),
        }
    }
}

/// Type-erased view of a table's schema, for walking every table at once
pub trait SchemaTable {
    fn name(&self) -> &str;
    fn column_names(&self) -> Vec<&str>;
    /// `TYPE[(LENGTH)]` of a declared column
    fn column_type(&self, column: &str, dialect: &dyn Dialect) -> Option<String>;
    fn create_table(&self, cm: &ConnectionManager) -> Result<()>;
    fn drop_table(&self, cm: &ConnectionManager) -> Result<()>;
    fn create_index_statements(&self) -> &[String];
    fn create_indexes(&self, cm: &ConnectionManager) -> Result<usize>;
    fn count(&self, cm: &ConnectionManager) -> Result<usize>;
}

impl<E: Default + Storable + 'static> SchemaTable for Table<E> {
    fn name(&self) -> &str {
        Table::name(self)
    }

    fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    fn column_type(&self, column: &str, dialect: &dyn Dialect) -> Option<String> {
        self.column(column).map(|c| c.type_string(dialect))
    }

    fn create_table(&self, cm: &ConnectionManager) -> Result<()> {
        Table::create_table(self, cm)
    }

    fn drop_table(&self, cm: &ConnectionManager) -> Result<()> {
        Table::drop_table(self, cm)
    }

    fn create_index_statements(&self) -> &[String] {
        Table::create_index_statements(self)
    }

    fn create_indexes(&self, cm: &ConnectionManager) -> Result<usize> {
        Table::create_indexes(self, cm)
    }

    fn count(&self, cm: &ConnectionManager) -> Result<usize> {
        Table::count(self, cm)
    }
}

/// A table bound to the connection it runs on
///
/// This is what the registry hands to business code.
pub struct TableAccess<'a, E> {
    table: &'a Table<E>,
    cm: &'a ConnectionManager,
}

impl<'a, E: Default + Storable + 'static> TableAccess<'a, E> {
    pub fn new(table: &'a Table<E>, cm: &'a ConnectionManager) -> Self {
        Self { table, cm }
    }

    pub fn table(&self) -> &'a Table<E> {
        self.table
    }

    pub fn connection(&self) -> &'a ConnectionManager {
        self.cm
    }

    pub fn store(&self, entity: &mut E) -> Result<usize> {
        self.table.store(self.cm, entity)
    }

    pub fn upsert(&self, entity: &mut E) -> Result<usize> {
        self.table.upsert(self.cm, entity)
    }

    pub fn load(&self, sql: &str, params: &[Value]) -> Result<Vec<E>> {
        self.table.load(self.cm, sql, params)
    }

    pub fn load_one(&self, sql: &str, params: &[Value]) -> Result<Option<E>> {
        self.table.load_one(self.cm, sql, params)
    }

    pub fn load_by_key(&self, keys: &[Value]) -> Result<Option<E>> {
        self.table.load_by_key(self.cm, keys)
    }

    pub fn load_all(&self) -> Result<Vec<E>> {
        self.table.load_all(self.cm)
    }

    pub fn delete(&self, keys: &[Value]) -> Result<usize> {
        self.table.execute_prepared_delete(self.cm, keys)
    }

    pub fn delete_where(&self, predicate: &str, params: &[Value]) -> Result<usize> {
        self.table.delete_where(self.cm, predicate, params)
    }

    pub fn is_stored(&self, keys: &[Value]) -> Result<bool> {
        self.table.is_stored(self.cm, keys)
    }

    pub fn count(&self) -> Result<usize> {
        self.table.count(self.cm)
    }
}
