//! Column descriptors - the storage shape of one entity field
//!
//! A descriptor pairs a column's DDL attributes with a typed getter/setter
//! bound at definition time. The typed pair is erased to SQLite values so a
//! table can hold descriptors of mixed Rust types.

use std::fmt;
use std::fmt::Write as _;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};

use super::dialect::Dialect;
use crate::{Error, Result};

/// Portable column types, resolved to engine names through a [`Dialect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
}

impl SqlType {
    /// Portable (JDBC-style) name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Bit => "BIT",
            SqlType::Boolean => "BOOLEAN",
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Float => "FLOAT",
            SqlType::Double => "DOUBLE",
            SqlType::Decimal => "DECIMAL",
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::LongVarchar => "LONGVARCHAR",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Getter<E> = Box<dyn Fn(&E) -> rusqlite::Result<Value> + Send + Sync>;
type Setter<E> = Box<dyn Fn(&mut E, ValueRef<'_>) -> FromSqlResult<()> + Send + Sync>;

/// One mapped column of entity type `E`
pub struct ColumnDescriptor<E> {
    name: String,
    sql_type: SqlType,
    length: Option<u32>,
    nullable: bool,
    primary_key: bool,
    getter: Getter<E>,
    setter: Setter<E>,
}

impl<E> ColumnDescriptor<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn length(&self) -> Option<u32> {
        self.length
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Read the field from `entity` as an SQLite value
    pub fn read(&self, entity: &E) -> rusqlite::Result<Value> {
        (self.getter)(entity)
    }

    /// Write a result-set value into the field of `entity`
    pub fn write(&self, entity: &mut E, value: ValueRef<'_>) -> FromSqlResult<()> {
        (self.setter)(entity, value)
    }

    /// Type name with optional length, as used by `ALTER TABLE ... ADD COLUMN`
    pub fn type_string(&self, dialect: &dyn Dialect) -> String {
        let mut out = dialect.type_name(self.sql_type).to_string();
        if let Some(length) = self.length {
            let _ = write!(out, "({length})");
        }
        out
    }

    /// Column fragment of a `CREATE TABLE` statement
    ///
    /// Always starts with a space: `" NAME TYPE[(LENGTH)][ NOT NULL][ PRIMARY KEY]"`.
    pub fn create_string(&self, dialect: &dyn Dialect) -> String {
        let mut out = format!(" {} {}", self.name, self.type_string(dialect));
        if !self.nullable {
            out.push_str(" NOT NULL");
        }
        if self.primary_key {
            out.push_str(" PRIMARY KEY");
        }
        out
    }
}

impl<E> fmt::Debug for ColumnDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("sql_type", &self.sql_type)
            .field("length", &self.length)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

/// Start a builder with name and type already set
pub fn column<E: 'static>(name: &str, sql_type: SqlType) -> ColumnBuilder<E> {
    ColumnBuilder::new().name(name).sql_type(sql_type)
}

/// Fluent builder for [`ColumnDescriptor`]
pub struct ColumnBuilder<E> {
    name: Option<String>,
    sql_type: Option<SqlType>,
    length: Option<u32>,
    nullable: bool,
    primary_key: bool,
    accessors: Option<(Getter<E>, Setter<E>)>,
}

impl<E: 'static> Default for ColumnBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> ColumnBuilder<E> {
    pub fn new() -> Self {
        Self {
            name: None,
            sql_type: None,
            length: None,
            nullable: true,
            primary_key: false,
            accessors: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    /// Bind the field accessors; both sides share the field type `T`
    pub fn accessors<T, G, S>(mut self, get: G, set: S) -> Self
    where
        T: ToSql + FromSql + 'static,
        G: Fn(&E) -> T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        let getter: Getter<E> = Box::new(move |entity| to_value(&get(entity)));
        let setter: Setter<E> = Box::new(move |entity, value| {
            set(entity, T::column_result(value)?);
            Ok(())
        });
        self.accessors = Some((getter, setter));
        self
    }

    pub fn build(self) -> Result<ColumnDescriptor<E>> {
        let name = self
            .name
            .ok_or_else(|| Error::InvalidColumn("column name is not set".to_string()))?;
        let sql_type = self
            .sql_type
            .ok_or_else(|| Error::InvalidColumn(format!("{name}: column type is not set")))?;
        let (getter, setter) = self
            .accessors
            .ok_or_else(|| Error::InvalidColumn(format!("{name}: no accessors bound")))?;

        Ok(ColumnDescriptor {
            name,
            sql_type,
            length: self.length,
            nullable: self.nullable,
            primary_key: self.primary_key,
            getter,
            setter,
        })
    }
}

fn to_value<T: ToSql>(value: &T) -> rusqlite::Result<Value> {
    match value.to_sql()? {
        ToSqlOutput::Borrowed(borrowed) => Ok(borrowed.into()),
        ToSqlOutput::Owned(owned) => Ok(owned),
        other => Err(rusqlite::Error::ToSqlConversionFailure(
            format!("unsupported column output {other:?}").into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dialect::DbInfo;

    #[derive(Debug, Default)]
    struct Person {
        age: i32,
        nick: Option<String>,
    }

    fn age_column(nullable: bool, primary_key: bool) -> ColumnDescriptor<Person> {
        column("AGE", SqlType::Integer)
            .nullable(nullable)
            .primary_key(primary_key)
            .accessors(|p: &Person| p.age, |p, v| p.age = v)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_values() {
        let col = column::<Person>("NICK", SqlType::Varchar)
            .length(20)
            .accessors(|p: &Person| p.nick.clone(), |p, v| p.nick = v)
            .build()
            .unwrap();
        assert_eq!(col.name(), "NICK");
        assert_eq!(col.sql_type(), SqlType::Varchar);
        assert_eq!(col.length(), Some(20));
        assert!(col.is_nullable());
        assert!(!col.is_primary_key());
    }

    #[test]
    fn test_create_string_truth_table() {
        let dialect = DbInfo::offline();
        assert_eq!(age_column(true, false).create_string(&dialect), " AGE INTEGER");
        assert_eq!(age_column(false, false).create_string(&dialect), " AGE INTEGER NOT NULL");
        assert_eq!(age_column(true, true).create_string(&dialect), " AGE INTEGER PRIMARY KEY");
        assert_eq!(
            age_column(false, true).create_string(&dialect),
            " AGE INTEGER NOT NULL PRIMARY KEY"
        );
    }

    #[test]
    fn test_create_string_with_length() {
        let dialect = DbInfo::offline();
        let col = column::<Person>("NICK", SqlType::Varchar)
            .length(127)
            .nullable(false)
            .accessors(|p: &Person| p.nick.clone(), |p, v| p.nick = v)
            .build()
            .unwrap();
        assert_eq!(col.create_string(&dialect), " NICK VARCHAR(127) NOT NULL");
        assert_eq!(col.type_string(&dialect), "VARCHAR(127)");
    }

    #[test]
    fn test_build_requires_name_type_and_accessors() {
        let no_name = ColumnBuilder::<Person>::new()
            .sql_type(SqlType::Integer)
            .accessors(|p: &Person| p.age, |p, v| p.age = v)
            .build();
        assert!(matches!(no_name, Err(Error::InvalidColumn(_))));

        let no_type = ColumnBuilder::<Person>::new()
            .name("AGE")
            .accessors(|p: &Person| p.age, |p, v| p.age = v)
            .build();
        assert!(matches!(no_type, Err(Error::InvalidColumn(_))));

        let no_accessors = column::<Person>("AGE", SqlType::Integer).build();
        let err = no_accessors.unwrap_err();
        assert!(err.to_string().contains("AGE"));
    }

    #[test]
    fn test_accessors_convert_values() {
        let age = age_column(false, false);
        let nick = column::<Person>("NICK", SqlType::Varchar)
            .accessors(|p: &Person| p.nick.clone(), |p, v| p.nick = v)
            .build()
            .unwrap();

        let mut person = Person { age: 33, nick: None };
        assert_eq!(age.read(&person).unwrap(), Value::Integer(33));
        assert_eq!(nick.read(&person).unwrap(), Value::Null);

        age.write(&mut person, ValueRef::Integer(41)).unwrap();
        nick.write(&mut person, ValueRef::Text(b"Kaiser")).unwrap();
        assert_eq!(person.age, 41);
        assert_eq!(person.nick.as_deref(), Some("Kaiser"));

        // text cannot become an integer field
        assert!(age.write(&mut person, ValueRef::Text(b"old")).is_err());
        // NULL cannot become a non-optional field
        assert!(age.write(&mut person, ValueRef::Null).is_err());
    }
}
