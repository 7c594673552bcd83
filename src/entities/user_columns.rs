//! User table-column layouts

use rusqlite::types::Value;

use super::Entity;
use crate::Result;
use crate::storage::{ColumnBuilder, SqlType, TableAccess, column};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserColumn {
    pub column_id: i32,
    pub model_index: i32,
    pub table_index: i32,
    pub width: Option<i32>,
    pub(crate) stored: bool,
}

storable!(UserColumn);

impl Entity for UserColumn {
    const TABLE_NAME: &'static str = "USERCOLUMNS";
    const ID_COLUMN_COUNT: usize = 1;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("COLUMN_ID", SqlType::Integer)
                .nullable(false)
                .primary_key(true)
                .accessors(|e: &Self| e.column_id, |e, v| e.column_id = v),
            column("MODELL_INDEX", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.model_index, |e, v| e.model_index = v),
            column("TABLE_INDEX", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.table_index, |e, v| e.table_index = v),
            column("COLUMN_WIDTH", SqlType::Integer)
                .accessors(|e: &Self| e.width, |e, v| e.width = v),
        ]
    }
}

impl TableAccess<'_, UserColumn> {
    /// Drop every saved column whose id lies in `from..=to`
    pub fn reset_range(&self, from: i32, to: i32) -> Result<usize> {
        self.delete_where(
            "COLUMN_ID BETWEEN ? AND ?",
            &[Value::Integer(from.into()), Value::Integer(to.into())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConnectionManager;

    #[test]
    fn test_reset_range() {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = UserColumn::table().unwrap();
        table.create_table(&cm).unwrap();
        let columns = TableAccess::new(&table, &cm);

        for column_id in [1999, 2000, 2500, 4000, 4001] {
            let mut c = UserColumn { column_id, model_index: 1, table_index: 0, width: Some(80), ..UserColumn::default() };
            columns.store(&mut c).unwrap();
        }

        assert_eq!(columns.reset_range(2000, 4000).unwrap(), 3);
        let left: Vec<i32> = columns.load_all().unwrap().iter().map(|c| c.column_id).collect();
        assert_eq!(left.len(), 2);
        assert!(left.contains(&1999) && left.contains(&4001));
    }
}
