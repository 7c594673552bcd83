//! Mapped entity kinds
//!
//! Table and column names keep their historical spelling; the legacy
//! migration patches address them by name.

use crate::Result;
use crate::storage::{ColumnBuilder, Storable, Table};

/// Implements [`Storable`] over a `stored: bool` field
macro_rules! storable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::storage::Storable for $ty {
                fn is_stored(&self) -> bool {
                    self.stored
                }

                fn set_stored(&mut self, stored: bool) {
                    self.stored = stored;
                }
            }
        )+
    };
}

pub mod basics;
pub mod config;
pub mod fixtures;
pub mod matches;
pub mod player;
pub mod user_columns;

pub use basics::Basics;
pub use config::{CONFIG_VERSION_KEY, ConfigEntry, DB_VERSION_KEY};
pub use fixtures::{LeagueFixtures, Pairing};
pub use matches::{MatchHighlight, MatchSummary};
pub use player::{FuturePlayerTraining, Player};
pub use user_columns::UserColumn;

/// An entity kind with a fixed table definition
pub trait Entity: Default + Storable + Sized + 'static {
    const TABLE_NAME: &'static str;
    const ID_COLUMN_COUNT: usize;

    fn columns() -> Vec<ColumnBuilder<Self>>;

    /// Secondary-index DDL
    fn index_statements() -> Vec<String> {
        Vec::new()
    }

    fn table() -> Result<Table<Self>> {
        Ok(Table::new(Self::TABLE_NAME, Self::columns(), Self::ID_COLUMN_COUNT)?
            .with_indexes(Self::index_statements()))
    }
}
