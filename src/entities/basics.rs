//! Team basics - one row per downloaded data snapshot (HRF)

use chrono::NaiveDateTime;

use super::Entity;
use crate::Result;
use crate::storage::{ColumnBuilder, SqlType, TableAccess, column};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Basics {
    pub hrf_id: i32,
    pub team_id: i32,
    pub team_name: Option<String>,
    pub manager: Option<String>,
    pub date: NaiveDateTime,
    pub season: i32,
    pub match_round: i32,
    pub season_offset: Option<i32>,
    stored: bool,
}

storable!(Basics);

impl Entity for Basics {
    const TABLE_NAME: &'static str = "BASICS";
    const ID_COLUMN_COUNT: usize = 1;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("HRF_ID", SqlType::Integer)
                .nullable(false)
                .primary_key(true)
                .accessors(|e: &Self| e.hrf_id, |e, v| e.hrf_id = v),
            column("TeamID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.team_id, |e, v| e.team_id = v),
            column("TeamName", SqlType::Varchar)
                .length(127)
                .accessors(|e: &Self| e.team_name.clone(), |e, v| e.team_name = v),
            column("Manager", SqlType::Varchar)
                .length(127)
                .accessors(|e: &Self| e.manager.clone(), |e, v| e.manager = v),
            column("Datum", SqlType::Timestamp)
                .nullable(false)
                .accessors(|e: &Self| e.date, |e, v| e.date = v),
            column("Season", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.season, |e, v| e.season = v),
            column("Spieltag", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.match_round, |e, v| e.match_round = v),
            column("SeasonOffset", SqlType::Integer)
                .accessors(|e: &Self| e.season_offset, |e, v| e.season_offset = v),
        ]
    }

    fn index_statements() -> Vec<String> {
        vec![format!("CREATE INDEX IBASICS_2 ON {}(Datum)", Self::TABLE_NAME)]
    }
}

impl TableAccess<'_, Basics> {
    /// Most recent snapshot
    pub fn latest(&self) -> Result<Option<Basics>> {
        let sql = self.table().select_statement("ORDER BY Datum DESC LIMIT 1");
        self.load_one(&sql, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConnectionManager;
    use chrono::NaiveDate;

    fn snapshot(hrf_id: i32, day: u32) -> Basics {
        Basics {
            hrf_id,
            team_id: 522_000,
            team_name: Some("Borussia Bergheim".to_string()),
            manager: Some("Udo".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(8, 0, 0).unwrap(),
            season: 88,
            match_round: 4,
            season_offset: None,
            stored: false,
        }
    }

    #[test]
    fn test_index_statement() {
        assert_eq!(Basics::index_statements(), vec!["CREATE INDEX IBASICS_2 ON BASICS(Datum)".to_string()]);
    }

    #[test]
    fn test_store_writes_columns() {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = Basics::table().unwrap();
        table.create_table(&cm).unwrap();
        table.create_indexes(&cm).unwrap();

        let mut basics = snapshot(42, 1);
        table.store(&cm, &mut basics).unwrap();

        let ids = cm
            .execute_query("SELECT HRF_ID, TeamName FROM BASICS", |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, String>(1)?))
            })
            .unwrap();
        assert_eq!(ids, vec![(42, "Borussia Bergheim".to_string())]);
        assert!(cm.index_exists("IBASICS_2").unwrap());
    }

    #[test]
    fn test_latest() {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = Basics::table().unwrap();
        table.create_table(&cm).unwrap();
        let basics = TableAccess::new(&table, &cm);

        assert!(basics.latest().unwrap().is_none());
        for (id, day) in [(1, 3), (2, 17), (3, 10)] {
            basics.store(&mut snapshot(id, day)).unwrap();
        }
        assert_eq!(basics.latest().unwrap().unwrap().hrf_id, 2);
    }
}
