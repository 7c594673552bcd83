//! Squad players per snapshot and planned future training

use chrono::NaiveDateTime;
use rusqlite::types::Value;

use super::Entity;
use crate::Result;
use crate::storage::{ColumnBuilder, SqlType, TableAccess, column};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Player {
    pub hrf_id: i32,
    pub player_id: i32,
    pub first_name: Option<String>,
    pub nick_name: Option<String>,
    pub last_name: Option<String>,
    pub date: NaiveDateTime,
    pub age: Option<i32>,
    pub form: Option<i32>,
    pub stamina: Option<i32>,
    pub rating: Option<i32>,
    pub last_match_date: Option<String>,
    pub last_match_rating: Option<i32>,
    pub last_match_id: Option<i32>,
    stored: bool,
}

/// Training priority of one player for a span of weeks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuturePlayerTraining {
    pub player_id: i32,
    pub from_season: i32,
    pub from_week: i32,
    pub to_season: Option<i32>,
    pub to_week: Option<i32>,
    pub priority: i32,
    stored: bool,
}

storable!(Player, FuturePlayerTraining);

impl Player {
    /// Display name, falling back to the nick name
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (None, Some(last)) => last.clone(),
            (Some(first), None) => first.clone(),
            (None, None) => self.nick_name.clone().unwrap_or_default(),
        }
    }
}

impl Entity for Player {
    const TABLE_NAME: &'static str = "SPIELER";
    const ID_COLUMN_COUNT: usize = 2;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("HRF_ID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.hrf_id, |e, v| e.hrf_id = v),
            column("SpielerID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.player_id, |e, v| e.player_id = v),
            column("FirstName", SqlType::Varchar)
                .length(100)
                .accessors(|e: &Self| e.first_name.clone(), |e, v| e.first_name = v),
            column("NickName", SqlType::Varchar)
                .length(100)
                .accessors(|e: &Self| e.nick_name.clone(), |e, v| e.nick_name = v),
            column("LastName", SqlType::Varchar)
                .length(100)
                .accessors(|e: &Self| e.last_name.clone(), |e, v| e.last_name = v),
            column("Datum", SqlType::Timestamp)
                .nullable(false)
                .accessors(|e: &Self| e.date, |e, v| e.date = v),
            column("Age", SqlType::Integer)
                .accessors(|e: &Self| e.age, |e, v| e.age = v),
            column("Form", SqlType::Integer)
                .accessors(|e: &Self| e.form, |e, v| e.form = v),
            column("Kondition", SqlType::Integer)
                .accessors(|e: &Self| e.stamina, |e, v| e.stamina = v),
            column("Rating", SqlType::Integer)
                .accessors(|e: &Self| e.rating, |e, v| e.rating = v),
            column("LastMatchDate", SqlType::Varchar)
                .length(100)
                .accessors(|e: &Self| e.last_match_date.clone(), |e, v| e.last_match_date = v),
            column("LastMatchRating", SqlType::Integer)
                .accessors(|e: &Self| e.last_match_rating, |e, v| e.last_match_rating = v),
            column("LastMatchId", SqlType::Integer)
                .accessors(|e: &Self| e.last_match_id, |e, v| e.last_match_id = v),
        ]
    }

    fn index_statements() -> Vec<String> {
        vec!["CREATE INDEX ISPIELER_1 ON SPIELER(SpielerID)".to_string()]
    }
}

impl Entity for FuturePlayerTraining {
    const TABLE_NAME: &'static str = "FUTUREPLAYERTRAINING";
    const ID_COLUMN_COUNT: usize = 3;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("SpielerID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.player_id, |e, v| e.player_id = v),
            column("FromSeason", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.from_season, |e, v| e.from_season = v),
            column("FromWeek", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.from_week, |e, v| e.from_week = v),
            column("ToSeason", SqlType::Integer)
                .accessors(|e: &Self| e.to_season, |e, v| e.to_season = v),
            column("ToWeek", SqlType::Integer)
                .accessors(|e: &Self| e.to_week, |e, v| e.to_week = v),
            column("Prio", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.priority, |e, v| e.priority = v),
        ]
    }
}

impl TableAccess<'_, Player> {
    /// Squad of one snapshot
    pub fn for_snapshot(&self, hrf_id: i32) -> Result<Vec<Player>> {
        let sql = self.table().select_statement("WHERE HRF_ID = ? ORDER BY SpielerID");
        self.load(&sql, &[Value::Integer(hrf_id.into())])
    }
}

impl TableAccess<'_, FuturePlayerTraining> {
    pub fn for_player(&self, player_id: i32) -> Result<Vec<FuturePlayerTraining>> {
        let sql = self
            .table()
            .select_statement("WHERE SpielerID = ? ORDER BY FromSeason, FromWeek");
        self.load(&sql, &[Value::Integer(player_id.into())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConnectionManager;

    #[test]
    fn test_full_name() {
        let mut player = Player { last_name: Some("Rahn".into()), ..Player::default() };
        assert_eq!(player.full_name(), "Rahn");
        player.first_name = Some("Helmut".into());
        assert_eq!(player.full_name(), "Helmut Rahn");
        let boss = Player { nick_name: Some("Der Boss".into()), ..Player::default() };
        assert_eq!(boss.full_name(), "Der Boss");
    }

    #[test]
    fn test_squad_of_snapshot() {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = Player::table().unwrap();
        table.create_table(&cm).unwrap();
        let players = TableAccess::new(&table, &cm);

        for (hrf_id, player_id) in [(1, 300), (1, 100), (2, 100)] {
            let mut p = Player { hrf_id, player_id, last_match_rating: Some(7), ..Player::default() };
            players.store(&mut p).unwrap();
        }

        let squad = players.for_snapshot(1).unwrap();
        assert_eq!(squad.iter().map(|p| p.player_id).collect::<Vec<_>>(), vec![100, 300]);
        assert_eq!(squad[0].last_match_rating, Some(7));
    }

    #[test]
    fn test_training_plan() {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = FuturePlayerTraining::table().unwrap();
        table.create_table(&cm).unwrap();
        let plans = TableAccess::new(&table, &cm);

        let mut plan = FuturePlayerTraining { player_id: 9, from_season: 89, from_week: 3, priority: 2, ..Default::default() };
        plans.store(&mut plan).unwrap();
        plan.priority = 1;
        plans.store(&mut plan).unwrap();

        let loaded = plans.for_player(9).unwrap();
        assert_eq!(loaded, vec![plan]);
    }
}
