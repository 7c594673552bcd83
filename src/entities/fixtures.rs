//! League fixture lists (SPIELPLAN) and their pairings (PAARUNG)

use std::collections::HashSet;

use chrono::NaiveDateTime;
use rusqlite::types::Value;

use super::Entity;
use crate::Result;
use crate::storage::{ColumnBuilder, SqlType, TableAccess, column};

/// Fixture list of one league season
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeagueFixtures {
    pub league_id: i32,
    pub season: i32,
    pub league_name: Option<String>,
    pub fetched: NaiveDateTime,
    stored: bool,
}

/// One scheduled match within a fixture list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pairing {
    pub league_id: i32,
    pub season: i32,
    pub match_id: i32,
    pub match_round: i32,
    pub home_name: Option<String>,
    pub home_id: i32,
    pub away_name: Option<String>,
    pub away_id: i32,
    pub date: Option<NaiveDateTime>,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    stored: bool,
}

storable!(LeagueFixtures, Pairing);

impl LeagueFixtures {
    pub fn new(league_id: i32, season: i32, league_name: &str, fetched: NaiveDateTime) -> Self {
        Self {
            league_id,
            season,
            league_name: Some(league_name.to_string()),
            fetched,
            stored: false,
        }
    }

    pub fn key(&self) -> [Value; 2] {
        [Value::Integer(self.league_id.into()), Value::Integer(self.season.into())]
    }
}

impl Entity for LeagueFixtures {
    const TABLE_NAME: &'static str = "SPIELPLAN";
    const ID_COLUMN_COUNT: usize = 2;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("LigaID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.league_id, |e, v| e.league_id = v),
            column("Saison", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.season, |e, v| e.season = v),
            column("LigaName", SqlType::Varchar)
                .length(256)
                .accessors(|e: &Self| e.league_name.clone(), |e, v| e.league_name = v),
            column("FetchDate", SqlType::Timestamp)
                .nullable(false)
                .accessors(|e: &Self| e.fetched, |e, v| e.fetched = v),
        ]
    }
}

impl Entity for Pairing {
    const TABLE_NAME: &'static str = "PAARUNG";
    const ID_COLUMN_COUNT: usize = 3;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("LigaID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.league_id, |e, v| e.league_id = v),
            column("Saison", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.season, |e, v| e.season = v),
            column("MatchID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.match_id, |e, v| e.match_id = v),
            column("Spieltag", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.match_round, |e, v| e.match_round = v),
            column("HeimName", SqlType::Varchar)
                .length(256)
                .accessors(|e: &Self| e.home_name.clone(), |e, v| e.home_name = v),
            column("HeimID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.home_id, |e, v| e.home_id = v),
            column("GastName", SqlType::Varchar)
                .length(256)
                .accessors(|e: &Self| e.away_name.clone(), |e, v| e.away_name = v),
            column("GastID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.away_id, |e, v| e.away_id = v),
            column("Datum", SqlType::Timestamp)
                .accessors(|e: &Self| e.date, |e, v| e.date = v),
            column("ToreHeim", SqlType::Integer)
                .accessors(|e: &Self| e.home_goals, |e, v| e.home_goals = v),
            column("ToreGast", SqlType::Integer)
                .accessors(|e: &Self| e.away_goals, |e, v| e.away_goals = v),
        ]
    }

    fn index_statements() -> Vec<String> {
        vec![format!("CREATE INDEX IPAARUNG_1 ON {}(LigaID, Saison)", Self::TABLE_NAME)]
    }
}

impl TableAccess<'_, LeagueFixtures> {
    /// Most recently fetched fixture list
    pub fn latest(&self) -> Result<Option<LeagueFixtures>> {
        let sql = self.table().select_statement("ORDER BY FetchDate DESC LIMIT 1");
        self.load_one(&sql, &[])
    }
}

impl TableAccess<'_, Pairing> {
    /// Pairings of one league season, by round
    pub fn for_league(&self, league_id: i32, season: i32) -> Result<Vec<Pairing>> {
        let sql = self
            .table()
            .select_statement("WHERE LigaID = ? AND Saison = ? ORDER BY Spieltag, MatchID");
        self.load(&sql, &[Value::Integer(league_id.into()), Value::Integer(season.into())])
    }

    pub fn delete_for_league(&self, league_id: i32, season: i32) -> Result<usize> {
        self.delete_where(
            "LigaID = ? AND Saison = ?",
            &[Value::Integer(league_id.into()), Value::Integer(season.into())],
        )
    }

    /// `(league, season)` pairs in which `team_id` played
    pub fn leagues_of_team(&self, team_id: i32) -> Result<HashSet<(i32, i32)>> {
        let team = Value::Integer(team_id.into());
        let rows = self.connection().execute_prepared_query(
            "SELECT DISTINCT LigaID, Saison FROM PAARUNG WHERE HeimID = ? OR GastID = ?",
            &[team.clone(), team],
            |row| Ok((row.get::<_, i32>(0)?, row.get::<_, i32>(1)?)),
        )?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConnectionManager, Table};
    use chrono::NaiveDate;

    fn fetched() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn pairing(league_id: i32, match_id: i32, home_id: i32, away_id: i32) -> Pairing {
        Pairing {
            league_id,
            season: 88,
            match_id,
            match_round: match_id % 14 + 1,
            home_id,
            away_id,
            ..Pairing::default()
        }
    }

    fn setup() -> (ConnectionManager, Table<LeagueFixtures>, Table<Pairing>) {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let fixtures = LeagueFixtures::table().unwrap();
        let pairings = Pairing::table().unwrap();
        fixtures.create_table(&cm).unwrap();
        pairings.create_table(&cm).unwrap();
        pairings.create_indexes(&cm).unwrap();
        (cm, fixtures, pairings)
    }

    #[test]
    fn test_fixture_round_trip() {
        let (cm, fixtures, _) = setup();
        let access = TableAccess::new(&fixtures, &cm);
        let mut plan = LeagueFixtures::new(3620, 88, "VI.12", fetched());
        access.store(&mut plan).unwrap();

        assert_eq!(access.load_by_key(&plan.key()).unwrap(), Some(plan.clone()));
        assert_eq!(access.latest().unwrap(), Some(plan));
    }

    #[test]
    fn test_pairings_for_league() {
        let (cm, _, pairings) = setup();
        let access = TableAccess::new(&pairings, &cm);
        for mut p in [pairing(1, 10, 7, 8), pairing(1, 11, 9, 7), pairing(2, 12, 3, 4)] {
            access.store(&mut p).unwrap();
        }

        assert_eq!(access.for_league(1, 88).unwrap().len(), 2);
        assert_eq!(access.leagues_of_team(7).unwrap(), HashSet::from([(1, 88)]));
        assert_eq!(access.delete_for_league(1, 88).unwrap(), 2);
        assert_eq!(access.count().unwrap(), 1);
    }
}
