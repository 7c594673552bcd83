//! Match summaries and their highlight events

use chrono::NaiveDateTime;
use rusqlite::types::Value;

use super::Entity;
use crate::Result;
use crate::storage::{ColumnBuilder, SqlType, TableAccess, column};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSummary {
    pub match_id: i32,
    pub match_type: i32,
    pub home_name: Option<String>,
    pub home_id: i32,
    pub away_name: Option<String>,
    pub away_id: i32,
    pub date: Option<NaiveDateTime>,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub status: Option<i32>,
    pub arena_id: Option<i32>,
    pub region_id: Option<i32>,
    pub weather: Option<i32>,
    pub weather_forecast: Option<i32>,
    pub derby: Option<bool>,
    pub neutral: Option<bool>,
    pub duration: Option<i32>,
    stored: bool,
}

/// One event of a played match
///
/// `event_id` is the combined event code, `type * 100 + subtype`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchHighlight {
    pub match_id: i32,
    pub event_index: i32,
    pub match_type: Option<i32>,
    pub minute: Option<i32>,
    pub event_id: Option<i32>,
    pub team_id: Option<i32>,
    pub player_id: Option<i32>,
    pub player_name: Option<String>,
    pub home_player: Option<bool>,
    pub assist_id: Option<i32>,
    pub assist_name: Option<String>,
    pub text: Option<String>,
    pub injury_type: Option<i32>,
    pub match_part: Option<i32>,
    pub event_variation: Option<i32>,
    pub(crate) stored: bool,
}

storable!(MatchSummary, MatchHighlight);

impl Entity for MatchSummary {
    const TABLE_NAME: &'static str = "MATCHESKURZINFO";
    const ID_COLUMN_COUNT: usize = 2;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("MatchID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.match_id, |e, v| e.match_id = v),
            column("MatchTyp", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.match_type, |e, v| e.match_type = v),
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
            column("MatchDate", SqlType::Timestamp)
                .accessors(|e: &Self| e.date, |e, v| e.date = v),
            column("HeimTore", SqlType::Integer)
                .accessors(|e: &Self| e.home_goals, |e, v| e.home_goals = v),
            column("GastTore", SqlType::Integer)
                .accessors(|e: &Self| e.away_goals, |e, v| e.away_goals = v),
            column("Status", SqlType::Integer)
                .accessors(|e: &Self| e.status, |e, v| e.status = v),
            column("ArenaId", SqlType::Integer)
                .accessors(|e: &Self| e.arena_id, |e, v| e.arena_id = v),
            column("RegionId", SqlType::Integer)
                .accessors(|e: &Self| e.region_id, |e, v| e.region_id = v),
            column("Weather", SqlType::Integer)
                .accessors(|e: &Self| e.weather, |e, v| e.weather = v),
            column("WeatherForecast", SqlType::Integer)
                .accessors(|e: &Self| e.weather_forecast, |e, v| e.weather_forecast = v),
            column("isDerby", SqlType::Boolean)
                .accessors(|e: &Self| e.derby, |e, v| e.derby = v),
            column("isNeutral", SqlType::Boolean)
                .accessors(|e: &Self| e.neutral, |e, v| e.neutral = v),
            column("Duration", SqlType::Integer)
                .accessors(|e: &Self| e.duration, |e, v| e.duration = v),
        ]
    }

    fn index_statements() -> Vec<String> {
        vec![
            "CREATE INDEX matchkurzinfo_heimid_idx ON MATCHESKURZINFO (HeimID)".to_string(),
            "CREATE INDEX matchkurzinfo_gastid_idx ON MATCHESKURZINFO (GastID)".to_string(),
        ]
    }
}

impl Entity for MatchHighlight {
    const TABLE_NAME: &'static str = "MATCHHIGHLIGHTS";
    const ID_COLUMN_COUNT: usize = 2;

    fn columns() -> Vec<ColumnBuilder<Self>> {
        vec![
            column("MatchID", SqlType::Integer)
                .nullable(false)
                .accessors(|e: &Self| e.match_id, |e, v| e.match_id = v),
            column("EVENT_INDEX", SqlType::Integer)
                .accessors(|e: &Self| e.event_index, |e, v| e.event_index = v),
            column("MatchTyp", SqlType::Integer)
                .accessors(|e: &Self| e.match_type, |e, v| e.match_type = v),
            column("Minute", SqlType::Integer)
                .accessors(|e: &Self| e.minute, |e, v| e.minute = v),
            column("MATCH_EVENT_ID", SqlType::Integer)
                .accessors(|e: &Self| e.event_id, |e, v| e.event_id = v),
            column("TeamID", SqlType::Integer)
                .accessors(|e: &Self| e.team_id, |e, v| e.team_id = v),
            column("SpielerID", SqlType::Integer)
                .accessors(|e: &Self| e.player_id, |e, v| e.player_id = v),
            column("SpielerName", SqlType::Varchar)
                .length(256)
                .accessors(|e: &Self| e.player_name.clone(), |e, v| e.player_name = v),
            column("SpielerHeim", SqlType::Boolean)
                .accessors(|e: &Self| e.home_player, |e, v| e.home_player = v),
            column("GehilfeID", SqlType::Integer)
                .accessors(|e: &Self| e.assist_id, |e, v| e.assist_id = v),
            column("GehilfeName", SqlType::Varchar)
                .length(256)
                .accessors(|e: &Self| e.assist_name.clone(), |e, v| e.assist_name = v),
            column("EventText", SqlType::LongVarchar)
                .accessors(|e: &Self| e.text.clone(), |e, v| e.text = v),
            column("INJURY_TYPE", SqlType::TinyInt)
                .accessors(|e: &Self| e.injury_type, |e, v| e.injury_type = v),
            column("MatchPart", SqlType::Integer)
                .accessors(|e: &Self| e.match_part, |e, v| e.match_part = v),
            column("EventVariation", SqlType::Integer)
                .accessors(|e: &Self| e.event_variation, |e, v| e.event_variation = v),
        ]
    }

    fn index_statements() -> Vec<String> {
        vec![
            "CREATE INDEX matchhighlights_teamid_idx ON MATCHHIGHLIGHTS (TeamID)".to_string(),
            "CREATE INDEX matchhighlights_eventid_idx ON MATCHHIGHLIGHTS (MATCH_EVENT_ID)".to_string(),
        ]
    }
}

impl TableAccess<'_, MatchSummary> {
    /// Matches involving `team_id`, newest first
    pub fn for_team(&self, team_id: i32) -> Result<Vec<MatchSummary>> {
        let team = Value::Integer(team_id.into());
        let sql = self
            .table()
            .select_statement("WHERE HeimID = ? OR GastID = ? ORDER BY MatchDate DESC");
        self.load(&sql, &[team.clone(), team])
    }
}

impl TableAccess<'_, MatchHighlight> {
    /// Events of one match in order
    pub fn for_match(&self, match_id: i32) -> Result<Vec<MatchHighlight>> {
        let sql = self
            .table()
            .select_statement("WHERE MatchID = ? ORDER BY EVENT_INDEX");
        self.load(&sql, &[Value::Integer(match_id.into())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConnectionManager;
    use chrono::NaiveDate;

    #[test]
    fn test_summary_round_trip_with_flags() {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = MatchSummary::table().unwrap();
        table.create_table(&cm).unwrap();
        table.create_indexes(&cm).unwrap();
        let matches = TableAccess::new(&table, &cm);

        let mut derby = MatchSummary {
            match_id: 700_123,
            match_type: 1,
            home_id: 10,
            away_id: 20,
            date: NaiveDate::from_ymd_opt(2024, 2, 10).and_then(|d| d.and_hms_opt(15, 30, 0)),
            derby: Some(true),
            neutral: Some(false),
            weather: Some(2),
            ..MatchSummary::default()
        };
        matches.store(&mut derby).unwrap();

        let mut friendly = MatchSummary { match_id: 700_124, match_type: 4, home_id: 30, away_id: 10, ..MatchSummary::default() };
        matches.store(&mut friendly).unwrap();

        let loaded = matches.for_team(10).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], derby);
        assert!(matches.for_team(99).unwrap().is_empty());
    }

    #[test]
    fn test_highlights_in_event_order() {
        let cm = ConnectionManager::open_in_memory().unwrap();
        let table = MatchHighlight::table().unwrap();
        table.create_table(&cm).unwrap();
        let highlights = TableAccess::new(&table, &cm);

        for (index, event) in [(2, 421), (0, 20), (1, 140)] {
            let mut h = MatchHighlight {
                match_id: 5,
                event_index: index,
                event_id: Some(event),
                text: Some(format!("event {event}")),
                ..MatchHighlight::default()
            };
            highlights.store(&mut h).unwrap();
        }

        let events: Vec<_> = highlights
            .for_match(5)
            .unwrap()
            .into_iter()
            .map(|h| h.event_id.unwrap())
            .collect();
        assert_eq!(events, vec![20, 140, 421]);
    }
}
