use tabled::{Table, Tabled, settings::Style};

use crate::storage::CachedStatementStats;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: usize,
}

#[derive(Tabled)]
struct CacheRow {
    #[tabled(rename = "Statement")]
    sql: String,
    #[tabled(rename = "Uses")]
    use_count: u64,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Last used")]
    last_accessed: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

pub fn count_table(counts: &[(String, usize)]) -> String {
    let rows: Vec<CountRow> = counts
        .iter()
        .map(|(table, rows)| CountRow {
            table: table.clone(),
            rows: *rows,
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Statement cache entries, most used first
pub fn cache_table(stats: &[(String, CachedStatementStats)]) -> String {
    let mut rows: Vec<CacheRow> = stats
        .iter()
        .map(|(sql, s)| CacheRow {
            sql: shorten(sql, 60),
            use_count: s.use_count(),
            created: s.created().format("%H:%M:%S").to_string(),
            last_accessed: s.last_accessed().format("%H:%M:%S").to_string(),
        })
        .collect();
    rows.sort_by(|a, b| b.use_count.cmp(&a.use_count));
    Table::new(rows).with(Style::rounded()).to_string()
}

fn shorten(sql: &str, max: usize) -> String {
    if sql.chars().count() <= max {
        return sql.to_string();
    }
    let head: String = sql.chars().take(max.saturating_sub(1)).collect();
    format!("{head}…")
}
