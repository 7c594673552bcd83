pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{
    error, header, info, muted, script_list, section, state_path, status, success, summary_row, timing, version_change,
};
pub use table::{TableBuilder, cache_table, count_table, stats_table};
pub use theme::{Theme, theme};
