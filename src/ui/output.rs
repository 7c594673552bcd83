use crate::migration::MigrationState;
use crate::ui::{Icons, theme};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::BALL, text.style(theme().header.clone()));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO.style(theme().info.clone()), label.style(theme().dim.clone()), value);
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn timing(elapsed: &str) {
    println!("{} {}", Icons::CLOCK.style(theme().dim.clone()), elapsed);
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

/// `300 -> 400`, or `new -> 400` for a created database
pub fn version_change(from: Option<i64>, to: i64) -> String {
    let from = match from {
        Some(v) => v.to_string().style(theme().version.clone()).to_string(),
        None => muted("new"),
    };
    format!("{from} -> {}", to.to_string().style(theme().version.clone()))
}

/// `V2, V3`, or a muted `none`
pub fn script_list(versions: &[u32]) -> String {
    if versions.is_empty() {
        return muted("none");
    }
    versions
        .iter()
        .map(|v| format!("V{v}").style(theme().version.clone()).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// States passed through, final state highlighted
pub fn state_path(states: &[MigrationState]) -> String {
    let last = states.len().saturating_sub(1);
    states
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if i == last {
                s.as_str().style(theme().state.clone()).to_string()
            } else {
                s.as_str().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_change() {
        let created = version_change(None, 400);
        assert!(created.contains("new") && created.contains("400"));
        let upgraded = version_change(Some(300), 400);
        assert!(upgraded.contains("300") && upgraded.contains("-> "));
    }

    #[test]
    fn test_script_list() {
        assert!(script_list(&[]).contains("none"));
        let listed = script_list(&[2, 3]);
        assert!(listed.contains("V2") && listed.contains("V3"));
    }

    #[test]
    fn test_state_path_order() {
        let path = state_path(&[MigrationState::LegacyBridged, MigrationState::UpToDate]);
        let bridged = path.find(MigrationState::LegacyBridged.as_str()).unwrap();
        let done = path.find(MigrationState::UpToDate.as_str()).unwrap();
        assert!(bridged < done);
        assert_eq!(state_path(&[]), "");
    }
}
