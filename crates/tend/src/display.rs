//! Formatting helpers shared by `tend ls` and the monitor.

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use std::path::Path;

use tend_core::SessionStatus;

/// Compact age such as `42s`, `5m`, `3h` or `2d`.
pub fn format_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

/// Replace the home directory prefix with `~`.
pub fn shorten_path(path: &str, home: Option<&Path>) -> String {
    let Some(home) = home.and_then(|h| h.to_str()).filter(|h| !h.is_empty()) else {
        return path.to_string();
    };
    match path.strip_prefix(home) {
        Some("") => "~".to_string(),
        Some(rest) if rest.starts_with('/') => format!("~{}", rest),
        _ => path.to_string(),
    }
}

/// Status label padded to `width`, then coloured.
pub fn colored_status(status: SessionStatus, width: usize) -> ColoredString {
    let label = format!("{:<width$}", status.label());
    match status {
        SessionStatus::AwaitingPermission => label.red().bold(),
        SessionStatus::AwaitingInput => label.magenta().bold(),
        SessionStatus::Idle => label.yellow(),
        SessionStatus::Working => label.green(),
        SessionStatus::Running => label.cyan(),
        SessionStatus::Exited => label.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "0s");
        assert_eq!(format_age(now - Duration::seconds(90), now), "1m");
        assert_eq!(format_age(now - Duration::hours(5), now), "5h");
        assert_eq!(format_age(now - Duration::days(3), now), "3d");
        // Clock skew never yields a negative age
        assert_eq!(format_age(now + Duration::seconds(5), now), "0s");
    }

    #[test]
    fn test_shorten_path() {
        let home = Path::new("/home/me");
        assert_eq!(shorten_path("/home/me/src/app", Some(home)), "~/src/app");
        assert_eq!(shorten_path("/home/me", Some(home)), "~");
        assert_eq!(shorten_path("/home/meow", Some(home)), "/home/meow");
        assert_eq!(shorten_path("/srv", None), "/srv");
    }
}
