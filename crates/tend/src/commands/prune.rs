//! Prune command.

use anyhow::Result;
use chrono::Duration;
use colored::Colorize;

use crate::config::Config;
use crate::error::CliError;

pub async fn execute(max_age: &str, all: bool, config: &Config) -> Result<()> {
    let max_age = if all { Duration::zero() } else { parse_age(max_age)? };

    let controller = super::controller(config)?;
    let removed = controller.prune(max_age)?;

    if removed.is_empty() {
        println!("Nothing to prune.");
    } else {
        for id in &removed {
            println!("  {} {}", "✓".green(), id);
        }
        println!("Pruned {} exited session(s).", removed.len());
    }
    Ok(())
}

/// Parse ages such as `0`, `90s`, `30m`, `12h`, `7d` or `2w`.
pub fn parse_age(raw: &str) -> Result<Duration, CliError> {
    let raw = raw.trim();
    let invalid = || CliError::InvalidDuration(raw.to_string());
    if raw == "0" {
        return Ok(Duration::zero());
    }

    let split = raw.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (digits, unit) = raw.split_at(split);
    let n: i64 = digits.parse().map_err(|_| invalid())?;
    let duration = match unit {
        "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        "w" => Duration::try_weeks(n),
        _ => None,
    };
    duration.ok_or_else(invalid)
}
