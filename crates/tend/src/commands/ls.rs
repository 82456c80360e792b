//! List command.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use tend_core::SessionRecord;

use crate::config::Config;
use crate::display::{colored_status, format_age, shorten_path};

/// JSON row: the stored record plus live client count.
#[derive(Serialize)]
struct Row<'a> {
    #[serde(flatten)]
    record: &'a SessionRecord,
    attached: u32,
}

pub async fn execute(json: bool, config: &Config) -> Result<()> {
    let controller = super::controller(config)?;
    let records = controller.snapshot()?;

    if json {
        let rows: Vec<Row> = records
            .iter()
            .map(|record| Row {
                record,
                attached: record.attached,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No sessions. Start one with `tend new`.");
        return Ok(());
    }

    let home = dirs::home_dir();
    let now = Utc::now();
    let id_width = records.iter().map(|r| r.id.len()).max().unwrap_or(2).max(2);

    println!(
        "{}",
        format!(
            "{:<id_width$}  {:<10}  {:>4}  {:>3}  {}",
            "ID", "STATUS", "AGE", "ATT", "DIRECTORY"
        )
        .bold()
    );
    for record in &records {
        let attached = if record.attached > 0 {
            format!("{:>3}", record.attached).green()
        } else {
            format!("{:>3}", "-").dimmed()
        };
        let mut line = format!(
            "{:<id_width$}  {}  {:>4}  {}  {}",
            record.id,
            colored_status(record.status, 10),
            format_age(record.updated_at, now),
            attached,
            shorten_path(&record.cwd, home.as_deref()),
        );
        if let Some(detail) = &record.detail {
            line.push_str(&format!("  {}", detail.dimmed()));
        }
        println!("{}", line);
    }

    Ok(())
}
