//! Focus command.

use anyhow::Result;
use colored::Colorize;

use tend_core::lifecycle::SESSION_ENV;

use crate::config::Config;
use crate::error::CliError;

pub async fn execute(session: Option<String>, config: &Config) -> Result<()> {
    let query = session
        .or_else(|| std::env::var(SESSION_ENV).ok())
        .filter(|s| !s.is_empty())
        .ok_or(CliError::NoSession)?;

    let controller = super::controller(config)?;
    let record = controller.focus(&query)?;
    if record.attached == 0 {
        println!(
            "{} Focus request queued for {}; it will be delivered on the next attach",
            "○".yellow(),
            record.id
        );
    } else {
        println!("{} Focus request sent to {}", "✓".green(), record.id);
    }
    Ok(())
}
