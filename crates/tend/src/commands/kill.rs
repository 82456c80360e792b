//! Kill command.

use anyhow::Result;
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};

use tend_core::KillTarget;

use crate::cli::KillArgs;
use crate::config::Config;
use crate::display::colored_status;
use crate::error::CliError;

pub async fn execute(args: KillArgs, config: &Config) -> Result<()> {
    let target = target(&args)?;
    let bulk = !matches!(target, KillTarget::Id(_));

    let controller = super::controller(config)?;
    let records = controller.kill_targets(&target)?;
    if records.is_empty() {
        println!("No matching sessions.");
        return Ok(());
    }

    if bulk && !args.yes {
        println!("{}", "Sessions to kill:".cyan());
        for record in &records {
            println!("  {}  {}  {}", record.id, colored_status(record.status, 10), record.cwd);
        }
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Kill {} session(s)?", records.len()))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let mut failures = 0;
    for record in &records {
        match controller.kill(record) {
            Ok(()) => println!("  {} {}", "✓".green(), record.id),
            Err(e) => {
                failures += 1;
                println!("  {} {}: {}", "✗".red(), record.id, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} session(s) could not be killed", failures);
    }
    Ok(())
}

fn target(args: &KillArgs) -> Result<KillTarget, CliError> {
    match (&args.session, args.all, args.idle) {
        (Some(id), false, false) => Ok(KillTarget::Id(id.clone())),
        (None, true, false) => Ok(KillTarget::All),
        (None, false, true) => Ok(KillTarget::Idle),
        _ => Err(CliError::Usage(
            "give exactly one of a session id, --all or --idle".to_string(),
        )),
    }
}
