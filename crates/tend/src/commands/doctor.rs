//! Diagnostics command.

use anyhow::Result;
use colored::Colorize;

use tend_core::store::Store;
use tend_core::tmux::{Multiplexer, Tmux};

use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    println!("{}", "tend Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    // Check tmux
    print!("  tmux: ");
    match Tmux::new().check_available() {
        Ok(_) => println!("{}", "✓ installed".green()),
        Err(_) => {
            println!("{}", "✗ not found".red());
            issues.push("tmux is not installed".to_string());
        }
    }

    // Check assistant command
    print!("  Assistant: ");
    match config.agent.command.first() {
        Some(program) => match which::which(program) {
            Ok(path) => println!("{} ({})", "✓ installed".green(), path.display()),
            Err(_) => {
                println!("{}", format!("✗ {} not found", program).red());
                issues.push(format!("{} is not on PATH", program));
            }
        },
        None => {
            println!("{}", "✗ not configured".red());
            issues.push("agent.command is empty".to_string());
        }
    }

    // Check config file
    print!("  Config file: ");
    if let Some(path) = &config.source {
        println!("{} ({})", "✓ loaded".green(), path.display());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    // Check data directory
    print!("  Data directory: ");
    if config.paths.data_dir.exists() {
        println!("{} ({})", "✓ exists".green(), config.paths.data_dir.display());
    } else {
        println!("{}", "○ will be created".yellow());
    }

    // Check session records
    print!("  Session records: ");
    let sessions_dir = config.paths.sessions_dir();
    if sessions_dir.exists() {
        match count_records(&sessions_dir) {
            Ok((total, corrupt)) if corrupt == 0 => {
                println!("{}", format!("✓ {} readable", total).green());
            }
            Ok((total, corrupt)) => {
                println!("{}", format!("✗ {} of {} unreadable", corrupt, total).red());
                issues.push(format!(
                    "{} corrupt record(s) in {}",
                    corrupt,
                    sessions_dir.display()
                ));
            }
            Err(e) => {
                println!("{}", format!("✗ {}", e).red());
                issues.push("Session store is not readable".to_string());
            }
        }
    } else {
        println!("{}", "○ none yet".yellow());
    }

    // Hooks
    println!();
    println!("  {}", "Hooks:".cyan());
    println!("    log: {}", config.paths.logs_dir().join("hook.log").display());
    for (name, command) in [
        ("notify", &config.hooks.notify_command),
        ("usage refresh", &config.hooks.usage_refresh_command),
        ("focus", &config.hooks.focus_command),
    ] {
        match command {
            Some(cmd) => println!("    {}: {}", name, cmd),
            None => println!("    {}: {}", name, "○ not set".yellow()),
        }
    }

    // Summary
    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}

/// Total record files and how many of them fail to load.
fn count_records(dir: &std::path::Path) -> Result<(usize, usize)> {
    let store = Store::open(dir)?;
    let mut total = 0;
    let mut corrupt = 0;
    for entry in std::fs::read_dir(dir)? {
        let Some(id) = Store::id_from_path(&entry?.path()) else {
            continue;
        };
        total += 1;
        if store.load(&id).is_err() {
            corrupt += 1;
        }
    }
    Ok((total, corrupt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tend_core::SessionRecord;
    use tempfile::tempdir;

    #[test]
    fn test_count_records_flags_corrupt_files() {
        let temp = tempdir().unwrap();
        let store = Store::open(temp.path()).unwrap();
        store.save(&mut SessionRecord::new("good", "/tmp")).unwrap();
        std::fs::write(temp.path().join("bad.json"), "{not json").unwrap();

        assert_eq!(count_records(temp.path()).unwrap(), (2, 1));
    }
}
