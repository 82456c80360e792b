//! Error types and reporting for the tend CLI.

use colored::Colorize;
use thiserror::Error;

/// Errors raised by the CLI layer itself.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid duration '{0}': expected e.g. 0, 90s, 30m, 12h, 7d or 2w")]
    InvalidDuration(String),

    #[error("No session given and TEND_SESSION_ID is not set")]
    NoSession,

    #[error("{0}")]
    Usage(String),
}

/// Print an error for the user. Resolution failures list their candidates.
pub fn report(err: &anyhow::Error) {
    if let Some(core) = err.downcast_ref::<tend_core::Error>() {
        match core {
            tend_core::Error::Ambiguous { query, candidates } => {
                eprintln!(
                    "{} '{}' matches {} sessions:",
                    "error:".red().bold(),
                    query,
                    candidates.len()
                );
                for id in candidates {
                    eprintln!("  {}", id);
                }
                return;
            }
            tend_core::Error::NotFound(query) => {
                eprintln!("{} no session matches '{}'", "error:".red().bold(), query);
                eprintln!("  Run `tend ls` to see known sessions");
                return;
            }
            _ => {}
        }
    }

    eprintln!("{} {}", "error:".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_survive_anyhow() {
        let err: anyhow::Error = tend_core::Error::Ambiguous {
            query: "ab".to_string(),
            candidates: vec!["abc".to_string(), "abd".to_string()],
        }
        .into();
        assert!(matches!(
            err.downcast_ref::<tend_core::Error>(),
            Some(tend_core::Error::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_invalid_duration_message() {
        let msg = CliError::InvalidDuration("7x".to_string()).to_string();
        assert!(msg.contains("'7x'"));
    }
}
