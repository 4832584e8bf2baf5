//! `mindfuel`: daily quote delivery.
//!
//! Exit code 0 on success, 1 on any fatal condition.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use mindfuel_core::Frequency;
use mindfuel_infra::CheckpointBackend;
use mindfuel_observability::LogFormat;

#[derive(Parser)]
#[command(name = "mindfuel", about = "Resumable daily quote mailer", version)]
struct Cli {
    /// Log output format (json or pretty)
    #[arg(long, global = true, env = "LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver today's content to every eligible subscriber
    Run,

    /// Refresh the content cache from the quote API
    FetchContent {
        #[arg(long, env = "CONTENT_API_URL")]
        api_url: String,

        #[arg(long, env = "CONTENT_PATH", default_value = "api_data/quote_data.json")]
        content_path: PathBuf,
    },

    /// Create the database schema if it does not exist
    Migrate {
        #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
        database_url: String,
    },

    /// Inspect or reset delivery checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,

        #[arg(long, global = true, env = "CHECKPOINT_BACKEND", default_value = "file")]
        backend: CheckpointBackend,

        #[arg(long, global = true, env = "CHECKPOINT_DIR", default_value = "state")]
        checkpoint_dir: PathBuf,

        #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
        database_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the stored checkpoint
    Show {
        #[arg(long, value_parser = parse_frequency)]
        frequency: Frequency,
    },
    /// Reset the checkpoint to the start of today's cycle
    Reset {
        #[arg(long, value_parser = parse_frequency)]
        frequency: Frequency,
    },
}

fn parse_frequency(raw: &str) -> Result<Frequency, String> {
    raw.parse().map_err(|e: mindfuel_core::DomainError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    mindfuel_observability::init_with(cli.log_format);

    let result = match cli.command {
        Commands::Run => commands::run().await,
        Commands::FetchContent {
            api_url,
            content_path,
        } => commands::fetch_content(&api_url, content_path).await,
        Commands::Migrate { database_url } => commands::migrate(&database_url).await,
        Commands::Checkpoint {
            action,
            backend,
            checkpoint_dir,
            database_url,
        } => {
            let target = commands::CheckpointTarget {
                backend,
                dir: checkpoint_dir,
                database_url,
            };
            match action {
                CheckpointAction::Show { frequency } => {
                    commands::checkpoint_show(&target, frequency).await
                }
                CheckpointAction::Reset { frequency } => {
                    commands::checkpoint_reset(&target, frequency).await
                }
            }
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_checkpoint_reset() {
        let cli = Cli::try_parse_from([
            "mindfuel",
            "checkpoint",
            "reset",
            "--frequency",
            "weekly",
            "--checkpoint-dir",
            "/tmp/state",
        ])
        .unwrap();
        match cli.command {
            Commands::Checkpoint {
                action: CheckpointAction::Reset { frequency },
                checkpoint_dir,
                ..
            } => {
                assert_eq!(frequency, Frequency::Weekly);
                assert_eq!(checkpoint_dir, PathBuf::from("/tmp/state"));
            }
            _ => panic!("expected checkpoint reset"),
        }
    }

    #[test]
    fn rejects_unknown_frequency() {
        assert!(Cli::try_parse_from(["mindfuel", "checkpoint", "show", "--frequency", "hourly"]).is_err());
    }
}
