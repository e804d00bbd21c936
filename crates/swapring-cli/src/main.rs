//! SwapRing operational CLI
//!
//! Commands emit one stable JSON object on stdout: `{ok, code?,
//! message?, details?}`. Exit codes: 0 success, 1 command failure,
//! 2 argument usage (via clap).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use swapring_store::migrate_json_to_sqlite;

#[derive(Parser)]
#[command(name = "swapring", about = "SwapRing operational tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Migrate a JSON state snapshot into the SQLite backend
    MigrateJsonStateToSqlite {
        /// Source JSON state file (defaults to STATE_FILE)
        #[arg(long)]
        from_state_file: Option<PathBuf>,
        /// Target SQLite state file
        #[arg(long)]
        to_state_file: Option<PathBuf>,
        /// Overwrite an already-migrated target
        #[arg(long)]
        force: bool,
    },
}

fn default_state_file() -> PathBuf {
    std::env::var("STATE_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("swapring_state.json"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::MigrateJsonStateToSqlite {
            from_state_file,
            to_state_file,
            force,
        } => {
            let from = from_state_file.unwrap_or_else(default_state_file);
            let to = to_state_file.unwrap_or_else(|| from.with_extension("sqlite"));
            match migrate_json_to_sqlite(&from, &to, force).await {
                Ok(report) => {
                    let out = serde_json::json!({
                        "ok": true,
                        "details": report,
                    });
                    println!("{}", out);
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    let out = serde_json::json!({
                        "ok": false,
                        "code": "migration_failed",
                        "message": err.to_string(),
                    });
                    println!("{}", out);
                    ExitCode::from(1)
                }
            }
        }
    }
}
