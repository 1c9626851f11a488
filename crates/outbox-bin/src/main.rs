//! Field Outbox - operator CLI and delivery loop for queued field submissions.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use outbox_config_and_utils::{init_logging, Config, Paths};

/// Field outbox command-line interface.
#[derive(Parser, Debug)]
#[command(name = "field-outbox")]
#[command(about = "Durable upload queue for field-recorded submissions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for the queue database, config and logs. Defaults to ~/.field-outbox
    #[arg(long, global = true, env = "FIELD_OUTBOX_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a record for delivery
    Enqueue {
        /// Record kind, e.g. match-record or pit-record
        #[arg(short, long)]
        kind: String,
        /// Read the payload from a file
        #[arg(short, long, conflicts_with = "data", required_unless_present = "data")]
        file: Option<PathBuf>,
        /// Use this string as the payload
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Show queue counts
    Stats,
    /// List queued submissions, oldest first
    List {
        /// Only show submissions in this state (pending, in_flight, succeeded, failed)
        #[arg(short, long)]
        state: Option<String>,
    },
    /// List submissions that failed permanently
    Failed,
    /// Reset a failed submission so it is attempted again
    Retry {
        /// Submission id
        id: String,
    },
    /// Remove delivered and failed submissions older than the retention period
    Purge {
        /// Retention in days. Defaults to the configured retention.
        #[arg(long)]
        older_than_days: Option<u32>,
    },
    /// Run a single dispatch cycle and exit
    Flush,
    /// Run the dispatcher until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, &paths, matches!(cli.command, Commands::Run));

    match cli.command {
        Commands::Enqueue { kind, file, data } => {
            let payload = match (file, data) {
                (Some(path), _) => std::fs::read(path)?,
                (None, Some(data)) => data.into_bytes(),
                (None, None) => return Err("either --file or --data is required".into()),
            };
            app::enqueue(&paths, &kind, payload)?;
        }
        Commands::Stats => app::show_stats(&paths)?,
        Commands::List { state } => app::list(&paths, state.as_deref())?,
        Commands::Failed => app::list_failed(&paths)?,
        Commands::Retry { id } => app::retry(&paths, &id)?,
        Commands::Purge { older_than_days } => {
            app::purge(&paths, older_than_days.unwrap_or(config.retention_days))?
        }
        Commands::Flush => app::flush(&config, &paths).await?,
        Commands::Run => app::run(config, paths).await?,
    }

    Ok(())
}
