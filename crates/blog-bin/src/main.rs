//! Blog outbox relay - drains activity notifications from the blog database to a broker.

mod app;

use std::path::PathBuf;

use blog_config_and_utils::{init_logging, parse_level, Config, Paths};
use clap::{Parser, Subcommand};

/// Blog outbox relay command-line interface.
#[derive(Parser, Debug)]
#[command(name = "blog-outbox-relay")]
#[command(about = "Publishes blog activity notifications from the transactional outbox")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, database and logs. Defaults to ~/.blog-outbox
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Run the dispatcher until interrupted
    Run,
    /// Show outbox counts by state
    Stats,
    /// List dead-lettered records
    DeadLetters {
        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Make a dead-lettered or pending record due again
    Requeue {
        /// Outbox record id
        id: i64,
    },
    /// Write sample blog content through the unit of work
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(
        &parse_level(level).as_str().to_lowercase(),
        Some(paths.log_file()),
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => app::run_relay(config, paths).await?,
        Commands::Stats => app::print_stats(&paths).await?,
        Commands::DeadLetters { limit } => app::print_dead_letters(&paths, limit).await?,
        Commands::Requeue { id } => app::requeue(&paths, id).await?,
        Commands::Seed => app::seed_content(&config, &paths)?,
    }

    Ok(())
}
