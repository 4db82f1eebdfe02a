mod commands;
mod logging;
mod settings;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use logging::LoggingConfig;
use settings::{Overrides, Settings};
use sqlsteps_migrate::Direction;

#[derive(Parser)]
#[command(name = "sqlsteps")]
#[command(about = "Apply and revert numbered SQL migrations", version)]
struct Cli {
    /// YAML file with `database` and `migrator` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL (sqlite:... or postgres://...)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory holding the .up.sql/.down.sql files
    #[arg(long, global = true, env = "SQLSTEPS_MIGRATIONS_DIR")]
    dir: Option<PathBuf>,

    /// Run deadline in seconds, 0 disables it
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Full tracing filter directive, overrides --log-level
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Up {
        /// Number of migrations to apply, 0 for all pending
        #[arg(long, short, default_value_t = 0, allow_negative_numbers = true)]
        steps: i64,
    },

    /// Revert applied migrations
    Down {
        /// Number of migrations to revert, 0 for all applied
        #[arg(long, short, default_value_t = 0, allow_negative_numbers = true)]
        steps: i64,
    },

    /// Print the current schema version
    Version,

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::new(self.log_level.clone(), self.json_logs);
        match &self.log_filter {
            Some(filter) => config.with_env_filter(filter.clone()),
            None => config,
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            database_url: self.database_url.clone(),
            migrations_dir: self.dir.clone(),
            timeout_secs: self.timeout,
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    let settings = Settings::resolve(cli.config.as_deref(), cli.overrides())?;

    match cli.command {
        Commands::Up { steps } => commands::run(&settings, Direction::Forward, steps).await,
        Commands::Down { steps } => commands::run(&settings, Direction::Reverse, steps).await,
        Commands::Version => commands::version(&settings).await.map(|_| true),
        Commands::Status { json } => commands::status(&settings, json).await.map(|_| true),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init_logging(&cli.logging_config()) {
        eprintln!("error: failed to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
