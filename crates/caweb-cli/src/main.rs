use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod db;

/// Path used when neither `-c` nor `CONFIG_FILE` is given.
const DEFAULT_CONFIG: &str = "/etc/caweb/config.yaml";

#[derive(Debug, clap::Parser)]
#[command(name = "caweb", version)]
struct Args {
    /// Path to the service config file.
    #[arg(short = 'c', long = "config", env = "CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Database initialization and migration.
    #[command(subcommand)]
    Db(self::db::DbCommands),
}

impl Args {
    /// Flag beats env (clap handles that order), env beats the
    /// compiled-in default.
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let args = Args::parse();
    let config = args.config_path();

    match args.command {
        Commands::Db(cmd) => cmd.run(&config).await,
    }
}
