use std::path::{Path, PathBuf};

use anyhow::Context;
use caweb_migrate::Coordinator;

#[derive(Debug, clap::Subcommand)]
pub enum DbCommands {
    /// Destructively initialize the database with development seed data.
    InitDev(InitDev),
    /// Destructively initialize the database with production seed data.
    InitProd(InitProd),
    /// Migrate a source database and config into a destination.
    ///
    /// The config file given with `-c` is the target that ends up
    /// overwritten with the migrated configuration.
    Migrate(Migrate),
}

#[derive(Debug, clap::Args)]
pub struct InitDev {}

#[derive(Debug, clap::Args)]
pub struct InitProd {}

#[derive(Debug, clap::Args)]
pub struct Migrate {
    /// Config file describing the source database.
    pub src: PathBuf,

    /// Config file describing the destination database.
    pub dst: PathBuf,
}

impl DbCommands {
    pub async fn run(self, config: &Path) -> anyhow::Result<()> {
        let coordinator = Coordinator::new();

        match self {
            Self::InitDev(_) => {
                coordinator
                    .init_dev(config)
                    .await
                    .context("failed to initialize the database for development")?;
                tracing::info!("database initialized with development data");
            }
            Self::InitProd(_) => {
                coordinator
                    .init_prod(config)
                    .await
                    .context("failed to initialize the database for production")?;
                tracing::info!("database initialized with production data");
            }
            Self::Migrate(cmd) => {
                coordinator
                    .migrate(&cmd.src, &cmd.dst, config)
                    .await
                    .context("migration failed")?;
                tracing::info!(config = %config.display(), "migration complete");
            }
        }

        Ok(())
    }
}
