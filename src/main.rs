use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lighthouse::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lighthouse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bench(args) => {
            lighthouse::cli::bench(args).await?;
        }
        Commands::Merge { intake, store } => {
            lighthouse::cli::merge(intake, store).await?;
        }
        Commands::List { store, verbose } => {
            lighthouse::cli::list(store, verbose).await?;
        }
        Commands::Info { model } => {
            lighthouse::cli::info(model).await?;
        }
    }

    Ok(())
}
