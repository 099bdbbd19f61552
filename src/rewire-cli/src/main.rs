mod cli;
mod commands;
mod config;
mod dispatch;

use anyhow::Result;
use clap::Parser;
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(&config);

    match cli.command {
        Commands::Configure {
            dev_mode,
            table,
            log_filter,
            show,
        } => {
            commands::configure::handle(dev_mode, table, log_filter, show)?;
        }

        Commands::Encode {
            source,
            destination,
            width,
        } => {
            commands::jump::encode(&source, &destination, width)?;
        }

        Commands::Decode { bytes, at } => {
            commands::jump::decode(&bytes, &at)?;
        }

        Commands::Table { command } => dispatch::dispatch_table(command, &config)?,

        Commands::Demo => {
            commands::demo::handle(config.dev_mode)?;
        }

        Commands::Preload { action } => dispatch::dispatch_preload(action, &config)?,
    }

    Ok(())
}
