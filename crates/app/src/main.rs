//! Harbor command-line binary.

use std::process::ExitCode;

use clap::Parser;
use harbor::{Cli, Settings, commands};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(path) = &cli.database {
        settings = settings.with_database_path(path);
    }

    // Initialize tracing; RUST_LOG wins over the `log` setting
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.log)?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting Harbor v{}", env!("CARGO_PKG_VERSION"));

    commands::run(&cli, &settings).await
}
