use anyhow::{Context, Result};
use clap::Parser;
use mailgate::cli::Cli;
use mailgate::config::GatewayConfig;
use mailgate::server;
use mailgate::smtp::LettreTransportFactory;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level()).init();

    let mut config = GatewayConfig::load_from_file(&cli.config)
        .await
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.apply_env();
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if cli.debug {
        tracing::debug!("Debug mode enabled");
    }

    let factory = Arc::new(LettreTransportFactory::new(config.smtp.clone()));
    server::serve(config, factory).await.context("Server failed")?;

    Ok(())
}
