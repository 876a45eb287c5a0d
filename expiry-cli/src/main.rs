use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use expiry_core::{Config, DomainCollector, MultiClient, RemoteWriter};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "domain-exporter")]
#[command(about = "Probe domain expiry dates and push them to a Prometheus remote-write endpoint")]
#[command(version)]
struct Cli {
    /// Per-domain probe budget (e.g. 10s, 500ms)
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Path to the YAML config file
    #[arg(long, default_value = "config.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("domain-exporter failed: {:#}", e);
        std::process::exit(1);
    }

    info!("finished");
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let writer = RemoteWriter::new(&config.remote_store).context("failed to build remote writer")?;
    let client = MultiClient::rdap_then_whois().context("failed to build lookup clients")?;

    info!(
        domains = config.domains.len(),
        timeout = %humantime::format_duration(cli.timeout),
        "starting collection"
    );

    let collector = DomainCollector::new(Arc::new(client), cli.timeout, config.domains)
        .context("failed to build collector")?;

    let registry = prometheus::Registry::new();
    registry
        .register(Box::new(collector))
        .context("failed to register collector")?;

    writer
        .write(&registry)
        .await
        .context("failed to write metrics to remote store")?;

    Ok(())
}
