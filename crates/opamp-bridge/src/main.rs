//! # opamp-bridge
//!
//! OpAMP bridge binary. Wires settings, logging, the proxy and the
//! WebSocket server together and runs until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use opamp_proxy::{
    ConnectionSettingsCalculator, FleetQuery, OpAmpProxy, StaticTelemetrySettings,
};
use opamp_server::{OpAmpServer, ServerConfig};
use opamp_settings::BridgeSettings;

/// OpAMP bridge server.
#[derive(Parser, Debug)]
#[command(name = "opamp-bridge", about = "OpAMP bridge server")]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides settings).
    #[arg(long)]
    listen: Option<String>,

    /// Bridge name (overrides settings).
    #[arg(long)]
    name: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<BridgeSettings> {
        let mut settings = match &self.config {
            Some(path) => opamp_settings::load_settings_from_path(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => opamp_settings::load_settings().context("failed to load settings")?,
        };
        if let Some(listen) = &self.listen {
            settings.listen.clone_from(listen);
        }
        if let Some(name) = &self.name {
            settings.name.clone_from(name);
        }
        Ok(settings)
    }
}

/// One-line view of the fleet for the watcher log.
#[derive(Debug, PartialEq, Eq)]
struct FleetSummary {
    agents: usize,
    healthy: usize,
    reporting_config: usize,
    hostnames: usize,
}

fn fleet_summary(fleet: &dyn FleetQuery) -> FleetSummary {
    let health = fleet.health();
    let configs = fleet.configurations();
    FleetSummary {
        agents: health.len(),
        healthy: health
            .values()
            .filter(|h| h.as_ref().is_some_and(|h| h.healthy))
            .count(),
        reporting_config: configs.values().filter(|c| c.is_some()).count(),
        hostnames: fleet.agents_by_hostname().len(),
    }
}

/// Log a summary each time the fleet changes.
async fn watch_fleet(proxy: Arc<OpAmpProxy>) {
    let updates = proxy.has_updates();
    while updates.changed().await {
        let summary = fleet_summary(proxy.as_ref());
        tracing::info!(
            agents = summary.agents,
            healthy = summary.healthy,
            reporting_config = summary.reporting_config,
            hostnames = summary.hostnames,
            "fleet updated"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    opamp_logging::init_logging(&settings.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let capabilities = settings.server_capabilities();
    let provider = Arc::new(StaticTelemetrySettings::new(settings.telemetry.clone()));
    let proxy = Arc::new(OpAmpProxy::new(
        capabilities,
        ConnectionSettingsCalculator::new(provider),
    ));

    let server = OpAmpServer::new(ServerConfig::from(&settings), Arc::clone(&proxy));
    let (addr, serve_handle) = server.listen().await?;
    tracing::info!(
        name = %settings.name,
        %addr,
        capabilities = format_args!("{capabilities:#x}"),
        "opamp bridge started"
    );

    let watcher = tokio::spawn(watch_fleet(Arc::clone(&proxy)));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown signal received");

    server
        .shutdown()
        .graceful_shutdown(vec![serve_handle], None)
        .await;
    watcher.abort();
    tracing::info!("opamp bridge stopped");
    Ok(())
}
