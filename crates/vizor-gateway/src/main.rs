//! # vizor-gateway
//!
//! Public gateway binary — loads settings, wires the backend address
//! resolver, and serves the WebSocket relay until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use vizor_relay::resolver::{
    AddressResolver, BackendAddress, EnvResolver, FixedResolver, PortFileResolver,
};
use vizor_relay::{RelayConfig, RelayServer};
use vizor_settings::{VizorSettings, load_settings, load_settings_from_path};

/// Dashboard WebSocket gateway.
#[derive(Parser, Debug)]
#[command(name = "vizor-gateway", about = "Dashboard WebSocket gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to a settings JSON file (defaults to `~/.vizor/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Fixed visualization backend port (skips env/file resolution).
    #[arg(long)]
    backend_port: Option<u16>,

    /// File the backend writes its port to at startup.
    #[arg(long)]
    backend_port_file: Option<PathBuf>,

    /// Log level when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn load_settings(&self) -> vizor_settings::Result<VizorSettings> {
        match &self.settings {
            Some(path) => load_settings_from_path(path),
            None => load_settings(),
        }
    }

    /// Pick the backend address source: explicit port > port file > env var.
    fn build_resolver(&self, settings: &VizorSettings) -> Arc<dyn AddressResolver> {
        let host = settings.backend.host.clone();
        if let Some(port) = self.backend_port {
            return Arc::new(FixedResolver(BackendAddress::new(host, port)));
        }
        if let Some(path) = self
            .backend_port_file
            .clone()
            .or_else(|| settings.backend.port_file.clone())
        {
            return Arc::new(PortFileResolver::new(host, path));
        }
        Arc::new(EnvResolver::new(host, settings.backend.port_env_var.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    vizor_core::logging::init_subscriber(&cli.log_level);

    let mut settings = cli.load_settings().context("failed to load settings")?;
    if let Some(host) = cli.host.clone() {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let resolver = cli.build_resolver(&settings);
    let config = RelayConfig::from_settings(&settings);
    anyhow::ensure!(
        !config.routes.is_empty(),
        "no relay routes registered; check the settings file"
    );

    let metrics_handle = vizor_relay::metrics::install_recorder();
    let server = RelayServer::new(config, resolver, metrics_handle);
    let (addr, serve_handle) = server
        .listen()
        .await
        .context("failed to bind the relay listener")?;
    info!(%addr, "gateway up");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    server.shutdown().graceful_shutdown(vec![serve_handle], None).await;

    Ok(())
}
