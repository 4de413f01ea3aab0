//! Helm Broker Server
//!
//! Main entry point for the Open Service Broker serving Helm addons.
//! This binary loads configuration, seeds the catalog, wires the broker
//! and serves HTTP with graceful shutdown.

mod config;
mod seed;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use helm_broker_api::{build_api_server_with_config, MiddlewareConfig};
use helm_broker_service::{
    Broker, HelmClientConfig, HttpHelmClient, OperationIdProvider, SequentialIdProvider,
    StaticKeyRefs, UuidOperationIdProvider,
};
use helm_broker_storage::MemoryStorage;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use config::{BrokerConfig, IdProviderKind};
use seed::Seed;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: String,

    /// Environment (development, production, etc.)
    #[arg(short, long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,

    /// Server host
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Base URL of the release service
    #[arg(long, env = "INSTALLER_URL")]
    installer_url: Option<String>,

    /// JSON file with the addons and charts to serve
    #[arg(long, env = "CATALOG_FILE")]
    catalog_file: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut BrokerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = self.installer_url {
            config.installer.url = url;
        }
        if let Some(file) = self.catalog_file {
            config.catalog.seed_file = Some(file);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let environment = args.environment.clone();
    let mut config = BrokerConfig::load_or_default(&args.config_dir, &environment);
    args.apply(&mut config);

    telemetry::init_with_config(telemetry::TelemetryConfig::from(&config.logging));

    info!("Starting Helm Broker");
    info!("Environment: {}", environment);
    info!("Server: {}", config.bind_address());
    info!("Installer: {}", config.installer.url);

    let storage = MemoryStorage::new();
    let key_refs = match &config.catalog.seed_file {
        Some(path) => {
            let seed = Seed::load(path).await?;
            let (key_refs, _) = seed.apply(&storage).await?;
            key_refs
        }
        None => {
            warn!("No catalog file configured, serving an empty catalog");
            StaticKeyRefs::new()
        }
    };

    let installer = HttpHelmClient::new(HelmClientConfig {
        base_url: config.installer.url.clone(),
        timeout: config.installer.timeout(),
    })
    .context("Failed to create installer client")?;

    let id_provider: Arc<dyn OperationIdProvider> = match config.broker.id_provider {
        IdProviderKind::Uuid => Arc::new(UuidOperationIdProvider),
        IdProviderKind::Sequential => Arc::new(SequentialIdProvider::new()),
    };

    let broker = Broker::builder()
        .storage((&storage).into())
        .installer(Arc::new(installer))
        .key_refs(Arc::new(key_refs))
        .id_provider(id_provider)
        .build()
        .map_err(anyhow::Error::msg)
        .context("Failed to build broker")?;

    let app = build_api_server_with_config(broker.clone(), MiddlewareConfig::default());

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid HTTP bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind HTTP server")?;
    info!("HTTP Server listening on http://{}", addr);

    if config.server.graceful_shutdown {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP Server error")?;

        let timeout = config.shutdown_timeout();
        info!(
            "Waiting up to {} seconds for background operations",
            timeout.as_secs()
        );
        if !broker.shutdown(timeout).await {
            warn!("Abandoning unfinished operations; they stay in progress");
        }
    } else {
        axum::serve(listener, app.into_make_service())
            .await
            .context("HTTP Server error")?;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
///
/// Resolves on SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
