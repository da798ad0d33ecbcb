//! Startup orchestration.
//!
//! # Responsibilities
//! - Parse package parameters from the command line
//! - Load `.env`, snapshot and check the environment, build the config
//! - Load the pre-rendered set and assemble the handler sequence
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The environment is read once; nothing re-reads it per request

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{load_config, load_env_file, AssetsConfig, ConfigError, Env, EnvError, RuntimeConfig};
use crate::http::{build_sequence, AppServer, RuntimeServer, UpstreamApp, UpstreamError};
use crate::lifecycle::Shutdown;
use crate::net::{BoundListener, ListenerError};
use crate::observability::metrics;
use crate::routing::{PrerenderedError, PrerenderedSet};

/// Package parameters, fixed when the runtime is packaged.
#[derive(Debug, Clone, Parser)]
#[command(name = "compute-runtime", version, about = "Serve a packaged web application")]
pub struct Cli {
    /// Package root holding client/, static/, prerendered/ and prerendered.json
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// URL segment of the client build; `/<app-path>/immutable/` is cached forever
    #[arg(long, default_value = "_app")]
    pub app_path: String,

    /// Namespace prefix for every runtime environment variable
    #[arg(long, default_value = "")]
    pub env_prefix: String,

    /// Application server that renders dynamic requests
    #[arg(long, default_value = "http://127.0.0.1:3001")]
    pub upstream: String,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_address: Option<SocketAddr>,

    /// Dotenv file loaded before the environment is read
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,
}

/// Fatal error while starting or running the server.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Prerendered(#[from] PrerenderedError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// A configured server that has not bound its listener yet.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub server: RuntimeServer,
}

impl Runtime {
    /// Build the server from package parameters and an environment snapshot.
    pub fn build(cli: &Cli, env: &Env, app: Arc<dyn AppServer>) -> Result<Self, StartupError> {
        let config = load_config(env)?;
        tracing::info!(
            prefix = %config.env_prefix,
            origin = config.origin.as_deref().unwrap_or("(from headers)"),
            address_header = config.address.header.as_deref().unwrap_or("(socket)"),
            body_size_limit = ?config.body_size_limit,
            "Configuration loaded"
        );

        let assets = AssetsConfig::from_root(&cli.root, cli.app_path.clone());
        let pages = PrerenderedSet::load(&assets.prerendered_manifest)?;
        tracing::info!(pages = pages.len(), "Pre-rendered pages loaded");

        let sequence = build_sequence(&assets, pages, &config, app);
        Ok(Self {
            config,
            server: RuntimeServer::new(sequence),
        })
    }

    /// Bind the configured listener and serve until `shutdown` fires.
    pub async fn serve(self, shutdown: broadcast::Receiver<()>) -> Result<(), StartupError> {
        let listener = BoundListener::bind(&self.config.listener).await?;
        self.server.run(listener, shutdown).await?;
        Ok(())
    }
}

/// Run the runtime to completion.
pub async fn run(cli: Cli) -> Result<(), StartupError> {
    if load_env_file(&cli.env_file)? {
        tracing::info!(path = %cli.env_file.display(), "Loaded environment file");
    }

    let env = Env::from_process(cli.env_prefix.clone())?;

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr)?;
    }

    let app = Arc::new(UpstreamApp::new(&cli.upstream)?);
    tracing::info!(upstream = %app.authority(), "Forwarding dynamic requests");

    let runtime = Runtime::build(&cli, &env, app)?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown.on_signal();

    runtime.serve(receiver).await
}
