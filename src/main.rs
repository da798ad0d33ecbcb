//! Compute runtime
//!
//! Serves a packaged web application on a TCP port or Unix socket.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net listener ──▶ http server (request id, trace)
//!                                          │
//!                                          ▼
//!                                   handler sequence
//!                       ┌──────────┬───────┴──────┬──────────────┐
//!                       ▼          ▼              ▼              ▼
//!                    client/    static/     prerendered/        ssr
//!                   (immutable)            (308 on slash    (origin, body
//!                                            mismatch)        limit, app)
//!                                                                │
//!                                                   upstream app server
//!                                                                │
//!     Client Response                                            ▼
//!     ◀───────────────────────────────────────────── br / gzip compression
//! ```

use clap::Parser;

use compute_runtime::lifecycle::{startup, Cli};
use compute_runtime::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    logging::init();
    tracing::info!("compute-runtime v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = startup::run(cli).await {
        tracing::error!(error = %e, "Fatal error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
