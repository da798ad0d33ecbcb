//! HTTP server setup.
//!
//! # Responsibilities
//! - Assemble the handler sequence from the packaged build output
//! - Create the Axum router with a single catch-all dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Serve on a TCP or Unix listener until shutdown
//!
//! # Design Decisions
//! - Every method and path goes to the sequence; axum does no routing
//! - Connect info is attached per transport so the address resolver
//!   sees the peer of either listener kind

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use tokio::sync::broadcast;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AssetsConfig, RuntimeConfig};
use crate::http::app::AppServer;
use crate::http::request::MakeRequestUuidV4;
use crate::http::response::not_found;
use crate::http::ssr::Ssr;
use crate::http::static_files::StaticFiles;
use crate::net::BoundListener;
#[cfg(unix)]
use crate::net::UnixPeer;
use crate::routing::prerendered::{PrerenderedRouter, PrerenderedSet};
use crate::routing::sequence::Sequence;

/// Application state injected into the dispatcher.
#[derive(Clone)]
struct AppState {
    sequence: Arc<Sequence>,
}

/// Build the stage list: client assets, static files, pre-rendered
/// pages, then the rendering application.
pub fn build_sequence(
    assets: &AssetsConfig,
    pages: PrerenderedSet,
    config: &RuntimeConfig,
    app: Arc<dyn AppServer>,
) -> Sequence {
    let mut sequence = Sequence::new();

    if let Some(client) = StaticFiles::client(&assets.client_dir, assets.immutable_prefix()) {
        sequence.push(client);
    }
    if let Some(plain) = StaticFiles::plain(&assets.static_dir) {
        sequence.push(plain);
    }
    sequence.push(PrerenderedRouter::new(pages, &assets.prerendered_dir));
    sequence.push(Ssr::new(app, config));

    sequence
}

/// HTTP server for the runtime.
pub struct RuntimeServer {
    router: Router,
}

impl RuntimeServer {
    pub fn new(sequence: Sequence) -> Self {
        tracing::info!(stages = ?sequence.stage_names(), "Handler sequence ready");

        let state = AppState {
            sequence: Arc::new(sequence),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// The configured router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: BoundListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!("Listening on {listener}");

        match listener {
            BoundListener::Tcp(listener) => {
                let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
                axum::serve(listener, app)
                    .with_graceful_shutdown(wait_for(shutdown))
                    .await?;
            }
            #[cfg(unix)]
            BoundListener::Unix { listener, .. } => {
                let app = self.router.into_make_service_with_connect_info::<UnixPeer>();
                axum::serve(listener, app)
                    .with_graceful_shutdown(wait_for(shutdown))
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn wait_for(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
    tracing::info!("Shutdown signal received, draining connections");
}

/// Catch-all handler: run the sequence, 404 when nothing answers.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    state
        .sequence
        .run(request, |_| async { not_found() })
        .await
}
