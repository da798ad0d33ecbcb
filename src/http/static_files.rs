//! Static asset stages backed by tower-http's file server.
//!
//! Misses and non-GET/HEAD requests fall through to the next stage.
//! The client build stage marks content-hashed assets as immutable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::http::request::without_body;
use crate::routing::sequence::{Flow, Middleware};

const IMMUTABLE_CACHE_CONTROL: &str = "public,max-age=31536000,immutable";

/// Serves files from a directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    name: &'static str,
    root: PathBuf,
    service: ServeDir,
    immutable_prefix: Option<String>,
}

impl StaticFiles {
    /// A stage for plain static files, or `None` if `root` does not exist.
    pub fn plain(root: &Path) -> Option<Self> {
        Self::build("static", root, None)
    }

    /// A stage for client build output. Successful responses under
    /// `immutable_prefix` get a year-long immutable cache policy.
    pub fn client(root: &Path, immutable_prefix: impl Into<String>) -> Option<Self> {
        Self::build("client", root, Some(immutable_prefix.into()))
    }

    fn build(name: &'static str, root: &Path, immutable_prefix: Option<String>) -> Option<Self> {
        if !root.is_dir() {
            tracing::info!(stage = name, root = %root.display(), "Static directory missing, stage disabled");
            return None;
        }

        let service = ServeDir::new(root)
            .append_index_html_on_directories(false)
            .precompressed_br()
            .precompressed_gzip();

        Some(Self {
            name,
            root: root.to_path_buf(),
            service,
            immutable_prefix,
        })
    }

    /// Directory served by this stage.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// GET and HEAD are the only methods a file server answers.
pub(crate) fn is_read_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

#[async_trait]
impl Middleware for StaticFiles {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, request: Request<Body>) -> Flow {
        if !is_read_method(request.method()) {
            return Flow::Next(request);
        }

        let response = match self.service.clone().oneshot(without_body(&request)).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Flow::Next(request);
        }

        let mut response = response.map(Body::new);
        if let Some(prefix) = &self.immutable_prefix {
            if response.status() == StatusCode::OK && request.uri().path().starts_with(prefix.as_str()) {
                response
                    .headers_mut()
                    .insert(CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL));
            }
        }

        Flow::Respond(response)
    }
}
