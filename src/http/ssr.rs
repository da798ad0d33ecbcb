//! Terminal stage: hand the request to the server-rendering application.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → origin (ORIGIN, or protocol/host headers)
//!     → body read under BODY_SIZE_LIMIT
//!     → Request<Bytes> with absolute URI + RequestContext
//!     → AppServer::respond
//!     → compression.rs
//! ```
//!
//! # Design Decisions
//! - A declared `content-length` over the limit is refused before reading
//! - App errors are logged with the request ID and answered with a bare 500

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::header::{ACCEPT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use futures_util::StreamExt;

use crate::config::RuntimeConfig;
use crate::http::address::{AddressResolver, PeerAddr};
use crate::http::app::{AppServer, ClientAddress, Platform, RequestContext};
use crate::http::compression::compress_response;
use crate::http::request::RequestIdExt;
use crate::http::response::{internal_error, invalid_body, text};
use crate::routing::sequence::{Flow, Middleware};

/// Why a request body was refused.
#[derive(Debug)]
enum BodyError {
    TooLarge,
    Read(axum::Error),
}

/// Renders every request that reaches it.
pub struct Ssr {
    app: Arc<dyn AppServer>,
    resolver: Arc<AddressResolver>,
    origin: Option<String>,
    protocol_header: Option<String>,
    host_header: String,
    body_size_limit: Option<usize>,
}

impl Ssr {
    pub fn new(app: Arc<dyn AppServer>, config: &RuntimeConfig) -> Self {
        Self {
            app,
            resolver: Arc::new(AddressResolver::new(config.address.clone())),
            origin: config
                .origin
                .as_deref()
                .map(|o| o.trim_end_matches('/').to_string()),
            protocol_header: config.protocol_header.clone(),
            host_header: config.host_header.clone(),
            body_size_limit: config.body_size_limit,
        }
    }

    /// `scheme://host` for this request.
    fn origin(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(origin) = &self.origin {
            return Some(origin.clone());
        }

        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let protocol = self
            .protocol_header
            .as_deref()
            .and_then(header)
            .unwrap_or("https");
        let host = header(&self.host_header)?;
        Some(format!("{protocol}://{host}"))
    }

    fn absolute_uri(&self, request: &Request<Body>) -> Option<Uri> {
        let origin = self.origin(request.headers())?;
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: Uri = format!("{origin}{path_and_query}").parse().ok()?;
        (uri.scheme().is_some() && uri.authority().is_some()).then_some(uri)
    }

    fn declared_too_large(&self, headers: &HeaderMap) -> bool {
        let Some(limit) = self.body_size_limit else {
            return false;
        };
        headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .is_some_and(|len| len > limit as u64)
    }
}

async fn read_body(body: Body, limit: Option<usize>) -> Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if limit.is_some_and(|limit| buf.len() + chunk.len() > limit) {
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

#[async_trait]
impl Middleware for Ssr {
    fn name(&self) -> &'static str {
        "ssr"
    }

    async fn handle(&self, request: Request<Body>) -> Flow {
        let Some(uri) = self.absolute_uri(&request) else {
            tracing::warn!(path = %request.uri().path(), "Cannot determine request origin");
            return Flow::Respond(text(StatusCode::BAD_REQUEST, "Bad Request"));
        };

        if self.declared_too_large(request.headers()) {
            return Flow::Respond(invalid_body(StatusCode::PAYLOAD_TOO_LARGE));
        }

        let method = request.method().clone();
        let accept_encoding = request
            .headers()
            .get(ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let request_id = request.request_id().map(str::to_string);
        let peer = PeerAddr::from_request(&request);

        let (mut parts, body) = request.into_parts();
        let body = match read_body(body, self.body_size_limit).await {
            Ok(body) => body,
            Err(BodyError::TooLarge) => {
                return Flow::Respond(invalid_body(StatusCode::PAYLOAD_TOO_LARGE))
            }
            Err(BodyError::Read(e)) => {
                tracing::debug!(error = %e, "Failed to read request body");
                return Flow::Respond(invalid_body(StatusCode::BAD_REQUEST));
            }
        };
        parts.uri = uri;

        let ctx = RequestContext::new(
            ClientAddress::new(self.resolver.clone(), parts.headers.clone(), peer.clone()),
            Platform {
                request_id: request_id.clone(),
                peer,
            },
        );

        let response = match self.app.respond(Request::from_parts(parts, body), ctx).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    request_id = request_id.as_deref().unwrap_or("unknown"),
                    error = %e,
                    "Application failed to render"
                );
                return Flow::Respond(internal_error());
            }
        };

        Flow::Respond(compress_response(&method, accept_encoding.as_deref(), response))
    }
}
