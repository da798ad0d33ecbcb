//! Application server adapter that forwards to an HTTP upstream.
//!
//! # Data Flow
//! ```text
//! Normalized request (absolute URI, buffered body)
//!     → resolve client address (x-forwarded-for)
//!     → strip hop-by-hop headers, add x-forwarded-proto/host
//!     → rewrite URI onto the upstream authority
//!     → hyper client
//!     → strip hop-by-hop headers, stream body back
//! ```
//!
//! # Design Decisions
//! - No retries: a rendered request may not be idempotent
//! - Connection failures answer 502 instead of surfacing as an error

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderName, HeaderValue, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::http::app::{AppError, AppServer, RequestContext};
use crate::http::response::{bad_gateway, strip_hop_by_hop};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Invalid upstream address.
#[derive(Debug, Error)]
#[error("Invalid upstream URL {value}: {reason}")]
pub struct UpstreamError {
    pub value: String,
    pub reason: String,
}

/// Forwards rendered requests to an HTTP application server.
#[derive(Clone)]
pub struct UpstreamApp {
    client: Client<HttpConnector, Body>,
    scheme: Scheme,
    authority: Authority,
}

impl UpstreamApp {
    /// Create an adapter for `upstream`, e.g. `http://127.0.0.1:3001`.
    pub fn new(upstream: &str) -> Result<Self, UpstreamError> {
        let invalid = |reason: &str| UpstreamError {
            value: upstream.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = upstream.parse().map_err(|_| invalid("not a URI"))?;
        if uri.scheme() != Some(&Scheme::HTTP) {
            return Err(invalid("only http:// upstreams are supported"));
        }
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            scheme: Scheme::HTTP,
            authority,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }
}

#[async_trait]
impl AppServer for UpstreamApp {
    async fn respond(
        &self,
        request: Request<Bytes>,
        ctx: RequestContext,
    ) -> Result<Response<Body>, AppError> {
        let client_address = ctx.client_address()?;
        let (parts, body) = request.into_parts();

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&client_address)?);
        if let Some(scheme) = parts.uri.scheme_str() {
            headers.insert(X_FORWARDED_PROTO, HeaderValue::from_str(scheme)?);
        }
        if let Some(host) = parts.uri.authority() {
            headers.insert(X_FORWARDED_HOST, HeaderValue::from_str(host.as_str())?);
        }

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?;

        let mut forwarded = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(Body::from(body))?;
        *forwarded.headers_mut() = headers;

        tracing::debug!(
            request_id = ctx.platform.request_id.as_deref().unwrap_or("unknown"),
            method = %parts.method,
            path = path_and_query,
            "Forwarding to upstream"
        );

        match self.client.request(forwarded).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Err(e) => {
                tracing::error!(
                    request_id = ctx.platform.request_id.as_deref().unwrap_or("unknown"),
                    upstream = %self.authority,
                    error = %e,
                    "Upstream error"
                );
                Ok(bad_gateway())
            }
        }
    }
}
