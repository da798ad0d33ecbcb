//! The application-server seam.
//!
//! # Responsibilities
//! - Define the single entry point a server-rendering application exposes
//! - Carry per-request context: a lazy client address and platform data
//!
//! # Design Decisions
//! - The client address is only resolved if the application asks for it,
//!   so a misconfigured address header only fails requests that need it
//! - The first resolution is memoized; later calls return the same result

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderMap, Request, Response};
use thiserror::Error;

use crate::http::address::{AddressError, AddressResolver, PeerAddr};

/// Error returned by an application server. Always answered with a 500.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("Invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("Failed to build request: {0}")]
    Http(#[from] axum::http::Error),

    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Lazily resolved client address of one request.
#[derive(Debug)]
pub struct ClientAddress {
    resolver: Arc<AddressResolver>,
    headers: HeaderMap,
    peer: Option<PeerAddr>,
    resolved: OnceLock<Result<String, AddressError>>,
}

impl ClientAddress {
    pub fn new(resolver: Arc<AddressResolver>, headers: HeaderMap, peer: Option<PeerAddr>) -> Self {
        Self {
            resolver,
            headers,
            peer,
            resolved: OnceLock::new(),
        }
    }

    /// Resolve the address on first call.
    pub fn get(&self) -> Result<String, AddressError> {
        self.resolved
            .get_or_init(|| self.resolver.resolve(&self.headers, self.peer.as_ref()))
            .clone()
    }
}

/// Transport details handed to the application.
#[derive(Debug, Clone, Default)]
pub struct Platform {
    pub request_id: Option<String>,
    pub peer: Option<PeerAddr>,
}

/// Everything an application gets alongside the request.
#[derive(Debug)]
pub struct RequestContext {
    client_address: ClientAddress,
    pub platform: Platform,
}

impl RequestContext {
    pub fn new(client_address: ClientAddress, platform: Platform) -> Self {
        Self {
            client_address,
            platform,
        }
    }

    pub fn client_address(&self) -> Result<String, AddressError> {
        self.client_address.get()
    }
}

/// A server-rendering application.
///
/// Requests arrive with an absolute URI (origin already applied) and a
/// fully buffered body.
#[async_trait]
pub trait AppServer: Send + Sync + 'static {
    async fn respond(
        &self,
        request: Request<Bytes>,
        ctx: RequestContext,
    ) -> Result<Response<Body>, AppError>;
}
