//! Client address resolution.
//!
//! # Responsibilities
//! - Return the socket peer when no header is trusted
//! - Return the trusted header verbatim when one is configured, repeated
//!   occurrences joined with `, `
//! - Pick the `XFF_DEPTH`-th entry from the right of `x-forwarded-for`
//!
//! # Design Decisions
//! - Every hop between the edge and this server is assumed to append one
//!   address; no allow-list of intermediate proxies is consulted
//! - Misconfiguration fails the one request that asks for the address,
//!   never the process
//! - Resolution reads the request and never mutates it

use std::net::SocketAddr;

use axum::extract::connect_info::MockConnectInfo;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use thiserror::Error;

use crate::config::AddressConfig;
#[cfg(unix)]
use crate::net::UnixPeer;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Error raised while resolving a client address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address header was specified with {setting}={header} but is absent from request")]
    MissingHeader { setting: String, header: String },

    #[error("{setting} must be a positive integer")]
    InvalidDepth { setting: String },

    #[error("{setting} is {depth}, but only found {found} addresses")]
    DepthExceedsAddresses {
        setting: String,
        depth: i64,
        found: usize,
    },

    #[error("Client address is unavailable for this connection")]
    Unavailable,
}

/// Transport-level peer of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    Unix(Option<String>),
}

impl PeerAddr {
    /// Find the peer among the connect-info extensions a transport may set.
    pub fn from_request<B>(request: &Request<B>) -> Option<Self> {
        let extensions = request.extensions();
        if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
            return Some(PeerAddr::Tcp(*addr));
        }
        #[cfg(unix)]
        if let Some(ConnectInfo(peer)) = extensions.get::<ConnectInfo<UnixPeer>>() {
            let path = peer
                .path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());
            return Some(PeerAddr::Unix(path));
        }
        // Routers driven without a socket.
        if let Some(MockConnectInfo(addr)) = extensions.get::<MockConnectInfo<SocketAddr>>() {
            return Some(PeerAddr::Tcp(*addr));
        }
        extensions.get::<PeerAddr>().cloned()
    }

    /// Address string of the peer, if it has one.
    pub fn address(&self) -> Option<String> {
        match self {
            PeerAddr::Tcp(addr) => Some(addr.ip().to_string()),
            PeerAddr::Unix(path) => path.clone(),
        }
    }
}

/// Resolves the originating client address of a request.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    config: AddressConfig,
}

impl AddressResolver {
    pub fn new(config: AddressConfig) -> Self {
        Self { config }
    }

    /// The trusted header, if any.
    pub fn trusted_header(&self) -> Option<&str> {
        self.config.header.as_deref()
    }

    /// Resolve the client address from request headers and the socket peer.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<&PeerAddr>) -> Result<String, AddressError> {
        let Some(header) = self.config.header.as_deref() else {
            return peer
                .and_then(PeerAddr::address)
                .ok_or(AddressError::Unavailable);
        };

        let mut values = headers.get_all(header).iter().peekable();
        if values.peek().is_none() {
            return Err(AddressError::MissingHeader {
                setting: self.config.header_setting.clone(),
                header: header.to_string(),
            });
        }

        // Repeated occurrences read as one comma-separated value.
        let joined = values
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        if header != X_FORWARDED_FOR {
            return Ok(joined);
        }
        self.select_forwarded(&joined)
    }

    /// Pick the configured hop from a comma-separated forwarding list.
    fn select_forwarded(&self, value: &str) -> Result<String, AddressError> {
        let addresses: Vec<&str> = value.split(',').collect();
        let depth = self.config.xff_depth;

        if depth < 1 {
            return Err(AddressError::InvalidDepth {
                setting: self.config.depth_setting.clone(),
            });
        }

        let count = addresses.len();
        match usize::try_from(depth) {
            Ok(d) if d <= count => Ok(addresses[count - d].trim().to_string()),
            _ => Err(AddressError::DepthExceedsAddresses {
                setting: self.config.depth_setting.clone(),
                depth,
                found: count,
            }),
        }
    }
}
