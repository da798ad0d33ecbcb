//! Listener selection.
//!
//! # Responsibilities
//! - Bind a Unix domain socket when `SOCKET_PATH` is set
//! - Bind TCP on `HOST:PORT` otherwise
//! - Describe the bound address for the startup log
//! - Carry the peer of a Unix connection into request extensions

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
#[cfg(unix)]
use std::path::Path;

#[cfg(unix)]
use axum::extract::connect_info::Connected;
#[cfg(unix)]
use axum::serve::IncomingStream;
use thiserror::Error;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::config::{BindTarget, ListenerConfig};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind {target}: {source}")]
    Bind { target: String, source: io::Error },

    #[error("Unix domain sockets are not supported on this platform")]
    UnixUnsupported,
}

/// Connect info for a Unix socket connection.
///
/// Clients usually connect from an unnamed socket, so `path` is often `None`.
#[cfg(unix)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixPeer {
    pub path: Option<PathBuf>,
}

#[cfg(unix)]
impl Connected<IncomingStream<'_, UnixListener>> for UnixPeer {
    fn connect_info(stream: IncomingStream<'_, UnixListener>) -> Self {
        let path = stream
            .io()
            .peer_addr()
            .ok()
            .and_then(|addr| addr.as_pathname().map(Path::to_path_buf));
        Self { path }
    }
}

/// A listener ready to hand to the HTTP server.
#[derive(Debug)]
pub enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl BoundListener {
    /// Bind the listener the configuration selects.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        match config.target() {
            BindTarget::Tcp(addr) => {
                let listener = TcpListener::bind(&addr)
                    .await
                    .map_err(|source| ListenerError::Bind { target: addr, source })?;
                Ok(BoundListener::Tcp(listener))
            }
            BindTarget::Unix(path) => Self::bind_unix(path),
        }
    }

    #[cfg(unix)]
    fn bind_unix(path: PathBuf) -> Result<Self, ListenerError> {
        let listener = UnixListener::bind(&path).map_err(|source| ListenerError::Bind {
            target: path.display().to_string(),
            source,
        })?;
        Ok(BoundListener::Unix { listener, path })
    }

    #[cfg(not(unix))]
    fn bind_unix(_path: PathBuf) -> Result<Self, ListenerError> {
        Err(ListenerError::UnixUnsupported)
    }

    /// Local TCP address, if this is a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            BoundListener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            BoundListener::Unix { .. } => None,
        }
    }
}

impl fmt::Display for BoundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundListener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => write!(f, "http://{addr}"),
                Err(_) => write!(f, "tcp (unknown address)"),
            },
            #[cfg(unix)]
            BoundListener::Unix { path, .. } => write!(f, "{}", path.display()),
        }
    }
}
