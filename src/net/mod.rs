//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig
//!     → SOCKET_PATH set?  yes → UnixListener
//!                         no  → TcpListener on HOST:PORT
//!     → Hand off to HTTP layer (axum::serve)
//! ```

pub mod listener;

pub use listener::{BoundListener, ListenerError};
#[cfg(unix)]
pub use listener::UnixPeer;
