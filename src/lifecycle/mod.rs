//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     .env → Env snapshot + prefix check → RuntimeConfig
//!     → prerendered.json → handler sequence → bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → axum stops accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Cli, Runtime, StartupError};
