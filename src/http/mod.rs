//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (TCP or Unix)
//!     → server.rs (Axum setup, request ID, trace span)
//!     → routing::sequence (ordered stages)
//!         → static_files.rs (client build, then static/)
//!         → routing::prerendered
//!         → ssr.rs (origin, body limit, AppServer)
//!             → address.rs (lazy client address)
//!             → upstream.rs (bundled AppServer)
//!             → compression.rs (br / gzip)
//!     → Send to client
//! ```

pub mod address;
pub mod app;
pub mod compression;
pub mod request;
pub mod response;
pub mod server;
pub mod ssr;
pub mod static_files;
pub mod upstream;

pub use address::{AddressError, AddressResolver, PeerAddr};
pub use app::{AppError, AppServer, ClientAddress, Platform, RequestContext};
pub use request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
pub use server::{build_sequence, RuntimeServer};
pub use upstream::{UpstreamApp, UpstreamError};
