//! Serving runtime for a packaged web application.
//!
//! Static assets, pre-rendered pages and server-rendered requests are
//! answered by one ordered handler sequence. See [`http::server`] for the
//! assembly and [`lifecycle::startup`] for the startup order.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::RuntimeConfig;
pub use http::{AppServer, RuntimeServer};
pub use lifecycle::Shutdown;
