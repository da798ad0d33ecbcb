//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → TraceLayer span (method, uri, request id)
//!     → sequence.rs records stage + status + latency
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout log lines (EnvFilter controlled)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric macros are no-ops until a recorder is installed
//! - Request ID is set before the trace span opens

pub mod logging;
pub mod metrics;
