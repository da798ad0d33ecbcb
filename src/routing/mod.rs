//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request
//!     → sequence.rs (try stages in order)
//!         → stage answers      → Response
//!         → stage passes       → next stage
//!     → every stage passed     → fallback (404)
//!
//! prerendered.rs (one of the stages):
//!     decoded path in set      → serve file
//!     slash-toggled path in set → 308 redirect
//!     otherwise                → pass
//! ```
//!
//! # Design Decisions
//! - Stage list built at startup, immutable at runtime
//! - First stage to answer wins; no stage runs twice per request

pub mod prerendered;
pub mod sequence;

pub use prerendered::{PrerenderedError, PrerenderedRouter, PrerenderedSet};
pub use sequence::{Flow, Middleware, Sequence};
