//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (optional)
//!     → loader.rs (merged into the process environment, never overriding)
//!
//! process environment
//!     → env.rs (snapshot, prefix conflict scan)
//!     → loader.rs (parse settings)
//!     → validation.rs (semantic checks)
//!     → RuntimeConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - Every setting has a default except the fixed origin
//! - Validation separates parsing from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use env::{Env, EnvError, Setting};
pub use loader::{load_config, load_env_file, ConfigError};
pub use schema::{AddressConfig, AssetsConfig, BindTarget, ListenerConfig, RuntimeConfig};
