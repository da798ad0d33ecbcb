//! Configuration schema definitions.
//!
//! `RuntimeConfig` is built from the environment by the loader and is
//! immutable afterwards. `AssetsConfig` describes the package layout and
//! comes from the command line.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Default request body ceiling in bytes.
pub const DEFAULT_BODY_SIZE_LIMIT: usize = 524_288;

/// Root runtime configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfig {
    /// Where to accept connections.
    pub listener: ListenerConfig,

    /// Fixed request origin. When unset it is derived per request.
    pub origin: Option<String>,

    /// Trusted client-address settings.
    pub address: AddressConfig,

    /// Header carrying the original protocol (lower-cased).
    pub protocol_header: Option<String>,

    /// Header carrying the original host (lower-cased).
    pub host_header: String,

    /// Request body ceiling in bytes. `None` disables the limit.
    pub body_size_limit: Option<usize>,

    /// Namespace prefix the settings were read under.
    pub env_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            origin: None,
            address: AddressConfig::default(),
            protocol_header: None,
            host_header: "host".to_string(),
            body_size_limit: Some(DEFAULT_BODY_SIZE_LIMIT),
            env_prefix: String::new(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerConfig {
    /// Bind host for TCP.
    pub host: String,

    /// Bind port for TCP.
    pub port: u16,

    /// Filesystem socket path. Takes precedence over host/port.
    pub socket_path: Option<PathBuf>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            socket_path: None,
        }
    }
}

impl ListenerConfig {
    /// The address to bind, as chosen by the settings.
    pub fn target(&self) -> BindTarget {
        match &self.socket_path {
            Some(path) => BindTarget::Unix(path.clone()),
            None => BindTarget::Tcp(format!("{}:{}", self.host, self.port)),
        }
    }
}

/// Concrete listener selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    Tcp(String),
    Unix(PathBuf),
}

/// Which header, if any, is trusted for the client address.
#[derive(Debug, Clone, Serialize)]
pub struct AddressConfig {
    /// Lower-cased header name. `None` means use the socket peer.
    pub header: Option<String>,

    /// Hop depth into `x-forwarded-for`, counted from the right.
    pub xff_depth: i64,

    /// Qualified name of the header setting, for error messages.
    pub header_setting: String,

    /// Qualified name of the depth setting, for error messages.
    pub depth_setting: String,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            header: None,
            xff_depth: 1,
            header_setting: "ADDRESS_HEADER".to_string(),
            depth_setting: "XFF_DEPTH".to_string(),
        }
    }
}

/// Layout of the packaged build output.
#[derive(Debug, Clone, Serialize)]
pub struct AssetsConfig {
    /// Immutable client build assets.
    pub client_dir: PathBuf,

    /// Plain static files.
    pub static_dir: PathBuf,

    /// Pre-rendered pages.
    pub prerendered_dir: PathBuf,

    /// JSON array of pre-rendered paths.
    pub prerendered_manifest: PathBuf,

    /// Directory name of the client build under `client_dir`.
    pub app_path: String,
}

impl AssetsConfig {
    /// Standard layout under a package root.
    pub fn from_root(root: &Path, app_path: impl Into<String>) -> Self {
        Self {
            client_dir: root.join("client"),
            static_dir: root.join("static"),
            prerendered_dir: root.join("prerendered"),
            prerendered_manifest: root.join("prerendered.json"),
            app_path: app_path.into(),
        }
    }

    /// URL prefix of content-hashed client assets.
    pub fn immutable_prefix(&self) -> String {
        format!("/{}/immutable/", self.app_path.trim_matches('/'))
    }
}
