//! Configuration loading from the environment.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::env::{Env, EnvError, Setting};
use crate::config::schema::{
    AddressConfig, ListenerConfig, RuntimeConfig, DEFAULT_BODY_SIZE_LIMIT,
};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("{setting}={value} is not valid: {reason}")]
    Parse {
        setting: String,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Failed to read {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a `.env` file into the process environment, if it exists.
///
/// Variables already set in the process are left untouched. Returns
/// whether a file was loaded.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(source) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Build and validate the runtime configuration from an environment snapshot.
pub fn load_config(env: &Env) -> Result<RuntimeConfig, ConfigError> {
    let socket_path = non_empty(env.get(Setting::SocketPath)).map(PathBuf::from);

    let listener = ListenerConfig {
        host: env.get_or(Setting::Host, "0.0.0.0").to_string(),
        port: match env.get(Setting::Port) {
            Some(raw) => parse_setting(env, Setting::Port, raw)?,
            None => 3000,
        },
        socket_path,
    };

    let xff_depth = match env.get(Setting::XffDepth) {
        Some(raw) => parse_setting(env, Setting::XffDepth, raw.trim())?,
        None => 1,
    };

    let body_size_limit = match env.get(Setting::BodySizeLimit) {
        Some(raw) => parse_body_size_limit(raw).ok_or_else(|| ConfigError::Parse {
            setting: env.qualified(Setting::BodySizeLimit),
            value: raw.to_string(),
            reason: "expected a byte count, 0 or Infinity".to_string(),
        })?,
        None => Some(DEFAULT_BODY_SIZE_LIMIT),
    };

    let config = RuntimeConfig {
        listener,
        origin: non_empty(env.get(Setting::Origin)).map(str::to_string),
        address: AddressConfig {
            header: non_empty(env.get(Setting::AddressHeader)).map(str::to_lowercase),
            xff_depth,
            header_setting: env.qualified(Setting::AddressHeader),
            depth_setting: env.qualified(Setting::XffDepth),
        },
        protocol_header: non_empty(env.get(Setting::ProtocolHeader)).map(str::to_lowercase),
        host_header: env.get_or(Setting::HostHeader, "host").to_lowercase(),
        body_size_limit,
        env_prefix: env.prefix().to_string(),
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// `0` and `Infinity` disable the limit.
fn parse_body_size_limit(raw: &str) -> Option<Option<usize>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("infinity") {
        return Some(None);
    }
    match raw.parse::<usize>().ok()? {
        0 => Some(None),
        n => Some(Some(n)),
    }
}

fn parse_setting<T>(env: &Env, setting: Setting, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Parse {
        setting: env.qualified(setting),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
