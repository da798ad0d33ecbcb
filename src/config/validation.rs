//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (the loader handles parsing)
//! - Check the fixed origin is an absolute http(s) URL
//! - Check header-name settings are valid HTTP header names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - `XFF_DEPTH` bounds are not checked here; they depend on each request
//! - Messages name the setting as set, `env_prefix` included

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::env::Setting;
use crate::config::schema::RuntimeConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{setting} {value} is not an absolute http(s) URL")]
    InvalidOrigin { setting: String, value: String },

    #[error("{setting} {value} is not a valid header name")]
    InvalidHeaderName { setting: String, value: String },

    #[error("{setting} must not be empty")]
    EmptyHost { setting: String },
}

/// Check a loaded configuration.
pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let qualified = |setting: Setting| format!("{}{}", config.env_prefix, setting.name());

    if let Some(origin) = &config.origin {
        let valid = url::Url::parse(origin)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidOrigin {
                setting: qualified(Setting::Origin),
                value: origin.clone(),
            });
        }
    }

    let headers = [
        (Setting::AddressHeader, config.address.header.as_deref()),
        (Setting::ProtocolHeader, config.protocol_header.as_deref()),
        (Setting::HostHeader, Some(config.host_header.as_str())),
    ];
    for (setting, value) in headers {
        if let Some(value) = value {
            if HeaderName::from_bytes(value.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidHeaderName {
                    setting: qualified(setting),
                    value: value.to_string(),
                });
            }
        }
    }

    if config.listener.socket_path.is_none() && config.listener.host.is_empty() {
        errors.push(ValidationError::EmptyHost {
            setting: qualified(Setting::Host),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
