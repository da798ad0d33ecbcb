//! Environment setting resolution under an optional namespace prefix.
//!
//! # Responsibilities
//! - Name the closed set of recognized settings
//! - Snapshot the process environment once at startup
//! - Reject prefixed variables that are not recognized settings
//! - Resolve `prefix + name` with a caller-supplied fallback
//!
//! # Design Decisions
//! - The conflict scan is a pure function over the snapshot; it runs
//!   before any setting can be read and sees every variable name, even
//!   those whose value is not unicode
//! - An empty prefix has no namespace to protect, so nothing is scanned
//! - The snapshot is immutable, so resolving twice yields the same value

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;

use thiserror::Error;

/// A setting the runtime reads from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    Port,
    Host,
    SocketPath,
    Origin,
    XffDepth,
    AddressHeader,
    ProtocolHeader,
    HostHeader,
    BodySizeLimit,
}

impl Setting {
    /// Every recognized setting.
    pub const ALL: [Setting; 9] = [
        Setting::Port,
        Setting::Host,
        Setting::SocketPath,
        Setting::Origin,
        Setting::XffDepth,
        Setting::AddressHeader,
        Setting::ProtocolHeader,
        Setting::HostHeader,
        Setting::BodySizeLimit,
    ];

    /// Unprefixed variable name.
    pub fn name(self) -> &'static str {
        match self {
            Setting::Port => "PORT",
            Setting::Host => "HOST",
            Setting::SocketPath => "SOCKET_PATH",
            Setting::Origin => "ORIGIN",
            Setting::XffDepth => "XFF_DEPTH",
            Setting::AddressHeader => "ADDRESS_HEADER",
            Setting::ProtocolHeader => "PROTOCOL_HEADER",
            Setting::HostHeader => "HOST_HEADER",
            Setting::BodySizeLimit => "BODY_SIZE_LIMIT",
        }
    }

    /// Look up a setting by its unprefixed name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error raised while snapshotting the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error(
        "You should change envPrefix ({prefix}) to avoid conflicts with existing environment variables: unexpectedly saw {}",
        .variables.join(", ")
    )]
    UnexpectedVariables {
        prefix: String,
        variables: Vec<String>,
    },
}

/// Immutable view of the environment under a namespace prefix.
#[derive(Debug, Clone, Default)]
pub struct Env {
    prefix: String,
    vars: HashMap<String, String>,
}

impl Env {
    /// Snapshot the process environment.
    pub fn from_process(prefix: impl Into<String>) -> Result<Self, EnvError> {
        Self::from_os_vars(prefix, std::env::vars_os())
    }

    /// Build from raw OS variables.
    ///
    /// Every name takes part in the conflict scan. Only variables whose
    /// name and value are both valid unicode can be read afterwards.
    pub fn from_os_vars<I>(prefix: impl Into<String>, vars: I) -> Result<Self, EnvError>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let prefix = prefix.into();
        let mut names = Vec::new();
        let mut readable = HashMap::new();
        for (key, value) in vars {
            names.push(key.to_string_lossy().into_owned());
            if let (Ok(key), Ok(value)) = (key.into_string(), value.into_string()) {
                readable.insert(key, value);
            }
        }

        check_prefix(&prefix, names.iter().map(String::as_str))?;
        Ok(Self {
            prefix,
            vars: readable,
        })
    }

    /// Build from an explicit set of variables, validating the prefix.
    pub fn from_vars<I>(prefix: impl Into<String>, vars: I) -> Result<Self, EnvError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = prefix.into();
        let vars: HashMap<String, String> = vars.into_iter().collect();

        check_prefix(&prefix, vars.keys().map(String::as_str))?;
        Ok(Self { prefix, vars })
    }

    /// The namespace prefix (may be empty).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full variable name for a setting, prefix included.
    pub fn qualified(&self, setting: Setting) -> String {
        format!("{}{}", self.prefix, setting.name())
    }

    /// Value of `prefix + name`, or `fallback` when the variable is unset.
    ///
    /// An absent fallback stays absent; it is never turned into a string.
    pub fn resolve<'a>(&'a self, setting: Setting, fallback: Option<&'a str>) -> Option<&'a str> {
        self.vars
            .get(&self.qualified(setting))
            .map(String::as_str)
            .or(fallback)
    }

    /// Value of the setting if set.
    pub fn get(&self, setting: Setting) -> Option<&str> {
        self.resolve(setting, None)
    }

    /// Value of the setting, or `fallback`.
    pub fn get_or<'a>(&'a self, setting: Setting, fallback: &'a str) -> &'a str {
        self.resolve(setting, Some(fallback)).unwrap_or(fallback)
    }
}

fn check_prefix<'a>(
    prefix: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), EnvError> {
    let conflicts = find_conflicts(prefix, names);
    if conflicts.is_empty() {
        return Ok(());
    }
    Err(EnvError::UnexpectedVariables {
        prefix: prefix.to_string(),
        variables: conflicts,
    })
}

/// Names of prefixed variables whose suffix is not a recognized setting.
///
/// Returns an empty list for an empty prefix. The result is sorted.
pub fn find_conflicts<'a>(prefix: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    if prefix.is_empty() {
        return Vec::new();
    }

    let mut conflicts: Vec<String> = names
        .into_iter()
        .filter_map(|name| {
            let suffix = name.strip_prefix(prefix)?;
            Setting::from_name(suffix).is_none().then(|| name.to_string())
        })
        .collect();
    conflicts.sort();
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_without_prefix() {
        let env = Env::from_vars("", vars(&[("PORT", "4000"), ("HOST", "127.0.0.1")])).unwrap();

        assert_eq!(env.get_or(Setting::Port, "3000"), "4000");
        assert_eq!(env.get_or(Setting::Host, "0.0.0.0"), "127.0.0.1");
        assert_eq!(env.get_or(Setting::BodySizeLimit, "524288"), "524288");
    }

    #[test]
    fn test_absent_fallback_stays_absent() {
        let env = Env::from_vars("", Vec::new()).unwrap();
        assert_eq!(env.resolve(Setting::SocketPath, None), None);
        assert_eq!(env.resolve(Setting::Origin, None), None);
        assert_eq!(env.resolve(Setting::Origin, Some("x")), Some("x"));
    }

    #[test]
    fn test_set_value_wins_over_any_fallback() {
        let env = Env::from_vars("", vars(&[("ORIGIN", "https://example.com")])).unwrap();
        assert_eq!(env.resolve(Setting::Origin, None), Some("https://example.com"));
        assert_eq!(
            env.resolve(Setting::Origin, Some("https://other.test")),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_prefixed_lookup_ignores_bare_names() {
        let env = Env::from_vars(
            "MY_APP_",
            vars(&[("MY_APP_PORT", "5000"), ("HOST", "10.0.0.1")]),
        )
        .unwrap();

        assert_eq!(env.get_or(Setting::Port, "3000"), "5000");
        assert_eq!(env.get_or(Setting::Host, "0.0.0.0"), "0.0.0.0");
        assert_eq!(env.qualified(Setting::XffDepth), "MY_APP_XFF_DEPTH");
    }

    #[test]
    fn test_unexpected_prefixed_variable_is_rejected() {
        let err = Env::from_vars(
            "MY_APP_",
            vars(&[("MY_APP_UNKNOWN_SETTING", "value"), ("MY_APP_PORT", "1")]),
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("You should change envPrefix"));
        assert!(message.contains("MY_APP_UNKNOWN_SETTING"));
        assert!(message.contains("UNKNOWN_SETTING"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_values_are_still_scanned() {
        use std::os::unix::ffi::OsStringExt;

        let garbled = || OsString::from_vec(vec![0x66, 0xff, 0xfe]);

        let err = Env::from_os_vars(
            "MY_APP_",
            vec![
                (OsString::from("MY_APP_BOGUS"), garbled()),
                (OsString::from("MY_APP_PORT"), OsString::from("5000")),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            EnvError::UnexpectedVariables {
                prefix: "MY_APP_".to_string(),
                variables: vec!["MY_APP_BOGUS".to_string()],
            }
        );

        let env = Env::from_os_vars(
            "MY_APP_",
            vec![
                (OsString::from("MY_APP_ORIGIN"), garbled()),
                (OsString::from("MY_APP_PORT"), OsString::from("5000")),
            ],
        )
        .unwrap();
        assert_eq!(env.get(Setting::Origin), None);
        assert_eq!(env.get(Setting::Port), Some("5000"));
    }

    #[test]
    fn test_all_conflicts_reported() {
        let conflicts = find_conflicts("APP_", ["APP_B", "APP_PORT", "APP_A", "OTHER"]);
        assert_eq!(conflicts, vec!["APP_A".to_string(), "APP_B".to_string()]);
    }

    #[test]
    fn test_empty_prefix_skips_scan() {
        assert!(find_conflicts("", ["UNKNOWN_VAR"]).is_empty());
        assert!(Env::from_vars("", vars(&[("UNKNOWN_VAR", "value")])).is_ok());
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let env = Env::from_vars("P_", vars(&[("P_PORT", "8080")])).unwrap();
        assert_eq!(env.get(Setting::Port), env.get(Setting::Port));
        assert_eq!(env.get(Setting::Host), None);
        assert_eq!(env.get(Setting::Host), None);
    }

    #[test]
    fn test_setting_names_round_trip() {
        for setting in Setting::ALL {
            assert_eq!(Setting::from_name(setting.name()), Some(setting));
        }
        assert_eq!(Setting::from_name("UNKNOWN"), None);
    }
}
