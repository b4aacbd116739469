//! # Configuration
//!
//! Controller and server configuration loaded from environment variables
//! (populated from a ConfigMap using `envFrom` in the deployment).
//!
//! Configuration is static for the lifetime of the process: changing it means
//! rolling the deployment, after which the first pass rewrites every Role whose
//! rule set changed.

mod controller;
mod duration;
mod error;
mod server;

pub use controller::*;
pub use duration::parse_kubernetes_duration;
pub use error::ConfigurationError;
pub use server::ServerConfig;

/// Load both configurations from the environment
pub fn load_config() -> Result<(ControllerConfig, ServerConfig), ConfigurationError> {
    Ok((ControllerConfig::from_env()?, ServerConfig::from_env()))
}

/// Read a key through `lookup` or return the default value when unset or unparsable
fn env_var_or_default<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma separated list, dropping blanks
pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
