//! # Configuration Errors

use thiserror::Error;

/// Missing or invalid configuration
///
/// Always fatal at startup: the controller refuses to run rather than
/// reconciling with a partial rule set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("required configuration {0} is not set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("read verbs [{}] are not contained in the full verb set", .0.join(", "))]
    ReadVerbsNotSubset(Vec<String>),
}
