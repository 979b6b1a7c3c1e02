//! Error types for OpenOperator

use thiserror::Error;

/// Result type alias using OpenOperator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for OpenOperator
#[derive(Error, Debug)]
pub enum Error {
    /// Request was malformed or missing required parts
    #[error("Validation error: {0}")]
    Validation(String),

    /// Sandbox fleet control plane failure (provision, list, kill)
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// File or command I/O against a live sandbox failed
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Code rewrite provider failure or unusable completion
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Render a transport failure, naming the deadline when it was the cause
pub(crate) fn transport_error(context: &str, timeout_secs: u64, err: reqwest::Error) -> String {
    if err.is_timeout() {
        format!("{} timed out after {}s", context, timeout_secs)
    } else {
        format!("{}: {}", context, err)
    }
}
