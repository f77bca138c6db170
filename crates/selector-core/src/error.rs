//! Error types for the selector

use thiserror::Error;

/// Selector error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// No server is available for selection
    #[error("No available service")]
    NoAvailableService,

    /// The configured selection mode cannot be served
    #[error("Unsupported selection mode: {0}")]
    UnsupportedMode(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server key is not of the form `network@host:port`
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// Connection establishment to the selected server failed
    #[error("Failed to dial {address}: {reason}")]
    DialFailure { address: String, reason: String },

    /// The registry could not be read
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),
}

/// Result alias used throughout the selector crates
pub type Result<T> = std::result::Result<T, SelectorError>;
