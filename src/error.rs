//! Error types for beacon-dns.

use thiserror::Error;

/// Errors that can occur while enumerating interfaces or supervising the helper.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (pipes, configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The OS interface table could not be read.
    #[error("failed to query network interfaces: {0}")]
    InterfaceQuery(String),

    /// Interface not found.
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    /// The helper executable is not present in any resource root.
    #[error("binary not found: {0}")]
    HelperNotFound(String),

    /// The OS refused to create the helper process.
    #[error("failed to start: {0}")]
    Spawn(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The supervisor task has shut down and no longer accepts commands.
    #[error("supervisor is no longer running")]
    SupervisorClosed,
}

/// Result type alias for beacon-dns operations.
pub type Result<T> = std::result::Result<T, Error>;
