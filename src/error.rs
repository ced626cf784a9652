//! Error types for the faultline crate itself
//!
//! These cover failures of the pipeline's own plumbing (transport, store,
//! export, recovery, configuration). Captured application failures are
//! modeled separately as [`crate::manager::ManagedError`].

use thiserror::Error;

/// Top-level error type, aggregating every subsystem's failures
#[derive(Debug, Error)]
pub enum FaultlineError {
    /// Remote endpoint failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local report store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Log export failure
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Recovery failure
    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures talking to the remote reporting endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint answered with a non-success status
    #[error("endpoint rejected the request with status {status}")]
    Rejected { status: u16 },

    /// The endpoint could not be reached at all
    #[error("endpoint unreachable: {0}")]
    Unavailable(String),
}

/// Failures of the durable report store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored payload could not be (de)serialized
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures serializing the log buffer
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize logs: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the recovery engine
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No recovery action succeeded for the error
    #[error("recovery failed: {action}")]
    Unrecovered { action: String },

    /// Recovery succeeded, but not through the fallback action
    #[error("recovered via '{action}', not the fallback action")]
    NotViaFallback { action: String },
}

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type alias for crate-level operations
pub type Result<T> = std::result::Result<T, FaultlineError>;
