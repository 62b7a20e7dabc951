//! Error types for the reminder core.
//!
//! Each subsystem gets its own `thiserror` enum. Nothing here is fatal to
//! the process: storage errors are isolated per task, channel errors per
//! delivery, and config errors surface once at startup.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-specific failure (connection, query, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The referenced entity does not exist.
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
}

/// Errors surfaced by external delivery channels (email, webhook).
///
/// These are always caught and logged at the dispatch boundary; they never
/// propagate to the caller of `dispatch`.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel transport rejected or failed the send.
    #[error("{channel} delivery failed: {reason}")]
    SendFailed {
        channel: &'static str,
        reason: String,
    },
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
