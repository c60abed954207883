//! # Telecast Error Types
//!
//! All errors that can occur in the delivery service.
//!
//! ## Propagation Policy
//!
//! | Error                | Surfaced to                          |
//! |----------------------|--------------------------------------|
//! | `InvalidConfig`      | caller of `configure_and_start`      |
//! | `TransportFailure`   | pump log (sends), configure (setup)  |
//! | `PersistenceFailure` | supervisor log only                  |
//! | `QueueClosed`        | `enqueue` returns `false`            |
//! | `EmptyPayload`       | `enqueue` returns `false`            |
//! | `WorkerSpawn`        | caller of `configure_and_start`      |
//!
//! Producers never receive any of these: `enqueue` degrades every failure
//! to "not delivered".

use thiserror::Error;

/// Errors that can occur in the delivery service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelecastError {
    /// Endpoint configuration rejected (absent, unresolvable, or a
    /// multicast mode pointing outside 224.0.0.0/4).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket-level failure while creating a transport or sending.
    #[error("transport failure towards {destination}: {reason}")]
    TransportFailure {
        /// Destination the transport was bound to.
        destination: String,
        /// Underlying cause.
        reason: String,
    },

    /// The endpoint record could not be read or written.
    #[error("persistence failure at {path}: {reason}")]
    PersistenceFailure {
        /// File that was being accessed.
        path: String,
        /// Underlying cause.
        reason: String,
    },

    /// The delivery queue no longer accepts writes (session teardown).
    #[error("delivery queue closed")]
    QueueClosed,

    /// Zero-length payloads are never queued.
    #[error("empty payload")]
    EmptyPayload,

    /// The pump worker thread could not be started.
    #[error("failed to spawn pump worker: {0}")]
    WorkerSpawn(String),
}

impl TelecastError {
    /// Builds a [`TelecastError::TransportFailure`] from an I/O error.
    pub(crate) fn transport(destination: impl ToString, err: &std::io::Error) -> Self {
        Self::TransportFailure {
            destination: destination.to_string(),
            reason: err.to_string(),
        }
    }

    /// Builds a [`TelecastError::PersistenceFailure`] from an I/O error.
    pub(crate) fn persistence(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::PersistenceFailure {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for delivery service operations.
pub type TelecastResult<T> = Result<T, TelecastError>;
