//! Error types for cfsync.
//!
//! Every failure is terminal for the current pass: nothing is retried
//! internally, the scheduler re-invokes the tool on its own cadence.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Range source unreachable: {0}")]
    SourceUnavailable(String),

    #[error("Range source rejected the request: {0}")]
    SourceRejected(String),

    #[error("Range source returned a malformed response: {0}")]
    SourceMalformed(String),

    #[error("State cache is corrupt: {0}")]
    StoreCorrupt(String),

    #[error("State cache could not be written: {0}")]
    StoreUnwritable(String),

    #[error("Firewall backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Firewall backend rejected a rule: {0}")]
    BackendRejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Permission denied: {0}")]
    Permission(String),
}
