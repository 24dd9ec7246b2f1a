use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by rule store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rule \"{name}\" {}", conflict_state(.override_existing))]
    Conflict { name: String, override_existing: bool },

    #[error("Cannot find rule \"{0}\"")]
    NotFound(String),

    #[error("Corrupt record at key {key}: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Store {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Store connection error: {0}")]
    Connectivity(#[from] etcd_client::Error),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

fn conflict_state(override_existing: &bool) -> &'static str {
    if *override_existing {
        "does not exist"
    } else {
        "already exists"
    }
}

impl StoreError {
    /// Whether the failure is transient and the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout { .. } | StoreError::Connectivity(_))
    }
}
