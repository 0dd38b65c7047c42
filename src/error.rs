//! Error taxonomy for fetching and reconciling simulation state.
//!
//! None of these are fatal to the poll loop: a failed fetch is logged and the
//! affected kind keeps its previous records.

use crate::types::EntityKind;
use thiserror::Error;

/// Why a single request to the simulation server produced no usable records.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// The request never completed (connect refused, timeout, reset…).
    #[error("transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// The server answered with a non-success status.
    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The body was not JSON, or lacked the expected list/fields.
    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::Transport { endpoint, .. }
            | FetchError::Status { endpoint, .. }
            | FetchError::MalformedResponse { endpoint, .. } => endpoint,
        }
    }

    pub(crate) fn malformed(endpoint: &str, reason: impl Into<String>) -> Self {
        FetchError::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no {kind} with id '{id}' is known")]
    MissingEntity { kind: EntityKind, id: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
