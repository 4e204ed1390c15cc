use std::time::Duration;

use thiserror::Error;
use transit_saga_store::StorageClientError;

/// Errors raised by the in-memory document engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine is offline or has no account at the endpoint.
    #[error("document engine unreachable at {endpoint}")]
    Unreachable {
        /// The requested endpoint.
        endpoint: String,
    },

    /// The account key was rejected.
    #[error("key rejected by {endpoint}")]
    Unauthorized {
        /// The requested endpoint.
        endpoint: String,
    },

    /// The client was closed.
    #[error("client closed")]
    Closed,

    /// The document has no string `id` field.
    #[error("document has no string `id` field")]
    MissingId,

    /// A document with this id already exists.
    #[error("document `{id}` already exists")]
    Conflict {
        /// The document id.
        id: String,
    },

    /// No document with this id exists.
    #[error("document `{id}` not found")]
    NotFound {
        /// The document id.
        id: String,
    },

    /// The supplied ETag does not match the stored document.
    #[error("document `{id}` was modified concurrently")]
    PreconditionFailed {
        /// The document id.
        id: String,
    },

    /// The request did not complete within the client's request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The document could not be encoded or decoded.
    #[error(transparent)]
    Serialization(#[from] transit_saga_store::Error),
}

impl StorageClientError for Error {}
