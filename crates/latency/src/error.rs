use thiserror::Error;
use transit_transport::BoxError;

/// Errors raised while measuring latency.
#[derive(Debug, Error)]
pub enum Error {
    /// The benchmark settings are unusable.
    #[error("invalid latency settings: {0}")]
    InvalidSettings(String),

    /// The transport failed to start, resolve its endpoint, or stop.
    #[error(transparent)]
    Transport(#[from] transit_transport::Error),

    /// A message could not be sent.
    #[error("failed to send message: {0}")]
    Send(#[source] BoxError),

    /// Not every message was delivered in time.
    #[error("received {received} of {expected} messages before timing out")]
    Timeout {
        /// Messages delivered.
        received: usize,
        /// Messages sent.
        expected: usize,
    },
}
