use thiserror::Error;
use transit_transport::BrokerError;

/// Errors raised by the in-memory broker.
#[derive(Debug, Error)]
pub enum Error {
    /// The address does not use the `memory` scheme or is not a URL.
    #[error("invalid memory broker address `{0}`")]
    InvalidAddress(String),

    /// A receive endpoint was declared before the host was configured.
    #[error("receive endpoint declared before host")]
    MissingHost,

    /// The bus credentials do not match the broker's.
    #[error("authentication failed for user {username:?}")]
    Authentication {
        /// The user name the bus presented, if any.
        username: Option<String>,
    },

    /// The bus is already running.
    #[error("bus already started")]
    AlreadyStarted,

    /// The bus is not running.
    #[error("bus not running")]
    NotRunning,
}

impl BrokerError for Error {}
