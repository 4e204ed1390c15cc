use std::fmt;

use thiserror::Error;

use crate::adapter::AdapterState;
use crate::broker::BoxError;
use crate::message::EndpointAddress;

/// Errors raised by the transport adapter.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection parameters are missing or malformed.
    #[error("invalid transport configuration: {0}")]
    InvalidConfiguration(String),

    /// An operation was invoked out of lifecycle order.
    #[error("cannot {operation} while the transport is {state}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the adapter was in.
        state: AdapterState,
    },

    /// The broker rejected the bus configuration.
    #[error("failed to build bus: {0}")]
    BuildBus(#[source] BoxError),

    /// The broker built a bus without creating the requested receive endpoint.
    #[error("broker did not create receive endpoint `{0}`")]
    EndpointNotCreated(String),

    /// The bus could not connect to the broker.
    #[error("failed to start bus: {0}")]
    Start(#[source] BoxError),

    /// The send endpoint for the receive endpoint's input address could not be resolved.
    #[error("failed to resolve send endpoint {address}: {source}")]
    ResolveEndpoint {
        /// The captured input address.
        address: EndpointAddress,
        /// The broker error.
        #[source]
        source: BoxError,
    },

    /// The bus reported an error while releasing broker resources.
    #[error("failed to stop bus: {0}")]
    Stop(#[source] BoxError),
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::BuildBus(_)
            | Self::EndpointNotCreated(_)
            | Self::Start(_)
            | Self::ResolveEndpoint { .. } => ErrorKind::ConstructionFailure,
            Self::Stop(_) => ErrorKind::Shutdown,
        }
    }

    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

/// Broad classification of transport errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or blank connection parameters.
    InvalidConfiguration,
    /// The broker connection could not be established.
    ConstructionFailure,
    /// Operation invoked out of lifecycle order.
    InvalidState,
    /// Broker resources could not be released cleanly.
    Shutdown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration => write!(f, "Invalid configuration"),
            Self::ConstructionFailure => write!(f, "Construction failure"),
            Self::InvalidState => write!(f, "Invalid state"),
            Self::Shutdown => write!(f, "Shutdown error"),
        }
    }
}
