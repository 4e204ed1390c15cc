use std::fmt;

use thiserror::Error;

use crate::client::BoxError;

/// Errors raised by the saga persistence adapter.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection parameters or saga metadata are missing or blank.
    #[error("invalid saga store configuration: {0}")]
    InvalidConfiguration(String),

    /// The storage engine client could not be built.
    #[error("failed to construct storage client for {saga_type}: {source}")]
    Construction {
        /// The saga type the client was requested for.
        saga_type: &'static str,
        /// The engine error.
        #[source]
        source: BoxError,
    },

    /// The factory was disposed.
    #[error("client factory has been disposed")]
    Disposed,

    /// Renaming a field would overwrite another field of the document.
    #[error("document already contains field `{field}`")]
    FieldCollision {
        /// The conflicting field.
        field: String,
    },

    /// A document could not be converted to or from its typed form.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::Construction { .. } => ErrorKind::ConstructionFailure,
            Self::Disposed => ErrorKind::InvalidState,
            Self::FieldCollision { .. } | Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

/// Broad classification of saga store errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or blank parameters.
    InvalidConfiguration,
    /// The storage client could not be built.
    ConstructionFailure,
    /// Operation invoked out of lifecycle order.
    InvalidState,
    /// Document encode or decode failure.
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration => write!(f, "Invalid configuration"),
            Self::ConstructionFailure => write!(f, "Construction failure"),
            Self::InvalidState => write!(f, "Invalid state"),
            Self::Serialization => write!(f, "Serialization error"),
        }
    }
}
