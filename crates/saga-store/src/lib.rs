//! Saga persistence adapter contract.
//!
//! A [`SagaClientFactory`] hands out one long-lived storage client per saga
//! type. When the storage engine reserves an identity field whose name
//! differs from the saga's correlation field, the client is built with a
//! [`DocumentSerializer`] that aliases one to the other, so saga state can be
//! stored without changing the domain model.
//!
//! Specific storage engines are provided in separate crates.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod config;
mod correlation;
mod error;
mod factory;
mod saga;
mod serializer;

pub use client::{BoxError, ClientBuilder, ClientOptions, StorageClient, StorageClientError};
pub use config::{DEFAULT_REQUEST_TIMEOUT, FactoryConfig};
pub use correlation::{CorrelationField, CorrelationResolver};
pub use error::{Error, ErrorKind};
pub use factory::{SagaClientFactory, SingleEndpointClientFactory};
pub use saga::Saga;
pub use serializer::{DocumentSerializer, FieldRename};
