//! Broker-agnostic transport contract for the message bus.
//!
//! This crate defines the seam every broker implementation plugs into
//! ([`Broker`], [`Bus`], [`SendEndpoint`], [`ReceiveEndpointConfigurator`])
//! and the [`TransportAdapter`] that drives one bus through its lifecycle:
//!
//! ```text
//! Created ──start()──► Starting ──► Running ──stop()──► Stopping ──► Stopped
//!                          │
//!                          └──(failure)──► Faulted ──stop()──► Stopped
//! ```
//!
//! Specific brokers are provided in separate crates.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod adapter;
mod broker;
mod error;
mod message;
mod settings;

pub use adapter::{AdapterState, SendEndpointOf, TransportAdapter};
pub use broker::{
    BoxError, Broker, BrokerError, Bus, BusConfigurator, HandlerError, MessageHandler,
    ReceiveEndpointConfigurator, SendEndpoint,
};
pub use error::{Error, ErrorKind};
pub use message::{ConsumeContext, EndpointAddress, Message};
pub use settings::{
    Credentials, DEFAULT_ENDPOINT_BASE_NAME, DEFAULT_PREFETCH_COUNT, EXPRESS_SUFFIX,
    EndpointSettings, HostSettings, TransportSettings, endpoint_name,
};
