//! In-memory broker for the transit transport.
//!
//! Queues live in process memory and are owned by a [`MemoryBroker`]
//! instance, so independent brokers never see each other's messages. Useful
//! for tests and for measuring the overhead of the transport itself.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod broker;
mod bus;
mod error;

pub use broker::{
    AppliedEndpointSettings, ERROR_QUEUE_SUFFIX, MemoryBroker, SKIPPED_QUEUE_SUFFIX,
    error_queue_name, skipped_queue_name,
};
pub use bus::{
    MEMORY_SCHEME, MemoryBus, MemoryBusConfigurator, MemoryEndpointConfigurator,
    MemorySendEndpoint,
};
pub use error::Error;
