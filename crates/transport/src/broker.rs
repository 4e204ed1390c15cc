use std::error::Error as StdError;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::message::{ConsumeContext, EndpointAddress, Message};
use crate::settings::HostSettings;

/// Boxed error crossing the broker boundary.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error returned by message handlers.
pub type HandlerError = BoxError;

/// Marker trait for broker errors.
pub trait BrokerError: StdError + Send + Sync + 'static {}

/// Processes messages delivered to a receive endpoint.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles one delivered message.
    async fn handle(&self, context: ConsumeContext) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(ConsumeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, context: ConsumeContext) -> Result<(), HandlerError> {
        (self)(context).await
    }
}

/// Customizes a receive endpoint while the bus is being built.
pub trait ReceiveEndpointConfigurator: Send {
    /// The queue the endpoint consumes from.
    fn queue_name(&self) -> &str;

    /// Sets whether the endpoint's queue is durable.
    fn set_durable(&mut self, durable: bool);

    /// Sets the number of messages the broker may push ahead of acknowledgement.
    fn set_prefetch_count(&mut self, prefetch_count: u16);

    /// Overrides the broker's default concurrent message limit.
    fn set_concurrent_message_limit(&mut self, limit: usize);

    /// Binds a handler to the endpoint.
    fn add_handler(&mut self, handler: Arc<dyn MessageHandler>);

    /// The address messages must be sent to in order to reach this endpoint,
    /// as currently configured.
    fn input_address(&self) -> EndpointAddress;
}

/// Configures a bus before it is built.
pub trait BusConfigurator {
    /// Applies broker connection parameters.
    fn host(&mut self, settings: &HostSettings);

    /// Declares a receive endpoint for `queue_name` and lets `configure`
    /// customize it.
    fn receive_endpoint(
        &mut self,
        queue_name: &str,
        configure: &mut dyn FnMut(&mut dyn ReceiveEndpointConfigurator),
    );
}

/// A broker client library capable of building buses.
pub trait Broker: Send + Sync + 'static {
    /// The error type for the broker.
    type Error: BrokerError;

    /// The bus built by this broker.
    type Bus: Bus<Error = Self::Error>;

    /// Builds a bus. Building performs no network I/O; connecting happens in
    /// [`Bus::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is rejected by the broker.
    fn create_bus(
        &self,
        configure: &mut dyn FnMut(&mut dyn BusConfigurator),
    ) -> Result<Self::Bus, Self::Error>;
}

/// A live broker connection.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// The error type for the bus.
    type Error: BrokerError;

    /// The send endpoint type resolved by the bus.
    type SendEndpoint: SendEndpoint<Error = Self::Error>;

    /// Connects to the broker and starts every receive endpoint. Returns once
    /// the bus reports itself started.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Stops receive endpoints and releases broker resources. Stopping a bus
    /// that is not running succeeds.
    async fn stop(&self) -> Result<(), Self::Error>;

    /// Resolves a send endpoint for `address`.
    async fn send_endpoint(
        &self,
        address: &EndpointAddress,
    ) -> Result<Self::SendEndpoint, Self::Error>;
}

/// A resolved destination messages can be sent to.
#[async_trait]
pub trait SendEndpoint: Clone + Debug + Send + Sync + 'static {
    /// The error type for the send endpoint.
    type Error: BrokerError;

    /// The destination address.
    fn address(&self) -> &EndpointAddress;

    /// Sends a message to the destination.
    async fn send(&self, message: Message) -> Result<(), Self::Error>;
}
