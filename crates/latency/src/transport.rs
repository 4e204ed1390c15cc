use std::sync::Arc;

use async_trait::async_trait;
use transit_transport::{Broker, Error, MessageHandler, SendEndpoint, SendEndpointOf, TransportAdapter};

/// A transport the latency harness can drive.
#[async_trait]
pub trait MessageLatencyTransport: Send {
    /// The endpoint messages are sent through.
    type SendEndpoint: SendEndpoint;

    /// Starts the transport with `handler` consuming from its receive
    /// endpoint.
    async fn start(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), Error>;

    /// The endpoint targeting the transport's own receive endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the transport is running.
    fn target_endpoint(&self) -> Result<Self::SendEndpoint, Error>;

    /// Stops the transport.
    async fn stop(&mut self) -> Result<(), Error>;
}

#[async_trait]
impl<B> MessageLatencyTransport for TransportAdapter<B>
where
    B: Broker,
{
    type SendEndpoint = SendEndpointOf<B>;

    async fn start(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), Error> {
        Self::start(self, move |endpoint| endpoint.add_handler(handler)).await
    }

    fn target_endpoint(&self) -> Result<Self::SendEndpoint, Error> {
        Self::target_endpoint(self)
    }

    async fn stop(&mut self) -> Result<(), Error> {
        Self::stop(self).await
    }
}
