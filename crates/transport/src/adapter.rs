use std::fmt;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::broker::{Broker, Bus, BusConfigurator, ReceiveEndpointConfigurator};
use crate::error::Error;
use crate::message::EndpointAddress;
use crate::settings::TransportSettings;

/// The send endpoint type produced by broker `B`.
pub type SendEndpointOf<B> = <<B as Broker>::Bus as Bus>::SendEndpoint;

/// Lifecycle state of a [`TransportAdapter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterState {
    /// Constructed, never started.
    Created,
    /// Building and connecting the bus.
    Starting,
    /// Bus started and target endpoint resolved.
    Running,
    /// Start failed after the bus was built; only `stop` is valid.
    Faulted,
    /// Releasing broker resources.
    Stopping,
    /// Broker resources released.
    Stopped,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Faulted => write!(f, "faulted"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Drives one broker bus through start and stop, exposing the adapter's
/// single receive endpoint as a send target once running.
///
/// Lifecycle methods take `&mut self`: one owner drives an adapter at a time.
pub struct TransportAdapter<B>
where
    B: Broker,
{
    broker: B,
    host_url: Url,
    settings: TransportSettings,
    state: AdapterState,
    bus: Option<B::Bus>,
    target_address: Option<EndpointAddress>,
    target_endpoint: Option<SendEndpointOf<B>>,
}

impl<B> TransportAdapter<B>
where
    B: Broker,
{
    /// Creates an adapter for `broker`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the host address is blank or
    /// malformed, credentials carry a blank user name, or the endpoint base
    /// name is blank.
    pub fn new(broker: B, settings: TransportSettings) -> Result<Self, Error> {
        let host_url = settings.validate()?;

        Ok(Self {
            broker,
            host_url,
            settings,
            state: AdapterState::Created,
            bus: None,
            target_address: None,
            target_endpoint: None,
        })
    }

    /// The current lifecycle state.
    pub const fn state(&self) -> AdapterState {
        self.state
    }

    /// The settings the adapter was created with.
    pub const fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// The parsed broker address.
    pub const fn host_url(&self) -> &Url {
        &self.host_url
    }

    /// The name of the adapter's receive endpoint.
    pub fn queue_name(&self) -> String {
        self.settings.endpoint.queue_name()
    }

    /// The input address captured while building the bus.
    pub const fn target_address(&self) -> Option<&EndpointAddress> {
        self.target_address.as_ref()
    }

    /// The running bus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the adapter is running.
    pub fn bus(&self) -> Result<&B::Bus, Error> {
        match (&self.state, &self.bus) {
            (AdapterState::Running, Some(bus)) => Ok(bus),
            _ => Err(Error::InvalidState {
                operation: "access the bus",
                state: self.state,
            }),
        }
    }

    /// The send endpoint targeting the adapter's receive endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the adapter is running.
    pub fn target_endpoint(&self) -> Result<SendEndpointOf<B>, Error> {
        match (&self.state, &self.target_endpoint) {
            (AdapterState::Running, Some(endpoint)) => Ok(endpoint.clone()),
            _ => Err(Error::InvalidState {
                operation: "resolve the target endpoint",
                state: self.state,
            }),
        }
    }

    /// Builds the bus, lets `configure` bind consumers to the receive
    /// endpoint, starts the bus and resolves the target endpoint.
    ///
    /// Only valid once, from [`AdapterState::Created`]. On failure the adapter
    /// is left [`AdapterState::Faulted`] and [`stop`](Self::stop) releases
    /// whatever was built. If the returned future is dropped before it
    /// completes, the adapter stays [`AdapterState::Starting`] and `stop`
    /// still releases the built bus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the adapter was already started, or
    /// a construction error if the bus cannot be built, started, or the
    /// target endpoint cannot be resolved.
    #[instrument(skip_all, fields(host = %self.host_url, queue = %self.queue_name()))]
    pub async fn start<F>(&mut self, configure: F) -> Result<(), Error>
    where
        F: FnOnce(&mut dyn ReceiveEndpointConfigurator) + Send,
    {
        if self.state != AdapterState::Created {
            return Err(Error::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        self.state = AdapterState::Starting;

        let (bus, target_address) = match self.build_bus(configure) {
            Ok(built) => built,
            Err(e) => {
                self.state = AdapterState::Faulted;
                return Err(e);
            }
        };

        let Some(target_address) = target_address else {
            self.bus = Some(bus);
            self.state = AdapterState::Faulted;
            return Err(Error::EndpointNotCreated(self.queue_name()));
        };

        // Held by the adapter before awaiting so an abandoned start stays stoppable.
        let bus = self.bus.insert(bus);
        let resolved = Self::start_bus(bus, &target_address).await;

        match resolved {
            Ok(endpoint) => {
                info!(target = %target_address, "transport started");
                self.target_endpoint = Some(endpoint);
                self.target_address = Some(target_address);
                self.state = AdapterState::Running;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "transport failed to start");
                self.state = AdapterState::Faulted;
                Err(e)
            }
        }
    }

    /// Stops the bus and releases broker resources.
    ///
    /// Stopping an adapter that never started, or was already stopped, is a
    /// no-op. A faulted adapter still releases the bus it built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stop`] if the bus reported an error while stopping;
    /// the adapter is stopped regardless.
    #[instrument(skip_all, fields(queue = %self.queue_name(), state = %self.state))]
    pub async fn stop(&mut self) -> Result<(), Error> {
        match self.state {
            AdapterState::Created | AdapterState::Stopped => {
                debug!("nothing to stop");
                return Ok(());
            }
            AdapterState::Starting
            | AdapterState::Running
            | AdapterState::Faulted
            | AdapterState::Stopping => {}
        }
        self.state = AdapterState::Stopping;
        self.target_endpoint = None;

        let result = match self.bus.take() {
            Some(bus) => bus.stop().await.map_err(|e| Error::Stop(Box::new(e))),
            None => Ok(()),
        };

        self.state = AdapterState::Stopped;
        match &result {
            Ok(()) => info!("transport stopped"),
            Err(e) => warn!(error = %e, "transport stopped with errors"),
        }

        result
    }

    fn build_bus<F>(&self, configure: F) -> Result<(B::Bus, Option<EndpointAddress>), Error>
    where
        F: FnOnce(&mut dyn ReceiveEndpointConfigurator),
    {
        let queue_name = self.queue_name();
        let host = &self.settings.host;
        let endpoint_settings = &self.settings.endpoint;

        let mut configure = Some(configure);
        let mut target_address = None;

        let bus = self
            .broker
            .create_bus(&mut |bus: &mut dyn BusConfigurator| {
                bus.host(host);
                bus.receive_endpoint(
                    &queue_name,
                    &mut |endpoint: &mut dyn ReceiveEndpointConfigurator| {
                        endpoint.set_durable(endpoint_settings.durable);
                        endpoint.set_prefetch_count(endpoint_settings.prefetch_count);

                        if endpoint_settings.concurrency_limit > 0 {
                            endpoint.set_concurrent_message_limit(
                                endpoint_settings.concurrency_limit,
                            );
                        }

                        if let Some(configure) = configure.take() {
                            configure(endpoint);
                        }

                        target_address = Some(endpoint.input_address());
                    },
                );
            })
            .map_err(|e| Error::BuildBus(Box::new(e)))?;

        debug!(target = ?target_address, "bus built");

        Ok((bus, target_address))
    }

    async fn start_bus(
        bus: &B::Bus,
        target_address: &EndpointAddress,
    ) -> Result<SendEndpointOf<B>, Error> {
        bus.start().await.map_err(|e| Error::Start(Box::new(e)))?;

        bus.send_endpoint(target_address)
            .await
            .map_err(|e| Error::ResolveEndpoint {
                address: target_address.clone(),
                source: Box::new(e),
            })
    }
}

impl<B> fmt::Debug for TransportAdapter<B>
where
    B: Broker,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("host", &self.host_url.as_str())
            .field("queue", &self.queue_name())
            .field("state", &self.state)
            .field("target_address", &self.target_address)
            .finish_non_exhaustive()
    }
}

impl<B> Drop for TransportAdapter<B>
where
    B: Broker,
{
    fn drop(&mut self) {
        if self.bus.is_some() {
            warn!(
                queue = %self.queue_name(),
                state = %self.state,
                "transport adapter dropped without stop; broker resources may leak"
            );
        }
    }
}
