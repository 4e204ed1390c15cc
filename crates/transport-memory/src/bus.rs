use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use transit_transport::{
    Bus, BusConfigurator, ConsumeContext, Credentials, DEFAULT_PREFETCH_COUNT, EndpointAddress,
    HostSettings, Message, MessageHandler, ReceiveEndpointConfigurator, SendEndpoint,
};
use url::Url;

use crate::broker::{
    AppliedEndpointSettings, BrokerState, Queue, error_queue_name, skipped_queue_name,
};
use crate::error::Error;

/// URL scheme served by the in-memory broker.
pub const MEMORY_SCHEME: &str = "memory";

/// Collects host and receive endpoint declarations for a [`MemoryBus`].
#[derive(Default)]
pub struct MemoryBusConfigurator {
    host: Option<Url>,
    credentials: Option<Credentials>,
    endpoints: Vec<EndpointDefinition>,
    error: Option<Error>,
}

impl MemoryBusConfigurator {
    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub(crate) fn build(self, state: Arc<BrokerState>) -> Result<MemoryBus, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let host = self.host.ok_or(Error::MissingHost)?;

        debug!(%host, endpoints = self.endpoints.len(), "built memory bus");

        Ok(MemoryBus {
            state,
            host,
            credentials: self.credentials,
            endpoints: self.endpoints,
            running: Mutex::new(None),
        })
    }
}

impl BusConfigurator for MemoryBusConfigurator {
    fn host(&mut self, settings: &HostSettings) {
        match Url::parse(settings.address.trim()) {
            Ok(url) if url.scheme() == MEMORY_SCHEME => {
                self.host = Some(url);
                self.credentials.clone_from(&settings.credentials);
            }
            _ => self.fail(Error::InvalidAddress(settings.address.clone())),
        }
    }

    fn receive_endpoint(
        &mut self,
        queue_name: &str,
        configure: &mut dyn FnMut(&mut dyn ReceiveEndpointConfigurator),
    ) {
        let Some(host) = self.host.clone() else {
            self.fail(Error::MissingHost);
            return;
        };

        let mut endpoint = MemoryEndpointConfigurator::new(host, queue_name);
        configure(&mut endpoint);
        self.endpoints.push(endpoint.into_definition());
    }
}

/// Configures one receive endpoint of a [`MemoryBus`].
pub struct MemoryEndpointConfigurator {
    host: Url,
    queue_name: String,
    settings: AppliedEndpointSettings,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl MemoryEndpointConfigurator {
    fn new(host: Url, queue_name: &str) -> Self {
        Self {
            host,
            queue_name: queue_name.to_string(),
            settings: AppliedEndpointSettings {
                durable: true,
                prefetch_count: DEFAULT_PREFETCH_COUNT,
                concurrency_limit: None,
            },
            handlers: Vec::new(),
        }
    }

    fn into_definition(self) -> EndpointDefinition {
        EndpointDefinition {
            input_address: self.input_address(),
            queue_name: self.queue_name,
            settings: self.settings,
            handlers: self.handlers,
        }
    }
}

impl ReceiveEndpointConfigurator for MemoryEndpointConfigurator {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn set_durable(&mut self, durable: bool) {
        self.settings.durable = durable;
    }

    fn set_prefetch_count(&mut self, prefetch_count: u16) {
        self.settings.prefetch_count = prefetch_count;
    }

    fn set_concurrent_message_limit(&mut self, limit: usize) {
        self.settings.concurrency_limit = Some(limit);
    }

    fn add_handler(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handlers.push(handler);
    }

    fn input_address(&self) -> EndpointAddress {
        EndpointAddress::new(&self.host, &self.queue_name, self.settings.durable)
    }
}

struct EndpointDefinition {
    input_address: EndpointAddress,
    queue_name: String,
    settings: AppliedEndpointSettings,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

struct RunningBus {
    token: CancellationToken,
    tracker: TaskTracker,
}

/// A bus connected to a [`MemoryBroker`](crate::MemoryBroker).
pub struct MemoryBus {
    state: Arc<BrokerState>,
    host: Url,
    credentials: Option<Credentials>,
    endpoints: Vec<EndpointDefinition>,
    running: Mutex<Option<RunningBus>>,
}

impl MemoryBus {
    /// Input addresses of the bus's receive endpoints.
    pub fn input_addresses(&self) -> impl Iterator<Item = &EndpointAddress> {
        self.endpoints.iter().map(|endpoint| &endpoint.input_address)
    }

    fn authenticate(&self) -> Result<(), Error> {
        match (&self.state.credentials, &self.credentials) {
            (None, _) => Ok(()),
            (Some(required), Some(presented)) if required == presented => Ok(()),
            (Some(_), presented) => Err(Error::Authentication {
                username: presented.as_ref().map(|c| c.username.clone()),
            }),
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    type Error = Error;
    type SendEndpoint = MemorySendEndpoint;

    #[instrument(skip(self), fields(host = %self.host))]
    async fn start(&self) -> Result<(), Self::Error> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyStarted);
        }

        self.authenticate()?;

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        for endpoint in &self.endpoints {
            let queue = self
                .state
                .declare(&endpoint.queue_name, endpoint.settings.durable);
            self.state
                .endpoints
                .insert(endpoint.queue_name.clone(), endpoint.settings.clone());

            let concurrency = endpoint
                .settings
                .effective_concurrency()
                .min(Semaphore::MAX_PERMITS);
            debug!(queue = %endpoint.queue_name, concurrency, "starting receive endpoint");

            let consumer = Consumer {
                state: self.state.clone(),
                queue,
                input_address: endpoint.input_address.clone(),
                handlers: Arc::new(endpoint.handlers.clone()),
                permits: Arc::new(Semaphore::new(concurrency)),
                tracker: tracker.clone(),
            };
            tracker.spawn(consumer.run(token.clone()));
        }

        *running = Some(RunningBus { token, tracker });
        info!(endpoints = self.endpoints.len(), "memory bus started");

        Ok(())
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn stop(&self) -> Result<(), Self::Error> {
        let Some(running) = self.running.lock().await.take() else {
            debug!("memory bus not running");
            return Ok(());
        };

        running.token.cancel();
        running.tracker.close();
        running.tracker.wait().await;

        for endpoint in self.endpoints.iter().filter(|e| !e.settings.durable) {
            self.state.delete(&endpoint.queue_name);
        }

        info!("memory bus stopped");

        Ok(())
    }

    async fn send_endpoint(
        &self,
        address: &EndpointAddress,
    ) -> Result<Self::SendEndpoint, Self::Error> {
        if address.as_url().scheme() != MEMORY_SCHEME || address.queue_name().is_empty() {
            return Err(Error::InvalidAddress(address.to_string()));
        }

        let running = self.running.lock().await;
        let Some(running) = running.as_ref() else {
            return Err(Error::NotRunning);
        };

        Ok(MemorySendEndpoint {
            address: address.clone(),
            state: self.state.clone(),
            token: running.token.clone(),
        })
    }
}

/// Sends messages to a queue of a [`MemoryBroker`](crate::MemoryBroker).
///
/// The queue is declared on first send. Sending fails once the bus that
/// resolved the endpoint has stopped.
#[derive(Clone, Debug)]
pub struct MemorySendEndpoint {
    address: EndpointAddress,
    state: Arc<BrokerState>,
    token: CancellationToken,
}

#[async_trait]
impl SendEndpoint for MemorySendEndpoint {
    type Error = Error;

    fn address(&self) -> &EndpointAddress {
        &self.address
    }

    async fn send(&self, message: Message) -> Result<(), Self::Error> {
        if self.token.is_cancelled() {
            return Err(Error::NotRunning);
        }

        let queue = self
            .state
            .declare(&self.address.queue_name(), self.address.is_durable());
        queue.push(message);

        Ok(())
    }
}

#[derive(Clone)]
struct Consumer {
    state: Arc<BrokerState>,
    queue: Arc<Queue>,
    input_address: EndpointAddress,
    handlers: Arc<Vec<Arc<dyn MessageHandler>>>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl Consumer {
    async fn run(self, token: CancellationToken) {
        loop {
            let permit = tokio::select! {
                biased;
                () = token.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let message = tokio::select! {
                biased;
                () = token.cancelled() => break,
                message = self.queue.receiver.recv_async() => match message {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            let consumer = self.clone();
            self.tracker.spawn(async move {
                consumer.dispatch(message).await;
                drop(permit);
            });
        }

        debug!(queue = %self.queue.name, "consumer stopped");
    }

    async fn dispatch(&self, message: Message) {
        if self.handlers.is_empty() {
            debug!(queue = %self.queue.name, message_id = %message.message_id, "no handler bound; skipping message");
            self.state
                .declare(&skipped_queue_name(&self.queue.name), true)
                .push(message);
            return;
        }

        for handler in self.handlers.iter() {
            let context = ConsumeContext {
                input_address: self.input_address.clone(),
                message: message.clone(),
            };

            if let Err(e) = handler.handle(context).await {
                warn!(
                    queue = %self.queue.name,
                    message_id = %message.message_id,
                    error = %e,
                    "handler failed; moving message to error queue"
                );
                self.state
                    .declare(&error_queue_name(&self.queue.name), true)
                    .push(message);
                return;
            }
        }
    }
}
