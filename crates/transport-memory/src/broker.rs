use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use transit_transport::{Broker, BusConfigurator, Credentials, Message};

use crate::bus::{MemoryBus, MemoryBusConfigurator};
use crate::error::Error;

/// Suffix of the queue a message is moved to when a handler fails.
pub const ERROR_QUEUE_SUFFIX: &str = "_error";

/// Suffix of the queue a message is moved to when no handler is bound.
pub const SKIPPED_QUEUE_SUFFIX: &str = "_skipped";

/// The settings a receive endpoint was started with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedEndpointSettings {
    /// Whether the queue survives bus stop.
    pub durable: bool,

    /// Configured prefetch count.
    pub prefetch_count: u16,

    /// Explicit concurrency override, if one was applied.
    pub concurrency_limit: Option<usize>,
}

impl AppliedEndpointSettings {
    /// Number of messages handled at once: the override if present, else the
    /// prefetch count, else one.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency_limit
            .filter(|limit| *limit > 0)
            .unwrap_or_else(|| usize::from(self.prefetch_count).max(1))
    }
}

/// Name of the error queue paired with `queue_name`.
#[must_use]
pub fn error_queue_name(queue_name: &str) -> String {
    format!("{queue_name}{ERROR_QUEUE_SUFFIX}")
}

/// Name of the skipped queue paired with `queue_name`.
#[must_use]
pub fn skipped_queue_name(queue_name: &str) -> String {
    format!("{queue_name}{SKIPPED_QUEUE_SUFFIX}")
}

#[derive(Debug)]
pub(crate) struct Queue {
    pub(crate) name: String,
    durable: bool,
    sender: flume::Sender<Message>,
    pub(crate) receiver: flume::Receiver<Message>,
}

impl Queue {
    fn new(name: &str, durable: bool) -> Self {
        let (sender, receiver) = flume::unbounded();

        Self {
            name: name.to_string(),
            durable,
            sender,
            receiver,
        }
    }

    pub(crate) fn push(&self, message: Message) {
        // The queue owns a receiver, so the channel never disconnects.
        if let Err(e) = self.sender.send(message) {
            warn!(queue = %self.name, message_id = %e.0.message_id, "queue disconnected; message dropped");
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct BrokerState {
    pub(crate) queues: DashMap<String, Arc<Queue>>,
    pub(crate) endpoints: DashMap<String, AppliedEndpointSettings>,
    pub(crate) credentials: Option<Credentials>,
}

impl BrokerState {
    /// Returns the named queue, creating it if needed. An existing queue keeps
    /// the durability it was declared with.
    pub(crate) fn declare(&self, name: &str, durable: bool) -> Arc<Queue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(queue = %name, durable, "declaring queue");
                Arc::new(Queue::new(name, durable))
            })
            .clone()
    }

    pub(crate) fn delete(&self, name: &str) {
        if self.queues.remove(name).is_some() {
            debug!(queue = %name, "deleted queue");
        }
    }
}

/// A broker living in process memory.
///
/// Every instance owns its queues; clones share them. Durable queues outlive
/// the buses that declared them, express queues are deleted when their bus
/// stops.
#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    /// Creates a broker that accepts any bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker that only starts buses presenting `credentials`.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            state: Arc::new(BrokerState {
                credentials: Some(credentials),
                ..BrokerState::default()
            }),
        }
    }

    /// Whether the named queue currently exists.
    #[must_use]
    pub fn queue_exists(&self, name: &str) -> bool {
        self.state.queues.contains_key(name)
    }

    /// Number of messages waiting in the named queue.
    #[must_use]
    pub fn queue_depth(&self, name: &str) -> Option<usize> {
        self.state.queues.get(name).map(|queue| queue.receiver.len())
    }

    /// Whether the named queue is durable.
    #[must_use]
    pub fn is_durable(&self, name: &str) -> Option<bool> {
        self.state.queues.get(name).map(|queue| queue.durable)
    }

    /// Names of every existing queue, sorted.
    #[must_use]
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .state
            .queues
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Removes and returns every message waiting in the named queue.
    #[must_use]
    pub fn drain(&self, name: &str) -> Vec<Message> {
        self.state
            .queues
            .get(name)
            .map(|queue| queue.receiver.drain().collect())
            .unwrap_or_default()
    }

    /// The settings the most recent receive endpoint on `queue_name` was
    /// started with.
    #[must_use]
    pub fn endpoint_settings(&self, queue_name: &str) -> Option<AppliedEndpointSettings> {
        self.state
            .endpoints
            .get(queue_name)
            .map(|settings| settings.clone())
    }
}

impl Broker for MemoryBroker {
    type Error = Error;
    type Bus = MemoryBus;

    fn create_bus(
        &self,
        configure: &mut dyn FnMut(&mut dyn BusConfigurator),
    ) -> Result<Self::Bus, Self::Error> {
        let mut configurator = MemoryBusConfigurator::default();
        configure(&mut configurator);

        configurator.build(self.state.clone())
    }
}
