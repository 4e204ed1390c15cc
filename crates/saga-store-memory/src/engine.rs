use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};
use transit_saga_store::{ClientBuilder, ClientOptions};

use crate::client::MemoryDocumentClient;
use crate::error::Error;

#[derive(Clone, Debug)]
pub(crate) struct StoredDocument {
    pub(crate) body: Value,
    pub(crate) etag: String,
}

pub(crate) type Documents = HashMap<String, StoredDocument>;
pub(crate) type Container = RwLock<Documents>;

#[derive(Debug)]
pub(crate) struct EngineState {
    accounts: DashMap<String, String>,
    containers: DashMap<String, Arc<Container>>,
    available: AtomicBool,
    opened: AtomicUsize,
    pub(crate) closed: AtomicUsize,
}

impl EngineState {
    pub(crate) fn container(&self, name: &str) -> Arc<Container> {
        self.containers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(container = %name, "creating container");
                Arc::default()
            })
            .clone()
    }
}

/// A document database living in process memory.
///
/// Documents are JSON objects keyed by their reserved `id` field and carry an
/// ETag that changes on every write. Clones share state.
#[derive(Clone, Debug)]
pub struct MemoryDocumentEngine {
    state: Arc<EngineState>,
}

impl Default for MemoryDocumentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentEngine {
    /// Creates an online engine with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(EngineState {
                accounts: DashMap::new(),
                containers: DashMap::new(),
                available: AtomicBool::new(true),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Registers an account reachable at `endpoint` and authenticated by `key`.
    #[must_use]
    pub fn with_account(self, endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        self.register_account(endpoint, key);
        self
    }

    /// Registers an account reachable at `endpoint` and authenticated by `key`.
    pub fn register_account(&self, endpoint: impl Into<String>, key: impl Into<String>) {
        let endpoint = endpoint.into();
        info!(%endpoint, "registered account");
        self.state.accounts.insert(endpoint, key.into());
    }

    /// Takes the engine on- or offline. Offline engines refuse new clients.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    /// Number of clients ever opened.
    #[must_use]
    pub fn connections_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Number of clients closed.
    #[must_use]
    pub fn connections_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of documents stored in `container`.
    pub async fn document_count(&self, container: &str) -> usize {
        match self.state.containers.get(container).map(|c| c.clone()) {
            Some(container) => container.read().await.len(),
            None => 0,
        }
    }

    /// A builder producing clients for this engine.
    #[must_use]
    pub fn builder(&self) -> MemoryClientBuilder {
        MemoryClientBuilder {
            engine: self.clone(),
        }
    }
}

/// Builds [`MemoryDocumentClient`]s for a [`MemoryDocumentEngine`].
#[derive(Clone, Debug)]
pub struct MemoryClientBuilder {
    engine: MemoryDocumentEngine,
}

impl ClientBuilder for MemoryClientBuilder {
    type Client = MemoryDocumentClient;
    type Error = Error;

    fn build(
        &self,
        endpoint: &str,
        key: &str,
        options: ClientOptions,
    ) -> Result<Self::Client, Self::Error> {
        let state = &self.engine.state;
        if !state.available.load(Ordering::SeqCst) {
            return Err(Error::Unreachable {
                endpoint: endpoint.to_string(),
            });
        }

        match state.accounts.get(endpoint) {
            None => {
                return Err(Error::Unreachable {
                    endpoint: endpoint.to_string(),
                });
            }
            Some(expected) if expected.value() != key => {
                return Err(Error::Unauthorized {
                    endpoint: endpoint.to_string(),
                });
            }
            Some(_) => {}
        }

        state.opened.fetch_add(1, Ordering::SeqCst);
        debug!(%endpoint, application = ?options.application_name, "opened client");

        Ok(MemoryDocumentClient::new(state.clone(), endpoint, options))
    }
}
