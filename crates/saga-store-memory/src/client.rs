use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};
use tokio::time::timeout;
use tracing::{debug, instrument};
use transit_saga_store::{ClientOptions, DocumentSerializer, StorageClient};
use uuid::Uuid;

use crate::engine::{Container, Documents, EngineState, StoredDocument};
use crate::error::Error;

/// The engine's identity field.
pub const ID_FIELD: &str = "id";

/// A stored item together with its current ETag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document<T> {
    /// The decoded item.
    pub item: T,

    /// The ETag of the stored version.
    pub etag: String,
}

/// A connection to a [`MemoryDocumentEngine`](crate::MemoryDocumentEngine).
#[derive(Debug)]
pub struct MemoryDocumentClient {
    state: Arc<EngineState>,
    endpoint: String,
    options: ClientOptions,
    closed: Arc<AtomicBool>,
}

impl MemoryDocumentClient {
    pub(crate) fn new(state: Arc<EngineState>, endpoint: &str, options: ClientOptions) -> Self {
        Self {
            state,
            endpoint: endpoint.to_string(),
            options,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The endpoint the client is connected to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The options the client was built with.
    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Whether [`close`](StorageClient::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// A handle to the named container, created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the client was closed.
    pub fn container(&self, name: &str) -> Result<MemoryContainer, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        Ok(MemoryContainer {
            name: name.to_string(),
            documents: self.state.container(name),
            serializer: self.options.serializer.clone(),
            request_timeout: self.options.request_timeout,
            closed: self.closed.clone(),
        })
    }
}

impl StorageClient for MemoryDocumentClient {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
            debug!(endpoint = %self.endpoint, "closed client");
        }
    }
}

/// Typed document operations on one container.
///
/// Items are encoded with the client's [`DocumentSerializer`], so a saga
/// whose correlation field is not named `id` is stored under `id`. An
/// operation fails with [`Error::Timeout`] if it waits on the container longer
/// than the client's request timeout.
#[derive(Clone, Debug)]
pub struct MemoryContainer {
    name: String,
    documents: Arc<Container>,
    serializer: DocumentSerializer,
    request_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl MemoryContainer {
    /// The container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores a new item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if an item with the same id exists, or
    /// [`Error::MissingId`] if the encoded item has no string `id`.
    #[instrument(skip_all, fields(container = %self.name))]
    pub async fn create<T>(&self, item: &T) -> Result<String, Error>
    where
        T: Serialize + Sync,
    {
        let (id, body) = self.encode(item)?;

        let mut documents = self.lock_write().await?;
        if documents.contains_key(&id) {
            return Err(Error::Conflict { id });
        }

        Ok(Self::store(&mut documents, id, body))
    }

    /// Stores an item, replacing any existing version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingId`] if the encoded item has no string `id`.
    #[instrument(skip_all, fields(container = %self.name))]
    pub async fn upsert<T>(&self, item: &T) -> Result<String, Error>
    where
        T: Serialize + Sync,
    {
        let (id, body) = self.encode(item)?;

        let mut documents = self.lock_write().await?;
        Ok(Self::store(&mut documents, id, body))
    }

    /// Replaces an existing item, optionally only if its ETag still matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such item exists, or
    /// [`Error::PreconditionFailed`] if `if_match` is stale.
    #[instrument(skip_all, fields(container = %self.name))]
    pub async fn replace<T>(&self, item: &T, if_match: Option<&str>) -> Result<String, Error>
    where
        T: Serialize + Sync,
    {
        let (id, body) = self.encode(item)?;

        let mut documents = self.lock_write().await?;
        match documents.get(&id) {
            None => return Err(Error::NotFound { id }),
            Some(current) if if_match.is_some_and(|etag| etag != current.etag) => {
                return Err(Error::PreconditionFailed { id });
            }
            Some(_) => {}
        }

        Ok(Self::store(&mut documents, id, body))
    }

    /// Reads and decodes an item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the stored document does not
    /// decode as `T`.
    pub async fn read<T>(&self, id: &str) -> Result<Option<Document<T>>, Error>
    where
        T: DeserializeOwned,
    {
        let Some(stored) = self.read_stored(id).await? else {
            return Ok(None);
        };

        Ok(Some(Document {
            item: self.serializer.decode(stored.body)?,
            etag: stored.etag,
        }))
    }

    /// Reads an item exactly as stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the client was closed.
    pub async fn read_document(&self, id: &str) -> Result<Option<Value>, Error> {
        Ok(self.read_stored(id).await?.map(|stored| stored.body))
    }

    /// Deletes an item, optionally only if its ETag still matches. Returns
    /// whether an item was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] if `if_match` is stale.
    #[instrument(skip(self), fields(container = %self.name))]
    pub async fn delete(&self, id: &str, if_match: Option<&str>) -> Result<bool, Error> {
        self.ensure_open()?;

        let mut documents = self.lock_write().await?;
        let stale = match documents.get(id) {
            None => return Ok(false),
            Some(current) => if_match.is_some_and(|etag| etag != current.etag),
        };
        if stale {
            return Err(Error::PreconditionFailed { id: id.to_string() });
        }

        documents.remove(id);
        debug!("deleted document");

        Ok(true)
    }

    async fn lock_read(&self) -> Result<RwLockReadGuard<'_, Documents>, Error> {
        timeout(self.request_timeout, self.documents.read())
            .await
            .map_err(|_| Error::Timeout(self.request_timeout))
    }

    async fn lock_write(&self) -> Result<RwLockWriteGuard<'_, Documents>, Error> {
        timeout(self.request_timeout, self.documents.write())
            .await
            .map_err(|_| Error::Timeout(self.request_timeout))
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn encode<T>(&self, item: &T) -> Result<(String, Value), Error>
    where
        T: Serialize,
    {
        self.ensure_open()?;

        let body = self.serializer.encode(item)?;
        let id = body
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or(Error::MissingId)?
            .to_string();

        Ok((id, body))
    }

    async fn read_stored(&self, id: &str) -> Result<Option<StoredDocument>, Error> {
        self.ensure_open()?;

        Ok(self.lock_read().await?.get(id).cloned())
    }

    fn store(
        documents: &mut Documents,
        id: String,
        body: Value,
    ) -> String {
        let etag = format!("\"{}\"", Uuid::new_v4());
        debug!(%id, %etag, "stored document");
        documents.insert(
            id,
            StoredDocument {
                body,
                etag: etag.clone(),
            },
        );
        etag
    }
}
