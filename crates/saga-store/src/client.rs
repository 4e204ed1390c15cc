use std::error::Error as StdError;
use std::time::Duration;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::serializer::DocumentSerializer;

/// Boxed error crossing the storage engine boundary.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Marker trait for storage engine errors.
pub trait StorageClientError: StdError + Send + Sync + 'static {}

/// A long-lived connection to a storage engine.
pub trait StorageClient: Send + Sync + 'static {
    /// Releases the connection. Called exactly once by the owning factory.
    fn close(&self);
}

/// Options a client is built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Converts saga state to and from engine documents.
    pub serializer: DocumentSerializer,

    /// Name reported to the engine for diagnostics.
    pub application_name: Option<String>,

    /// Upper bound on how long a single engine request may wait.
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            serializer: DocumentSerializer::default(),
            application_name: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Builds native clients for one storage engine.
pub trait ClientBuilder: Send + Sync + 'static {
    /// The client type built.
    type Client: StorageClient;

    /// The error type for the engine.
    type Error: StorageClientError;

    /// The engine's reserved identity field.
    const RESERVED_ID_FIELD: &'static str = "id";

    /// Builds a client connected to `endpoint` and authenticated with `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached or rejects the key.
    fn build(
        &self,
        endpoint: &str,
        key: &str,
        options: ClientOptions,
    ) -> Result<Self::Client, Self::Error>;
}
