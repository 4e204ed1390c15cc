use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// A message as seen by the transport: an identifier, string headers and an
/// opaque body. Message contracts are layered on top by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier assigned when the message was created.
    pub message_id: Uuid,

    /// Transport headers.
    pub headers: BTreeMap<String, String>,

    /// Serialized message body.
    pub body: Bytes,
}

impl Message {
    /// Creates a message with a fresh identifier and no headers.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a header, if present.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

/// The address of a queue on a broker.
///
/// Addresses take the form `<scheme>://<host>/<queue>`; non-durable (express)
/// queues carry a `durable=false` query flag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress(Url);

impl EndpointAddress {
    /// Builds the address of `queue` on the broker at `host`.
    ///
    /// Credentials, query and fragment of `host` are not carried over.
    #[must_use]
    pub fn new(host: &Url, queue: &str, durable: bool) -> Self {
        let mut url = host.clone();
        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.set_fragment(None);
        url.set_path(&format!("/{queue}"));
        url.set_query(if durable { None } else { Some("durable=false") });

        Self(url)
    }

    /// The queue name addressed, percent-decoded.
    #[must_use]
    pub fn queue_name(&self) -> Cow<'_, str> {
        percent_decode_str(self.0.path().trim_start_matches('/')).decode_utf8_lossy()
    }

    /// Whether the addressed queue is durable.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !self
            .0
            .query_pairs()
            .any(|(key, value)| key == "durable" && value == "false")
    }

    /// The underlying URL.
    #[must_use]
    pub const fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<EndpointAddress> for Url {
    fn from(address: EndpointAddress) -> Self {
        address.0
    }
}

/// A message delivered to a receive endpoint.
#[derive(Clone, Debug)]
pub struct ConsumeContext {
    /// The input address of the endpoint that received the message.
    pub input_address: EndpointAddress,

    /// The delivered message.
    pub message: Message,
}
