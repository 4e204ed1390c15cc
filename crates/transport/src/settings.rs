use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Base name of the receive endpoint when none is configured.
pub const DEFAULT_ENDPOINT_BASE_NAME: &str = "latency_consumer";

/// Suffix appended to the endpoint name for non-durable endpoints.
pub const EXPRESS_SUFFIX: &str = "_express";

/// Prefetch count used when none is configured.
pub const DEFAULT_PREFETCH_COUNT: u16 = 16;

/// Broker credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The user name.
    pub username: String,

    /// The password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Broker connection parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    /// The broker address, e.g. `activemq://broker:61616`.
    pub address: String,

    /// Credentials, if the broker requires them.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl HostSettings {
    /// Creates host settings for `address` without credentials.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Parses the broker address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the address is blank or not
    /// a valid URL, or if credentials are present with a blank user name.
    pub fn parse_address(&self) -> Result<Url, Error> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(Error::invalid_configuration("broker address is blank"));
        }

        if let Some(credentials) = &self.credentials {
            if credentials.username.trim().is_empty() {
                return Err(Error::invalid_configuration("broker user name is blank"));
            }
        }

        Url::parse(address).map_err(|e| {
            Error::invalid_configuration(format!("broker address `{address}` is invalid: {e}"))
        })
    }
}

/// Settings applied to the adapter's receive endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Base name of the receive endpoint.
    pub base_name: String,

    /// Whether the endpoint's queue survives broker restarts.
    pub durable: bool,

    /// Number of messages the broker may push ahead of acknowledgement.
    pub prefetch_count: u16,

    /// Maximum number of messages handled concurrently. Zero keeps the
    /// broker's default.
    pub concurrency_limit: usize,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            base_name: DEFAULT_ENDPOINT_BASE_NAME.to_string(),
            durable: true,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            concurrency_limit: 0,
        }
    }
}

impl EndpointSettings {
    /// The queue name of the receive endpoint.
    #[must_use]
    pub fn queue_name(&self) -> String {
        endpoint_name(&self.base_name, self.durable)
    }
}

/// Derives a queue name so durable and express consumers never share a queue.
#[must_use]
pub fn endpoint_name(base_name: &str, durable: bool) -> String {
    if durable {
        base_name.to_string()
    } else {
        format!("{base_name}{EXPRESS_SUFFIX}")
    }
}

/// Everything the transport adapter needs before start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Broker connection parameters.
    pub host: HostSettings,

    /// Receive endpoint settings.
    #[serde(default)]
    pub endpoint: EndpointSettings,
}

impl TransportSettings {
    /// Creates settings for `host` with default endpoint settings.
    #[must_use]
    pub fn new(host: HostSettings) -> Self {
        Self {
            host,
            endpoint: EndpointSettings::default(),
        }
    }

    /// Replaces the endpoint settings.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: EndpointSettings) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub(crate) fn validate(&self) -> Result<Url, Error> {
        if self.endpoint.base_name.trim().is_empty() {
            return Err(Error::invalid_configuration("endpoint base name is blank"));
        }

        self.host.parse_address()
    }
}
