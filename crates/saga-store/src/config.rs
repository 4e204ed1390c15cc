use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for a single-endpoint client factory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// The storage engine endpoint.
    pub endpoint: String,

    /// The account key.
    pub key: String,

    /// Name reported to the engine. Defaults to none.
    #[serde(default)]
    pub application_name: Option<String>,

    /// Timeout for individual engine requests. Defaults to 60 seconds if not set.
    #[serde(default)]
    pub request_timeout: Option<Duration>,
}

impl FactoryConfig {
    /// Creates a config for `endpoint` authenticated with `key`.
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            application_name: None,
            request_timeout: None,
        }
    }

    /// Sets the application name.
    #[must_use]
    pub fn with_application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = Some(application_name.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    /// The effective request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::invalid_configuration("storage endpoint is blank"));
        }
        if self.key.trim().is_empty() {
            return Err(Error::invalid_configuration("storage key is blank"));
        }

        Ok(())
    }
}

impl fmt::Debug for FactoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("application_name", &self.application_name)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: FactoryConfig = serde_json::from_str(
            r#"{ "endpoint": "memory://documents", "key": "secret" }"#,
        )
        .unwrap();

        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert!(config.application_name.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_values_rejected() {
        assert!(FactoryConfig::new("", "secret").validate().is_err());
        assert!(FactoryConfig::new("memory://documents", "  ").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = FactoryConfig::new("memory://documents", "secret");

        let debug = format!("{config:?}");

        assert!(!debug.contains("secret"));
        assert!(debug.contains("memory://documents"));
    }
}
