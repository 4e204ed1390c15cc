use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Parameters of a latency run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencySettings {
    /// Number of messages sent.
    pub message_count: usize,

    /// Number of concurrent senders.
    pub concurrency: usize,

    /// Size of each message body in bytes.
    pub payload_size: usize,

    /// How long to wait for the last delivery once every message is sent.
    pub receive_timeout: Duration,
}

impl Default for LatencySettings {
    fn default() -> Self {
        Self {
            message_count: 1000,
            concurrency: 1,
            payload_size: 64,
            receive_timeout: Duration::from_secs(30),
        }
    }
}

impl LatencySettings {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.message_count == 0 {
            return Err(Error::InvalidSettings(
                "message count must be positive".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidSettings(
                "concurrency must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of messages each sender sends; the first senders take the
    /// remainder.
    pub(crate) fn messages_per_sender(&self) -> Vec<usize> {
        let senders = self.concurrency.min(self.message_count);
        let base = self.message_count / senders;
        let remainder = self.message_count % senders;

        (0..senders)
            .map(|i| if i < remainder { base + 1 } else { base })
            .collect()
    }
}
