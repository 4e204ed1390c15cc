//! Message latency harness for transit transports.
//!
//! A [`LatencyBenchmark`] starts a [`MessageLatencyTransport`] with a
//! consumer on its own receive endpoint, sends a batch of messages to that
//! endpoint and reports how long each took to arrive.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod benchmark;
mod error;
mod report;
mod settings;
mod transport;

pub use benchmark::{LatencyBenchmark, SEQUENCE_HEADER};
pub use error::Error;
pub use report::LatencyReport;
pub use settings::LatencySettings;
pub use transport::MessageLatencyTransport;
