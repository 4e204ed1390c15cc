//! Measures round-trip latency through the in-memory broker.

use transit_latency::{LatencyBenchmark, LatencySettings};
use transit_transport::{EndpointSettings, HostSettings, TransportAdapter, TransportSettings};
use transit_transport_memory::MemoryBroker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let settings = TransportSettings::new(HostSettings::new("memory://localhost")).with_endpoint(
        EndpointSettings {
            durable: false,
            concurrency_limit: 8,
            ..EndpointSettings::default()
        },
    );
    let mut transport = TransportAdapter::new(MemoryBroker::new(), settings)?;

    let benchmark = LatencyBenchmark::new(LatencySettings {
        message_count: 10_000,
        concurrency: 8,
        ..LatencySettings::default()
    })?;

    let report = benchmark.run(&mut transport).await?;
    println!("{report}");

    Ok(())
}
