use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::try_join_all;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};
use transit_transport::{ConsumeContext, HandlerError, Message, MessageHandler, SendEndpoint};
use uuid::Uuid;

use crate::error::Error;
use crate::report::LatencyReport;
use crate::settings::LatencySettings;
use crate::transport::MessageLatencyTransport;

/// Header carrying the index of the message within a run.
pub const SEQUENCE_HEADER: &str = "latency-sequence";

/// Measures send-to-consume latency through a transport's own receive
/// endpoint.
#[derive(Clone, Debug)]
pub struct LatencyBenchmark {
    settings: LatencySettings,
}

impl LatencyBenchmark {
    /// Creates a benchmark.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] if the message count or
    /// concurrency is zero.
    pub fn new(settings: LatencySettings) -> Result<Self, Error> {
        settings.validate()?;

        Ok(Self { settings })
    }

    /// The benchmark settings.
    #[must_use]
    pub const fn settings(&self) -> &LatencySettings {
        &self.settings
    }

    /// Starts `transport` with a recording consumer, sends every message,
    /// waits for every delivery and stops the transport.
    ///
    /// The transport is stopped whether or not the run succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails, a send fails, or not every
    /// message arrives within the receive timeout.
    #[instrument(skip_all, fields(messages = self.settings.message_count, concurrency = self.settings.concurrency))]
    pub async fn run<T>(&self, transport: &mut T) -> Result<LatencyReport, Error>
    where
        T: MessageLatencyTransport,
    {
        let recorder = Arc::new(Recorder::new(self.settings.message_count));
        transport.start(recorder.clone()).await?;

        let measured = self.measure(&*transport, &recorder).await;
        let stopped = transport.stop().await;

        let report = measured?;
        stopped?;

        info!(
            p50 = ?report.p50,
            p99 = ?report.p99,
            throughput = report.messages_per_second,
            "latency run complete"
        );

        Ok(report)
    }

    async fn measure<T>(&self, transport: &T, recorder: &Recorder) -> Result<LatencyReport, Error>
    where
        T: MessageLatencyTransport,
    {
        let endpoint = transport.target_endpoint()?;
        let payload = Bytes::from(vec![0_u8; self.settings.payload_size]);

        let started = Instant::now();

        let mut offset = 0;
        let senders = self.settings.messages_per_sender().into_iter().map(|count| {
            let first = offset;
            offset += count;
            send_batch(&endpoint, recorder, payload.clone(), first..first + count)
        });
        try_join_all(senders).await?;

        debug!(sent = self.settings.message_count, "all messages sent");

        if tokio::time::timeout(self.settings.receive_timeout, recorder.wait())
            .await
            .is_err()
        {
            let received = recorder.received();
            warn!(received, "timed out waiting for deliveries");
            return Err(Error::Timeout {
                received,
                expected: self.settings.message_count,
            });
        }

        let total = started.elapsed();

        Ok(LatencyReport::from_samples(recorder.samples().await, total))
    }
}

async fn send_batch<E>(
    endpoint: &E,
    recorder: &Recorder,
    payload: Bytes,
    sequence: Range<usize>,
) -> Result<(), Error>
where
    E: SendEndpoint,
{
    for index in sequence {
        let message = Message::new(payload.clone()).with_header(SEQUENCE_HEADER, index.to_string());
        recorder.sending(message.message_id);

        endpoint
            .send(message)
            .await
            .map_err(|e| Error::Send(Box::new(e)))?;
    }

    Ok(())
}

struct Recorder {
    in_flight: DashMap<Uuid, Instant>,
    samples: Mutex<Vec<Duration>>,
    received: AtomicUsize,
    expected: usize,
    complete: Notify,
}

impl Recorder {
    fn new(expected: usize) -> Self {
        Self {
            in_flight: DashMap::with_capacity(expected),
            samples: Mutex::new(Vec::with_capacity(expected)),
            received: AtomicUsize::new(0),
            expected,
            complete: Notify::new(),
        }
    }

    fn sending(&self, message_id: Uuid) {
        self.in_flight.insert(message_id, Instant::now());
    }

    fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        while self.received() < self.expected {
            self.complete.notified().await;
        }
    }

    async fn samples(&self) -> Vec<Duration> {
        self.samples.lock().await.clone()
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, context: ConsumeContext) -> Result<(), HandlerError> {
        let Some((_, sent_at)) = self.in_flight.remove(&context.message.message_id) else {
            debug!(message_id = %context.message.message_id, "ignoring unknown message");
            return Ok(());
        };

        self.samples.lock().await.push(sent_at.elapsed());

        if self.received.fetch_add(1, Ordering::SeqCst) + 1 >= self.expected {
            self.complete.notify_one();
        }

        Ok(())
    }
}
