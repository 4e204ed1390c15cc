use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Round-trip latency statistics of one run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LatencyReport {
    /// Messages delivered.
    pub message_count: usize,

    /// Wall time from the first send to the last delivery.
    pub total: Duration,

    /// Fastest delivery.
    pub min: Duration,

    /// Slowest delivery.
    pub max: Duration,

    /// Mean delivery time.
    pub mean: Duration,

    /// Median delivery time.
    pub p50: Duration,

    /// 95th percentile delivery time.
    pub p95: Duration,

    /// 99th percentile delivery time.
    pub p99: Duration,

    /// Delivered messages per second of wall time.
    pub messages_per_second: f64,
}

impl LatencyReport {
    /// Summarizes per-message latencies. Percentiles use the nearest-rank
    /// method.
    #[must_use]
    pub fn from_samples(mut samples: Vec<Duration>, total: Duration) -> Self {
        samples.sort_unstable();

        let count = samples.len();
        let sum: u128 = samples.iter().map(Duration::as_nanos).sum();
        let mean = u128::try_from(count)
            .ok()
            .and_then(|n| sum.checked_div(n))
            .map_or(Duration::ZERO, |nanos| {
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            });

        Self {
            message_count: count,
            total,
            min: samples.first().copied().unwrap_or_default(),
            max: samples.last().copied().unwrap_or_default(),
            mean,
            p50: percentile(&samples, 50),
            p95: percentile(&samples, 95),
            p99: percentile(&samples, 99),
            messages_per_second: throughput(count, total),
        }
    }
}

fn percentile(sorted: &[Duration], percent: usize) -> Duration {
    let rank = (percent * sorted.len()).div_ceil(100).max(1);
    sorted.get(rank - 1).copied().unwrap_or_default()
}

#[allow(clippy::cast_precision_loss)]
fn throughput(count: usize, total: Duration) -> f64 {
    let seconds = total.as_secs_f64();
    if seconds > 0.0 {
        count as f64 / seconds
    } else {
        0.0
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} messages in {:.3?} ({:.1} msg/s)",
            self.message_count, self.total, self.messages_per_second
        )?;
        writeln!(
            f,
            "min {:.3?}  mean {:.3?}  max {:.3?}",
            self.min, self.mean, self.max
        )?;
        write!(
            f,
            "p50 {:.3?}  p95 {:.3?}  p99 {:.3?}",
            self.p50, self.p95, self.p99
        )
    }
}
