//! Gateway throughput counters and the periodic rate reporter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared throughput counters for the whole gateway.
///
/// Incremented lock-free from the receive loops and the send path; readers
/// take [`snapshot`]s.
///
/// [`snapshot`]: GatewayStats::snapshot
#[derive(Debug, Default)]
pub struct GatewayStats {
    frames_in: AtomicU64,
    bytes_in: AtomicU64,
    frames_dropped: AtomicU64,
    readings_stored: AtomicU64,
    frames_out: AtomicU64,
    bytes_out: AtomicU64,
    reconnects: AtomicU64,
}

impl GatewayStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes arriving from a board socket
    pub fn record_read(&self, bytes: usize) {
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record one complete telemetry frame
    pub fn record_frame(&self) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame dropped by the decoder
    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one reading stored in the registry
    pub fn record_reading(&self) {
        self.readings_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one frame written to a board
    pub fn record_sent(&self, bytes: usize) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record one reconnection attempt
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            readings_stored: self.readings_stored.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the gateway counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Telemetry frames assembled
    pub frames_in: u64,
    /// Raw bytes read from board sockets
    pub bytes_in: u64,
    /// Frames dropped by the decoder
    pub frames_dropped: u64,
    /// Readings stored in the registry
    pub readings_stored: u64,
    /// Command frames written to boards
    pub frames_out: u64,
    /// Raw bytes written to boards
    pub bytes_out: u64,
    /// Reconnection attempts made
    pub reconnects: u64,
}

/// Start the periodic throughput reporter.
///
/// Logs frame rates and totals every `period` until `shutdown` is
/// cancelled. Dropped frames are reported at warn level since a healthy
/// rack drops none.
pub fn start_reporter(
    stats: Arc<GatewayStats>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; use it to seed the window.
        ticker.tick().await;

        let mut last = stats.snapshot();
        let mut last_at = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let snap = stats.snapshot();
                    let now = Instant::now();
                    let elapsed = now.duration_since(last_at).as_secs_f64();
                    if elapsed > 0.0 {
                        let in_rate = (snap.frames_in - last.frames_in) as f64 / elapsed;
                        let out_rate = (snap.frames_out - last.frames_out) as f64 / elapsed;
                        info!(
                            "throughput: {:.1} frames/s in, {:.1} frames/s out, {} readings stored, {} bytes in total",
                            in_rate, out_rate, snap.readings_stored, snap.bytes_in
                        );

                        let dropped = snap.frames_dropped - last.frames_dropped;
                        if dropped > 0 {
                            warn!("{} frames dropped in the last {:.0}s", dropped, elapsed);
                        }
                    }
                    last = snap;
                    last_at = now;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = GatewayStats::new();
        stats.record_read(800);
        stats.record_read(200);
        stats.record_frame();
        for _ in 0..4 {
            stats.record_reading();
        }
        stats.record_sent(16);
        stats.record_dropped();
        stats.record_reconnect();

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_in, 1000);
        assert_eq!(snap.frames_in, 1);
        assert_eq!(snap.readings_stored, 4);
        assert_eq!(snap.frames_out, 1);
        assert_eq!(snap.bytes_out, 16);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.reconnects, 1);
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let stats = Arc::new(GatewayStats::new());
        let shutdown = CancellationToken::new();
        let reporter = start_reporter(stats, Duration::from_millis(10), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), reporter)
            .await
            .expect("reporter should exit promptly")
            .unwrap();
    }
}
