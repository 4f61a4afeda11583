//! Concurrent latest-value channel store for the cycler gateway.
//!
//! Every telemetry frame replaces four channel entries; displays, loggers,
//! and analyzers read the entries or follow the update stream. The registry
//! decouples the two sides completely: writers are the 32 board receive
//! loops updating concurrently, readers either fetch the latest value for a
//! channel or subscribe to a bounded broadcast of updates.
//!
//! ## Ordering
//!
//! Each update is stamped with a process-wide monotonic sequence number and
//! an entry only ever moves forward in sequence order, so concurrent writers
//! can never resurrect a stale value. "Latest" always means the
//! highest-sequence update applied to that channel.
//!
//! ## Backpressure
//!
//! Update fan-out is a bounded broadcast ring. A subscriber that falls more
//! than the ring capacity behind observes [`Lagged`] and resumes with the
//! oldest retained update; ingestion never blocks on a slow subscriber.
//!
//! [`Lagged`]: tokio::sync::broadcast::error::RecvError::Lagged

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use cycler_wire::{ChannelId, ChannelReading};

/// Default capacity of the update broadcast ring
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// One applied registry update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    /// Process-wide monotonic sequence number of this update
    pub seq: u64,
    /// The reading that was applied
    pub reading: ChannelReading,
}

/// Concurrent latest-value store keyed by channel.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ChannelRegistry {
    /// Per-channel latest update
    entries: DashMap<ChannelId, ChannelUpdate>,
    /// Sequence source for update ordering
    seq: AtomicU64,
    /// Update fan-out ring
    events: broadcast::Sender<ChannelUpdate>,
}

impl ChannelRegistry {
    /// Create a registry with the default broadcast capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a registry with an explicit broadcast capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            entries: DashMap::new(),
            seq: AtomicU64::new(0),
            events,
        }
    }

    /// Apply one reading: stamp it, replace the channel's entry wholesale,
    /// and fan it out to subscribers. Returns the assigned sequence number.
    ///
    /// Never blocks and never awaits; safe to call from every receive loop
    /// concurrently.
    pub fn update(&self, reading: ChannelReading) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let update = ChannelUpdate { seq, reading };

        trace!(
            "registry update channel={} seq={}",
            update.reading.channel,
            seq
        );

        self.entries
            .entry(update.reading.channel)
            .and_modify(|current| {
                if current.seq < update.seq {
                    *current = update.clone();
                }
            })
            .or_insert_with(|| update.clone());

        // No receivers is fine; the ring drops the oldest entry on overflow.
        self.events.send(update).ok();
        seq
    }

    /// Latest reading for `channel`, if any frame has carried one yet
    pub fn latest(&self, channel: ChannelId) -> Option<ChannelReading> {
        self.entries.get(&channel).map(|e| e.reading.clone())
    }

    /// Latest update (reading plus sequence number) for `channel`
    pub fn latest_update(&self, channel: ChannelId) -> Option<ChannelUpdate> {
        self.entries.get(&channel).map(|e| e.clone())
    }

    /// Subscribe to the update stream from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.events.subscribe()
    }

    /// Latest readings for all channels seen so far, in channel order
    pub fn snapshot(&self) -> Vec<ChannelReading> {
        let mut readings: Vec<ChannelReading> =
            self.entries.iter().map(|e| e.reading.clone()).collect();
        readings.sort_by_key(|r| r.channel);
        readings
    }

    /// Number of channels with at least one reading
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no reading has been stored yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::broadcast::error::RecvError;

    fn reading(channel: u16, step: i32) -> ChannelReading {
        ChannelReading {
            channel: ChannelId::new(channel).unwrap(),
            timestamp: Utc::now(),
            voltage: f64::from(channel),
            current: 1.0,
            power: 2.0,
            capacity: 3.0,
            temperature: 25.0,
            step_number: step,
            cycle_number: 0,
            raw: Bytes::new(),
        }
    }

    #[test]
    fn test_update_and_latest() {
        let registry = ChannelRegistry::new();
        assert!(registry.is_empty());

        let seq = registry.update(reading(9, 1));
        assert_eq!(seq, 1);
        assert_eq!(registry.len(), 1);

        let stored = registry.latest(ChannelId::new(9).unwrap()).unwrap();
        assert_eq!(stored.step_number, 1);
        assert!((stored.voltage - 9.0).abs() < f64::EPSILON);
        assert!(registry.latest(ChannelId::new(10).unwrap()).is_none());
    }

    #[test]
    fn test_update_replaces_wholesale() {
        let registry = ChannelRegistry::new();
        registry.update(reading(5, 1));
        registry.update(reading(5, 2));

        assert_eq!(registry.len(), 1);
        let update = registry.latest_update(ChannelId::new(5).unwrap()).unwrap();
        assert_eq!(update.seq, 2);
        assert_eq!(update.reading.step_number, 2);
    }

    #[test]
    fn test_snapshot_in_channel_order() {
        let registry = ChannelRegistry::new();
        registry.update(reading(100, 0));
        registry.update(reading(3, 0));
        registry.update(reading(57, 0));

        let channels: Vec<u8> = registry
            .snapshot()
            .iter()
            .map(|r| r.channel.get())
            .collect();
        assert_eq!(channels, vec![3, 57, 100]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        let registry = Arc::new(ChannelRegistry::new());

        let mut tasks = Vec::new();
        for board in 0..32u16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                for offset in 0..4u16 {
                    registry.update(reading(board * 4 + offset + 1, 0));
                }
            }));
        }
        futures::future::join_all(tasks).await;

        assert_eq!(registry.len(), 128);
        for channel in ChannelId::all() {
            let stored = registry.latest(channel).unwrap();
            assert!((stored.voltage - f64::from(channel.get())).abs() < f64::EPSILON);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contended_channel_keeps_highest_seq() {
        let registry = Arc::new(ChannelRegistry::new());

        let mut tasks = Vec::new();
        for task in 0..8i32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let mut applied = Vec::new();
                for round in 0..50 {
                    let step = task * 1000 + round;
                    applied.push((registry.update(reading(1, step)), step));
                }
                applied
            }));
        }

        let mut applied = Vec::new();
        for task in tasks {
            applied.extend(task.await.unwrap());
        }

        let (max_seq, winning_step) = applied.iter().max_by_key(|(seq, _)| *seq).unwrap();
        let update = registry.latest_update(ChannelId::new(1).unwrap()).unwrap();
        assert_eq!(update.seq, *max_seq);
        assert_eq!(update.reading.step_number, *winning_step);
    }

    #[tokio::test]
    async fn test_subscribers_receive_updates() {
        let registry = ChannelRegistry::new();
        let mut rx = registry.subscribe();

        let seq = registry.update(reading(42, 7));
        let update = rx.recv().await.unwrap();
        assert_eq!(update.seq, seq);
        assert_eq!(update.reading.channel.get(), 42);
        assert_eq!(update.reading.step_number, 7);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let registry = ChannelRegistry::with_capacity(4);
        let mut rx = registry.subscribe();

        for step in 0..10 {
            registry.update(reading(1, step));
        }

        match rx.recv().await {
            Err(RecvError::Lagged(missed)) => assert!(missed >= 6),
            other => panic!("expected lag, got {other:?}"),
        }

        // The ring resumes at the oldest retained update.
        let update = rx.recv().await.unwrap();
        assert!(update.seq > 1);
        assert_eq!(registry.latest_update(ChannelId::new(1).unwrap()).unwrap().seq, 10);
    }
}
