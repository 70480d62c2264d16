//! Pipeline observability: counters, snapshots, and status events.
//!
//! Everything here is display-only. Counters are cheap atomics, and status
//! events go through a lossy bounded channel so observation never blocks or
//! alters the pipeline.

use crate::net::ConnectionState;
use crate::queue::OutboundQueue;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Capacity of the status-event channel; events past it are discarded.
const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Observable pipeline events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The connection manager changed state
    ConnectionChanged(ConnectionState),
    /// A message was written to the collector
    Delivered { sequence: u64 },
    /// The queue was full and evicted its oldest message
    QueueOverflow { evicted_sequence: u64 },
    /// Delivery retries were exhausted and the message was dropped
    Undeliverable { sequence: u64 },
}

/// Lossy fan-out for status events; emitting never blocks.
#[derive(Debug, Clone)]
pub struct StatusHub {
    tx: Sender<StatusEvent>,
    stats: Arc<PipelineStats>,
}

impl StatusHub {
    /// Create a hub and the receiver observers drain.
    pub fn new(stats: Arc<PipelineStats>) -> (Self, Receiver<StatusEvent>) {
        let (tx, rx) = bounded(STATUS_CHANNEL_CAPACITY);
        (Self { tx, stats }, rx)
    }

    /// Emit an event, dropping it if no observer keeps up.
    pub fn emit(&self, event: StatusEvent) {
        let _ = self.tx.try_send(event);
    }

    /// Record a connection-state transition: gauge plus event.
    pub(crate) fn connection_changed(&self, state: ConnectionState) {
        self.stats.set_connection_state(state);
        self.emit(StatusEvent::ConnectionChanged(state));
    }
}

/// Atomic counters shared across pipeline threads.
#[derive(Debug)]
pub struct PipelineStats {
    delivered: AtomicU64,
    retries: AtomicU64,
    undeliverable: AtomicU64,
    connect_failures: AtomicU64,
    write_failures: AtomicU64,
    reconnects: AtomicU64,
    connection_state: AtomicU8,
    session_start: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            undeliverable: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            connection_state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            session_start: Utc::now(),
        }
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undeliverable(&self) {
        self.undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Connection state as last reported by the connection manager.
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection_state.load(Ordering::Relaxed))
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn undeliverable_count(&self) -> u64 {
        self.undeliverable.load(Ordering::Relaxed)
    }

    /// Point-in-time view combining counters with queue gauges.
    pub fn snapshot(&self, queue: &OutboundQueue) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            undeliverable: self.undeliverable.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connection_state: self.connection_state(),
            queue_depth: queue.depth(),
            enqueued: queue.enqueued_count(),
            queue_dropped: queue.dropped_count(),
            dequeued: queue.dequeued_count(),
            session_start: self.session_start,
            uptime_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of pipeline health.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub retries: u64,
    pub undeliverable: u64,
    pub connect_failures: u64,
    pub write_failures: u64,
    pub reconnects: u64,
    pub connection_state: ConnectionState,
    pub queue_depth: usize,
    pub enqueued: u64,
    pub queue_dropped: u64,
    pub dequeued: u64,
    pub session_start: DateTime<Utc>,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Human-readable summary for display.
    pub fn summary(&self) -> String {
        format!(
            "Session Statistics:\n\
             - Samples enqueued: {}\n\
             - Delivered to collector: {}\n\
             - Dropped (queue overflow): {}\n\
             - Dropped (retries exhausted): {}\n\
             - Delivery retries: {}\n\
             - Connect failures: {} | Write failures: {} | Reconnects: {}\n\
             - Connection state: {}\n\
             - Queue depth: {}\n\
             - Session duration: {} seconds",
            self.enqueued,
            self.delivered,
            self.queue_dropped,
            self.undeliverable,
            self.retries,
            self.connect_failures,
            self.write_failures,
            self.reconnects,
            self.connection_state,
            self.queue_depth,
            self.uptime_secs
        )
    }
}
