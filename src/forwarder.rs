//! Pipeline lifecycle and the forwarder loop.
//!
//! A single consumer thread drains the outbound queue and writes framed
//! messages to the collector connection, reconnecting with capped
//! exponential backoff. Producers only encode and enqueue; all network
//! blocking happens on the forwarder thread.

use crate::config::{ForwarderConfig, SessionContext};
use crate::encode::WireEncoder;
use crate::net::{ConnectionManager, NetError};
use crate::queue::{EnqueueResult, OutboundQueue, WireMessage};
use crate::sensors::Sample;
use crate::status::{PipelineStats, StatsSnapshot, StatusEvent, StatusHub};
use crossbeam_channel::Receiver;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Errors starting a pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The forwarder thread could not be spawned
    Spawn(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Spawn(msg) => write!(f, "failed to start forwarder: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// A running telemetry pipeline for one session.
///
/// Producers call [`Pipeline::submit`] from any thread; a dedicated
/// forwarder thread owns the connection and drains the queue. Stopping (or
/// dropping) the pipeline closes the queue, joins the forwarder, and
/// releases the socket.
pub struct Pipeline {
    encoder: WireEncoder,
    queue: Arc<OutboundQueue>,
    stats: Arc<PipelineStats>,
    hub: StatusHub,
    status_rx: Receiver<StatusEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Start a pipeline for one session.
    pub fn start(
        session: SessionContext,
        config: ForwarderConfig,
    ) -> Result<Self, PipelineError> {
        let encoder = WireEncoder::new(&session);
        let queue = Arc::new(OutboundQueue::new(config.queue_capacity));
        let stats = Arc::new(PipelineStats::new());
        let (hub, status_rx) = StatusHub::new(stats.clone());

        let conn = ConnectionManager::new(session.server.clone(), &config, hub.clone());
        let worker_queue = queue.clone();
        let worker_stats = stats.clone();
        let worker_hub = hub.clone();

        let handle = thread::Builder::new()
            .name("telemetry-forwarder".to_string())
            .spawn(move || run_forwarder(worker_queue, conn, config, worker_stats, worker_hub))
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        info!(user = %session.user_id, server = %session.server, "pipeline started");

        Ok(Self {
            encoder,
            queue,
            stats,
            hub,
            status_rx,
            handle: Some(handle),
        })
    }

    /// Encode and enqueue one sample.
    ///
    /// Never blocks; sensor callbacks can call this at any rate. Returns
    /// `false` once the pipeline has been stopped.
    pub fn submit(&self, sample: &Sample) -> bool {
        let payload = self.encoder.encode(sample);
        match self.queue.enqueue(payload) {
            EnqueueResult::Accepted { evicted, .. } => {
                if let Some(evicted_sequence) = evicted {
                    self.hub.emit(StatusEvent::QueueOverflow { evicted_sequence });
                }
                true
            }
            EnqueueResult::Closed => false,
        }
    }

    /// Messages currently buffered.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Live counters.
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Point-in-time health view.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(&self.queue)
    }

    /// Receiver for status events (display only).
    pub fn status_events(&self) -> &Receiver<StatusEvent> {
        &self.status_rx
    }

    /// Close the queue, join the forwarder, and return final stats.
    ///
    /// Remaining messages are drained best-effort: once the queue is closed
    /// the forwarder skips retry backoff, so teardown stays bounded even
    /// with the collector down.
    pub fn stop(mut self) -> StatsSnapshot {
        self.shutdown();
        self.stats.snapshot(&self.queue)
    }

    fn shutdown(&mut self) {
        self.queue.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_forwarder(
    queue: Arc<OutboundQueue>,
    mut conn: ConnectionManager,
    config: ForwarderConfig,
    stats: Arc<PipelineStats>,
    hub: StatusHub,
) {
    debug!("forwarder loop started");
    while let Some(message) = queue.dequeue() {
        forward_one(&queue, &mut conn, &config, &stats, &hub, &message);
    }
    conn.close();
    debug!("forwarder loop stopped");
}

/// Deliver one message, retrying with backoff until it is written or the
/// retry budget is spent.
fn forward_one(
    queue: &OutboundQueue,
    conn: &mut ConnectionManager,
    config: &ForwarderConfig,
    stats: &PipelineStats,
    hub: &StatusHub,
    message: &WireMessage,
) {
    let mut attempt: u32 = 0;
    loop {
        match deliver(conn, message) {
            Ok(()) => {
                if attempt > 0 {
                    stats.record_reconnect();
                }
                stats.record_delivered();
                hub.emit(StatusEvent::Delivered {
                    sequence: message.sequence,
                });
                return;
            }
            Err(error) => {
                match &error {
                    NetError::Connect(_) => stats.record_connect_failure(),
                    NetError::Write(_) => stats.record_write_failure(),
                }

                if attempt >= config.max_retries || queue.is_closed() {
                    warn!(
                        sequence = message.sequence,
                        attempt,
                        error = %error,
                        "dropping undeliverable message"
                    );
                    stats.record_undeliverable();
                    hub.emit(StatusEvent::Undeliverable {
                        sequence: message.sequence,
                    });
                    return;
                }

                attempt += 1;
                stats.record_retry();
                let delay = backoff_delay(config, attempt);
                debug!(
                    sequence = message.sequence,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "delivery failed, backing off"
                );
                conn.mark_backoff();
                if queue.wait_close(delay) {
                    // Session teardown observed mid-backoff: give the
                    // message one last immediate attempt on the next spin.
                    continue;
                }
            }
        }
    }
}

fn deliver(conn: &mut ConnectionManager, message: &WireMessage) -> Result<(), NetError> {
    conn.ensure_connected()?;
    conn.write(&message.payload)
}

/// Exponential backoff with jitter: base doubling per attempt, clamped to
/// the cap, scaled by a random factor in [0.5, 1.5).
fn backoff_delay(config: &ForwarderConfig, attempt: u32) -> Duration {
    let base_ms = config.backoff_base.as_millis().max(1) as u64;
    let cap_ms = config.backoff_cap.as_millis().max(1) as u64;
    let exponent = attempt.saturating_sub(1).min(16);
    let raw_ms = base_ms.saturating_mul(1u64 << exponent).min(cap_ms);

    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
    let delay_ms = ((raw_ms as f64) * jitter) as u64;
    Duration::from_millis(delay_ms.clamp(1, cap_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(base_ms: u64, cap_ms: u64) -> ForwarderConfig {
        ForwarderConfig {
            backoff_base: Duration::from_millis(base_ms),
            backoff_cap: Duration::from_millis(cap_ms),
            ..ForwarderConfig::default()
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = config_with(200, 5_000);
        for attempt in 1..=10 {
            let delay = backoff_delay(&config, attempt);
            assert!(delay >= Duration::from_millis(1));
            assert!(delay <= Duration::from_millis(5_000));
        }
        // Late attempts sit at the cap (within jitter).
        let late = backoff_delay(&config, 10);
        assert!(late >= Duration::from_millis(2_500));
    }

    #[test]
    fn test_backoff_first_attempt_near_base() {
        let config = config_with(200, 5_000);
        for _ in 0..20 {
            let delay = backoff_delay(&config, 1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(300));
        }
    }

    #[test]
    fn test_backoff_handles_degenerate_config() {
        let config = config_with(0, 0);
        let delay = backoff_delay(&config, 3);
        assert!(delay >= Duration::from_millis(1));
        assert!(delay <= Duration::from_millis(2));
    }
}
