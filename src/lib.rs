//! Watch Telemetry Agent - streams smartwatch sensor readings to a collector.
//!
//! This library takes asynchronous, bursty, multi-sensor readings and
//! forwards them to a remote collector over a single persistent TCP
//! connection, with newline-framed messages, drop-oldest back-pressure,
//! and bounded reconnect-with-backoff on failure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Watch Telemetry Agent                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌────────┐   ┌─────────┐   ┌──────────┐   ┌───────────┐    │
//! │  │ Sensor │──▶│ Encoder │──▶│ Outbound │──▶│ Forwarder │    │
//! │  │ stream │   │ (lines) │   │  queue   │   │   loop    │    │
//! │  └────────┘   └─────────┘   └──────────┘   └───────────┘    │
//! │   many producers,  total,      bounded FIFO,   one thread,  │
//! │   never block      pure        drop-oldest     owns socket  │
//! └─────────────────────────────────────────────────────────────┘
//!                                                    │
//!                                                    ▼
//!                                      newline-framed TCP ▶ collector
//! ```
//!
//! Producers only encode and enqueue; every blocking operation (dialing,
//! writing, backoff sleeps) happens on the single forwarder thread, which
//! guarantees strict write ordering on the connection.
//!
//! # Example
//!
//! ```no_run
//! use watch_telemetry_agent::{
//!     ForwarderConfig, Pipeline, Sample, ServerAddress, SessionContext,
//! };
//!
//! let session = SessionContext::new("u1", ServerAddress::new("192.168.1.20", 12345));
//! let pipeline = Pipeline::start(session, ForwarderConfig::default())
//!     .expect("failed to start pipeline");
//!
//! let sample = Sample::now(1, "Accelerometer", &[0.1, 0.2, 9.8]);
//! pipeline.submit(&sample);
//!
//! let final_stats = pipeline.stop();
//! println!("{}", final_stats.summary());
//! ```

pub mod config;
pub mod encode;
pub mod forwarder;
pub mod net;
pub mod queue;
pub mod sensors;
pub mod status;

// Re-export key types at crate root for convenience
pub use config::{
    Config, ConfigError, ForwarderConfig, ServerAddress, SessionContext, DEFAULT_PORT, SOURCE_TAG,
};
pub use encode::WireEncoder;
pub use forwarder::{Pipeline, PipelineError};
pub use net::{ConnectionManager, ConnectionState, NetError};
pub use queue::{EnqueueResult, OutboundQueue, WireMessage};
pub use sensors::{
    Sample, SensorError, SensorInfo, SensorSubscription, SimulatedSensors, MAX_AXES,
};
pub use status::{PipelineStats, StatsSnapshot, StatusEvent, StatusHub};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
