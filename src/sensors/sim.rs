//! Simulated sensor source.
//!
//! Stands in for the platform sensor service so the pipeline can run
//! anywhere: a background thread synthesizes readings for the subscribed
//! sensors at a fixed delivery rate and pushes them over a bounded channel.

use crate::sensors::types::{Sample, SensorInfo};
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Android sensor type ids for the sensors a watch typically exposes.
pub const SENSOR_ACCELEROMETER: i32 = 1;
pub const SENSOR_MAGNETIC_FIELD: i32 = 2;
pub const SENSOR_GYROSCOPE: i32 = 4;
pub const SENSOR_LIGHT: i32 = 5;
pub const SENSOR_HEART_RATE: i32 = 21;

/// Channel capacity between the generator thread and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 10_000;

/// Errors from the simulated sensor service.
#[derive(Debug)]
pub enum SensorError {
    /// Subscription requested with an empty sensor selection
    NoSensorsSelected,
    /// A requested sensor id is not in the capability list
    UnknownSensor(String),
    /// The delivery rate must be at least 1 Hz
    InvalidRate(u32),
    /// The generator thread could not be spawned
    Spawn(String),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::NoSensorsSelected => write!(f, "no sensors selected"),
            SensorError::UnknownSensor(which) => write!(f, "unknown sensor: {which}"),
            SensorError::InvalidRate(hz) => write!(f, "invalid delivery rate: {hz} Hz"),
            SensorError::Spawn(msg) => write!(f, "failed to start sensor source: {msg}"),
        }
    }
}

impl std::error::Error for SensorError {}

/// Simulated capability query and subscription service.
pub struct SimulatedSensors {
    sensors: Vec<SensorInfo>,
}

impl SimulatedSensors {
    /// Create a source exposing the default smartwatch sensor set.
    pub fn new() -> Self {
        Self {
            sensors: vec![
                SensorInfo::new(SENSOR_ACCELEROMETER, "Accelerometer"),
                SensorInfo::new(SENSOR_MAGNETIC_FIELD, "Magnetic Field"),
                SensorInfo::new(SENSOR_GYROSCOPE, "Gyroscope"),
                SensorInfo::new(SENSOR_LIGHT, "Light"),
                SensorInfo::new(SENSOR_HEART_RATE, "Heart Rate"),
            ],
        }
    }

    /// Capability query: the sensors this device exposes.
    pub fn sensors(&self) -> &[SensorInfo] {
        &self.sensors
    }

    /// Resolve a comma-separated selection of sensor names or ids.
    ///
    /// `"all"` selects every available sensor. Name matching is
    /// case-insensitive and ignores spaces, so `heartrate` matches
    /// "Heart Rate".
    pub fn select(&self, selection: &str) -> Result<Vec<i32>, SensorError> {
        let mut ids = Vec::new();
        for part in selection.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part.eq_ignore_ascii_case("all") {
                return Ok(self.sensors.iter().map(|s| s.id).collect());
            }
            let found = if let Ok(id) = part.parse::<i32>() {
                self.sensors.iter().find(|s| s.id == id)
            } else {
                let wanted = normalize_selector(part);
                self.sensors
                    .iter()
                    .find(|s| normalize_selector(&s.name) == wanted)
            };
            match found {
                Some(info) => {
                    if !ids.contains(&info.id) {
                        ids.push(info.id);
                    }
                }
                None => return Err(SensorError::UnknownSensor(part.to_string())),
            }
        }
        if ids.is_empty() {
            return Err(SensorError::NoSensorsSelected);
        }
        Ok(ids)
    }

    /// Subscribe to a set of sensors at the given delivery rate.
    ///
    /// Spawns a generator thread producing one sample per subscribed sensor
    /// per period until the subscription is stopped or dropped.
    pub fn subscribe(
        &self,
        ids: &[i32],
        rate_hz: u32,
    ) -> Result<SensorSubscription, SensorError> {
        if ids.is_empty() {
            return Err(SensorError::NoSensorsSelected);
        }
        if rate_hz == 0 {
            return Err(SensorError::InvalidRate(rate_hz));
        }
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            match self.sensors.iter().find(|s| s.id == *id) {
                Some(info) => selected.push(info.clone()),
                None => return Err(SensorError::UnknownSensor(id.to_string())),
            }
        }

        let (sender, receiver) = bounded(EVENT_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let period = Duration::from_micros(1_000_000 / u64::from(rate_hz));

        let handle = thread::Builder::new()
            .name("sensor-sim".to_string())
            .spawn(move || run_generator(selected, period, sender, thread_running))
            .map_err(|e| SensorError::Spawn(e.to_string()))?;

        Ok(SensorSubscription {
            receiver,
            running,
            handle: Some(handle),
        })
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to the simulated sensor stream.
pub struct SensorSubscription {
    receiver: Receiver<Sample>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorSubscription {
    /// Get the receiver for incoming samples.
    pub fn samples(&self) -> &Receiver<Sample> {
        &self.receiver
    }

    /// Stop the generator thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Check whether the generator is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SensorSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_generator(
    sensors: Vec<SensorInfo>,
    period: Duration,
    sender: Sender<Sample>,
    running: Arc<AtomicBool>,
) {
    let mut rng = rand::thread_rng();
    let mut tick: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let phase = tick as f32 * period.as_secs_f32();
        for info in &sensors {
            let values = synth_values(info.id, phase, &mut rng);
            let sample = Sample::now(info.id, info.name.clone(), &values);
            // A consumer lagging far enough to fill the channel loses the
            // newest samples; the pipeline has its own overflow policy.
            let _ = sender.try_send(sample);
        }
        tick += 1;
        thread::sleep(period);
    }
}

/// Synthesize plausible readings for a sensor at the given phase.
fn synth_values(sensor_id: i32, phase: f32, rng: &mut impl Rng) -> Vec<f32> {
    let noise: f32 = rng.gen_range(-0.05..0.05);
    match sensor_id {
        SENSOR_ACCELEROMETER => vec![
            (phase * 2.0).sin() * 0.6 + noise,
            (phase * 2.0).cos() * 0.6 + noise,
            9.81 + noise,
        ],
        SENSOR_MAGNETIC_FIELD => vec![
            22.0 + phase.sin() * 3.0 + noise,
            -8.0 + phase.cos() * 3.0 + noise,
            41.0 + noise,
        ],
        SENSOR_GYROSCOPE => vec![
            (phase * 3.0).sin() * 0.2 + noise,
            (phase * 3.0).cos() * 0.2 + noise,
            noise,
        ],
        SENSOR_LIGHT => vec![180.0 + (phase * 0.5).sin() * 60.0 + noise * 20.0],
        SENSOR_HEART_RATE => vec![72.0 + (phase * 0.2).sin() * 6.0 + noise * 4.0],
        _ => vec![noise],
    }
}

fn normalize_selector(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase()
}
