//! Sensor identity and sample types.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Number of axis values carried per sample.
pub const MAX_AXES: usize = 3;

/// One sensor as reported by the capability query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Platform sensor type id
    pub id: i32,
    /// Human-readable sensor name
    pub name: String,
}

impl SensorInfo {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One sensor reading: up to three axis values and a capture timestamp.
///
/// Immutable once created. Sensors with fewer than three axes (light,
/// heart rate) leave the remaining slots at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Platform sensor type id
    pub sensor_id: i32,
    /// Sensor name as reported by the capability query
    pub sensor_name: String,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp_millis: u64,
    /// Axis values, zero-filled past the sensor's axis count
    pub axes: [f32; MAX_AXES],
}

impl Sample {
    /// Build a sample from a raw value slice.
    ///
    /// Up to the first three values are taken; missing axes are zero-filled.
    pub fn new(
        sensor_id: i32,
        sensor_name: impl Into<String>,
        timestamp_millis: u64,
        values: &[f32],
    ) -> Self {
        let mut axes = [0.0f32; MAX_AXES];
        for (axis, value) in axes.iter_mut().zip(values) {
            *axis = *value;
        }
        Self {
            sensor_id,
            sensor_name: sensor_name.into(),
            timestamp_millis,
            axes,
        }
    }

    /// Build a sample stamped with the current wall-clock time.
    pub fn now(sensor_id: i32, sensor_name: impl Into<String>, values: &[f32]) -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        Self::new(sensor_id, sensor_name, millis, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_pads_missing_axes() {
        let sample = Sample::new(21, "Heart Rate", 1_000, &[72.5]);
        assert_eq!(sample.axes, [72.5, 0.0, 0.0]);
    }

    #[test]
    fn test_sample_truncates_extra_values() {
        let sample = Sample::new(1, "Accelerometer", 1_000, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sample.axes, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sample_now_has_recent_timestamp() {
        let before = Utc::now().timestamp_millis() as u64;
        let sample = Sample::now(1, "Accelerometer", &[0.0; 3]);
        let after = Utc::now().timestamp_millis() as u64;
        assert!(sample.timestamp_millis >= before);
        assert!(sample.timestamp_millis <= after);
    }
}
