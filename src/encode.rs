//! Wire encoding for outbound telemetry.
//!
//! Each sample becomes one newline-terminated UTF-8 line:
//!
//! ```text
//! source,userId,sensorName,timestampMillis,x,y,z
//! ```
//!
//! Encoding is total: it cannot fail for any sample, and the same
//! (sample, session) pair always yields byte-identical output.

use crate::config::SessionContext;
use crate::sensors::Sample;
use std::fmt::Write as _;

/// Encodes samples into wire lines for one session.
#[derive(Debug, Clone)]
pub struct WireEncoder {
    source: String,
    user_id: String,
}

impl WireEncoder {
    /// Capture the session fields every line carries.
    ///
    /// The source tag and user id are made delimiter-safe up front so the
    /// per-sample path never has to revisit them.
    pub fn new(session: &SessionContext) -> Self {
        Self {
            source: delimiter_safe(&session.source_tag),
            user_id: delimiter_safe(&session.user_id),
        }
    }

    /// Encode one sample as a newline-terminated wire line.
    pub fn encode(&self, sample: &Sample) -> Vec<u8> {
        let mut line = String::with_capacity(64);
        line.push_str(&self.source);
        line.push(',');
        line.push_str(&self.user_id);
        line.push(',');
        line.push_str(&delimiter_safe(&sample.sensor_name));
        let _ = write!(line, ",{}", sample.timestamp_millis);
        for axis in sample.axes {
            line.push(',');
            write_axis(&mut line, axis);
        }
        line.push('\n');
        line.into_bytes()
    }
}

/// Replace whitespace and commas with underscores so a field cannot break
/// the comma/newline framing.
fn delimiter_safe(field: &str) -> String {
    field
        .chars()
        .map(|c| if c.is_whitespace() || c == ',' { '_' } else { c })
        .collect()
}

/// Render one axis value deterministically.
///
/// Whole numbers keep a single decimal place (`1.0`); everything else uses
/// the shortest decimal form that round-trips (`0.1`, `0.25`).
fn write_axis(out: &mut String, value: f32) {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e7 {
        let _ = write!(out, "{value:.1}");
    } else {
        let _ = write!(out, "{value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerAddress;

    fn session(user: &str) -> SessionContext {
        SessionContext::new(user, ServerAddress::new("127.0.0.1", 12345))
    }

    fn encode_str(encoder: &WireEncoder, sample: &Sample) -> String {
        String::from_utf8(encoder.encode(sample)).expect("utf-8 line")
    }

    #[test]
    fn test_encodes_accelerometer_line() {
        let encoder = WireEncoder::new(&session("u1"));
        let sample = Sample::new(1, "Accelerometer", 1234, &[1.0, 2.0, 3.0]);
        assert_eq!(
            encode_str(&encoder, &sample),
            "smartwatch,u1,Accelerometer,1234,1.0,2.0,3.0\n"
        );
    }

    #[test]
    fn test_encodes_fractional_axes() {
        let encoder = WireEncoder::new(&session("u1"));
        let sample = Sample::new(4, "Gyroscope", 5678, &[0.1, 0.2, 0.3]);
        assert_eq!(
            encode_str(&encoder, &sample),
            "smartwatch,u1,Gyroscope,5678,0.1,0.2,0.3\n"
        );
    }

    #[test]
    fn test_single_axis_sensor_pads_zeroes() {
        let encoder = WireEncoder::new(&session("u1"));
        let sample = Sample::new(21, "Heart Rate", 99, &[72.5]);
        assert_eq!(
            encode_str(&encoder, &sample),
            "smartwatch,u1,Heart_Rate,99,72.5,0.0,0.0\n"
        );
    }

    #[test]
    fn test_normalizes_unsafe_fields() {
        let encoder = WireEncoder::new(&session("user one,two"));
        let sample = Sample::new(2, "Magnetic Field\nUncal", 1, &[0.0; 3]);
        let line = encode_str(&encoder, &sample);
        assert!(line.starts_with("smartwatch,user_one_two,Magnetic_Field_Uncal,"));
        // Exactly one newline: the terminator.
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = WireEncoder::new(&session("u1"));
        let sample = Sample::new(1, "Accelerometer", 42, &[0.25, -1.5, 9.81]);
        assert_eq!(encoder.encode(&sample), encoder.encode(&sample));
    }

    #[test]
    fn test_non_finite_axes_stay_single_field() {
        let encoder = WireEncoder::new(&session("u1"));
        let sample = Sample::new(1, "Accelerometer", 7, &[f32::NAN, f32::INFINITY, -0.0]);
        let line = encode_str(&encoder, &sample);
        // Field count is stable regardless of axis values.
        assert_eq!(line.trim_end().split(',').count(), 7);
    }
}
