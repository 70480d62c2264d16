//! Sensor types and the simulated sensor source.
//!
//! Real deployments get samples pushed from the platform sensor service;
//! the simulated source here implements the same capability-query and
//! subscription interface so the pipeline can be exercised anywhere.

pub mod sim;
pub mod types;

pub use sim::{
    SensorError, SensorSubscription, SimulatedSensors, SENSOR_ACCELEROMETER,
    SENSOR_GYROSCOPE, SENSOR_HEART_RATE, SENSOR_LIGHT, SENSOR_MAGNETIC_FIELD,
};
pub use types::{Sample, SensorInfo, MAX_AXES};
