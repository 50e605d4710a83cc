//! Magnetometer calibration: hard iron, soft iron and Earth field
//!
//! Estimates live in a [`CalibrationState`] owned by one
//! [`EnvironmentalCalibration`]; [`CalibrationRecord`] is its flat persisted form.
pub mod environment;
pub mod state;
pub mod stats;

pub use environment::EnvironmentalCalibration;
pub use state::{CalibrationQuality, CalibrationRecord, CalibrationState};
