//! Magnetometer calibration and state estimation for finger-mounted magnets.
//!
//! Raw samples go through [`calibration::EnvironmentalCalibration`] to remove
//! hard iron, soft iron and the Earth field. The residual then feeds either
//! [`filters::KalmanFilter`] (single point) or [`filters::ParticleFilter`]
//! (whole-hand pose, scored with the [`dipole`] forward model).
//!
//! Everything here is synchronous and owned by one caller; share an
//! estimator across threads only behind your own lock.

pub mod calibration;
pub mod config;
pub mod dipole;
pub mod error;
pub mod filters;
pub mod frame;
pub mod types;

pub use calibration::{CalibrationRecord, CalibrationState, EnvironmentalCalibration};
pub use config::TrackerConfig;
pub use dipole::{DipoleSource, MagnetConfig};
pub use error::{CalibrationStage, MagError, Result};
pub use filters::{DipoleLikelihood, KalmanFilter, MeasurementLikelihood, ParticleFilter};
pub use types::{Finger, HandPose, Quaternion, SensorSample};
