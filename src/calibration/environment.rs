//! Environmental magnetometer calibration
//!
//! Three independent stages, each over a batch of samples:
//!   - Earth field: stationary batch, averaged in WORLD frame
//!   - Hard iron: constant sensor-frame offset (ellipsoid center)
//!   - Soft iron: linear map taking the centered ellipsoid onto a sphere
//!
//! Correction order is fixed: subtract hard iron, apply soft iron, then
//! subtract the Earth field rotated into the current sensor frame.
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::{Matrix3, Vector3};

use super::state::{CalibrationRecord, CalibrationState};
use super::stats;
use crate::config::CalibrationConfig;
use crate::error::{CalibrationStage, MagError, Result};
use crate::frame;
use crate::types::{Quaternion, SensorSample};

/// Eigenvalues at or below this are treated as a collapsed axis
const MIN_EIGENVALUE: f64 = 1e-12;

pub struct EnvironmentalCalibration {
    config: CalibrationConfig,
    state: CalibrationState,

    /// Set once the orientation-less correction has been warned about
    degraded_warned: AtomicBool,
}

impl EnvironmentalCalibration {
    pub fn new() -> Self {
        Self::build(CalibrationConfig::default(), CalibrationState::default())
    }

    pub fn with_config(config: CalibrationConfig) -> Result<Self> {
        Self::from_state(config, CalibrationState::default())
    }

    /// Resume from a previously saved state
    pub fn from_state(config: CalibrationConfig, state: CalibrationState) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, state))
    }

    pub fn from_record(config: CalibrationConfig, record: &CalibrationRecord) -> Result<Self> {
        Self::from_state(config, CalibrationState::from_record(record))
    }

    fn build(config: CalibrationConfig, state: CalibrationState) -> Self {
        Self {
            config,
            state,
            degraded_warned: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn to_record(&self) -> CalibrationRecord {
        self.state.to_record()
    }

    /// Back to identity defaults
    pub fn reset(&mut self) {
        self.state = CalibrationState::default();
        self.degraded_warned.store(false, Ordering::Relaxed);
    }

    fn require(&self, stage: CalibrationStage, required: usize, actual: usize) -> Result<()> {
        if actual < required {
            log::warn!(
                "{} calibration rejected: {} of {} samples",
                stage,
                actual,
                required
            );
            return Err(MagError::InsufficientSamples {
                stage,
                required,
                actual,
            });
        }
        Ok(())
    }

    /// Estimate the WORLD-frame Earth field from a stationary batch.
    ///
    /// Each sample is iron-corrected with the current estimates, rotated into
    /// the world frame and averaged. Quality is `1 / (1 + mean axis std)`.
    pub fn calibrate_earth_field(&mut self, samples: &[SensorSample]) -> Result<f64> {
        self.require(
            CalibrationStage::EarthField,
            self.config.min_earth_field_samples,
            samples.len(),
        )?;

        let world: Vec<Vector3<f64>> = samples
            .iter()
            .map(|s| -> Result<Vector3<f64>> {
                let r = frame::checked_rotation(&s.orientation)?;
                Ok(frame::sensor_to_world(&r, &self.correct_iron_only(&s.magnetometer)))
            })
            .collect::<Result<_>>()?;

        self.check_stationary(samples);

        let field = stats::mean(&world);
        let dispersion = stats::axis_std(&world).mean();
        let quality = 1.0 / (1.0 + dispersion);

        self.state.earth_field_world = field;
        self.state.earth_field_calibrated = true;
        self.state.quality.earth_field = quality;

        log::info!(
            "Earth field calibrated: [{:.2}, {:.2}, {:.2}] |B|={:.2} µT quality={:.3}",
            field.x,
            field.y,
            field.z,
            field.norm(),
            quality
        );
        Ok(quality)
    }

    /// Flags (without rejecting) an Earth-field batch whose accelerometer
    /// magnitude varies more than a stationary device would.
    fn check_stationary(&self, samples: &[SensorSample]) {
        let magnitudes: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.accelerometer.map(|a| a.norm()))
            .collect();
        if magnitudes.len() < 2 {
            return;
        }
        let n = magnitudes.len() as f64;
        let mean = magnitudes.iter().sum::<f64>() / n;
        let std = (magnitudes.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / n).sqrt();
        if std > self.config.stationary_accel_std_g {
            log::warn!(
                "Earth field batch does not look stationary: accel std {:.3} g > {:.3} g",
                std,
                self.config.stationary_accel_std_g
            );
        }
    }

    /// Estimate the hard-iron offset as the per-axis min/max midpoint of raw
    /// readings.
    ///
    /// Quality averages sphericity of the centered cloud with the fraction of
    /// the azimuth×elevation grid the batch covered.
    pub fn calibrate_hard_iron(&mut self, samples: &[SensorSample]) -> Result<f64> {
        self.require(
            CalibrationStage::HardIron,
            self.config.min_hard_iron_samples,
            samples.len(),
        )?;

        let raw: Vec<Vector3<f64>> = samples.iter().map(|s| s.magnetometer).collect();
        let offset = stats::bounding_box_center(&raw);
        let centered: Vec<Vector3<f64>> = raw.iter().map(|v| v - offset).collect();

        let sphericity = stats::sphericity(&centered).clamp(0.0, 1.0);
        let coverage = stats::angular_coverage(
            &centered,
            self.config.azimuth_bins,
            self.config.elevation_bins,
        );
        let quality = 0.5 * sphericity + 0.5 * coverage;

        self.state.hard_iron_offset = offset;
        self.state.hard_iron_calibrated = true;
        self.state.quality.hard_iron = quality;

        log::info!(
            "Hard iron calibrated: [{:.2}, {:.2}, {:.2}] sphericity={:.3} coverage={:.3}",
            offset.x,
            offset.y,
            offset.z,
            sphericity,
            coverage
        );
        Ok(quality)
    }

    /// Estimate the soft-iron correction `V · diag(1/√λ) · Vᵗ` from the
    /// covariance of hard-iron-centered readings.
    ///
    /// Quality is `min(λ)/max(λ)` of that raw covariance. A batch whose
    /// covariance has a collapsed axis is rejected with `DegenerateNumerics`.
    pub fn calibrate_soft_iron(&mut self, samples: &[SensorSample]) -> Result<f64> {
        self.require(
            CalibrationStage::SoftIron,
            self.config.min_soft_iron_samples,
            samples.len(),
        )?;
        if !self.state.hard_iron_calibrated {
            log::warn!("Soft iron calibrated before hard iron; using the default zero offset");
        }

        let centered: Vec<Vector3<f64>> = samples
            .iter()
            .map(|s| s.magnetometer - self.state.hard_iron_offset)
            .collect();
        let cov = stats::covariance(&centered);
        let eigen = cov.symmetric_eigen();

        let lambda_min = eigen.eigenvalues.min();
        let lambda_max = eigen.eigenvalues.max();
        if !(lambda_min > MIN_EIGENVALUE) || !lambda_max.is_finite() {
            return Err(MagError::DegenerateNumerics(format!(
                "soft iron covariance eigenvalues {:?} are not positive",
                eigen.eigenvalues.as_slice()
            )));
        }

        let inv_sqrt = Matrix3::from_diagonal(&eigen.eigenvalues.map(|l| 1.0 / l.sqrt()));
        let v = eigen.eigenvectors;
        let correction = v * inv_sqrt * v.transpose();
        let quality = lambda_min / lambda_max;

        self.state.soft_iron_matrix = correction;
        self.state.soft_iron_calibrated = true;
        self.state.quality.soft_iron = quality;

        log::info!(
            "Soft iron calibrated: eigenvalues [{:.3}, {:.3}, {:.3}] quality={:.3}",
            eigen.eigenvalues[0],
            eigen.eigenvalues[1],
            eigen.eigenvalues[2],
            quality
        );
        Ok(quality)
    }

    /// `soft_iron · (reading − hard_iron)`
    pub fn correct_iron_only(&self, magnetometer: &Vector3<f64>) -> Vector3<f64> {
        self.state.soft_iron_matrix * (magnetometer - self.state.hard_iron_offset)
    }

    /// Iron-corrected reading minus the Earth field in the current sensor frame.
    ///
    /// With an orientation the stored WORLD-frame field is rotated by `Rᵗ`
    /// before subtraction, which stays valid while the device moves. Without
    /// one the stored field is subtracted as-is; that degraded mode is only
    /// correct while the orientation matches the one at calibration.
    pub fn correct(
        &self,
        magnetometer: &Vector3<f64>,
        orientation: Option<&Quaternion>,
    ) -> Result<Vector3<f64>> {
        let iron = self.correct_iron_only(magnetometer);
        let earth_sensor = match orientation {
            Some(q) => {
                let r = frame::checked_rotation(q)?;
                frame::world_to_sensor(&r, &self.state.earth_field_world)
            }
            None => {
                // Warn once per instance, this runs at the sample rate
                if !self.degraded_warned.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "correct() without orientation: subtracting the stored Earth field, \
                         valid only while the device keeps its calibration orientation"
                    );
                }
                self.state.earth_field_world
            }
        };
        Ok(iron - earth_sensor)
    }

    /// [`correct`](Self::correct) using the sample's own orientation
    pub fn correct_sample(&self, sample: &SensorSample) -> Result<Vector3<f64>> {
        self.correct(&sample.magnetometer, Some(&sample.orientation))
    }

    /// Residuals for a batch; fails on the first unusable orientation
    pub fn correct_batch(&self, samples: &[SensorSample]) -> Result<Vec<Vector3<f64>>> {
        samples.iter().map(|s| self.correct_sample(s)).collect()
    }
}

impl Default for EnvironmentalCalibration {
    fn default() -> Self {
        Self::new()
    }
}
