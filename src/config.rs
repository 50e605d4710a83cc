//! Tuning parameters for calibration and the two estimators.
//!
//! Every field has a default, so a JSON file only needs the values it
//! overrides.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{MagError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Minimum stationary samples for the Earth-field stage
    pub min_earth_field_samples: usize,

    /// Minimum samples (varied orientations) for the hard-iron stage
    pub min_hard_iron_samples: usize,

    /// Minimum samples for the soft-iron stage
    pub min_soft_iron_samples: usize,

    /// Azimuth bins of the hard-iron coverage grid
    pub azimuth_bins: usize,

    /// Elevation bins of the hard-iron coverage grid
    pub elevation_bins: usize,

    /// Accel magnitude std [g] above which an Earth-field batch is flagged as moving
    pub stationary_accel_std_g: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_earth_field_samples: 50,
            min_hard_iron_samples: 100,
            min_soft_iron_samples: 200,
            azimuth_bins: 12,
            elevation_bins: 6,
            stationary_accel_std_g: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    /// Default time step [s] (50 Hz)
    pub dt: f64,

    /// White-noise acceleration std driving the constant-velocity model
    pub process_noise_std: f64,

    /// Position measurement noise std
    pub measurement_noise_std: f64,

    /// Diagonal of the covariance on reset
    pub initial_covariance: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            dt: 0.02,
            process_noise_std: 50.0,
            measurement_noise_std: 1.0,
            initial_covariance: 1000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    pub num_particles: usize,

    /// Position spread [mm] around the initial pose
    pub initial_noise_std: f64,

    /// Random-walk std [mm/√s]; scaled by √dt each predict
    pub process_noise_std: f64,

    /// Resample when ESS falls below this fraction of N
    pub resample_threshold: f64,

    /// Gaussian kernel width [µT] of the dipole likelihood
    pub likelihood_sigma: f64,

    /// Fixed RNG seed for reproducible runs; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            num_particles: 500,
            initial_noise_std: 5.0,
            process_noise_std: 20.0,
            resample_threshold: 0.5,
            likelihood_sigma: 5.0,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub calibration: CalibrationConfig,
    pub kalman: KalmanConfig,
    pub particle: ParticleConfig,
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_earth_field_samples == 0
            || self.min_hard_iron_samples == 0
            || self.min_soft_iron_samples == 0
        {
            return Err(MagError::InvalidConfig(
                "calibration sample minimums must be positive".to_string(),
            ));
        }
        if self.azimuth_bins == 0 || self.elevation_bins == 0 {
            return Err(MagError::InvalidConfig(
                "coverage grid needs at least one azimuth and one elevation bin".to_string(),
            ));
        }
        if !(self.stationary_accel_std_g >= 0.0) {
            return Err(MagError::InvalidConfig(format!(
                "stationary_accel_std_g must be >= 0, got {}",
                self.stationary_accel_std_g
            )));
        }
        Ok(())
    }
}

impl KalmanConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(MagError::InvalidConfig(format!(
                "kalman dt must be positive, got {}",
                self.dt
            )));
        }
        if !(self.process_noise_std >= 0.0) || !(self.measurement_noise_std > 0.0) {
            return Err(MagError::InvalidConfig(
                "kalman noise std values must be non-negative (measurement > 0)".to_string(),
            ));
        }
        if !(self.initial_covariance > 0.0) {
            return Err(MagError::InvalidConfig(format!(
                "initial_covariance must be positive, got {}",
                self.initial_covariance
            )));
        }
        Ok(())
    }
}

impl ParticleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(MagError::InvalidConfig(
                "particle filter needs at least one particle".to_string(),
            ));
        }
        if !(self.initial_noise_std >= 0.0) || !(self.process_noise_std >= 0.0) {
            return Err(MagError::InvalidConfig(
                "particle noise std values must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.resample_threshold) {
            return Err(MagError::InvalidConfig(format!(
                "resample_threshold must be in [0, 1], got {}",
                self.resample_threshold
            )));
        }
        if !(self.likelihood_sigma > 0.0) {
            return Err(MagError::InvalidConfig(format!(
                "likelihood_sigma must be positive, got {}",
                self.likelihood_sigma
            )));
        }
        Ok(())
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;
        self.kalman.validate()?;
        self.particle.validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_json_str(&json)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::info!("Loaded tracker config from {}", path.display());
        Ok(config)
    }
}
