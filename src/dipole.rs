//! Point-dipole forward model
//!
//! B = k · (3(m·r̂)r̂ − m) / |r|³
//!
//! Positions are in millimetres and converted to metres internally. Moments
//! are in A·m², and `k = μ0/4π` is expressed in µT·m³/(A·m²) so the output
//! shares units with the calibrated magnetometer residual.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::types::{Finger, HandPose, FINGER_COUNT};

/// μ0/4π [T·m/A] scaled to µT
pub const DIPOLE_CONSTANT: f64 = 1e-7 * 1e6;

/// Closer than this the point-dipole model is meaningless
pub const MIN_DISTANCE_MM: f64 = 1.0;

const MM_PER_M: f64 = 1000.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DipoleSource {
    /// Magnet position [mm]
    pub position: Vector3<f64>,

    /// Magnetic moment [A·m²]
    pub moment: Vector3<f64>,
}

impl DipoleSource {
    pub fn new(position: Vector3<f64>, moment: Vector3<f64>) -> Self {
        Self { position, moment }
    }
}

/// Field of `source` at `sensor_pos` [mm]. Zero inside `MIN_DISTANCE_MM`.
pub fn field_at(sensor_pos: &Vector3<f64>, source: &DipoleSource) -> Vector3<f64> {
    let r_mm = sensor_pos - source.position;
    let dist_mm = r_mm.norm();
    if !(dist_mm >= MIN_DISTANCE_MM) {
        return Vector3::zeros();
    }

    let r = r_mm / MM_PER_M;
    let dist = dist_mm / MM_PER_M;
    let r_hat = r / dist;
    let m = &source.moment;

    (r_hat * (3.0 * m.dot(&r_hat)) - m) * (DIPOLE_CONSTANT / dist.powi(3))
}

/// Superposition of every source at one sensor position
pub fn field_from_sources(sensor_pos: &Vector3<f64>, sources: &[DipoleSource]) -> Vector3<f64> {
    sources.iter().map(|s| field_at(sensor_pos, s)).sum()
}

/// Magnet moment carried by each finger; zero for fingers without a magnet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MagnetConfig {
    pub moments: [Vector3<f64>; FINGER_COUNT],
}

impl MagnetConfig {
    pub fn new(moments: [Vector3<f64>; FINGER_COUNT]) -> Self {
        Self { moments }
    }

    pub fn none() -> Self {
        Self {
            moments: [Vector3::zeros(); FINGER_COUNT],
        }
    }

    pub fn with_magnet(mut self, finger: Finger, moment: Vector3<f64>) -> Self {
        self.moments[finger.index()] = moment;
        self
    }

    pub fn moment(&self, finger: Finger) -> &Vector3<f64> {
        &self.moments[finger.index()]
    }

    /// Dipole sources at the pose's finger positions (magnet-carrying fingers only)
    pub fn sources_for(&self, pose: &HandPose) -> Vec<DipoleSource> {
        Finger::ALL
            .iter()
            .filter(|f| self.moment(**f).norm_squared() > 0.0)
            .map(|&f| DipoleSource::new(pose[f], *self.moment(f)))
            .collect()
    }

    /// Total magnet field at `sensor_pos` for a pose
    pub fn field_for_pose(&self, sensor_pos: &Vector3<f64>, pose: &HandPose) -> Vector3<f64> {
        Finger::ALL
            .iter()
            .map(|&f| field_at(sensor_pos, &DipoleSource::new(pose[f], *self.moment(f))))
            .sum()
    }
}

impl Default for MagnetConfig {
    fn default() -> Self {
        Self::none()
    }
}
