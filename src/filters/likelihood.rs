use nalgebra::Vector3;

use crate::dipole::MagnetConfig;
use crate::types::HandPose;

/// Unnormalized likelihood of a magnetic residual given a pose hypothesis
pub trait MeasurementLikelihood {
    fn likelihood(&self, pose: &HandPose, measurement: &Vector3<f64>) -> f64;
}

impl<F> MeasurementLikelihood for F
where
    F: Fn(&HandPose, &Vector3<f64>) -> f64,
{
    fn likelihood(&self, pose: &HandPose, measurement: &Vector3<f64>) -> f64 {
        self(pose, measurement)
    }
}

/// Gaussian kernel on the difference between the measured residual and the
/// summed dipole field of every finger magnet at its hypothesized position.
#[derive(Clone, Debug)]
pub struct DipoleLikelihood {
    /// Sensor position in the pose frame [mm]
    pub sensor_position: Vector3<f64>,
    pub magnets: MagnetConfig,
    /// Kernel width [µT]
    pub sigma: f64,
}

impl DipoleLikelihood {
    pub fn new(sensor_position: Vector3<f64>, magnets: MagnetConfig, sigma: f64) -> Self {
        Self {
            sensor_position,
            magnets,
            sigma,
        }
    }

    pub fn expected_field(&self, pose: &HandPose) -> Vector3<f64> {
        self.magnets.field_for_pose(&self.sensor_position, pose)
    }
}

impl MeasurementLikelihood for DipoleLikelihood {
    fn likelihood(&self, pose: &HandPose, measurement: &Vector3<f64>) -> f64 {
        let error = (measurement - self.expected_field(pose)).norm();
        (-0.5 * (error / self.sigma).powi(2)).exp()
    }
}
