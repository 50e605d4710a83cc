pub mod linalg;

pub use linalg::*;

use std::ops::{Index, IndexMut};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Orientation quaternion (w, x, y, z), sensor frame relative to world frame.
///
/// Stored as captured; consumers normalize on read.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Rotation of `angle_rad` about `axis` (axis need not be unit length)
    pub fn from_axis_angle(axis: &Vector3<f64>, angle_rad: f64) -> Self {
        let norm = axis.norm();
        if norm < 1e-12 {
            return Self::IDENTITY;
        }
        let half = 0.5 * angle_rad;
        let s = half.sin() / norm;
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One captured sensor reading.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorSample {
    /// Sequence index assigned by the acquisition layer
    pub index: u64,

    /// Capture time [seconds]
    pub timestamp: f64,

    /// Magnetometer reading in sensor frame [µT]
    pub magnetometer: Vector3<f64>,

    /// Accelerometer reading in sensor frame [g], when the device reports one
    pub accelerometer: Option<Vector3<f64>>,

    /// Sensor orientation relative to the world frame
    pub orientation: Quaternion,
}

impl SensorSample {
    pub fn new(
        index: u64,
        timestamp: f64,
        magnetometer: Vector3<f64>,
        orientation: Quaternion,
    ) -> Self {
        Self {
            index,
            timestamp,
            magnetometer,
            accelerometer: None,
            orientation,
        }
    }

    pub fn with_accelerometer(mut self, accel: Vector3<f64>) -> Self {
        self.accelerometer = Some(accel);
        self
    }
}

pub const FINGER_COUNT: usize = 5;

/// Tracked point identity. One magnet per finger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; FINGER_COUNT] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pose hypothesis: one 3D position [mm] per finger, relative to the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandPose {
    pub positions: [Vector3<f64>; FINGER_COUNT],
}

impl HandPose {
    pub fn new(positions: [Vector3<f64>; FINGER_COUNT]) -> Self {
        Self { positions }
    }

    pub fn zeros() -> Self {
        Self {
            positions: [Vector3::zeros(); FINGER_COUNT],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Finger, &Vector3<f64>)> {
        Finger::ALL.iter().copied().zip(self.positions.iter())
    }
}

impl Default for HandPose {
    fn default() -> Self {
        Self::zeros()
    }
}

impl Index<Finger> for HandPose {
    type Output = Vector3<f64>;

    fn index(&self, finger: Finger) -> &Vector3<f64> {
        &self.positions[finger.index()]
    }
}

impl IndexMut<Finger> for HandPose {
    fn index_mut(&mut self, finger: Finger) -> &mut Vector3<f64> {
        &mut self.positions[finger.index()]
    }
}
