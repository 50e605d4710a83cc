//! Linear algebra type aliases for the estimators
//!
//! Fixed-size nalgebra types so every matrix product is dimension-checked at
//! compile time.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const KALMAN_STATE_DIM: usize = 6; // (px, py, pz, vx, vy, vz)

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_POS: usize = 3; // (x, y, z)

// ===== Kalman Position Filter Types =====
pub type StateVec6 = SVector<f64, KALMAN_STATE_DIM>;
pub type StateMat6 = SMatrix<f64, KALMAN_STATE_DIM, KALMAN_STATE_DIM>;

pub type MeasVec3 = SVector<f64, MEASURE_DIM_POS>;
pub type MeasNoise3 = SMatrix<f64, MEASURE_DIM_POS, MEASURE_DIM_POS>;

// Measurement matrix H selects the position block
pub type MeasurementMatrix3x6 = SMatrix<f64, MEASURE_DIM_POS, KALMAN_STATE_DIM>; // 3×6

// Kalman gain K
pub type KalmanGain6x3 = SMatrix<f64, KALMAN_STATE_DIM, MEASURE_DIM_POS>; // 6×3
