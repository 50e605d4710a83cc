//! Constant-velocity Kalman filter over a 3D position stream
//!
//! State Vector (6D):
//! [0-2]: Position (x, y, z)
//! [3-5]: Velocity (vx, vy, vz)
//!
//! Uninitialized until the first measurement, which seeds the position with
//! zero velocity. Every later measurement runs predict then update.
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::config::KalmanConfig;
use crate::error::Result;
use crate::types::{
    KalmanGain6x3, MeasNoise3, MeasVec3, MeasurementMatrix3x6, StateMat6, StateVec6,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KalmanSnapshot {
    pub position: (f64, f64, f64),
    pub velocity: (f64, f64, f64),

    /// Covariance trace for uncertainty
    pub covariance_trace: f64,

    pub tracking: bool,
    pub updates: u64,
    pub skipped_updates: u64,
}

pub struct KalmanFilter {
    config: KalmanConfig,

    /// State vector [6D]
    state: StateVec6,

    /// Covariance matrix [6x6]
    covariance: StateMat6,

    /// Measurement noise R [3x3]
    measurement_noise: MeasNoise3,

    /// H selects the position block
    h: MeasurementMatrix3x6,

    tracking: bool,
    updates: u64,
    skipped_updates: u64,
}

impl KalmanFilter {
    pub fn new(config: KalmanConfig) -> Result<Self> {
        config.validate()?;

        let r = config.measurement_noise_std.powi(2);
        let mut h = MeasurementMatrix3x6::zeros();
        h.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());

        Ok(Self {
            state: StateVec6::zeros(),
            covariance: StateMat6::identity() * config.initial_covariance,
            measurement_noise: MeasNoise3::identity() * r,
            h,
            config,
            tracking: false,
            updates: 0,
            skipped_updates: 0,
        })
    }

    /// Back to uninitialized: zero state, large diagonal covariance
    pub fn reset(&mut self) {
        self.state = StateVec6::zeros();
        self.covariance = StateMat6::identity() * self.config.initial_covariance;
        self.tracking = false;
        self.updates = 0;
        self.skipped_updates = 0;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn position(&self) -> MeasVec3 {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    pub fn velocity(&self) -> MeasVec3 {
        self.state.fixed_rows::<3>(3).into_owned()
    }

    pub fn covariance(&self) -> &StateMat6 {
        &self.covariance
    }

    fn transition(dt: f64) -> StateMat6 {
        let mut f = StateMat6::identity();
        for i in 0..3 {
            f[(i, i + 3)] = dt;
        }
        f
    }

    /// Discrete white-noise acceleration model
    fn process_noise(&self, dt: f64) -> StateMat6 {
        let var = self.config.process_noise_std.powi(2);
        let q_pos = 0.25 * dt.powi(4) * var;
        let q_cross = 0.5 * dt.powi(3) * var;
        let q_vel = dt.powi(2) * var;

        let mut q = StateMat6::zeros();
        for i in 0..3 {
            q[(i, i)] = q_pos;
            q[(i, i + 3)] = q_cross;
            q[(i + 3, i)] = q_cross;
            q[(i + 3, i + 3)] = q_vel;
        }
        q
    }

    /// Propagate by `dt`: x = F·x, P = F·P·Fᵗ + Q. No-op before tracking.
    pub fn predict(&mut self, dt: f64) {
        if !self.tracking {
            return;
        }
        if !(dt > 0.0) || !dt.is_finite() {
            log::debug!("kalman predict skipped for dt={}", dt);
            return;
        }
        let f = Self::transition(dt);
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise(dt);
    }

    /// Feed one position measurement using the configured `dt`
    pub fn update(&mut self, measurement: &MeasVec3) {
        self.update_with_dt(measurement, self.config.dt);
    }

    pub fn update_with_dt(&mut self, measurement: &MeasVec3, dt: f64) {
        if !self.tracking {
            self.state = StateVec6::zeros();
            self.state.fixed_rows_mut::<3>(0).copy_from(measurement);
            self.tracking = true;
            self.updates += 1;
            return;
        }
        self.predict(dt);
        self.correct(measurement);
    }

    fn correct(&mut self, measurement: &MeasVec3) {
        let innovation = measurement - self.h * self.state;
        let ph_t = self.covariance * self.h.transpose();
        let s = self.h * ph_t + self.measurement_noise;

        // S is symmetric positive definite unless singular or poisoned by NaN
        let s_inv = s
            .cholesky()
            .map(|chol| chol.inverse())
            .filter(|inv| inv.iter().all(|v| v.is_finite()));
        let Some(s_inv) = s_inv else {
            log::debug!("innovation covariance singular, keeping predicted state");
            self.skipped_updates += 1;
            return;
        };

        let k: KalmanGain6x3 = ph_t * s_inv;
        self.state += k * innovation;

        let i_kh = StateMat6::identity() - k * self.h;
        let p = i_kh * self.covariance;
        self.covariance = (p + p.transpose()) * 0.5;
        self.updates += 1;
    }

    pub fn snapshot(&self) -> KalmanSnapshot {
        let p = self.position();
        let v = self.velocity();
        KalmanSnapshot {
            position: (p.x, p.y, p.z),
            velocity: (v.x, v.y, v.z),
            covariance_trace: self.covariance.trace(),
            tracking: self.tracking,
            updates: self.updates,
            skipped_updates: self.skipped_updates,
        }
    }
}
