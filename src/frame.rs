//! Frame math
//!
//! Convention: `R = quaternion_to_rotation_matrix(q)` maps sensor frame into
//! world frame, `R · v_sensor = v_world`. A world-frame vector is expressed in
//! the sensor frame with `Rᵗ`. Every Earth-field subtraction goes through
//! [`world_to_sensor`]; applying `R` there instead doubles the Earth field in
//! the residual rather than cancelling it.

use nalgebra::{Matrix3, Vector3};

use crate::error::{MagError, Result};
use crate::types::Quaternion;

const MIN_QUAT_NORM: f64 = 1e-9;

/// Normalized (w, x, y, z) components, or `None` for zero-norm/non-finite input
fn unit_components(q: &Quaternion) -> Option<[f64; 4]> {
    if !q.is_finite() {
        return None;
    }
    let norm = q.norm();
    if norm < MIN_QUAT_NORM {
        return None;
    }
    Some([q.w / norm, q.x / norm, q.y / norm, q.z / norm])
}

fn rotation_from_unit(q: [f64; 4]) -> Matrix3<f64> {
    let [w, x, y, z] = q;

    let r00 = 1.0 - 2.0 * (y * y + z * z);
    let r01 = 2.0 * (x * y - w * z);
    let r02 = 2.0 * (x * z + w * y);

    let r10 = 2.0 * (x * y + w * z);
    let r11 = 1.0 - 2.0 * (x * x + z * z);
    let r12 = 2.0 * (y * z - w * x);

    let r20 = 2.0 * (x * z - w * y);
    let r21 = 2.0 * (y * z + w * x);
    let r22 = 1.0 - 2.0 * (x * x + y * y);

    Matrix3::new(r00, r01, r02, r10, r11, r12, r20, r21, r22)
}

/// Sensor-to-world rotation matrix for `q`.
///
/// The quaternion is normalized first. A zero-norm or non-finite quaternion is
/// a caller error and yields the identity.
pub fn quaternion_to_rotation_matrix(q: &Quaternion) -> Matrix3<f64> {
    match unit_components(q) {
        Some(unit) => rotation_from_unit(unit),
        None => {
            log::debug!("degenerate quaternion {:?}, using identity rotation", q);
            Matrix3::identity()
        }
    }
}

/// Like [`quaternion_to_rotation_matrix`] but rejects unusable quaternions.
pub fn checked_rotation(q: &Quaternion) -> Result<Matrix3<f64>> {
    if !q.is_finite() {
        return Err(MagError::InvalidOrientation(format!(
            "non-finite quaternion {:?}",
            q
        )));
    }
    unit_components(q)
        .map(rotation_from_unit)
        .ok_or_else(|| MagError::InvalidOrientation(format!("zero-norm quaternion {:?}", q)))
}

pub fn rotate_vector(r: &Matrix3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    r * v
}

pub fn transpose(r: &Matrix3<f64>) -> Matrix3<f64> {
    r.transpose()
}

/// `R · v_sensor`
pub fn sensor_to_world(r: &Matrix3<f64>, v_sensor: &Vector3<f64>) -> Vector3<f64> {
    rotate_vector(r, v_sensor)
}

/// `Rᵗ · v_world`
pub fn world_to_sensor(r: &Matrix3<f64>, v_world: &Vector3<f64>) -> Vector3<f64> {
    r.tr_mul(v_world)
}

/// Earth field in the NED world frame from total intensity and dip/declination
/// angles (degrees).
pub fn ned_field(magnitude: f64, inclination_deg: f64, declination_deg: f64) -> Vector3<f64> {
    let inc = inclination_deg.to_radians();
    let dec = declination_deg.to_radians();
    let horizontal = magnitude * inc.cos();
    Vector3::new(
        horizontal * dec.cos(),
        horizontal * dec.sin(),
        magnitude * inc.sin(),
    )
}
