//! Batch statistics over 3-vectors used by the calibration stages.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};

pub fn mean(vectors: &[Vector3<f64>]) -> Vector3<f64> {
    if vectors.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = vectors.iter().sum();
    sum / vectors.len() as f64
}

/// Per-axis population standard deviation
pub fn axis_std(vectors: &[Vector3<f64>]) -> Vector3<f64> {
    if vectors.is_empty() {
        return Vector3::zeros();
    }
    let mu = mean(vectors);
    let var = vectors
        .iter()
        .map(|v| (v - mu).component_mul(&(v - mu)))
        .sum::<Vector3<f64>>()
        / vectors.len() as f64;
    var.map(f64::sqrt)
}

/// Midpoint of the per-axis min/max (bounding-box center)
pub fn bounding_box_center(vectors: &[Vector3<f64>]) -> Vector3<f64> {
    let Some(first) = vectors.first() else {
        return Vector3::zeros();
    };
    let (min, max) = vectors
        .iter()
        .fold((*first, *first), |(lo, hi), v| (lo.inf(v), hi.sup(v)));
    (min + max) * 0.5
}

/// Population covariance (mean-subtracted)
pub fn covariance(vectors: &[Vector3<f64>]) -> Matrix3<f64> {
    if vectors.is_empty() {
        return Matrix3::zeros();
    }
    let mu = mean(vectors);
    let sum: Matrix3<f64> = vectors
        .iter()
        .map(|v| {
            let d = v - mu;
            d * d.transpose()
        })
        .sum();
    sum / vectors.len() as f64
}

/// `1 − std(r)/mean(r)` over vector norms; 1.0 for a perfect sphere
pub fn sphericity(vectors: &[Vector3<f64>]) -> f64 {
    if vectors.is_empty() {
        return 0.0;
    }
    let n = vectors.len() as f64;
    let radii: Vec<f64> = vectors.iter().map(|v| v.norm()).collect();
    let mean_r = radii.iter().sum::<f64>() / n;
    if mean_r <= f64::EPSILON {
        return 0.0;
    }
    let var_r = radii.iter().map(|r| (r - mean_r).powi(2)).sum::<f64>() / n;
    1.0 - var_r.sqrt() / mean_r
}

/// Fraction of an azimuth×elevation grid hit by at least one direction.
///
/// Zero-length vectors carry no direction and are skipped.
pub fn angular_coverage(
    vectors: &[Vector3<f64>],
    azimuth_bins: usize,
    elevation_bins: usize,
) -> f64 {
    if azimuth_bins == 0 || elevation_bins == 0 {
        return 0.0;
    }
    let mut hit = vec![false; azimuth_bins * elevation_bins];

    for v in vectors {
        let r = v.norm();
        if r <= f64::EPSILON {
            continue;
        }
        let azimuth = v.y.atan2(v.x); // [-π, π]
        let elevation = (v.z / r).clamp(-1.0, 1.0).asin(); // [-π/2, π/2]

        let az_bin = (((azimuth + PI) / (2.0 * PI)) * azimuth_bins as f64) as usize;
        let el_bin = (((elevation + PI / 2.0) / PI) * elevation_bins as f64) as usize;
        let az_bin = az_bin.min(azimuth_bins - 1);
        let el_bin = el_bin.min(elevation_bins - 1);

        hit[el_bin * azimuth_bins + az_bin] = true;
    }

    hit.iter().filter(|&&h| h).count() as f64 / hit.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std() {
        let vs = vec![Vector3::new(1.0, 0.0, 2.0), Vector3::new(3.0, 0.0, 2.0)];
        assert_relative_eq!(mean(&vs), Vector3::new(2.0, 0.0, 2.0));
        assert_relative_eq!(axis_std(&vs), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(mean(&[]), Vector3::zeros());
        assert_eq!(bounding_box_center(&[]), Vector3::zeros());
        assert_eq!(covariance(&[]), Matrix3::zeros());
        assert_eq!(sphericity(&[]), 0.0);
        assert_eq!(angular_coverage(&[], 4, 4), 0.0);
    }

    #[test]
    fn test_bounding_box_center() {
        let vs = vec![
            Vector3::new(-1.0, 5.0, 0.0),
            Vector3::new(3.0, 1.0, -4.0),
            Vector3::new(0.0, 2.0, 8.0),
        ];
        assert_relative_eq!(bounding_box_center(&vs), Vector3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_covariance_of_axis_pairs() {
        let vs = vec![
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(-2.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        ];
        let cov = covariance(&vs);
        assert_relative_eq!(cov, Matrix3::from_diagonal(&Vector3::new(2.0, 0.5, 0.0)));
    }

    #[test]
    fn test_sphericity() {
        let sphere = vec![Vector3::x() * 5.0, Vector3::y() * 5.0, -Vector3::z() * 5.0];
        assert_relative_eq!(sphericity(&sphere), 1.0);

        let squashed = vec![Vector3::x() * 1.0, Vector3::y() * 3.0];
        assert!(sphericity(&squashed) < 0.6);
    }

    #[test]
    fn test_angular_coverage() {
        let single = vec![Vector3::x(); 10];
        assert_relative_eq!(angular_coverage(&single, 4, 2), 1.0 / 8.0);

        let axes = vec![
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(-1.0, -1.0, -1.0),
            Vector3::zeros(),
        ];
        let coverage = angular_coverage(&axes, 4, 2);
        assert!(coverage > 0.4 && coverage <= 1.0);
    }
}
