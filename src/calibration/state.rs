use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Confidence scores reported by each calibration stage (0 when not run)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationQuality {
    pub earth_field: f64,
    pub hard_iron: f64,
    pub soft_iron: f64,
}

/// Hard iron, soft iron and Earth field estimates.
///
/// Starts at identity (zero offset, identity matrix, zero field). Each
/// calibration stage replaces only its own slice.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationState {
    /// Sensor-frame offset subtracted first [µT]
    pub hard_iron_offset: Vector3<f64>,

    /// Linear correction applied after the offset
    pub soft_iron_matrix: Matrix3<f64>,

    /// Earth field in WORLD frame, in iron-corrected units
    pub earth_field_world: Vector3<f64>,

    pub hard_iron_calibrated: bool,
    pub soft_iron_calibrated: bool,
    pub earth_field_calibrated: bool,

    pub quality: CalibrationQuality,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            hard_iron_offset: Vector3::zeros(),
            soft_iron_matrix: Matrix3::identity(),
            earth_field_world: Vector3::zeros(),
            hard_iron_calibrated: false,
            soft_iron_calibrated: false,
            earth_field_calibrated: false,
            quality: CalibrationQuality::default(),
        }
    }
}

impl CalibrationState {
    pub fn earth_field_magnitude(&self) -> f64 {
        self.earth_field_world.norm()
    }

    pub fn is_fully_calibrated(&self) -> bool {
        self.hard_iron_calibrated && self.soft_iron_calibrated && self.earth_field_calibrated
    }

    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            hard_iron_offset: [
                self.hard_iron_offset.x,
                self.hard_iron_offset.y,
                self.hard_iron_offset.z,
            ],
            soft_iron_matrix: row_major(&self.soft_iron_matrix),
            earth_field: [
                self.earth_field_world.x,
                self.earth_field_world.y,
                self.earth_field_world.z,
            ],
            earth_field_magnitude: self.earth_field_magnitude(),
            hard_iron_calibrated: self.hard_iron_calibrated,
            soft_iron_calibrated: self.soft_iron_calibrated,
            earth_field_calibrated: self.earth_field_calibrated,
            quality: self.quality,
            saved_at: Some(Utc::now()),
        }
    }

    pub fn from_record(record: &CalibrationRecord) -> Self {
        Self {
            hard_iron_offset: Vector3::from(record.hard_iron_offset),
            soft_iron_matrix: Matrix3::from_row_slice(&record.soft_iron_matrix),
            earth_field_world: Vector3::from(record.earth_field),
            hard_iron_calibrated: record.hard_iron_calibrated,
            soft_iron_calibrated: record.soft_iron_calibrated,
            earth_field_calibrated: record.earth_field_calibrated,
            quality: record.quality,
        }
    }
}

#[rustfmt::skip]
fn row_major(m: &Matrix3<f64>) -> [f64; 9] {
    [
        m[(0, 0)], m[(0, 1)], m[(0, 2)],
        m[(1, 0)], m[(1, 1)], m[(1, 2)],
        m[(2, 0)], m[(2, 1)], m[(2, 2)],
    ]
}

/// Flat on-disk form of [`CalibrationState`].
///
/// The soft-iron matrix is stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub hard_iron_offset: [f64; 3],
    pub soft_iron_matrix: [f64; 9],
    pub earth_field: [f64; 3],
    pub earth_field_magnitude: f64,
    pub hard_iron_calibrated: bool,
    pub soft_iron_calibrated: bool,
    pub earth_field_calibrated: bool,
    #[serde(default)]
    pub quality: CalibrationQuality,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl CalibrationRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write calibration to {}", path.display()))?;
        log::info!("Saved calibration to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration from {}", path.display()))?;
        let record = Self::from_json(&json)
            .with_context(|| format!("Malformed calibration record {}", path.display()))?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn sample_state() -> CalibrationState {
        CalibrationState {
            hard_iron_offset: Vector3::new(12.345678901234567, -7.1, 0.1 + 0.2),
            soft_iron_matrix: Matrix3::new(
                1.02, 0.013, -0.004,
                0.013, 0.97, 0.021,
                -0.004, 0.021, 1.0 / 3.0,
            ),
            earth_field_world: Vector3::new(19.5, 1.2, 45.8),
            hard_iron_calibrated: true,
            soft_iron_calibrated: true,
            earth_field_calibrated: false,
            quality: CalibrationQuality {
                earth_field: 0.0,
                hard_iron: 0.91,
                soft_iron: 0.42,
            },
        }
    }

    #[test]
    fn test_default_is_identity() {
        let state = CalibrationState::default();
        assert_eq!(state.hard_iron_offset, Vector3::zeros());
        assert_eq!(state.soft_iron_matrix, Matrix3::identity());
        assert_eq!(state.earth_field_world, Vector3::zeros());
        assert!(!state.is_fully_calibrated());
    }

    #[test]
    fn test_record_is_row_major() {
        let mut state = CalibrationState::default();
        state.soft_iron_matrix = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let record = state.to_record();
        assert_eq!(
            record.soft_iron_matrix,
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        );
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let state = sample_state();
        let record = state.to_record();
        let json = record.to_json().unwrap();
        let restored = CalibrationRecord::from_json(&json).unwrap();

        assert_eq!(restored, record);
        assert_eq!(CalibrationState::from_record(&restored), state);
        assert!((restored.earth_field_magnitude - state.earth_field_magnitude()).abs() == 0.0);
    }

    #[test]
    fn test_record_without_optional_fields() {
        let json = r#"{
            "hard_iron_offset": [1.0, 2.0, 3.0],
            "soft_iron_matrix": [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            "earth_field": [0.0, 0.0, 50.0],
            "earth_field_magnitude": 50.0,
            "hard_iron_calibrated": true,
            "soft_iron_calibrated": false,
            "earth_field_calibrated": true
        }"#;
        let record = CalibrationRecord::from_json(json).unwrap();
        assert_eq!(record.saved_at, None);
        assert_eq!(record.quality, CalibrationQuality::default());

        let state = CalibrationState::from_record(&record);
        assert_eq!(state.hard_iron_offset, Vector3::new(1.0, 2.0, 3.0));
        assert!(state.earth_field_calibrated);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!(
            "magflex_calibration_{}.json",
            std::process::id()
        ));
        let record = sample_state().to_record();
        record.save(&path).unwrap();
        let loaded = CalibrationRecord::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CalibrationRecord::load("/nonexistent/magflex/cal.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read calibration"));
    }
}
