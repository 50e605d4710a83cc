use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Calibration stage that produced an error or a log line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStage {
    EarthField,
    HardIron,
    SoftIron,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationStage::EarthField => "earth field",
            CalibrationStage::HardIron => "hard iron",
            CalibrationStage::SoftIron => "soft iron",
        };
        f.write_str(name)
    }
}

/// Magnetometer engine error types
#[derive(Error, Debug)]
pub enum MagError {
    #[error("{stage} calibration needs at least {required} samples, got {actual}")]
    InsufficientSamples {
        stage: CalibrationStage,
        required: usize,
        actual: usize,
    },

    #[error("Degenerate numerics: {0}")]
    DegenerateNumerics(String),

    #[error("Invalid orientation: {0}")]
    InvalidOrientation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MagError {
    /// True for the "keep collecting samples and retry" case
    pub fn is_retryable(&self) -> bool {
        matches!(self, MagError::InsufficientSamples { .. })
    }
}

pub type Result<T> = std::result::Result<T, MagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_samples_message() {
        let err = MagError::InsufficientSamples {
            stage: CalibrationStage::HardIron,
            required: 100,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "hard iron calibration needs at least 100 samples, got 12"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_not_retryable() {
        let err = MagError::InvalidOrientation("zero norm".to_string());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("zero norm"));
    }
}
