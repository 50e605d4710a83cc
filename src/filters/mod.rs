pub mod kalman;
pub mod likelihood;
pub mod particle;

pub use kalman::{KalmanFilter, KalmanSnapshot};
pub use likelihood::{DipoleLikelihood, MeasurementLikelihood};
pub use particle::{ParticleFilter, UpdateOutcome};
