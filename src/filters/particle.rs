//! Particle filter over hand poses
//!
//! Each particle is a full `HandPose` hypothesis (one position per finger).
//! The field-to-pose mapping is multimodal, so the set keeps several
//! hypotheses alive instead of collapsing onto one Gaussian mode.
//!
//!   - predict: random walk, σ·√dt per finger axis (no velocity state)
//!   - update: weight = likelihood(particle, measurement), normalized;
//!     uniform fallback when every particle is ~impossible
//!   - resample: systematic, when ESS = 1/Σw² drops below threshold·N
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::likelihood::MeasurementLikelihood;
use crate::config::ParticleConfig;
use crate::error::Result;
use crate::types::{HandPose, FINGER_COUNT};

/// Weight totals at or below this are treated as zero evidence
const MIN_WEIGHT_SUM: f64 = 1e-300;

/// Result of one measurement update
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// ESS after normalization, before any resample
    pub ess: f64,
    pub resampled: bool,
    /// Weights were reset to uniform because the total was ~0
    pub degenerate: bool,
}

pub struct ParticleFilter {
    config: ParticleConfig,
    particles: Vec<HandPose>,
    weights: Vec<f64>,
    rng: StdRng,
    resample_count: u64,
}

impl ParticleFilter {
    pub fn new(config: ParticleConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            particles: Vec::with_capacity(config.num_particles),
            weights: Vec::with_capacity(config.num_particles),
            config,
            rng,
            resample_count: 0,
        })
    }

    pub fn is_initialized(&self) -> bool {
        !self.particles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[HandPose] {
        &self.particles
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn resample_count(&self) -> u64 {
        self.resample_count
    }

    fn gaussian(rng: &mut StdRng, sigma: f64) -> Vector3<f64> {
        Vector3::new(
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
            rng.sample::<f64, _>(StandardNormal),
        ) * sigma
    }

    fn perturb(rng: &mut StdRng, pose: &HandPose, sigma: f64) -> HandPose {
        let mut out = *pose;
        for p in out.positions.iter_mut() {
            *p += Self::gaussian(rng, sigma);
        }
        out
    }

    /// Seed N particles around `initial_pose` with uniform weights
    pub fn initialize(&mut self, initial_pose: &HandPose) {
        let n = self.config.num_particles;
        let sigma = self.config.initial_noise_std;
        let rng = &mut self.rng;

        self.particles = (0..n)
            .map(|_| Self::perturb(rng, initial_pose, sigma))
            .collect();
        self.weights = vec![1.0 / n as f64; n];
        self.resample_count = 0;
        log::debug!("particle filter initialized with {} particles", n);
    }

    /// Random-walk motion model. Non-positive `dt` leaves particles unchanged.
    pub fn predict(&mut self, dt: f64) {
        if !(dt > 0.0) || !dt.is_finite() {
            return;
        }
        let sigma = self.config.process_noise_std * dt.sqrt();
        for particle in self.particles.iter_mut() {
            for p in particle.positions.iter_mut() {
                *p += Self::gaussian(&mut self.rng, sigma);
            }
        }
    }

    /// Reweight every particle by `likelihood`, normalize, and resample if
    /// the effective sample size has collapsed.
    pub fn update<L>(&mut self, measurement: &Vector3<f64>, likelihood: &L) -> UpdateOutcome
    where
        L: MeasurementLikelihood + ?Sized,
    {
        if self.particles.is_empty() {
            log::warn!("particle update before initialize, ignoring measurement");
            return UpdateOutcome {
                ess: 0.0,
                resampled: false,
                degenerate: false,
            };
        }

        for (w, particle) in self.weights.iter_mut().zip(self.particles.iter()) {
            let l = likelihood.likelihood(particle, measurement);
            *w = if l.is_finite() && l > 0.0 { l } else { 0.0 };
        }
        let degenerate = !self.normalize_weights();

        let ess = self.effective_sample_size();
        let n = self.particles.len() as f64;
        let resampled = ess < self.config.resample_threshold * n;
        if resampled {
            self.systematic_resample();
        }

        UpdateOutcome {
            ess,
            resampled,
            degenerate,
        }
    }

    /// Returns false (and leaves uniform weights) when the total is ~0
    fn normalize_weights(&mut self) -> bool {
        let sum: f64 = self.weights.iter().sum();
        let n = self.weights.len();
        if !(sum > MIN_WEIGHT_SUM) || !sum.is_finite() {
            log::debug!("particle weights collapsed (sum={:e}), resetting to uniform", sum);
            self.weights.iter_mut().for_each(|w| *w = 1.0 / n as f64);
            return false;
        }
        self.weights.iter_mut().for_each(|w| *w /= sum);
        true
    }

    /// `1 / Σ wᵢ²` of the normalized weights
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    /// One random offset, N equally spaced pointers into the cumulative
    /// weights. Duplicates are expected; weights reset to uniform.
    fn systematic_resample(&mut self) {
        let n = self.particles.len();
        let step = 1.0 / n as f64;
        let mut u = self.rng.gen::<f64>() * step;

        let mut resampled = Vec::with_capacity(n);
        let mut i = 0;
        let mut cumulative = self.weights[0];
        for _ in 0..n {
            while u >= cumulative && i < n - 1 {
                i += 1;
                cumulative += self.weights[i];
            }
            resampled.push(self.particles[i]);
            u += step;
        }

        self.particles = resampled;
        self.weights = vec![step; n];
        self.resample_count += 1;
        log::debug!("systematic resample #{} over {} particles", self.resample_count, n);
    }

    /// Weighted mean position of each finger; `None` before initialize
    pub fn estimate(&self) -> Option<HandPose> {
        if self.particles.is_empty() {
            return None;
        }
        let mut mean = HandPose::zeros();
        for (particle, &w) in self.particles.iter().zip(self.weights.iter()) {
            for f in 0..FINGER_COUNT {
                mean.positions[f] += particle.positions[f] * w;
            }
        }
        Some(mean)
    }

    /// Weighted per-axis standard deviation of each finger position
    pub fn estimate_spread(&self) -> Option<[Vector3<f64>; FINGER_COUNT]> {
        let mean = self.estimate()?;
        let mut var = [Vector3::zeros(); FINGER_COUNT];
        for (particle, &w) in self.particles.iter().zip(self.weights.iter()) {
            for f in 0..FINGER_COUNT {
                let d = particle.positions[f] - mean.positions[f];
                var[f] += d.component_mul(&d) * w;
            }
        }
        Some(var.map(|v| v.map(f64::sqrt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dipole::MagnetConfig;
    use crate::filters::likelihood::DipoleLikelihood;
    use crate::types::Finger;
    use approx::assert_relative_eq;

    fn config(n: usize) -> ParticleConfig {
        ParticleConfig {
            num_particles: n,
            seed: Some(42),
            ..ParticleConfig::default()
        }
    }

    fn rest_pose() -> HandPose {
        HandPose::new([
            Vector3::new(-30.0, 20.0, 30.0),
            Vector3::new(-10.0, 0.0, 60.0),
            Vector3::new(0.0, 0.0, 65.0),
            Vector3::new(10.0, 0.0, 60.0),
            Vector3::new(20.0, 0.0, 50.0),
        ])
    }

    fn assert_normalized(pf: &ParticleFilter) {
        assert!(pf.weights().iter().all(|&w| w >= 0.0));
        let sum: f64 = pf.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "weights sum to {}", sum);
    }

    #[test]
    fn test_initialize_spreads_around_pose() {
        let mut pf = ParticleFilter::new(config(500)).unwrap();
        assert!(pf.estimate().is_none());

        pf.initialize(&rest_pose());
        assert_eq!(pf.len(), 500);
        assert_normalized(&pf);

        let estimate = pf.estimate().unwrap();
        for f in Finger::ALL {
            assert!((estimate[f] - rest_pose()[f]).norm() < 1.5);
        }
        let spread = pf.estimate_spread().unwrap();
        assert!(spread.iter().all(|s| s.iter().all(|&v| v > 3.0 && v < 7.0)));
    }

    #[test]
    fn test_predict_scales_with_sqrt_dt() {
        let mut pf = ParticleFilter::new(ParticleConfig {
            initial_noise_std: 0.0,
            process_noise_std: 10.0,
            ..config(2000)
        })
        .unwrap();
        pf.initialize(&rest_pose());
        pf.predict(0.25);

        let spread = pf.estimate_spread().unwrap();
        // 10 · √0.25 = 5
        for s in spread.iter() {
            for &v in s.iter() {
                assert!((v - 5.0).abs() < 0.5, "spread {}", v);
            }
        }

        let before = pf.particles().to_vec();
        pf.predict(0.0);
        pf.predict(-1.0);
        assert_eq!(pf.particles(), &before[..]);
    }

    #[test]
    fn test_weights_normalized_after_update() {
        let mut pf = ParticleFilter::new(config(300)).unwrap();
        pf.initialize(&rest_pose());

        let target = rest_pose()[Finger::Index];
        let likelihood = |pose: &HandPose, _: &Vector3<f64>| {
            (-(pose[Finger::Index] - target).norm_squared() / 50.0).exp()
        };
        for _ in 0..5 {
            pf.predict(0.02);
            pf.update(&Vector3::zeros(), &likelihood);
            assert_normalized(&pf);
            assert_eq!(pf.len(), 300);
        }
    }

    #[test]
    fn test_zero_likelihood_falls_back_to_uniform() {
        let mut pf = ParticleFilter::new(config(100)).unwrap();
        pf.initialize(&rest_pose());

        let nothing = |_: &HandPose, _: &Vector3<f64>| 0.0;
        let outcome = pf.update(&Vector3::zeros(), &nothing);

        assert!(outcome.degenerate);
        assert!(!outcome.resampled);
        assert_relative_eq!(outcome.ess, 100.0, epsilon = 1e-9);
        assert!(pf.weights().iter().all(|&w| (w - 0.01).abs() < 1e-15));

        let nan = |_: &HandPose, _: &Vector3<f64>| f64::NAN;
        let outcome = pf.update(&Vector3::zeros(), &nan);
        assert!(outcome.degenerate);
        assert_normalized(&pf);
    }

    #[test]
    fn test_resample_keeps_count_and_allows_duplicates() {
        let mut pf = ParticleFilter::new(config(200)).unwrap();
        pf.initialize(&rest_pose());

        // Only one particle is plausible: ESS = 1
        let favored = pf.particles()[17];
        let likelihood = move |pose: &HandPose, _: &Vector3<f64>| {
            if *pose == favored {
                1.0
            } else {
                0.0
            }
        };
        let outcome = pf.update(&Vector3::zeros(), &likelihood);

        assert!(outcome.resampled);
        assert_relative_eq!(outcome.ess, 1.0, epsilon = 1e-9);
        assert_eq!(pf.len(), 200);
        assert!(pf.particles().iter().all(|p| *p == favored));
        assert_normalized(&pf);
        assert_eq!(pf.resample_count(), 1);
    }

    #[test]
    fn test_no_resample_when_ess_high() {
        let mut pf = ParticleFilter::new(config(100)).unwrap();
        pf.initialize(&rest_pose());
        let flat = |_: &HandPose, _: &Vector3<f64>| 0.7;
        let outcome = pf.update(&Vector3::zeros(), &flat);

        assert!(!outcome.resampled);
        assert!(!outcome.degenerate);
        assert_eq!(pf.resample_count(), 0);
    }

    #[test]
    fn test_update_before_initialize_is_ignored() {
        let mut pf = ParticleFilter::new(config(10)).unwrap();
        let outcome = pf.update(&Vector3::zeros(), &|_: &HandPose, _: &Vector3<f64>| 1.0);
        assert_eq!(outcome.ess, 0.0);
        assert!(pf.is_empty());
    }

    #[test]
    fn test_dipole_likelihood_pulls_estimate_toward_truth() {
        let sensor = Vector3::zeros();
        let magnets = MagnetConfig::none().with_magnet(Finger::Index, Vector3::new(0.0, 0.0, 0.03));
        let model = DipoleLikelihood::new(sensor, magnets, 2.0);

        let mut truth = rest_pose();
        truth[Finger::Index] = Vector3::new(-10.0, 0.0, 45.0);
        let measurement = model.expected_field(&truth);

        let mut pf = ParticleFilter::new(ParticleConfig {
            initial_noise_std: 8.0,
            process_noise_std: 5.0,
            ..config(800)
        })
        .unwrap();
        pf.initialize(&rest_pose());

        let start_error = (pf.estimate().unwrap()[Finger::Index] - truth[Finger::Index]).norm();
        for _ in 0..30 {
            pf.predict(0.02);
            pf.update(&measurement, &model);
            assert_normalized(&pf);
        }
        let end_error = (pf.estimate().unwrap()[Finger::Index] - truth[Finger::Index]).norm();

        let predicted = model.expected_field(&pf.estimate().unwrap());
        let rest_residual = (model.expected_field(&rest_pose()) - measurement).norm();
        assert!((predicted - measurement).norm() < rest_residual);
        assert!(end_error < start_error + 1.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(ParticleFilter::new(config(0)).is_err());
    }
}
