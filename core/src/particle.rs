//! Particle filter core: particle set ownership, the predict/weight/normalize/estimate/
//! resample cycle, degeneracy recovery, and resampling strategies.
//!
//! The filter owns exactly one particle generation at a time. Each call to
//! [ParticleFilter::step] consumes the previous generation and replaces it wholesale
//! through resampling; no particle survives a timestep by mutation in place, and no
//! history is retained. Steps never overlap: a step runs to completion (including
//! resampling) before the next may begin.
//!
//! Prediction draws from the single filter-owned seeded generator sequentially in
//! particle order, so a fixed seed reproduces a run exactly. The weighting pass is
//! parallel (rayon) but consumes no randomness, so thread scheduling cannot perturb
//! results.

use log::warn;
use nalgebra::{Matrix2, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::map::{LandmarkMap, MapLimits};
use crate::measurements::{DEFAULT_RANGE_STD, RangeScan, RangeSensorModel};
use crate::motion::{OdometryNoise, sample_motion};
use crate::{ConfigError, OdometryDelta, Pose};

/// A single pose hypothesis with its importance weight.
#[derive(Clone, Copy, Debug, Default)]
pub struct Particle {
    /// The hypothesized pose
    pub pose: Pose,
    /// Non-negative importance weight; sums to 1 across the set after normalization
    pub weight: f64,
}

/// How the next particle generation is drawn from the current weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ResamplingStrategy {
    /// Low-variance systematic resampling: one uniform offset, O(N) cumulative walk.
    #[default]
    Systematic,
    /// Independent draws with replacement; higher selection variance, kept for
    /// comparison runs.
    Multinomial,
}

impl fmt::Display for ResamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResamplingStrategy::Systematic => write!(f, "systematic"),
            ResamplingStrategy::Multinomial => write!(f, "multinomial"),
        }
    }
}

/// How the point estimate is extracted from the weighted particle set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AveragingStrategy {
    /// Weighted mean of positions and weighted circular mean of headings.
    #[default]
    WeightedMean,
    /// Pose of the highest-weight particle.
    HighestWeight,
}
impl fmt::Display for AveragingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AveragingStrategy::WeightedMean => write!(f, "weighted-mean"),
            AveragingStrategy::HighestWeight => write!(f, "highest-weight"),
        }
    }
}

/// Per-run filter configuration.
///
/// The map and the initialization mode are supplied separately to the constructors;
/// everything here is immutable for the lifetime of a run.
#[derive(Clone, Copy, Debug)]
pub struct FilterConfig {
    /// Number of particles, fixed for the run
    pub num_particles: usize,
    /// Odometry motion noise coefficients
    pub motion_noise: OdometryNoise,
    /// Range measurement noise standard deviation
    pub range_std: f64,
    /// Resampling strategy
    pub resampling: ResamplingStrategy,
    /// Point-estimate extraction strategy
    pub averaging: AveragingStrategy,
    /// Seed for the filter-owned random number generator
    pub seed: u64,
}
impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 500,
            motion_noise: OdometryNoise::default(),
            range_std: DEFAULT_RANGE_STD,
            resampling: ResamplingStrategy::default(),
            averaging: AveragingStrategy::default(),
            seed: 123,
        }
    }
}

/// Monte Carlo localization filter over a known landmark map.
///
/// # Example
/// ```rust
/// use mcl::map::{Landmark, LandmarkMap};
/// use mcl::measurements::{RangeMeasurement, RangeScan};
/// use mcl::particle::{FilterConfig, ParticleFilter};
/// use mcl::{OdometryDelta, Pose};
///
/// let map = LandmarkMap::new(vec![
///     Landmark { id: 1, x: 2.0, y: 1.0 },
///     Landmark { id: 2, x: 0.0, y: 4.0 },
///     Landmark { id: 3, x: 5.0, y: 3.0 },
/// ])
/// .unwrap()
/// .shared();
///
/// let config = FilterConfig { num_particles: 200, ..FilterConfig::default() };
/// let mut filter =
///     ParticleFilter::tracking(map, Pose::new(0.0, 0.0, 0.0), 0.2, 0.1, &config).unwrap();
///
/// let delta = OdometryDelta::new(0.0, 1.0, 0.0);
/// let scan = RangeScan::new(vec![RangeMeasurement::with_id(1, 1.0)]);
/// let estimate = filter.step(delta, &scan);
/// assert!(estimate.is_finite());
/// ```
pub struct ParticleFilter {
    particles: Vec<Particle>,
    sensor: RangeSensorModel,
    motion_noise: OdometryNoise,
    resampling: ResamplingStrategy,
    averaging: AveragingStrategy,
    rng: StdRng,
    degenerate_resets: u64,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean = self.estimate();
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field(
                "mean_pose",
                &format_args!("({:.3}, {:.3}, {:.3} rad)", mean.x, mean.y, mean.theta),
            )
            .field("degenerate_resets", &self.degenerate_resets)
            .finish()
    }
}
impl ParticleFilter {
    fn build(
        map: Arc<LandmarkMap>,
        config: &FilterConfig,
    ) -> Result<(RangeSensorModel, StdRng), ConfigError> {
        if config.num_particles == 0 {
            return Err(ConfigError::NoParticles);
        }
        let sensor = RangeSensorModel::new(map, config.range_std)?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok((sensor, rng))
    }
    /// Initialize for global localization: particles drawn uniformly over a map region
    /// with uniform headings, all weights `1/N`.
    ///
    /// # Arguments
    /// * `map` - Shared landmark map.
    /// * `limits` - Region to scatter particles over.
    /// * `config` - Per-run configuration.
    ///
    /// # Returns
    /// * `Ok(ParticleFilter)` ready for the first timestep.
    /// * `Err(ConfigError)` on invalid configuration.
    pub fn uniform(
        map: Arc<LandmarkMap>,
        limits: MapLimits,
        config: &FilterConfig,
    ) -> Result<ParticleFilter, ConfigError> {
        let (sensor, mut rng) = Self::build(map, config)?;
        let n = config.num_particles;
        let weight = 1.0 / n as f64;
        let particles = (0..n)
            .map(|_| Particle {
                pose: Pose::new(
                    rng.random_range(limits.x_min..=limits.x_max),
                    rng.random_range(limits.y_min..=limits.y_max),
                    rng.random_range(-std::f64::consts::PI..std::f64::consts::PI),
                ),
                weight,
            })
            .collect();
        Ok(ParticleFilter {
            particles,
            sensor,
            motion_noise: config.motion_noise,
            resampling: config.resampling,
            averaging: config.averaging,
            rng,
            degenerate_resets: 0,
        })
    }
    /// Initialize for tracking from a known start pose: particles drawn from a Gaussian
    /// centered at `start`, all weights `1/N`.
    ///
    /// # Arguments
    /// * `map` - Shared landmark map.
    /// * `start` - Known start pose.
    /// * `position_std` - Standard deviation of the initial x and y scatter.
    /// * `heading_std` - Standard deviation of the initial heading scatter, in radians.
    /// * `config` - Per-run configuration.
    pub fn tracking(
        map: Arc<LandmarkMap>,
        start: Pose,
        position_std: f64,
        heading_std: f64,
        config: &FilterConfig,
    ) -> Result<ParticleFilter, ConfigError> {
        if !(position_std >= 0.0 && position_std.is_finite()) {
            return Err(ConfigError::NegativeNoise("position_std", position_std));
        }
        if !(heading_std >= 0.0 && heading_std.is_finite()) {
            return Err(ConfigError::NegativeNoise("heading_std", heading_std));
        }
        let (sensor, mut rng) = Self::build(map, config)?;
        let n = config.num_particles;
        let weight = 1.0 / n as f64;
        let scatter = |center: f64, sd: f64, rng: &mut StdRng| -> f64 {
            if sd > 0.0 {
                match Normal::new(center, sd) {
                    Ok(normal) => normal.sample(rng),
                    Err(_) => center,
                }
            } else {
                center
            }
        };
        let particles = (0..n)
            .map(|_| {
                let x = scatter(start.x, position_std, &mut rng);
                let y = scatter(start.y, position_std, &mut rng);
                let theta = scatter(start.theta, heading_std, &mut rng);
                Particle {
                    pose: Pose::new(x, y, theta),
                    weight,
                }
            })
            .collect();
        Ok(ParticleFilter {
            particles,
            sensor,
            motion_noise: config.motion_noise,
            resampling: config.resampling,
            averaging: config.averaging,
            rng,
            degenerate_resets: 0,
        })
    }
    /// Run one full filter cycle: predict, weight, normalize, estimate, resample.
    ///
    /// The returned pose is the estimate computed from this timestep's normalized
    /// weights, before resampling resets them to uniform.
    ///
    /// # Arguments
    /// * `delta` - Odometry delta for this timestep. A non-finite delta is rejected
    ///   and treated as no motion.
    /// * `scan` - Range observations for this timestep; may be empty.
    ///
    /// # Returns
    /// * The weighted-mean (or highest-weight, per configuration) pose estimate.
    pub fn step(&mut self, delta: OdometryDelta, scan: &RangeScan) -> Pose {
        self.predict(delta);
        if self.reweight(scan) {
            self.normalize_weights();
        }
        let estimate = self.estimate();
        self.resample();
        estimate
    }
    /// Prediction pass: propagate every particle through the odometry motion model.
    ///
    /// Weights are untouched. Draws run sequentially in particle order from the
    /// filter-owned generator to keep runs reproducible under a fixed seed.
    pub fn predict(&mut self, delta: OdometryDelta) {
        let delta = if delta.is_finite() {
            delta
        } else {
            warn!("rejecting non-finite odometry delta {delta}, treating as no motion");
            OdometryDelta::default()
        };
        for particle in &mut self.particles {
            particle.pose = sample_motion(particle.pose, delta, &self.motion_noise, &mut self.rng);
        }
    }
    /// Weighting pass: overwrite every particle's weight with the raw likelihood of
    /// the scan from that particle's pose.
    ///
    /// Malformed observations are dropped first (see [RangeSensorModel::sanitize]).
    /// If no valid observations remain the weights are left untouched and `false`
    /// is returned; callers skip the normalization pass in that case so the weights
    /// survive the timestep bit for bit. The pass runs in parallel; each particle
    /// reads only the shared map and scan and writes only its own slot.
    ///
    /// # Returns
    /// * `true` if the weights were updated from the scan.
    pub fn reweight(&mut self, scan: &RangeScan) -> bool {
        let scan = self.sensor.sanitize(scan);
        if scan.is_empty() {
            return false;
        }
        let sensor = &self.sensor;
        self.particles
            .par_iter_mut()
            .for_each(|particle| particle.weight = sensor.likelihood(&particle.pose, &scan));
        true
    }
    /// Normalize weights to sum to 1.
    ///
    /// If every particle scored zero (or the sum is otherwise non-finite), all weights
    /// are reset to uniform `1/N` instead of dividing by zero. This is the deliberate
    /// degeneracy recovery policy: the reset is logged, counted in
    /// [ParticleFilter::degenerate_resets], and never surfaced as an error.
    ///
    /// # Returns
    /// * `true` if a degenerate reset occurred, `false` on a normal pass.
    pub fn normalize_weights(&mut self) -> bool {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= sum;
            }
            false
        } else {
            let uniform = 1.0 / self.particles.len() as f64;
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
            self.degenerate_resets += 1;
            warn!(
                "degenerate weight sum {sum}; resetting weights to uniform (reset #{})",
                self.degenerate_resets
            );
            true
        }
    }
    /// Point estimate of the pose from the current weighted particle set.
    ///
    /// The weighted-mean strategy averages x and y directly and averages headings as
    /// unit vectors, taking `atan2` of the weighted `(cos, sin)` sums. Averaging the
    /// raw angles would produce wraparound artifacts near ±π.
    pub fn estimate(&self) -> Pose {
        match self.averaging {
            AveragingStrategy::WeightedMean => self.weighted_mean(),
            AveragingStrategy::HighestWeight => self.highest_weight_pose(),
        }
    }
    fn weighted_mean(&self) -> Pose {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(total > 0.0 && total.is_finite()) {
            // Degenerate set; fall back to the unweighted mean
            let n = self.particles.len() as f64;
            let mut x = 0.0;
            let mut y = 0.0;
            let mut cos_sum = 0.0;
            let mut sin_sum = 0.0;
            for particle in &self.particles {
                x += particle.pose.x / n;
                y += particle.pose.y / n;
                cos_sum += particle.pose.theta.cos();
                sin_sum += particle.pose.theta.sin();
            }
            return Pose::new(x, y, sin_sum.atan2(cos_sum));
        }
        let mut x = 0.0;
        let mut y = 0.0;
        let mut cos_sum = 0.0;
        let mut sin_sum = 0.0;
        for particle in &self.particles {
            let w = particle.weight / total;
            x += w * particle.pose.x;
            y += w * particle.pose.y;
            cos_sum += w * particle.pose.theta.cos();
            sin_sum += w * particle.pose.theta.sin();
        }
        Pose::new(x, y, sin_sum.atan2(cos_sum))
    }
    fn highest_weight_pose(&self) -> Pose {
        self.particles
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
            .map(|p| p.pose)
            .unwrap_or_default()
    }
    /// Weighted covariance of the particle positions around the weighted mean.
    ///
    /// Exposes the spread of the posterior; useful for detecting multimodal or
    /// ring-shaped posteriors that a point estimate alone would hide.
    pub fn position_covariance(&self) -> Matrix2<f64> {
        let mean = self.weighted_mean();
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        let mut cov = Matrix2::<f64>::zeros();
        if !(total > 0.0 && total.is_finite()) {
            return cov;
        }
        for particle in &self.particles {
            let w = particle.weight / total;
            let diff = Vector2::new(particle.pose.x - mean.x, particle.pose.y - mean.y);
            cov += w * diff * diff.transpose();
        }
        cov
    }
    /// Replace the particle set with a new generation drawn with replacement,
    /// frequency proportional to weight, then reset all weights to `1/N`.
    ///
    /// Only the pre-resample weights are meaningful; post-resample weights stay
    /// uniform until the next weighting pass. Poses are copied into the new set so
    /// duplicated lineages diverge independently under future motion noise.
    pub fn resample(&mut self) {
        let n = self.particles.len();
        let indices = match self.resampling {
            ResamplingStrategy::Systematic => self.systematic_indices(),
            ResamplingStrategy::Multinomial => self.multinomial_indices(),
        };
        let uniform = 1.0 / n as f64;
        let new_particles = indices
            .into_iter()
            .map(|i| Particle {
                pose: self.particles[i].pose,
                weight: uniform,
            })
            .collect();
        self.particles = new_particles;
    }
    /// Low-variance systematic selection: a single uniform offset in `[0, 1/N)` and an
    /// O(N) walk along the cumulative weights.
    fn systematic_indices(&mut self) -> Vec<usize> {
        let n = self.particles.len();
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(total > 0.0 && total.is_finite()) {
            return (0..n).collect();
        }
        let step = total / n as f64;
        let mut u = self.rng.random_range(0.0..step);
        let mut indices = Vec::with_capacity(n);
        let mut i = 0;
        let mut cumulative = self.particles[0].weight;
        for _ in 0..n {
            while u > cumulative && i < n - 1 {
                i += 1;
                cumulative += self.particles[i].weight;
            }
            indices.push(i);
            u += step;
        }
        indices
    }
    /// Independent multinomial selection via cumulative search per draw.
    fn multinomial_indices(&mut self) -> Vec<usize> {
        let n = self.particles.len();
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(total > 0.0 && total.is_finite()) {
            return (0..n).collect();
        }
        let mut cumulative = Vec::with_capacity(n);
        let mut running = 0.0;
        for particle in &self.particles {
            running += particle.weight;
            cumulative.push(running);
        }
        (0..n)
            .map(|_| {
                let u = self.rng.random_range(0.0..total);
                match cumulative.binary_search_by(|c| c.total_cmp(&u)) {
                    Ok(i) => i,
                    Err(i) => i.min(n - 1),
                }
            })
            .collect()
    }
    /// Resample only when the effective sample size falls below
    /// `threshold * num_particles`.
    ///
    /// # Returns
    /// * `true` if resampling was performed.
    pub fn resample_if_needed(&mut self, threshold: f64) -> bool {
        if self.effective_sample_size() < threshold * self.particles.len() as f64 {
            self.resample();
            true
        } else {
            false
        }
    }
    /// Effective sample size `1 / Σ wᵢ²` of the current (normalized) weights.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_of_squares: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }
    /// Overwrite the weights directly. Intended for tests and external weighting
    /// schemes; panics if the slice length does not match the particle count.
    pub fn set_weights(&mut self, weights: &[f64]) {
        assert_eq!(weights.len(), self.particles.len());
        for (particle, &w) in self.particles.iter_mut().zip(weights.iter()) {
            particle.weight = w;
        }
    }
    /// Read-only view of the current particle generation.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    /// Number of particles (fixed for the run).
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }
    /// Number of degenerate-weight recoveries performed so far.
    pub fn degenerate_resets(&self) -> u64 {
        self.degenerate_resets
    }
    /// The shared landmark map.
    pub fn map(&self) -> &Arc<LandmarkMap> {
        self.sensor.map()
    }
    /// The range sensor model.
    pub fn sensor(&self) -> &RangeSensorModel {
        &self.sensor
    }
    /// Mean of the particle headings as unit vectors; exposed for heading-spread
    /// diagnostics alongside [ParticleFilter::position_covariance].
    pub fn heading_concentration(&self) -> f64 {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(total > 0.0 && total.is_finite()) {
            return 0.0;
        }
        let mut cos_sum = 0.0;
        let mut sin_sum = 0.0;
        for particle in &self.particles {
            let w = particle.weight / total;
            cos_sum += w * particle.pose.theta.cos();
            sin_sum += w * particle.pose.theta.sin();
        }
        (cos_sum.powi(2) + sin_sum.powi(2)).sqrt()
    }
}
