//! Odometry motion model.
//!
//! Implements the rotation-translation-rotation odometry motion model: each particle's
//! pose is propagated by the commanded delta after corrupting its three components with
//! zero-mean Gaussian noise whose standard deviation scales with the motion magnitude.
//! The model is a pure function of one particle's pose, the shared delta, and an
//! independent random draw, so the prediction pass has no cross-particle dependencies.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::{ConfigError, OdometryDelta, Pose, wrap_heading};

/// Noise configuration for the odometry motion model.
///
/// The four alpha coefficients control how the sampling standard deviations grow with
/// the commanded motion:
///
/// - `sd_rot1  = alpha1·|rot1| + alpha2·|trans|`
/// - `sd_trans = alpha3·|trans| + alpha4·(|rot1| + |rot2|)`
/// - `sd_rot2  = alpha1·|rot2| + alpha2·|trans|`
///
/// Each standard deviation is additionally clamped up to `floor`, so a stationary
/// robot keeps a little particle diversity instead of collapsing the cloud to an
/// exact point. Setting `floor` to zero makes a zero delta an exact pass-through.
#[derive(Clone, Copy, Debug)]
pub struct OdometryNoise {
    /// Rotation noise per unit of commanded rotation
    pub alpha1: f64,
    /// Rotation noise per unit of commanded translation
    pub alpha2: f64,
    /// Translation noise per unit of commanded translation
    pub alpha3: f64,
    /// Translation noise per unit of commanded rotation
    pub alpha4: f64,
    /// Minimum sampling standard deviation for every component
    pub floor: f64,
}
impl Default for OdometryNoise {
    fn default() -> Self {
        OdometryNoise {
            alpha1: 0.1,
            alpha2: 0.1,
            alpha3: 0.05,
            alpha4: 0.05,
            floor: 1e-4,
        }
    }
}
impl OdometryNoise {
    /// Create a noise configuration, validating that every coefficient is non-negative.
    ///
    /// # Arguments
    /// * `alpha1` - Rotation noise per unit rotation.
    /// * `alpha2` - Rotation noise per unit translation.
    /// * `alpha3` - Translation noise per unit translation.
    /// * `alpha4` - Translation noise per unit rotation.
    /// * `floor` - Minimum sampling standard deviation; zero disables the floor.
    pub fn new(
        alpha1: f64,
        alpha2: f64,
        alpha3: f64,
        alpha4: f64,
        floor: f64,
    ) -> Result<OdometryNoise, ConfigError> {
        for (name, value) in [
            ("alpha1", alpha1),
            ("alpha2", alpha2),
            ("alpha3", alpha3),
            ("alpha4", alpha4),
            ("noise floor", floor),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::NegativeNoise(name, value));
            }
        }
        Ok(OdometryNoise {
            alpha1,
            alpha2,
            alpha3,
            alpha4,
            floor,
        })
    }
    /// Sampling standard deviations `(sd_rot1, sd_trans, sd_rot2)` for a delta,
    /// clamped up to the noise floor.
    pub fn standard_deviations(&self, delta: &OdometryDelta) -> (f64, f64, f64) {
        let rot1 = delta.rot1.abs();
        let trans = delta.trans.abs();
        let rot2 = delta.rot2.abs();
        (
            (self.alpha1 * rot1 + self.alpha2 * trans).max(self.floor),
            (self.alpha3 * trans + self.alpha4 * (rot1 + rot2)).max(self.floor),
            (self.alpha1 * rot2 + self.alpha2 * trans).max(self.floor),
        )
    }
}

/// Draw one zero-mean Gaussian sample, treating a zero standard deviation as
/// deterministic rather than constructing a zero-variance distribution.
fn gaussian_sample(sd: f64, rng: &mut StdRng) -> f64 {
    if sd > 0.0 {
        match Normal::new(0.0, sd) {
            Ok(normal) => normal.sample(rng),
            Err(_) => 0.0,
        }
    } else {
        0.0
    }
}

/// Sample a new pose for one particle from the odometry motion model.
///
/// Draws three independent noise samples scaled per [OdometryNoise], applies the
/// noisy delta to the pose, and wraps the resulting heading to (-π, π]. With a zero
/// delta and a zero noise floor the input pose is returned exactly.
///
/// # Arguments
/// * `pose` - The particle's prior pose.
/// * `delta` - The commanded odometry delta (assumed finite; the filter rejects
///   non-finite deltas before calling).
/// * `noise` - The motion noise configuration.
/// * `rng` - Random number generator to draw the noise from.
///
/// # Returns
/// * The sampled posterior pose.
///
/// # Example
/// ```rust
/// use mcl::motion::{OdometryNoise, sample_motion};
/// use mcl::{OdometryDelta, Pose};
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let noise = OdometryNoise::new(0.0, 0.0, 0.0, 0.0, 0.0).unwrap();
/// let mut rng = StdRng::seed_from_u64(7);
/// let pose = sample_motion(
///     Pose::new(0.0, 0.0, 0.0),
///     OdometryDelta::new(0.0, 1.0, 0.0),
///     &noise,
///     &mut rng,
/// );
/// assert_eq!(pose, Pose::new(1.0, 0.0, 0.0));
/// ```
pub fn sample_motion(
    pose: Pose,
    delta: OdometryDelta,
    noise: &OdometryNoise,
    rng: &mut StdRng,
) -> Pose {
    let (sd_rot1, sd_trans, sd_rot2) = noise.standard_deviations(&delta);
    let noisy_rot1 = delta.rot1 + gaussian_sample(sd_rot1, rng);
    let noisy_trans = delta.trans + gaussian_sample(sd_trans, rng);
    let noisy_rot2 = delta.rot2 + gaussian_sample(sd_rot2, rng);
    let heading = pose.theta + noisy_rot1;
    Pose {
        x: pose.x + noisy_trans * heading.cos(),
        y: pose.y + noisy_trans * heading.sin(),
        theta: wrap_heading(heading + noisy_rot2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    fn noiseless() -> OdometryNoise {
        OdometryNoise::new(0.0, 0.0, 0.0, 0.0, 0.0).unwrap()
    }

    #[test]
    fn test_zero_delta_is_exact_pass_through() {
        let mut rng = StdRng::seed_from_u64(1);
        let pose = Pose::new(3.0, -2.0, 1.1);
        let moved = sample_motion(pose, OdometryDelta::default(), &noiseless(), &mut rng);
        assert_eq!(moved, pose);
    }
    #[test]
    fn test_noiseless_motion_geometry() {
        let mut rng = StdRng::seed_from_u64(1);
        let pose = Pose::new(0.0, 0.0, PI / 2.0);
        let delta = OdometryDelta::new(-PI / 2.0, 2.0, PI / 4.0);
        let moved = sample_motion(pose, delta, &noiseless(), &mut rng);
        // Turn to face +x, translate 2, then turn 45 degrees left
        assert_approx_eq!(moved.x, 2.0, 1e-12);
        assert_approx_eq!(moved.y, 0.0, 1e-12);
        assert_approx_eq!(moved.theta, PI / 4.0, 1e-12);
    }
    #[test]
    fn test_heading_wrapped_after_motion() {
        let mut rng = StdRng::seed_from_u64(1);
        let pose = Pose::new(0.0, 0.0, 3.0);
        let delta = OdometryDelta::new(3.0, 0.0, 3.0);
        let moved = sample_motion(pose, delta, &noiseless(), &mut rng);
        assert!(moved.theta > -PI && moved.theta <= PI);
        assert_approx_eq!(moved.theta, wrap_heading(9.0), 1e-12);
    }
    #[test]
    fn test_noise_floor_keeps_diversity() {
        let noise = OdometryNoise::new(0.0, 0.0, 0.0, 0.0, 0.1).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let pose = Pose::new(0.0, 0.0, 0.0);
        let a = sample_motion(pose, OdometryDelta::default(), &noise, &mut rng);
        let b = sample_motion(pose, OdometryDelta::default(), &noise, &mut rng);
        assert!(a != b, "floor noise should perturb stationary particles");
    }
    #[test]
    fn test_standard_deviation_scaling() {
        let noise = OdometryNoise::new(0.1, 0.2, 0.3, 0.4, 0.0).unwrap();
        let delta = OdometryDelta::new(-0.5, 2.0, 0.25);
        let (sd_rot1, sd_trans, sd_rot2) = noise.standard_deviations(&delta);
        assert_approx_eq!(sd_rot1, 0.1 * 0.5 + 0.2 * 2.0, 1e-12);
        assert_approx_eq!(sd_trans, 0.3 * 2.0 + 0.4 * 0.75, 1e-12);
        assert_approx_eq!(sd_rot2, 0.1 * 0.25 + 0.2 * 2.0, 1e-12);
    }
    #[test]
    fn test_negative_alpha_rejected() {
        assert!(matches!(
            OdometryNoise::new(-0.1, 0.0, 0.0, 0.0, 0.0),
            Err(ConfigError::NegativeNoise("alpha1", _))
        ));
    }
    #[test]
    fn test_sampled_translation_statistics() {
        // Mean displacement over many draws should approach the commanded translation
        let noise = OdometryNoise::new(0.0, 0.0, 0.05, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let delta = OdometryDelta::new(0.0, 1.0, 0.0);
        let n = 5000;
        let mut sum = 0.0;
        for _ in 0..n {
            let moved = sample_motion(Pose::default(), delta, &noise, &mut rng);
            sum += moved.x;
        }
        assert_approx_eq!(sum / n as f64, 1.0, 0.01);
    }
}
