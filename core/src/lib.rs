//! Monte Carlo localization toolbox for planar mobile robots
//!
//! This crate provides a particle filter for estimating the pose (x, y, heading) of a mobile
//! robot moving on a known 2D map of point landmarks. The filter consumes noisy odometry
//! deltas (the classic rotation-translation-rotation decomposition of relative motion) and
//! noisy range measurements to the landmarks, and produces a posterior distribution over pose
//! represented by a weighted particle set together with a weighted-mean point estimate. The
//! map is known and fixed for the lifetime of a run; this crate performs localization only
//! and should not be thought of as a SLAM system. It likewise does not talk to sensor
//! hardware: odometry and range data are assumed to be pre-recorded or supplied by an
//! external driver one timestep at a time.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the linear algebra tools for the filter outputs.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides seedable random number generation for motion sampling and resampling.
//! - [`rayon`](https://crates.io/crates/rayon): Provides the parallel iterator used for the per-particle weighting pass.
//!
//! All other functionality is built on top of these crates or is auxiliary functionality
//! (e.g. CSV I/O). The primary reference text is _Probabilistic Robotics_ by Thrun, Burgard,
//! and Fox. In general, variables are named according to the quantity they represent and not
//! the symbol used in the book; for example the first odometry noise coefficient is named
//! `alpha1` rather than `α₁`.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [map]: Contains the landmark map types, map limits, and CSV loading.
//! - [measurements]: Contains the range sensor model, landmark data association, and scan sanitization.
//! - [motion]: Contains the odometry motion model and its noise configuration.
//! - [particle]: Contains the particle filter core, resampling, and state estimation.
//! - [sim]: Contains sensor log records, result records, and the localization run loop.
//!
//! The root module holds the pose and odometry value types shared by all of the above, the
//! heading wrap utilities, and the configuration error type.
//!
//! ## Pose and frame conventions
//!
//! A pose is the triple $(x, y, \theta)$ where $x$ and $y$ are map-frame coordinates in map
//! units and $\theta$ is the heading in radians, wrapped to $(-\pi, \pi]$. Positive $\theta$
//! rotates counter-clockwise from the map x axis. The vehicle frame has its x axis pointing
//! along the heading and its y axis pointing to the robot's left. Conversions between the
//! two frames are provided by [Pose::vehicle_to_world] and [Pose::world_to_vehicle].
//!
//! ## Odometry decomposition
//!
//! Relative motion between two timesteps is expressed as an initial rotation `rot1`, a
//! translation `trans` along the new heading, and a final rotation `rot2`. The motion model
//! in [motion] corrupts each component with zero-mean Gaussian noise whose standard
//! deviation scales with the magnitude of the commanded motion.

pub mod map;
pub mod measurements;
pub mod motion;
pub mod particle;
pub mod sim;

use nalgebra::Vector3;

use std::fmt::{self, Display};

use thiserror::Error;

/// Errors raised when a filter or one of its models is constructed with structurally
/// invalid configuration.
///
/// These are fatal at initialization and are never produced by the per-timestep loop;
/// statistical edge cases (degenerate weights, outlier measurements) are recovered
/// in-loop instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The landmark map contains no landmarks. The range likelihood is undefined
    /// without at least one landmark to measure against.
    #[error("landmark map must contain at least one landmark")]
    EmptyMap,
    /// Two landmarks in the map share an id.
    #[error("duplicate landmark id {0} in map")]
    DuplicateLandmark(u32),
    /// The requested particle count is zero.
    #[error("particle count must be positive")]
    NoParticles,
    /// A noise parameter that must be non-negative was negative.
    #[error("{0} must be non-negative, got {1}")]
    NegativeNoise(&'static str, f64),
    /// A noise parameter that must be strictly positive was zero or negative.
    #[error("{0} must be positive, got {1}")]
    NonPositiveNoise(&'static str, f64),
    /// Map limits with a non-positive extent along one axis.
    #[error("map limits must satisfy x_min < x_max and y_min < y_max")]
    InvalidLimits,
}

/// A planar robot pose: position in the map frame plus heading.
///
/// This is a plain value type. Particles copy poses rather than alias them, so mutating
/// one particle's pose can never affect another's.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    /// Map-frame x coordinate in map units
    pub x: f64,
    /// Map-frame y coordinate in map units
    pub y: f64,
    /// Heading in radians, wrapped to (-π, π]
    pub theta: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.3}, y: {:.3}, theta: {:.3} rad }}",
            self.x, self.y, self.theta
        )
    }
}
impl Pose {
    /// Create a new pose, wrapping the heading to (-π, π].
    ///
    /// # Arguments
    /// * `x` - Map-frame x coordinate.
    /// * `y` - Map-frame y coordinate.
    /// * `theta` - Heading in radians; any finite value is accepted and wrapped.
    ///
    /// # Example
    /// ```rust
    /// use mcl::Pose;
    /// use std::f64::consts::PI;
    ///
    /// let pose = Pose::new(1.0, 2.0, 3.0 * PI);
    /// assert!((pose.theta - PI).abs() < 1e-12);
    /// ```
    pub fn new(x: f64, y: f64, theta: f64) -> Pose {
        Pose {
            x,
            y,
            theta: wrap_heading(theta),
        }
    }
    /// Get the pose as an nalgebra vector `[x, y, theta]`.
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }
    /// Euclidean distance from this pose's position to a point in the map frame.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((x - self.x).powi(2) + (y - self.y).powi(2)).sqrt()
    }
    /// Transform a point from the vehicle frame to the map (world) frame.
    ///
    /// The vehicle frame has x forward along the heading and y to the robot's left.
    ///
    /// # Arguments
    /// * `forward` - Vehicle-frame x coordinate of the point.
    /// * `left` - Vehicle-frame y coordinate of the point.
    ///
    /// # Returns
    /// * The `(x, y)` coordinates of the point in the map frame.
    pub fn vehicle_to_world(&self, forward: f64, left: f64) -> (f64, f64) {
        let (sin_t, cos_t) = self.theta.sin_cos();
        (
            self.x + forward * cos_t - left * sin_t,
            self.y + forward * sin_t + left * cos_t,
        )
    }
    /// Transform a point from the map (world) frame to the vehicle frame.
    ///
    /// Inverse of [Pose::vehicle_to_world].
    pub fn world_to_vehicle(&self, x: f64, y: f64) -> (f64, f64) {
        let (sin_t, cos_t) = self.theta.sin_cos();
        let dx = x - self.x;
        let dy = y - self.y;
        (dx * cos_t + dy * sin_t, -dx * sin_t + dy * cos_t)
    }
    /// Check that all components are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}
impl From<Vector3<f64>> for Pose {
    fn from(v: Vector3<f64>) -> Self {
        Pose::new(v[0], v[1], v[2])
    }
}
impl From<Pose> for Vector3<f64> {
    fn from(pose: Pose) -> Self {
        pose.to_vector()
    }
}

/// Relative motion between two timesteps as estimated by wheel/IMU odometry.
///
/// The motion is decomposed into an initial rotation, a translation along the new
/// heading, and a final rotation. All three components are noisy estimates; the
/// motion model in [motion] samples the noise when propagating particles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OdometryDelta {
    /// Initial rotation in radians
    pub rot1: f64,
    /// Translation in map units
    pub trans: f64,
    /// Final rotation in radians
    pub rot2: f64,
}
impl Display for OdometryDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OdometryDelta {{ rot1: {:.4}, trans: {:.4}, rot2: {:.4} }}",
            self.rot1, self.trans, self.rot2
        )
    }
}
impl OdometryDelta {
    /// Create a new odometry delta.
    pub fn new(rot1: f64, trans: f64, rot2: f64) -> OdometryDelta {
        OdometryDelta { rot1, trans, rot2 }
    }
    /// Check that all components are finite. Non-finite deltas are rejected by the
    /// filter and treated as "no motion" for that timestep.
    pub fn is_finite(&self) -> bool {
        self.rot1.is_finite() && self.trans.is_finite() && self.rot2.is_finite()
    }
}

// --- Heading wrap utilities ---

/// Wrap a heading angle to the half-open range (-π, π].
///
/// The wrap is idempotent: `wrap_heading(wrap_heading(theta)) == wrap_heading(theta)`
/// for any finite `theta`, and the result is always strictly greater than -π and at
/// most π. Poses constructed through [Pose::new] and the motion model keep their
/// headings in this range, which is what makes the circular-mean heading estimate
/// well defined.
///
/// # Arguments
/// * `angle` - The heading to be wrapped, in radians.
/// # Returns
/// * The wrapped heading in (-π, π].
/// # Example
/// ```rust
/// use mcl::wrap_heading;
/// use std::f64::consts::PI;
///
/// assert!((wrap_heading(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
/// assert_eq!(wrap_heading(-PI), PI); // -π maps to the included endpoint π
/// ```
pub fn wrap_heading(angle: f64) -> f64 {
    let mut wrapped = angle;
    while wrapped > std::f64::consts::PI {
        wrapped -= 2.0 * std::f64::consts::PI;
    }
    while wrapped <= -std::f64::consts::PI {
        wrapped += 2.0 * std::f64::consts::PI;
    }
    wrapped
}

/// Smallest signed difference between two headings, in (-π, π].
///
/// Useful for comparing a heading estimate against ground truth across the ±π
/// wrap boundary.
pub fn heading_difference(a: f64, b: f64) -> f64 {
    wrap_heading(a - b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_wrap_heading_range() {
        for i in -100..=100 {
            let angle = i as f64 * 0.37;
            let wrapped = wrap_heading(angle);
            assert!(wrapped > -PI && wrapped <= PI, "angle {angle} -> {wrapped}");
        }
    }
    #[test]
    fn test_wrap_heading_idempotent() {
        for i in -100..=100 {
            let angle = i as f64 * 0.73;
            let once = wrap_heading(angle);
            assert_eq!(wrap_heading(once), once);
        }
    }
    #[test]
    fn test_wrap_heading_endpoints() {
        assert_eq!(wrap_heading(PI), PI);
        assert_eq!(wrap_heading(-PI), PI);
        assert_approx_eq!(wrap_heading(3.0 * PI), PI, 1e-12);
        assert_approx_eq!(wrap_heading(-3.0 * PI), PI, 1e-12);
        assert_eq!(wrap_heading(0.0), 0.0);
    }
    #[test]
    fn test_heading_difference_across_wrap() {
        assert_approx_eq!(heading_difference(PI - 0.1, -PI + 0.1), -0.2, 1e-12);
        assert_approx_eq!(heading_difference(-PI + 0.1, PI - 0.1), 0.2, 1e-12);
    }
    #[test]
    fn test_pose_new_wraps_heading() {
        let pose = Pose::new(0.0, 0.0, 5.0 * PI / 2.0);
        assert_approx_eq!(pose.theta, PI / 2.0, 1e-12);
    }
    #[test]
    fn test_vehicle_to_world_round_trip() {
        let pose = Pose::new(2.0, -1.0, 0.7);
        let (wx, wy) = pose.vehicle_to_world(3.0, -0.5);
        let (fx, fy) = pose.world_to_vehicle(wx, wy);
        assert_approx_eq!(fx, 3.0, 1e-12);
        assert_approx_eq!(fy, -0.5, 1e-12);
    }
    #[test]
    fn test_vehicle_to_world_axes() {
        // Facing +y: vehicle forward is world +y, vehicle left is world -x
        let pose = Pose::new(0.0, 0.0, PI / 2.0);
        let (wx, wy) = pose.vehicle_to_world(1.0, 0.0);
        assert_approx_eq!(wx, 0.0, 1e-12);
        assert_approx_eq!(wy, 1.0, 1e-12);
        let (wx, wy) = pose.vehicle_to_world(0.0, 1.0);
        assert_approx_eq!(wx, -1.0, 1e-12);
        assert_approx_eq!(wy, 0.0, 1e-12);
    }
    #[test]
    fn test_distance_to() {
        let pose = Pose::new(1.0, 1.0, 0.0);
        assert_approx_eq!(pose.distance_to(4.0, 5.0), 5.0, 1e-12);
    }
    #[test]
    fn test_odometry_delta_finite() {
        assert!(OdometryDelta::new(0.1, 1.0, -0.1).is_finite());
        assert!(!OdometryDelta::new(f64::NAN, 1.0, 0.0).is_finite());
        assert!(!OdometryDelta::new(0.0, f64::INFINITY, 0.0).is_finite());
    }
    #[test]
    fn test_odometry_delta_compares_by_value() {
        let delta = OdometryDelta::new(0.1, 1.0, -0.1);
        assert_eq!(delta, OdometryDelta::new(0.1, 1.0, -0.1));
        assert_ne!(delta, OdometryDelta::new(0.1, 1.5, -0.1));
    }
}
