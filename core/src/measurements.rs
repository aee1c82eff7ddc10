//! Range sensor model and landmark data association.
//!
//! The sensor is range-only: each observation is a distance to some landmark, optionally
//! tagged with the landmark's id. For a candidate pose, the model predicts the range to
//! each (associated) landmark and scores the observation with a Gaussian likelihood on
//! the range residual. Per-observation likelihoods are combined as a product under an
//! independence assumption; accumulation happens in log space before the final `exp` to
//! limit premature underflow. The scoring function is read-only over the shared map, so
//! the weighting pass can run on a worker pool without synchronization.

use log::warn;

use std::sync::Arc;

use crate::map::{Landmark, LandmarkMap};
use crate::{ConfigError, Pose};

/// Default range measurement noise standard deviation, in map units.
pub const DEFAULT_RANGE_STD: f64 = 0.2;

/// One observed range, optionally tagged with the landmark it came from.
///
/// Sensor logs may also carry a bearing per observation; the range-only model ignores
/// it, but it is preserved here so logs round-trip without loss.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeMeasurement {
    /// Id of the observed landmark, if the sensor provides an association.
    /// `None` means the association must be inferred from the range itself.
    pub landmark_id: Option<u32>,
    /// Observed range in map units, non-negative after sanitization
    pub range: f64,
    /// Observed bearing in radians, carried but unused by the range-only model
    pub bearing: Option<f64>,
}
impl RangeMeasurement {
    /// Create a range measurement with a known landmark association.
    pub fn with_id(landmark_id: u32, range: f64) -> RangeMeasurement {
        RangeMeasurement {
            landmark_id: Some(landmark_id),
            range,
            bearing: None,
        }
    }
    /// Create a range measurement with no landmark association.
    pub fn unassociated(range: f64) -> RangeMeasurement {
        RangeMeasurement {
            landmark_id: None,
            range,
            bearing: None,
        }
    }
}

/// The set of range observations collected at one timestep. May be empty, in which
/// case the weighting pass leaves the particle distribution unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RangeScan {
    /// Observations in sensor order
    pub measurements: Vec<RangeMeasurement>,
}
impl RangeScan {
    /// Create a scan from a list of observations.
    pub fn new(measurements: Vec<RangeMeasurement>) -> RangeScan {
        RangeScan { measurements }
    }
    /// An empty scan (no observations this timestep).
    pub fn empty() -> RangeScan {
        RangeScan::default()
    }
    /// Number of observations in the scan.
    pub fn len(&self) -> usize {
        self.measurements.len()
    }
    /// Whether the scan contains no observations.
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}
impl From<Vec<RangeMeasurement>> for RangeScan {
    fn from(measurements: Vec<RangeMeasurement>) -> Self {
        RangeScan { measurements }
    }
}

/// Range-only landmark sensor model.
///
/// Holds a shared handle to the landmark map and the range noise standard deviation.
/// Scoring ([RangeSensorModel::likelihood]) is a pure function of the candidate pose
/// and a sanitized scan, which is what allows the filter to evaluate all particles in
/// parallel against the same scan.
#[derive(Clone, Debug)]
pub struct RangeSensorModel {
    map: Arc<LandmarkMap>,
    range_std: f64,
}
impl RangeSensorModel {
    /// Create a sensor model.
    ///
    /// # Arguments
    /// * `map` - Shared landmark map; guaranteed non-empty by construction.
    /// * `range_std` - Range noise standard deviation, strictly positive.
    ///
    /// # Returns
    /// * `Ok(RangeSensorModel)` on valid configuration.
    /// * `Err(ConfigError)` if `range_std` is not strictly positive and finite.
    pub fn new(map: Arc<LandmarkMap>, range_std: f64) -> Result<RangeSensorModel, ConfigError> {
        if !(range_std > 0.0 && range_std.is_finite()) {
            return Err(ConfigError::NonPositiveNoise("range_std", range_std));
        }
        Ok(RangeSensorModel { map, range_std })
    }
    /// The configured range noise standard deviation.
    pub fn range_std(&self) -> f64 {
        self.range_std
    }
    /// The shared landmark map.
    pub fn map(&self) -> &Arc<LandmarkMap> {
        &self.map
    }
    /// Range the sensor would report for `landmark` if the robot were at `pose`,
    /// noise-free.
    pub fn predicted_range(&self, pose: &Pose, landmark: &Landmark) -> f64 {
        pose.distance_to(landmark.x, landmark.y)
    }
    /// Associate an untagged observed range to a landmark by nearest predicted range.
    ///
    /// Each observation is associated independently; two observations in one scan may
    /// associate to the same landmark.
    ///
    /// # Arguments
    /// * `pose` - The candidate pose the association is evaluated from.
    /// * `observed_range` - The observed range to match.
    ///
    /// # Returns
    /// * The landmark whose predicted range from `pose` is closest to the observation.
    pub fn associate(&self, pose: &Pose, observed_range: f64) -> &Landmark {
        let mut best = &self.map.landmarks()[0];
        let mut best_error = (self.predicted_range(pose, best) - observed_range).abs();
        for landmark in &self.map.landmarks()[1..] {
            let error = (self.predicted_range(pose, landmark) - observed_range).abs();
            if error < best_error {
                best = landmark;
                best_error = error;
            }
        }
        best
    }
    /// Drop malformed observations from a scan before weighting.
    ///
    /// Rejects negative or non-finite ranges and known ids that are absent from the
    /// map, logging a warning for each. Rejection applies to the single observation,
    /// not the whole timestep; the surviving observations are still scored.
    pub fn sanitize(&self, scan: &RangeScan) -> RangeScan {
        let mut kept = Vec::with_capacity(scan.len());
        for measurement in &scan.measurements {
            if !(measurement.range.is_finite() && measurement.range >= 0.0) {
                warn!(
                    "dropping measurement with invalid range {}",
                    measurement.range
                );
                continue;
            }
            if let Some(id) = measurement.landmark_id
                && self.map.get(id).is_none()
            {
                warn!("dropping measurement for unknown landmark id {id}");
                continue;
            }
            kept.push(*measurement);
        }
        RangeScan::new(kept)
    }
    /// Unnormalized likelihood of observing `scan` from `pose`.
    ///
    /// Per-observation likelihood is the Gaussian PDF of the range residual with
    /// standard deviation [RangeSensorModel::range_std]; the total is the product
    /// across observations, accumulated in log space. An empty scan scores 1.0 for
    /// every pose, leaving the particle distribution unchanged after normalization.
    /// The result may underflow to 0.0 when every observation is far from its
    /// prediction; the filter's normalization step recovers that case.
    ///
    /// # Arguments
    /// * `pose` - Candidate pose to score.
    /// * `scan` - Sanitized observations (see [RangeSensorModel::sanitize]).
    ///
    /// # Returns
    /// * A non-negative unnormalized likelihood.
    pub fn likelihood(&self, pose: &Pose, scan: &RangeScan) -> f64 {
        let mut log_likelihood = 0.0;
        for measurement in &scan.measurements {
            let landmark = match measurement.landmark_id {
                Some(id) => match self.map.get(id) {
                    Some(landmark) => landmark,
                    // Unknown ids are removed by sanitize; skip if one slips through
                    None => continue,
                },
                None => self.associate(pose, measurement.range),
            };
            let residual = measurement.range - self.predicted_range(pose, landmark);
            log_likelihood += log_normal_pdf(residual, self.range_std);
        }
        log_likelihood.exp()
    }
}

/// Log of the zero-mean Gaussian PDF evaluated at `x` with standard deviation `sd`.
fn log_normal_pdf(x: f64, sd: f64) -> f64 {
    let normalized = x / sd;
    -0.5 * normalized.powi(2) - sd.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn model() -> RangeSensorModel {
        let map = LandmarkMap::new(vec![
            Landmark {
                id: 1,
                x: 2.0,
                y: 0.0,
            },
            Landmark {
                id: 2,
                x: 0.0,
                y: 4.0,
            },
            Landmark {
                id: 3,
                x: 6.0,
                y: 6.0,
            },
        ])
        .unwrap();
        RangeSensorModel::new(map.shared(), DEFAULT_RANGE_STD).unwrap()
    }

    #[test]
    fn test_empty_scan_scores_one() {
        let model = model();
        let pose = Pose::new(1.0, 1.0, 0.0);
        assert_eq!(model.likelihood(&pose, &RangeScan::empty()), 1.0);
    }
    #[test]
    fn test_likelihood_peaks_at_true_range() {
        let model = model();
        let pose = Pose::new(0.0, 0.0, 0.0);
        // True range to landmark 1 is 2.0
        let exact =
            model.likelihood(&pose, &RangeScan::new(vec![RangeMeasurement::with_id(1, 2.0)]));
        let off =
            model.likelihood(&pose, &RangeScan::new(vec![RangeMeasurement::with_id(1, 2.5)]));
        assert!(exact > off);
        // Peak value is the Gaussian PDF at zero residual
        let peak = 1.0 / (DEFAULT_RANGE_STD * (2.0 * std::f64::consts::PI).sqrt());
        assert_approx_eq!(exact, peak, 1e-9);
    }
    #[test]
    fn test_likelihood_is_product_across_observations() {
        let model = model();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let first = RangeMeasurement::with_id(1, 2.1);
        let second = RangeMeasurement::with_id(2, 3.8);
        let separate = model.likelihood(&pose, &RangeScan::new(vec![first]))
            * model.likelihood(&pose, &RangeScan::new(vec![second]));
        let joint = model.likelihood(&pose, &RangeScan::new(vec![first, second]));
        assert_approx_eq!(joint, separate, 1e-12);
    }
    #[test]
    fn test_nearest_neighbor_association() {
        let model = model();
        let pose = Pose::new(0.0, 0.0, 0.0);
        // Predicted ranges: landmark 1 -> 2.0, landmark 2 -> 4.0, landmark 3 -> ~8.49
        assert_eq!(model.associate(&pose, 2.2).id, 1);
        assert_eq!(model.associate(&pose, 3.9).id, 2);
        assert_eq!(model.associate(&pose, 9.0).id, 3);
    }
    #[test]
    fn test_unassociated_scan_scores_like_associated_when_unambiguous() {
        let model = model();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let tagged =
            model.likelihood(&pose, &RangeScan::new(vec![RangeMeasurement::with_id(1, 2.1)]));
        let untagged = model.likelihood(
            &pose,
            &RangeScan::new(vec![RangeMeasurement::unassociated(2.1)]),
        );
        assert_approx_eq!(tagged, untagged, 1e-12);
    }
    #[test]
    fn test_sanitize_drops_malformed_observations() {
        let model = model();
        let scan = RangeScan::new(vec![
            RangeMeasurement::with_id(1, 2.0),
            RangeMeasurement::with_id(1, -1.0),
            RangeMeasurement::unassociated(f64::NAN),
            RangeMeasurement::with_id(42, 3.0),
        ]);
        let clean = model.sanitize(&scan);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean.measurements[0], RangeMeasurement::with_id(1, 2.0));
    }
    #[test]
    fn test_far_observations_underflow_to_zero() {
        let model = model();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let scan = RangeScan::new(vec![RangeMeasurement::with_id(1, 1e6)]);
        assert_eq!(model.likelihood(&pose, &scan), 0.0);
    }
    #[test]
    fn test_non_positive_range_std_rejected() {
        let map = LandmarkMap::new(vec![Landmark {
            id: 1,
            x: 0.0,
            y: 0.0,
        }])
        .unwrap();
        assert!(matches!(
            RangeSensorModel::new(map.shared(), 0.0),
            Err(ConfigError::NonPositiveNoise("range_std", _))
        ));
    }
}
