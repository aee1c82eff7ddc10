//! Landmark map types and CSV loading.
//!
//! The map is an ordered collection of point landmarks with unique ids. It is loaded
//! once before the first timestep, validated, and never mutated afterwards; the filter
//! and any parallel workers share it through an [`std::sync::Arc`] handle rather than
//! copying it per particle.

use serde::{Deserialize, Serialize};

use std::path::Path;
use std::sync::Arc;

use crate::ConfigError;

/// A fixed point landmark on the map.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Landmark {
    /// Unique landmark id
    pub id: u32,
    /// Map-frame x coordinate
    pub x: f64,
    /// Map-frame y coordinate
    pub y: f64,
}

/// An immutable, ordered collection of landmarks with unique ids.
///
/// Constructed once per run through [LandmarkMap::new] or [LandmarkMap::from_csv];
/// both reject empty maps and duplicate ids up front so the per-timestep loop never
/// has to re-validate.
#[derive(Clone, Debug)]
pub struct LandmarkMap {
    landmarks: Vec<Landmark>,
}
impl LandmarkMap {
    /// Build a map from a list of landmarks, validating it.
    ///
    /// # Arguments
    /// * `landmarks` - The landmarks, in any order. Order is preserved.
    ///
    /// # Returns
    /// * `Ok(LandmarkMap)` if the list is non-empty with unique ids.
    /// * `Err(ConfigError)` otherwise.
    ///
    /// # Example
    /// ```rust
    /// use mcl::map::{Landmark, LandmarkMap};
    ///
    /// let map = LandmarkMap::new(vec![
    ///     Landmark { id: 1, x: 2.0, y: 1.0 },
    ///     Landmark { id: 2, x: 0.0, y: 4.0 },
    /// ]).unwrap();
    /// assert_eq!(map.len(), 2);
    /// ```
    pub fn new(landmarks: Vec<Landmark>) -> Result<LandmarkMap, ConfigError> {
        if landmarks.is_empty() {
            return Err(ConfigError::EmptyMap);
        }
        for (i, landmark) in landmarks.iter().enumerate() {
            if landmarks[..i].iter().any(|other| other.id == landmark.id) {
                return Err(ConfigError::DuplicateLandmark(landmark.id));
            }
        }
        Ok(LandmarkMap { landmarks })
    }
    /// Read a landmark map from a CSV file with columns `id,x,y`.
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file to read.
    ///
    /// # Returns
    /// * `Ok(LandmarkMap)` if the file parses and validates.
    /// * `Err` if the file cannot be read, parsed, or fails map validation.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<LandmarkMap, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let landmark: Landmark = result?;
            landmarks.push(landmark);
        }
        Ok(LandmarkMap::new(landmarks)?)
    }
    /// Write the map to a CSV file with columns `id,x,y`.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_path(path)?;
        for landmark in &self.landmarks {
            writer.serialize(landmark)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Look up a landmark by id.
    pub fn get(&self, id: u32) -> Option<&Landmark> {
        self.landmarks.iter().find(|landmark| landmark.id == id)
    }
    /// All landmarks in load order.
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
    /// Number of landmarks in the map.
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    /// Whether the map is empty. Always false for a validated map; provided for
    /// completeness alongside [LandmarkMap::len].
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    /// Wrap the map in a shared read-only handle for the filter and its workers.
    pub fn shared(self) -> Arc<LandmarkMap> {
        Arc::new(self)
    }
    /// Axis-aligned bounding box of the landmarks, padded by `margin` on every side.
    ///
    /// Useful as a default initialization region for global localization when no
    /// explicit map limits are known.
    pub fn bounding_limits(&self, margin: f64) -> MapLimits {
        let mut x_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        let mut y_min = f64::INFINITY;
        let mut y_max = f64::NEG_INFINITY;
        for landmark in &self.landmarks {
            x_min = x_min.min(landmark.x);
            x_max = x_max.max(landmark.x);
            y_min = y_min.min(landmark.y);
            y_max = y_max.max(landmark.y);
        }
        MapLimits {
            x_min: x_min - margin,
            x_max: x_max + margin,
            y_min: y_min - margin,
            y_max: y_max + margin,
        }
    }
}

/// Rectangular region of the map used to initialize particles for global localization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapLimits {
    /// Minimum x coordinate
    pub x_min: f64,
    /// Maximum x coordinate
    pub x_max: f64,
    /// Minimum y coordinate
    pub y_min: f64,
    /// Maximum y coordinate
    pub y_max: f64,
}
impl MapLimits {
    /// Create map limits, validating that the region has positive extent.
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Result<MapLimits, ConfigError> {
        if !(x_min < x_max && y_min < y_max) {
            return Err(ConfigError::InvalidLimits);
        }
        Ok(MapLimits {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }
    /// Whether a point lies inside the region (inclusive of the boundary).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_landmarks() -> Vec<Landmark> {
        vec![
            Landmark {
                id: 1,
                x: 2.0,
                y: 1.0,
            },
            Landmark {
                id: 2,
                x: 0.0,
                y: 4.0,
            },
            Landmark {
                id: 3,
                x: 5.0,
                y: 5.0,
            },
        ]
    }

    #[test]
    fn test_map_construction_and_lookup() {
        let map = LandmarkMap::new(three_landmarks()).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(2).unwrap().y, 4.0);
        assert!(map.get(99).is_none());
    }
    #[test]
    fn test_empty_map_rejected() {
        let result = LandmarkMap::new(Vec::new());
        assert!(matches!(result, Err(ConfigError::EmptyMap)));
    }
    #[test]
    fn test_duplicate_id_rejected() {
        let mut landmarks = three_landmarks();
        landmarks.push(Landmark {
            id: 2,
            x: 9.0,
            y: 9.0,
        });
        let result = LandmarkMap::new(landmarks);
        assert!(matches!(result, Err(ConfigError::DuplicateLandmark(2))));
    }
    #[test]
    fn test_bounding_limits() {
        let map = LandmarkMap::new(three_landmarks()).unwrap();
        let limits = map.bounding_limits(1.0);
        assert_eq!(limits.x_min, -1.0);
        assert_eq!(limits.x_max, 6.0);
        assert_eq!(limits.y_min, 0.0);
        assert_eq!(limits.y_max, 6.0);
        assert!(limits.contains(0.0, 3.0));
        assert!(!limits.contains(7.0, 3.0));
    }
    #[test]
    fn test_invalid_limits_rejected() {
        assert!(matches!(
            MapLimits::new(1.0, 1.0, 0.0, 2.0),
            Err(ConfigError::InvalidLimits)
        ));
        assert!(MapLimits::new(-1.0, 12.0, 0.0, 10.0).is_ok());
    }
    #[test]
    fn test_csv_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join("mcl_test_map_round_trip.csv");
        let map = LandmarkMap::new(three_landmarks()).unwrap();
        map.to_csv(&path).unwrap();
        let loaded = LandmarkMap::from_csv(&path).unwrap();
        assert_eq!(loaded.landmarks(), map.landmarks());
        std::fs::remove_file(&path).ok();
    }
}
