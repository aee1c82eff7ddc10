//! Sensor-log records, result records, and the localization run loop.
//!
//! This module provides:
//! - A struct (`SensorRecord`) for reading and writing recorded odometry/range data
//!   to/from CSV files, and grouping it into per-timestep inputs
//! - `LocalizationResult` rows for storing and analyzing a localization run
//! - The `run_localization` driver that feeds a recorded log through a filter
//!
//! The log format is one CSV row per (timestep, observation). Rows sharing a timestep
//! repeat the same odometry delta; a timestep with odometry but no observations is a
//! single row with the measurement columns empty. Bearings are carried through even
//! though the range-only sensor model ignores them.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::OdometryDelta;
use crate::measurements::{RangeMeasurement, RangeScan};
use crate::particle::ParticleFilter;

/// Struct representing a single row of a sensor log CSV file.
///
/// Fields correspond to columns in the CSV. Each row carries the timestep's odometry
/// delta plus at most one range observation; multi-observation timesteps span several
/// rows with identical odometry columns.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SensorRecord {
    /// Timestep index, non-decreasing through the file
    pub timestep: u64,
    /// Odometry initial rotation in radians
    pub rot1: f64,
    /// Odometry translation in map units
    pub trans: f64,
    /// Odometry final rotation in radians
    pub rot2: f64,
    /// Observed landmark id; empty if the association is unknown or the row has no observation
    pub landmark_id: Option<u32>,
    /// Observed range in map units; empty if the row has no observation
    pub range: Option<f64>,
    /// Observed bearing in radians; optional and unused by the range-only model
    pub bearing: Option<f64>,
}
impl SensorRecord {
    /// Reads a CSV file and returns a vector of `SensorRecord` structs.
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file to read.
    ///
    /// # Returns
    /// * `Ok(Vec<SensorRecord>)` if successful.
    /// * `Err` if the file cannot be read or parsed.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }
    /// Writes a vector of SensorRecord structs to a CSV file.
    ///
    /// # Arguments
    /// * `records` - Records to write
    /// * `path` - Path where the CSV file will be saved
    pub fn to_csv<P: AsRef<Path>>(
        records: &[Self],
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// One timestep's filter input: the odometry delta plus the range scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimestepData {
    /// Timestep index from the log
    pub timestep: u64,
    /// Odometry delta for this timestep
    pub delta: OdometryDelta,
    /// Range observations for this timestep; may be empty
    pub scan: RangeScan,
}
impl TimestepData {
    /// Expand this timestep back into log rows. A timestep without observations
    /// becomes a single row with empty measurement columns.
    pub fn to_records(&self) -> Vec<SensorRecord> {
        if self.scan.is_empty() {
            return vec![SensorRecord {
                timestep: self.timestep,
                rot1: self.delta.rot1,
                trans: self.delta.trans,
                rot2: self.delta.rot2,
                landmark_id: None,
                range: None,
                bearing: None,
            }];
        }
        self.scan
            .measurements
            .iter()
            .map(|measurement| SensorRecord {
                timestep: self.timestep,
                rot1: self.delta.rot1,
                trans: self.delta.trans,
                rot2: self.delta.rot2,
                landmark_id: measurement.landmark_id,
                range: Some(measurement.range),
                bearing: measurement.bearing,
            })
            .collect()
    }
}

/// Group log rows into per-timestep filter inputs.
///
/// Rows are grouped by consecutive equal `timestep` values; the odometry delta is
/// taken from the first row of each group. Rows with an empty `range` column
/// contribute no observation.
pub fn group_records(records: &[SensorRecord]) -> Vec<TimestepData> {
    let mut timesteps: Vec<TimestepData> = Vec::new();
    for record in records {
        let start_new = timesteps
            .last()
            .is_none_or(|current| current.timestep != record.timestep);
        if start_new {
            timesteps.push(TimestepData {
                timestep: record.timestep,
                delta: OdometryDelta::new(record.rot1, record.trans, record.rot2),
                scan: RangeScan::empty(),
            });
        }
        if let (Some(current), Some(range)) = (timesteps.last_mut(), record.range) {
            current.scan.measurements.push(RangeMeasurement {
                landmark_id: record.landmark_id,
                range,
                bearing: record.bearing,
            });
        }
    }
    timesteps
}

/// One row of a localization run's output.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LocalizationResult {
    /// Timestep index from the log
    pub timestep: u64,
    /// Estimated x coordinate
    pub x: f64,
    /// Estimated y coordinate
    pub y: f64,
    /// Estimated heading in radians
    pub theta: f64,
    /// Effective sample size before resampling
    pub effective_sample_size: f64,
    /// Cumulative count of degenerate-weight recoveries
    pub degenerate_resets: u64,
}
impl LocalizationResult {
    /// Writes a vector of results to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(
        results: &[Self],
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_path(path)?;
        for result in results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Reads results back from a CSV file previously written by
    /// [LocalizationResult::to_csv].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut results = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            results.push(record);
        }
        Ok(results)
    }
}

/// Feed a recorded log through the filter one timestep at a time.
///
/// Each timestep runs the full cycle (predict, weight, normalize, estimate,
/// resample); normalization is skipped on timesteps with no valid observations
/// so the weights pass through exactly, and the effective sample size is
/// recorded from the normalized weights before resampling resets them.
///
/// # Arguments
/// * `filter` - An initialized filter; consumed timestep by timestep.
/// * `timesteps` - Per-timestep inputs, typically from [group_records].
///
/// # Returns
/// * One [LocalizationResult] per timestep, in order.
pub fn run_localization(
    filter: &mut ParticleFilter,
    timesteps: &[TimestepData],
) -> Vec<LocalizationResult> {
    let mut results = Vec::with_capacity(timesteps.len());
    for data in timesteps {
        filter.predict(data.delta);
        if filter.reweight(&data.scan) {
            filter.normalize_weights();
        }
        let estimate = filter.estimate();
        let effective_sample_size = filter.effective_sample_size();
        filter.resample();
        debug!(
            "timestep {}: estimate {} (ESS {:.1})",
            data.timestep, estimate, effective_sample_size
        );
        results.push(LocalizationResult {
            timestep: data.timestep,
            x: estimate.x,
            y: estimate.y,
            theta: estimate.theta,
            effective_sample_size,
            degenerate_resets: filter.degenerate_resets(),
        });
    }
    info!(
        "processed {} timesteps ({} degenerate resets)",
        timesteps.len(),
        filter.degenerate_resets()
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<SensorRecord> {
        vec![
            SensorRecord {
                timestep: 0,
                rot1: 0.1,
                trans: 1.0,
                rot2: -0.1,
                landmark_id: Some(1),
                range: Some(2.5),
                bearing: Some(0.3),
            },
            SensorRecord {
                timestep: 0,
                rot1: 0.1,
                trans: 1.0,
                rot2: -0.1,
                landmark_id: Some(2),
                range: Some(4.0),
                bearing: None,
            },
            SensorRecord {
                timestep: 1,
                rot1: 0.0,
                trans: 0.5,
                rot2: 0.0,
                landmark_id: None,
                range: None,
                bearing: None,
            },
            SensorRecord {
                timestep: 2,
                rot1: 0.0,
                trans: 0.5,
                rot2: 0.0,
                landmark_id: None,
                range: Some(3.2),
                bearing: None,
            },
        ]
    }

    #[test]
    fn test_group_records() {
        let timesteps = group_records(&sample_records());
        assert_eq!(timesteps.len(), 3);
        assert_eq!(timesteps[0].scan.len(), 2);
        assert_eq!(timesteps[0].delta.trans, 1.0);
        assert!(timesteps[1].scan.is_empty());
        assert_eq!(timesteps[2].scan.len(), 1);
        assert_eq!(timesteps[2].scan.measurements[0].landmark_id, None);
    }
    #[test]
    fn test_timesteps_compare_by_value() {
        let a = group_records(&sample_records());
        let b = group_records(&sample_records());
        assert_eq!(a, b);
        let mut c = group_records(&sample_records());
        c[1].delta.trans = 0.75;
        assert_ne!(a, c);
    }
    #[test]
    fn test_records_round_trip_through_timesteps() {
        let records = sample_records();
        let timesteps = group_records(&records);
        let expanded: Vec<SensorRecord> =
            timesteps.iter().flat_map(|t| t.to_records()).collect();
        assert_eq!(expanded, records);
    }
    #[test]
    fn test_sensor_record_csv_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join("mcl_test_sensor_round_trip.csv");
        let records = sample_records();
        SensorRecord::to_csv(&records, &path).unwrap();
        let loaded = SensorRecord::from_csv(&path).unwrap();
        assert_eq!(loaded, records);
        std::fs::remove_file(&path).ok();
    }
    #[test]
    fn test_localization_result_csv_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join("mcl_test_result_round_trip.csv");
        let results = vec![
            LocalizationResult {
                timestep: 0,
                x: 1.0,
                y: 2.0,
                theta: 0.5,
                effective_sample_size: 87.5,
                degenerate_resets: 0,
            },
            LocalizationResult {
                timestep: 1,
                x: 1.5,
                y: 2.5,
                theta: 0.4,
                effective_sample_size: 92.0,
                degenerate_resets: 1,
            },
        ];
        LocalizationResult::to_csv(&results, &path).unwrap();
        let loaded = LocalizationResult::from_csv(&path).unwrap();
        assert_eq!(loaded, results);
        std::fs::remove_file(&path).ok();
    }
}
