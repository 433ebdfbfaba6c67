//! # Aggregation Module
//!
//! Derives display values from a history [`Snapshot`].
//!
//! Every function here works on a snapshot, never on the live history, so
//! aggregation can take as long as it needs without stalling ingestion.
//! Everything is recomputed per query; there are no running totals to drift.
//!
//! ## Invalid values
//!
//! A record whose value (or time) does not parse for its kind stays in the
//! history but is skipped by every aggregator here and counted as rejected.
//! A kind with no valid records yields `None` or an empty series, never a
//! zero that could be mistaken for a real reading.
//!
//! ## Usage
//!
//! ```
//! use payload_station::aggregate;
//! use payload_station::frame::protocol::{SensorKind, TelemetryRecord};
//! use payload_station::history::Snapshot;
//!
//! let snapshot = Snapshot::from_records([
//!     TelemetryRecord::new("2024-01-01", "1", SensorKind::Gps, "10.0,20.0"),
//!     TelemetryRecord::new("2024-01-01", "2", SensorKind::Gps, "20.0,30.0"),
//! ]);
//!
//! let centroid = aggregate::centroid(&snapshot).unwrap();
//! assert_eq!((centroid.latitude, centroid.longitude), (15.0, 25.0));
//! assert_eq!(aggregate::latest_scalar(&snapshot, &SensorKind::Battery), None);
//! ```

pub mod dashboard;

use serde::Serialize;
use tracing::debug;

use crate::frame::protocol::{Attitude, GpsFix, SensorKind, SensorReading, TelemetryRecord};
use crate::history::Snapshot;

pub use dashboard::Dashboard;

/// Ordered `(time, value)` points of one kind, plus how many records were skipped
#[derive(Debug, Clone, PartialEq)]
pub struct Series<T> {
    /// Points in arrival order; time in seconds
    pub points: Vec<(f64, T)>,

    /// Records of the kind that failed to coerce
    pub rejected: usize,
}

impl<T> Default for Series<T> {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            rejected: 0,
        }
    }
}

impl<T> Series<T> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Mean GPS position over a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub latitude: f64,
    pub longitude: f64,

    /// Number of valid fixes averaged
    pub fixes: usize,
}

/// Gyroscope angles formatted for display; empty strings when no data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttitudeDisplay {
    pub yaw: String,
    pub pitch: String,
    pub roll: String,
}

impl From<Attitude> for AttitudeDisplay {
    fn from(attitude: Attitude) -> Self {
        Self {
            yaw: format!("{:.2}", attitude.yaw),
            pitch: format!("{:.2}", attitude.pitch),
            roll: format!("{:.2}", attitude.roll),
        }
    }
}

/// Date and time of a record, as sent by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureTime {
    pub date: String,
    pub time: String,
}

/// Latest valid reading of a kind.
///
/// Invalid trailing records are skipped, so this is the newest record that
/// actually decodes. Unknown kinds always yield `None`.
pub fn latest(snapshot: &Snapshot, kind: &SensorKind) -> Option<SensorReading> {
    snapshot
        .filter_by_type(kind)
        .rev()
        .find_map(|record| record.reading().ok())
}

/// Latest valid value of a scalar kind (Temperature, Pressure, Battery)
pub fn latest_scalar(snapshot: &Snapshot, kind: &SensorKind) -> Option<f64> {
    latest(snapshot, kind).and_then(|reading| reading.as_scalar())
}

/// Latest valid GPS fix
pub fn latest_fix(snapshot: &Snapshot) -> Option<GpsFix> {
    match latest(snapshot, &SensorKind::Gps)? {
        SensorReading::Position(fix) => Some(fix),
        _ => None,
    }
}

/// Latest gyroscope attitude, each angle to two decimal places
pub fn latest_attitude(snapshot: &Snapshot) -> AttitudeDisplay {
    match latest(snapshot, &SensorKind::Gyroscope) {
        Some(SensorReading::Attitude(attitude)) => attitude.into(),
        _ => AttitudeDisplay::default(),
    }
}

/// Time series of a kind with values decoded.
///
/// A record whose time or value fails to coerce is left out and counted in
/// [`Series::rejected`]; the rest of the series is unaffected.
pub fn series(snapshot: &Snapshot, kind: &SensorKind) -> Series<SensorReading> {
    let mut series = Series::default();

    if let SensorKind::Other(_) = kind {
        return series;
    }

    for record in snapshot.filter_by_type(kind) {
        match coerce(record) {
            Some(point) => series.points.push(point),
            None => series.rejected += 1,
        }
    }

    series
}

/// Time series of a scalar kind as plain numbers
pub fn scalar_series(snapshot: &Snapshot, kind: &SensorKind) -> Series<f64> {
    let full = series(snapshot, kind);
    Series {
        points: full
            .points
            .into_iter()
            .filter_map(|(time, reading)| reading.as_scalar().map(|value| (time, value)))
            .collect(),
        rejected: full.rejected,
    }
}

/// Arithmetic mean of a scalar kind's valid values
pub fn mean(snapshot: &Snapshot, kind: &SensorKind) -> Option<f64> {
    let values: Vec<f64> = snapshot
        .filter_by_type(kind)
        .filter_map(|record| record.reading().ok())
        .filter_map(|reading| reading.as_scalar())
        .collect();

    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean latitude and mean longitude over every valid GPS record
pub fn centroid(snapshot: &Snapshot) -> Option<Centroid> {
    let mut latitude_sum = 0.0;
    let mut longitude_sum = 0.0;
    let mut fixes = 0usize;

    for record in snapshot.filter_by_type(&SensorKind::Gps) {
        if let Ok(SensorReading::Position(fix)) = record.reading() {
            latitude_sum += fix.latitude;
            longitude_sum += fix.longitude;
            fixes += 1;
        }
    }

    if fixes == 0 {
        return None;
    }

    Some(Centroid {
        latitude: latitude_sum / fixes as f64,
        longitude: longitude_sum / fixes as f64,
        fixes,
    })
}

/// Date and time of the most recent record of any kind
pub fn now(snapshot: &Snapshot) -> Option<CaptureTime> {
    snapshot.last().map(|record| CaptureTime {
        date: record.captured_date.clone(),
        time: record.captured_time.clone(),
    })
}

/// Records of known kinds whose time or value fails to coerce
pub fn coercion_errors(snapshot: &Snapshot) -> usize {
    snapshot
        .iter()
        .filter(|record| !matches!(record.sensor_type, SensorKind::Other(_)))
        .filter(|record| coerce(record).is_none())
        .count()
}

fn coerce(record: &TelemetryRecord) -> Option<(f64, SensorReading)> {
    let result = record
        .time_seconds()
        .and_then(|time| record.reading().map(|reading| (time, reading)));

    match result {
        Ok(point) => Some(point),
        Err(e) => {
            debug!("Skipping record at {} {}: {}", record.captured_date, record.captured_time, e);
            None
        }
    }
}

/// Render an optional reading for display, `"unknown"` when absent
pub fn display_scalar(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.2}", value),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(time: &str, kind: SensorKind, value: &str) -> TelemetryRecord {
        TelemetryRecord::new("2024-01-01", time, kind, value)
    }

    #[test]
    fn test_temperature_latest_and_series() {
        let snapshot = Snapshot::from_records([
            rec("5", SensorKind::Temperature, "21.5"),
            rec("6", SensorKind::Temperature, "22.0"),
        ]);

        assert_eq!(latest_scalar(&snapshot, &SensorKind::Temperature), Some(22.0));

        let series = scalar_series(&snapshot, &SensorKind::Temperature);
        assert_eq!(series.points, vec![(5.0, 21.5), (6.0, 22.0)]);
        assert_eq!(series.rejected, 0);
    }

    #[test]
    fn test_empty_kind_is_absent_not_zero() {
        let snapshot = Snapshot::from_records([rec("5", SensorKind::Temperature, "21.5")]);

        assert_eq!(latest_scalar(&snapshot, &SensorKind::Battery), None);
        assert_eq!(mean(&snapshot, &SensorKind::Battery), None);
        assert!(series(&snapshot, &SensorKind::Battery).is_empty());
        assert_eq!(display_scalar(None), "unknown");
    }

    #[test]
    fn test_gps_centroid() {
        let snapshot = Snapshot::from_records([
            rec("1", SensorKind::Gps, "10.0,20.0"),
            rec("2", SensorKind::Gps, "20.0,30.0"),
        ]);

        let centroid = centroid(&snapshot).unwrap();
        assert_eq!(centroid.latitude, 15.0);
        assert_eq!(centroid.longitude, 25.0);
        assert_eq!(centroid.fixes, 2);
    }

    #[test]
    fn test_malformed_gps_excluded_but_kept_in_history() {
        let snapshot = Snapshot::from_records([
            rec("1", SensorKind::Gps, "10.0,20.0"),
            rec("2", SensorKind::Gps, "10.0"),
            rec("3", SensorKind::Gps, "20.0,30.0"),
        ]);

        let gps = series(&snapshot, &SensorKind::Gps);
        assert_eq!(gps.len(), 2);
        assert_eq!(gps.rejected, 1);

        let centroid = centroid(&snapshot).unwrap();
        assert_eq!((centroid.latitude, centroid.longitude), (15.0, 25.0));

        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.iter().any(|record| record.raw_value == "10.0"));
    }

    #[test]
    fn test_no_gps_centroid_is_absent() {
        assert_eq!(centroid(&Snapshot::default()), None);
        assert_eq!(latest_fix(&Snapshot::default()), None);
    }

    #[test]
    fn test_latest_skips_invalid_tail() {
        let snapshot = Snapshot::from_records([
            rec("1", SensorKind::Pressure, "1013.2"),
            rec("2", SensorKind::Pressure, "oops"),
        ]);
        assert_eq!(latest_scalar(&snapshot, &SensorKind::Pressure), Some(1013.2));
    }

    #[test]
    fn test_non_numeric_time_rejected_from_series() {
        let snapshot = Snapshot::from_records([
            rec("abc", SensorKind::Temperature, "21.5"),
            rec("6", SensorKind::Temperature, "22.0"),
        ]);

        let series = scalar_series(&snapshot, &SensorKind::Temperature);
        assert_eq!(series.points, vec![(6.0, 22.0)]);
        assert_eq!(series.rejected, 1);
    }

    #[test]
    fn test_pressure_series_uses_pressure_records_only() {
        let snapshot = Snapshot::from_records([
            rec("1", SensorKind::Temperature, "21.5"),
            rec("2", SensorKind::Pressure, "1013.2"),
        ]);

        let series = scalar_series(&snapshot, &SensorKind::Pressure);
        assert_eq!(series.points, vec![(2.0, 1013.2)]);
    }

    #[test]
    fn test_mean() {
        let snapshot = Snapshot::from_records([
            rec("1", SensorKind::Temperature, "20.0"),
            rec("2", SensorKind::Temperature, "bad"),
            rec("3", SensorKind::Temperature, "22.0"),
        ]);
        assert_eq!(mean(&snapshot, &SensorKind::Temperature), Some(21.0));
    }

    #[test]
    fn test_latest_attitude_formatting() {
        let snapshot = Snapshot::from_records([rec("1", SensorKind::Gyroscope, "1.005,-20.5,3")]);
        let attitude = latest_attitude(&snapshot);
        assert_eq!(attitude.pitch, "-20.50");
        assert_eq!(attitude.roll, "3.00");

        assert_eq!(latest_attitude(&Snapshot::default()), AttitudeDisplay::default());
    }

    #[test]
    fn test_now_uses_latest_record_of_any_kind() {
        let snapshot = Snapshot::from_records([
            rec("1", SensorKind::Temperature, "20.0"),
            TelemetryRecord::new("2024-01-02", "9", SensorKind::Other("Humidity".to_string()), "40"),
        ]);

        let now = now(&snapshot).unwrap();
        assert_eq!(now.date, "2024-01-02");
        assert_eq!(now.time, "9");
        assert_eq!(super::now(&Snapshot::default()), None);
    }

    #[test]
    fn test_unknown_kind_is_opaque_and_not_counted() {
        let humidity = SensorKind::Other("Humidity".to_string());
        let snapshot = Snapshot::from_records([rec("1", humidity.clone(), "40")]);

        assert!(series(&snapshot, &humidity).is_empty());
        assert_eq!(latest(&snapshot, &humidity), None);
        assert_eq!(coercion_errors(&snapshot), 0);
    }

    #[test]
    fn test_coercion_error_count() {
        let snapshot = Snapshot::from_records([
            rec("1", SensorKind::Gps, "10.0"),
            rec("2", SensorKind::Gyroscope, "1,2"),
            rec("3", SensorKind::Battery, "3.9"),
        ]);
        assert_eq!(coercion_errors(&snapshot), 2);
    }
}
