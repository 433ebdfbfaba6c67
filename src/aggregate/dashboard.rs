//! Per-tick view handed to the external renderer.

use std::fs;
use std::path::Path;

use serde::Serialize;

use super::*;
use crate::error::Result;

/// Everything the display needs, computed from a single snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// Total records in history
    pub records: usize,

    /// Capture date/time of the most recent record
    pub now: Option<CaptureTime>,

    pub temperature: Option<f64>,
    pub temperature_mean: Option<f64>,
    pub pressure: Option<f64>,
    pub battery: Option<f64>,

    /// Battery for display: two decimals or `"unknown"`
    pub battery_label: String,

    pub gps: Option<GpsFix>,
    pub centroid: Option<Centroid>,
    pub attitude: AttitudeDisplay,

    /// Records kept in history but excluded from aggregation
    pub coercion_errors: usize,

    /// Frames the decoder dropped before they reached history
    pub frames_dropped: u64,
}

impl Dashboard {
    /// Build the view from one snapshot so every field is mutually consistent
    pub fn build(snapshot: &Snapshot, frames_dropped: u64) -> Self {
        let battery = latest_scalar(snapshot, &SensorKind::Battery);

        Self {
            records: snapshot.len(),
            now: now(snapshot),
            temperature: latest_scalar(snapshot, &SensorKind::Temperature),
            temperature_mean: mean(snapshot, &SensorKind::Temperature),
            pressure: latest_scalar(snapshot, &SensorKind::Pressure),
            battery,
            battery_label: display_scalar(battery),
            gps: latest_fix(snapshot),
            centroid: centroid(snapshot),
            attitude: latest_attitude(snapshot),
            coercion_errors: coercion_errors(snapshot),
            frames_dropped,
        }
    }

    /// Write the view as JSON, replacing the file atomically
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written or renamed.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
