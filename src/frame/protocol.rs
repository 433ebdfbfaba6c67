//! # Telemetry Protocol Constants and Types
//!
//! Core definitions for the line-oriented payload link.
//!
//! A frame is four newline-terminated UTF-8 lines, in this order:
//!
//! ```text
//! 2024-01-01        date
//! 5                 time (seconds, text-encoded)
//! GPS               sensor tag
//! 10.0,20.0         value (kind-dependent)
//! ```
//!
//! There is no start marker, length or checksum. Framing is purely
//! positional, so one dropped or injected line shifts every later frame.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, StationError};

/// Number of lines in one telemetry frame
pub const FRAME_LINE_COUNT: usize = 4;

/// Separator between fields of a multi-valued reading and of a command
pub const FIELD_SEPARATOR: char = ',';

/// Fields in a GPS value (`lat,lon`)
pub const GPS_FIELD_COUNT: usize = 2;

/// Fields in a gyroscope value (`yaw,pitch,roll`)
pub const GYROSCOPE_FIELD_COUNT: usize = 3;

/// Sensor category a record belongs to.
///
/// Unknown tags are kept verbatim in [`SensorKind::Other`] so the record
/// survives in history, but aggregators treat them as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorKind {
    Temperature,
    Pressure,
    Gps,
    Gyroscope,
    Battery,
    Other(String),
}

impl SensorKind {
    /// Every known kind, in persistence order.
    pub const KNOWN: [SensorKind; 5] = [
        SensorKind::Temperature,
        SensorKind::Pressure,
        SensorKind::Gps,
        SensorKind::Gyroscope,
        SensorKind::Battery,
    ];

    /// Map a wire tag to a kind. Matching is exact.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Temperature" => Self::Temperature,
            "Pressure" => Self::Pressure,
            "GPS" => Self::Gps,
            "Gyroscope" => Self::Gyroscope,
            "Battery" => Self::Battery,
            other => Self::Other(other.to_string()),
        }
    }

    /// The tag exactly as it appears on the wire.
    pub fn tag(&self) -> &str {
        match self {
            Self::Temperature => "Temperature",
            Self::Pressure => "Pressure",
            Self::Gps => "GPS",
            Self::Gyroscope => "Gyroscope",
            Self::Battery => "Battery",
            Self::Other(tag) => tag,
        }
    }

    /// Kinds whose value is a single number.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Temperature | Self::Pressure | Self::Battery)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for SensorKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// One decoded telemetry frame. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    /// Date line as sent by the device
    pub captured_date: String,

    /// Time line, numeric seconds kept as text
    pub captured_time: String,

    /// Sensor kind parsed from the tag line
    pub sensor_type: SensorKind,

    /// Value line, unparsed
    pub raw_value: String,
}

impl TelemetryRecord {
    pub fn new(
        captured_date: impl Into<String>,
        captured_time: impl Into<String>,
        sensor_type: SensorKind,
        raw_value: impl Into<String>,
    ) -> Self {
        Self {
            captured_date: captured_date.into(),
            captured_time: captured_time.into(),
            sensor_type,
            raw_value: raw_value.into(),
        }
    }

    /// The record as the four durable columns `date,time,sensor_type,value`.
    pub fn columns(&self) -> [&str; 4] {
        [
            &self.captured_date,
            &self.captured_time,
            self.sensor_type.tag(),
            &self.raw_value,
        ]
    }

    /// Capture time as seconds.
    pub fn time_seconds(&self) -> Result<f64> {
        parse_number(&self.sensor_type, &self.captured_time)
    }

    /// Decode `raw_value` according to the record's kind.
    ///
    /// # Errors
    ///
    /// Returns `StationError::Coercion` if the value has the wrong arity,
    /// a field is not a finite number, or the kind is unknown.
    pub fn reading(&self) -> Result<SensorReading> {
        let kind = &self.sensor_type;
        match kind {
            SensorKind::Temperature | SensorKind::Pressure | SensorKind::Battery => {
                Ok(SensorReading::Scalar(parse_number(kind, &self.raw_value)?))
            }
            SensorKind::Gps => {
                let [latitude, longitude] = split_fields::<GPS_FIELD_COUNT>(kind, &self.raw_value)?;
                Ok(SensorReading::Position(GpsFix {
                    latitude,
                    longitude,
                    time: self.captured_time.clone(),
                }))
            }
            SensorKind::Gyroscope => {
                let [yaw, pitch, roll] =
                    split_fields::<GYROSCOPE_FIELD_COUNT>(kind, &self.raw_value)?;
                Ok(SensorReading::Attitude(Attitude { yaw, pitch, roll }))
            }
            SensorKind::Other(_) => Err(coercion(kind, &self.raw_value, "unknown sensor kind")),
        }
    }
}

/// GPS position reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Capture time of the fix, as sent
    pub time: String,
}

/// Gyroscope orientation reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attitude {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// A record's value decoded for its kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorReading {
    Scalar(f64),
    Position(GpsFix),
    Attitude(Attitude),
}

impl SensorReading {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            _ => None,
        }
    }
}

/// Operator request to change a sensor's reporting interval
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    /// Sensor tag the device should reconfigure
    pub target_sensor: String,

    /// New interval in seconds; `None` sends an empty field
    pub interval_seconds: Option<f64>,
}

impl CommandRequest {
    pub fn new(target_sensor: impl Into<String>, interval_seconds: Option<f64>) -> Self {
        Self {
            target_sensor: target_sensor.into(),
            interval_seconds,
        }
    }

    /// Check the request can be expressed on the wire.
    ///
    /// # Errors
    ///
    /// Returns `StationError::InvalidCommand` if the sensor name is empty or
    /// contains a separator or line break, or the interval is negative or
    /// not finite.
    pub fn validate(&self) -> Result<()> {
        let target = self.target_sensor.trim();
        if target.is_empty() {
            return Err(StationError::InvalidCommand("target sensor cannot be empty".to_string()));
        }
        if self.target_sensor.contains(FIELD_SEPARATOR) || self.target_sensor.contains(['\r', '\n']) {
            return Err(StationError::InvalidCommand(format!(
                "target sensor {:?} contains a separator or line break",
                self.target_sensor
            )));
        }
        if let Some(interval) = self.interval_seconds {
            if !interval.is_finite() || interval < 0.0 {
                return Err(StationError::InvalidCommand(format!(
                    "interval {} must be a finite, non-negative number of seconds",
                    interval
                )));
            }
        }
        Ok(())
    }
}

fn coercion(kind: &SensorKind, value: &str, reason: impl Into<String>) -> StationError {
    StationError::Coercion {
        kind: kind.tag().to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number(kind: &SensorKind, text: &str) -> Result<f64> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| coercion(kind, text, "not a number"))?;

    if !value.is_finite() {
        return Err(coercion(kind, text, "not a finite number"));
    }
    Ok(value)
}

fn split_fields<const N: usize>(kind: &SensorKind, text: &str) -> Result<[f64; N]> {
    let parts: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    if parts.len() != N {
        return Err(coercion(
            kind,
            text,
            format!("expected {} fields, got {}", N, parts.len()),
        ));
    }

    let mut fields = [0.0; N];
    for (slot, part) in fields.iter_mut().zip(parts) {
        *slot = parse_number(kind, part)
            .map_err(|_| coercion(kind, text, format!("field {:?} is not a finite number", part)))?;
    }
    Ok(fields)
}
