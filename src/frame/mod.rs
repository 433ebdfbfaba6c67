//! # Telemetry Link Protocol Module
//!
//! Implementation of the payload's line-oriented serial protocol.
//!
//! This module handles:
//! - Telemetry frame decoding (four lines: date, time, sensor tag, value)
//! - Per-kind value parsing (scalar, GPS pair, gyroscope triple)
//! - Command encoding (`<sensor>,<interval>`)

pub mod protocol;
pub mod encoder;
pub mod decoder;
