//! # Payload Station Library
//!
//! Ground station for a satellite or rocket payload over a single serial link.
//!
//! This library decodes the payload's four-line telemetry frames into a shared
//! sensor history, aggregates it for display, sends interval commands back to
//! the payload, and persists the history incrementally to per-sensor CSV files.

pub mod aggregate;
pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod history;
pub mod ingest;
pub mod persistence;
pub mod serial;
pub mod station;
