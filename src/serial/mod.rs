//! # Serial Communication Module
//!
//! Handles the serial link to the payload.
//!
//! This module handles:
//! - Opening the configured port, or probing default device paths
//! - Splitting the stream into a buffered telemetry reader and a command sink

pub mod port_trait;

use crate::config::SerialConfig;
use crate::error::{Result, StationError};
use tokio::io::{BufReader, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

pub use port_trait::{CommandSink, WriterSink};

/// Port value that requests probing [`DEFAULT_DEVICE_PATHS`]
pub const AUTO_PORT: &str = "auto";

/// Default device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (most common for payload radios)
    "/dev/ttyACM0", // USB CDC devices
];

/// Buffered telemetry side of the link
pub type SerialReader = BufReader<ReadHalf<SerialStream>>;

/// Command side of the link
pub type SerialSink = WriterSink<WriteHalf<SerialStream>>;

/// Payload serial link
///
/// Owns the open port until it is split into its two directions.
pub struct SerialLink {
    /// Serial port handle
    port: SerialStream,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    /// Open the link described by the serial configuration
    ///
    /// A port of `"auto"` tries each default device path in turn.
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use payload_station::config::Config;
    /// use payload_station::serial::SerialLink;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let config = Config::load("config/default.toml")?;
    ///     let link = SerialLink::open(&config.serial)?;
    ///     println!("Connected to {}", link.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        if config.port == AUTO_PORT {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, config.baud_rate)
        } else {
            Self::open_with_paths(&[config.port.as_str()], config.baud_rate)
        }
    }

    /// Open the first device that succeeds from a list of paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Link speed
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened payload link at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(StationError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| StationError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split into the telemetry reader and the command sink
    pub fn into_split(self) -> (SerialReader, SerialSink) {
        let (read, write) = tokio::io::split(self.port);
        (BufReader::new(read), WriterSink::new(write))
    }
}
