//! # Telemetry Frame Decoder
//!
//! Reads four-line frames from the serial link and turns them into
//! [`TelemetryRecord`]s.
//!
//! The decoder never tries to resynchronize. When a line fails, the lines
//! read so far are discarded and the next call starts a fresh frame at the
//! next line on the wire. If the device dropped or injected a line, every
//! following frame stays shifted until another failure happens to realign
//! it.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::timeout;
use tracing::trace;

use super::protocol::*;
use crate::error::{Result, StationError};

/// Line-framed telemetry decoder over any buffered async byte source
pub struct FrameDecoder<R> {
    reader: R,
    read_timeout: Option<Duration>,
    line: Vec<u8>,
}

impl<R> std::fmt::Debug for FrameDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncBufRead + Unpin> FrameDecoder<R> {
    /// Create a decoder that waits indefinitely for each line
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            read_timeout: None,
            line: Vec::with_capacity(64),
        }
    }

    /// Limit how long a single line read may block.
    ///
    /// Expiry fails the current frame with a transient decode error.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    /// Read and decode the next frame
    ///
    /// # Returns
    ///
    /// * `Result<TelemetryRecord>` - Decoded record
    ///
    /// # Errors
    ///
    /// - `StationError::Decode` if a line is not UTF-8, is blank, or the read
    ///   timed out. The partial frame is dropped.
    /// - `StationError::SourceClosed` if the source reached end of stream.
    /// - `StationError::Io` for any other read failure.
    pub async fn read_frame(&mut self) -> Result<TelemetryRecord> {
        let mut lines = Vec::with_capacity(FRAME_LINE_COUNT);

        for index in 0..FRAME_LINE_COUNT {
            let line = self.read_line(index, &lines).await?;
            lines.push(line);
        }

        decode_lines(lines)
    }

    async fn read_line(&mut self, index: usize, partial: &[String]) -> Result<String> {
        self.line.clear();

        let read = match self.read_timeout {
            Some(limit) => {
                match timeout(limit, self.reader.read_until(b'\n', &mut self.line)).await {
                    Ok(read) => read,
                    Err(_) => {
                        return Err(self.line_error(
                            format!("read timed out after {:?} on line {}", limit, index + 1),
                            partial,
                        ))
                    }
                }
            }
            None => self.reader.read_until(b'\n', &mut self.line).await,
        };

        let count = match read {
            Ok(count) => count,
            Err(e) if is_transient_io(&e) => {
                return Err(self.line_error(format!("read failed on line {}: {}", index + 1, e), partial))
            }
            Err(e) => return Err(e.into()),
        };

        if count == 0 {
            return Err(StationError::SourceClosed);
        }

        let text = match std::str::from_utf8(&self.line) {
            Ok(text) => text.trim(),
            Err(e) => return Err(self.line_error(format!("invalid UTF-8 on line {}: {}", index + 1, e), partial)),
        };

        if text.is_empty() {
            return Err(self.line_error(format!("empty line {}", index + 1), partial));
        }

        trace!("Frame line {}: {:?}", index + 1, text);
        Ok(text.to_string())
    }

    /// Decode error carrying the frame's earlier lines plus whatever part of
    /// the current line was read.
    ///
    /// `partial` stays empty only when nothing of the frame arrived.
    fn line_error(&self, reason: String, partial: &[String]) -> StationError {
        let mut partial = partial.to_vec();
        if !self.line.is_empty() {
            partial.push(String::from_utf8_lossy(&self.line).trim().to_string());
        }
        StationError::Decode { reason, partial }
    }
}

/// Assemble a record from the four positional lines of a frame
///
/// # Arguments
///
/// * `lines` - `[date, time, sensor_type, value]`, already stripped
///
/// # Errors
///
/// Returns `StationError::Decode` if there are not exactly four lines.
pub fn decode_lines(lines: Vec<String>) -> Result<TelemetryRecord> {
    let [date, time, tag, value] = <[String; FRAME_LINE_COUNT]>::try_from(lines).map_err(|lines| {
        StationError::Decode {
            reason: format!("expected {} lines, got {}", FRAME_LINE_COUNT, lines.len()),
            partial: lines,
        }
    })?;

    Ok(TelemetryRecord::new(date, time, SensorKind::from_tag(&tag), value))
}

fn is_transient_io(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}
