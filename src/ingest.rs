//! # Ingestion Loop
//!
//! The single producer of the station: reads frames from the link and
//! appends them to history until the link closes or shutdown is requested.
//!
//! A frame that fails to decode is logged and counted, and the loop moves
//! straight on to the next one. A read timeout before any line of a frame
//! arrived is only an idle link and is not counted. Only the end of the
//! stream or a hard I/O error stops it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, StationError};
use crate::frame::decoder::FrameDecoder;
use crate::history::HistoryWriter;

/// Frame counters shared between the ingestion task and the poll driver
#[derive(Debug, Clone, Default)]
pub struct IngestCounters {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    decoded: AtomicU64,
    dropped: AtomicU64,
}

impl IngestCounters {
    /// Frames appended to history
    pub fn frames_decoded(&self) -> u64 {
        self.inner.decoded.load(Ordering::Relaxed)
    }

    /// Frames discarded by the decoder
    pub fn frames_dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    fn record_decoded(&self) {
        self.inner.decoded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why the ingestion loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestExit {
    /// Shutdown was requested
    Shutdown,
    /// The telemetry source reached end of stream
    SourceClosed,
}

/// Final state of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub exit: IngestExit,
    pub frames_decoded: u64,
    pub frames_dropped: u64,
}

/// Run the ingestion loop
///
/// # Arguments
///
/// * `decoder` - Frame decoder over the link's read side
/// * `writer` - The history's only writer
/// * `counters` - Counters to update as frames arrive
/// * `shutdown` - Becomes `true` (or is dropped) to stop the loop
///
/// # Returns
///
/// * `Result<IngestSummary>` - How and when the loop stopped
///
/// # Errors
///
/// Returns error on a non-transient read failure. Decode errors never stop
/// the loop.
pub async fn run<R>(
    mut decoder: FrameDecoder<R>,
    mut writer: HistoryWriter,
    counters: IngestCounters,
    mut shutdown: watch::Receiver<bool>,
) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    info!("Ingestion started");

    let exit = loop {
        if *shutdown.borrow() {
            break IngestExit::Shutdown;
        }

        let frame = tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break IngestExit::Shutdown;
                }
                continue;
            }

            frame = decoder.read_frame() => frame,
        };

        match frame {
            Ok(record) => {
                debug!(
                    "Frame {} {} {} = {}",
                    record.captured_date, record.captured_time, record.sensor_type, record.raw_value
                );
                writer.append(record);
                counters.record_decoded();
            }
            Err(StationError::Decode { reason, partial }) if partial.is_empty() => {
                // No line of a frame had arrived yet
                debug!("Link idle: {}", reason);
            }
            Err(e) if e.is_transient() => {
                warn!("Dropped frame: {}", e);
                counters.record_dropped();
            }
            Err(StationError::SourceClosed) => break IngestExit::SourceClosed,
            Err(e) => return Err(e),
        }
    };

    let summary = IngestSummary {
        exit,
        frames_decoded: counters.frames_decoded(),
        frames_dropped: counters.frames_dropped(),
    };
    info!(
        "Ingestion stopped ({:?}): {} frames decoded, {} dropped",
        summary.exit, summary.frames_decoded, summary.frames_dropped
    );
    Ok(summary)
}
