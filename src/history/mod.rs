//! # Sensor History Module
//!
//! The one piece of shared mutable state in the station: the ordered list of
//! every record received since start-up.
//!
//! Access is split by role. [`HistoryWriter`] is the only handle that can
//! append and cannot be cloned, so exactly one producer exists. Any number
//! of [`HistoryReader`]s take [`Snapshot`]s. Both sides hold the mutex only
//! for a single push or for copying the record pointers; parsing, rendering
//! and I/O always happen on a snapshot outside the lock.
//!
//! ## Usage
//!
//! ```
//! use payload_station::frame::protocol::{SensorKind, TelemetryRecord};
//! use payload_station::history;
//!
//! let (mut writer, reader) = history::channel();
//! writer.append(TelemetryRecord::new("2024-01-01", "5", SensorKind::Temperature, "21.5"));
//!
//! let snapshot = reader.snapshot();
//! assert_eq!(snapshot.len(), 1);
//! assert_eq!(snapshot.filter_by_type(&SensorKind::Temperature).count(), 1);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::frame::protocol::{SensorKind, TelemetryRecord};

type Records = Vec<Arc<TelemetryRecord>>;

#[derive(Debug, Default)]
struct Shared {
    records: Mutex<Records>,
}

impl Shared {
    // Records are only ever pushed whole, so a poisoned lock still guards a
    // consistent list.
    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create an empty history, returning its single writer and a reader.
pub fn channel() -> (HistoryWriter, HistoryReader) {
    let shared = Arc::new(Shared::default());
    (
        HistoryWriter {
            shared: Arc::clone(&shared),
        },
        HistoryReader { shared },
    )
}

/// Exclusive append handle, owned by the ingestion loop
#[derive(Debug)]
pub struct HistoryWriter {
    shared: Arc<Shared>,
}

impl HistoryWriter {
    /// Append a record. Amortized O(1); the lock covers only the push.
    pub fn append(&mut self, record: TelemetryRecord) {
        let record = Arc::new(record);
        let len = {
            let mut records = self.shared.lock();
            records.push(record);
            records.len()
        };
        trace!("History length now {}", len);
    }

    /// A new reader over the same history
    pub fn reader(&self) -> HistoryReader {
        HistoryReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Shared read handle
#[derive(Debug, Clone)]
pub struct HistoryReader {
    shared: Arc<Shared>,
}

impl HistoryReader {
    /// Point-in-time copy of the history.
    ///
    /// Only the record pointers are copied while the lock is held. The
    /// snapshot contains every record appended before the call and nothing
    /// appended after it.
    pub fn snapshot(&self) -> Snapshot {
        let records = self.shared.lock().clone();
        Snapshot { records }
    }

    /// Current number of records
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable, ordered view of the history at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: Records,
}

impl Snapshot {
    /// Build a snapshot directly from records, in order
    pub fn from_records(records: impl IntoIterator<Item = TelemetryRecord>) -> Self {
        Self {
            records: records.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in arrival order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TelemetryRecord> + '_ {
        self.records.iter().map(Arc::as_ref)
    }

    /// Records of one kind, in arrival order
    pub fn filter_by_type<'a>(
        &'a self,
        kind: &'a SensorKind,
    ) -> impl DoubleEndedIterator<Item = &'a TelemetryRecord> + 'a {
        self.iter().filter(move |record| &record.sensor_type == kind)
    }

    /// Most recent record of any kind
    pub fn last(&self) -> Option<&TelemetryRecord> {
        self.records.last().map(Arc::as_ref)
    }
}
