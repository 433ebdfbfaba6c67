//! # Persistence Module
//!
//! Appends history to one CSV file per known sensor kind.
//!
//! ## File layout
//!
//! ```text
//! <data_dir>/temperature.csv
//! <data_dir>/pressure.csv
//! <data_dir>/gps.csv
//! <data_dir>/gyroscope.csv
//! <data_dir>/battery.csv
//! ```
//!
//! Each file starts with the header `date,time,sensor_type,value` and is
//! only ever appended to. Records of unknown kinds are not persisted.
//!
//! ## Cursors
//!
//! The writer keeps, per kind, how many of that kind's records are already
//! on disk. A flush appends only the records past the cursor, so repeated
//! flushes without new data write nothing.
//!
//! A fresh writer (station restart) has no cursors. Before its first append
//! to an existing file it reads the file's last row and searches the
//! in-memory records of that kind from the newest backwards for an identical
//! record; appending resumes after the match. If there is no match that kind
//! is skipped and the flush reports an error rather than risk duplicating
//! rows; the other kinds are still written, and the operator has to move the
//! file aside. Two identical consecutive records (same date, time and value)
//! make the resume point ambiguous; the newest match wins.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::{Result, StationError};
use crate::frame::protocol::{SensorKind, TelemetryRecord};
use crate::history::Snapshot;

/// Column header of every durable file
pub const CSV_HEADER: [&str; 4] = ["date", "time", "sensor_type", "value"];

/// Rows appended by one flush, per kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Kinds that received rows, in persistence order
    pub appended: Vec<(SensorKind, usize)>,
}

impl FlushReport {
    /// Total rows appended across all kinds
    pub fn total(&self) -> usize {
        self.appended.iter().map(|(_, rows)| rows).sum()
    }

    /// Rows appended for one kind
    pub fn rows_for(&self, kind: &SensorKind) -> usize {
        self.appended
            .iter()
            .find(|(appended_kind, _)| appended_kind == kind)
            .map_or(0, |(_, rows)| *rows)
    }
}

/// Incremental, idempotent CSV writer
#[derive(Debug)]
pub struct PersistenceWriter {
    data_dir: PathBuf,
    cursors: HashMap<SensorKind, usize>,
}

impl PersistenceWriter {
    /// Create a writer, creating `data_dir` if needed
    ///
    /// # Errors
    ///
    /// Returns `StationError::Persistence` if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|e| {
            persistence_error(format!("cannot create {}: {}", data_dir.display(), e))
        })?;

        Ok(Self {
            data_dir,
            cursors: HashMap::new(),
        })
    }

    /// Durable file for a kind
    pub fn path_for(&self, kind: &SensorKind) -> PathBuf {
        self.data_dir.join(format!("{}.csv", kind.tag().to_lowercase()))
    }

    /// Records of `kind` known to be on disk, if established
    pub fn cursor(&self, kind: &SensorKind) -> Option<usize> {
        self.cursors.get(kind).copied()
    }

    /// Append every not-yet-persisted record in `snapshot`
    ///
    /// # Arguments
    ///
    /// * `snapshot` - History snapshot; must be a prefix-consistent view
    ///
    /// # Returns
    ///
    /// * `Result<FlushReport>` - Rows appended per kind
    ///
    /// # Errors
    ///
    /// Returns `StationError::Persistence` naming every kind whose file tail
    /// could not be located in memory, whose header is foreign, or whose
    /// write failed. A failing kind does not hold back the others: their
    /// rows are still appended before the error is returned.
    pub fn flush(&mut self, snapshot: &Snapshot) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        let mut failures = Vec::new();

        for kind in SensorKind::KNOWN.iter() {
            match self.flush_kind(kind, snapshot) {
                Ok(0) => {}
                Ok(rows) => report.appended.push((kind.clone(), rows)),
                Err(e) => {
                    error!("Flush of {} records failed: {}", kind, e);
                    let reason = match e {
                        StationError::Persistence(msg) => msg,
                        other => other.to_string(),
                    };
                    failures.push(format!("{}: {}", kind, reason));
                }
            }
        }

        if report.total() > 0 {
            info!("Persisted {} new records to {}", report.total(), self.data_dir.display());
        }

        if !failures.is_empty() {
            return Err(persistence_error(failures.join("; ")));
        }
        Ok(report)
    }

    /// Append the pending records of one kind, returning how many were written
    fn flush_kind(&mut self, kind: &SensorKind, snapshot: &Snapshot) -> Result<usize> {
        let records: Vec<&TelemetryRecord> = snapshot.filter_by_type(kind).collect();

        let start = match self.cursors.get(kind).copied() {
            Some(cursor) => cursor,
            None if records.is_empty() => return Ok(0),
            None => {
                let cursor = self.recover_cursor(kind, &records)?;
                self.cursors.insert(kind.clone(), cursor);
                cursor
            }
        };

        let Some(pending) = records.get(start..).filter(|pending| !pending.is_empty()) else {
            return Ok(0);
        };

        if let Err(e) = self.append_rows(kind, pending) {
            // Some rows may have reached the disk; re-derive from the file next time
            self.cursors.remove(kind);
            return Err(e);
        }

        self.cursors.insert(kind.clone(), records.len());
        debug!("Appended {} {} records", pending.len(), kind);
        Ok(pending.len())
    }

    /// Find how many of `records` are already in the kind's file
    fn recover_cursor(&self, kind: &SensorKind, records: &[&TelemetryRecord]) -> Result<usize> {
        let path = self.path_for(kind);

        let Some(last_row) = read_last_row(&path)? else {
            return Ok(0);
        };

        let tail = [
            last_row[0].as_str(),
            last_row[1].as_str(),
            last_row[2].as_str(),
            last_row[3].as_str(),
        ];

        match records.iter().rposition(|record| record.columns() == tail) {
            Some(index) => {
                info!(
                    "Resuming {} after existing row {} of {} in memory",
                    path.display(),
                    index + 1,
                    records.len()
                );
                Ok(index + 1)
            }
            None => Err(persistence_error(format!(
                "last row of {} ({}) not found in memory history; refusing to append",
                path.display(),
                last_row.join(",")
            ))),
        }
    }

    fn append_rows(&self, kind: &SensorKind, rows: &[&TelemetryRecord]) -> Result<()> {
        let path = self.path_for(kind);
        let needs_header = fs::metadata(&path).map(|meta| meta.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| write_error(&path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        if needs_header {
            writer.write_record(CSV_HEADER).map_err(|e| write_error(&path, e))?;
        }
        for row in rows {
            writer.write_record(row.columns()).map_err(|e| write_error(&path, e))?;
        }

        writer.flush().map_err(|e| write_error(&path, e))?;
        writer.get_ref().sync_data().map_err(|e| write_error(&path, e))?;
        Ok(())
    }
}

/// Last data row of a durable file; `None` if missing or header-only.
fn read_last_row(path: &Path) -> Result<Option<[String; 4]>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(persistence_error(format!("read {}: {}", path.display(), e))),
    };

    let read_error = |e: csv::Error| persistence_error(format!("read {}: {}", path.display(), e));
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader.headers().map_err(read_error)?.clone();
    if headers.is_empty() {
        return Ok(None);
    }
    if headers.iter().ne(CSV_HEADER) {
        return Err(persistence_error(format!(
            "{} has unexpected header {:?}",
            path.display(),
            headers
        )));
    }

    let mut last = None;
    for row in reader.records() {
        last = Some(row.map_err(read_error)?);
    }

    Ok(last.map(|row| {
        let field = |i: usize| row.get(i).unwrap_or_default().to_string();
        [field(0), field(1), field(2), field(3)]
    }))
}

fn persistence_error(msg: String) -> StationError {
    StationError::Persistence(msg)
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> StationError {
    persistence_error(format!("write {}: {}", path.display(), e))
}
