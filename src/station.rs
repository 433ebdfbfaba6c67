//! # Station
//!
//! Consumer side of the pipeline: the read API over history, the write API
//! (commands out, flush to disk) and parsing of operator console lines.
//!
//! Every query takes a fresh snapshot, so values returned by one call are
//! consistent with each other but may be older than the next call's.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::aggregate::{self, CaptureTime, Centroid, Dashboard, Series};
use crate::command::{CommandDispatcher, DispatchOutcome};
use crate::error::{Result, StationError};
use crate::frame::protocol::{CommandRequest, SensorKind, SensorReading, FIELD_SEPARATOR};
use crate::history::{HistoryReader, Snapshot};
use crate::ingest::IngestCounters;
use crate::persistence::{FlushReport, PersistenceWriter};
use crate::serial::CommandSink;

/// One line typed by the operator
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorInput {
    /// `save` or `flush`
    Flush,
    /// `status`
    Status,
    /// `<sensor>` or `<sensor>,<interval>`
    Command(CommandRequest),
}

impl OperatorInput {
    /// Parse a console line. Blank lines yield `None`.
    ///
    /// Keywords are case-insensitive; anything else is a command.
    ///
    /// # Errors
    ///
    /// Returns `StationError::InvalidCommand` if the interval is not a number.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        if line.eq_ignore_ascii_case("save") || line.eq_ignore_ascii_case("flush") {
            return Ok(Some(Self::Flush));
        }
        if line.eq_ignore_ascii_case("status") {
            return Ok(Some(Self::Status));
        }

        let request = match line.split_once(FIELD_SEPARATOR) {
            Some((sensor, interval)) => {
                let interval = interval.trim();
                let interval_seconds = if interval.is_empty() {
                    None
                } else {
                    Some(interval.parse::<f64>().map_err(|_| {
                        StationError::InvalidCommand(format!("interval {:?} is not a number", interval))
                    })?)
                };
                CommandRequest::new(sensor.trim(), interval_seconds)
            }
            None => CommandRequest::new(line, None),
        };

        Ok(Some(Self::Command(request)))
    }
}

/// Read and write access to a running station
pub struct Station<S> {
    history: HistoryReader,
    counters: IngestCounters,
    dispatcher: CommandDispatcher<S>,
    persistence: Option<Arc<Mutex<PersistenceWriter>>>,
    actions: u64,
}

impl<S> std::fmt::Debug for Station<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("records", &self.history.len())
            .field("persistence", &self.persistence)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl<S: CommandSink> Station<S> {
    /// # Arguments
    ///
    /// * `history` - Reader side of the ingestion history
    /// * `counters` - Counters updated by the ingestion task
    /// * `dispatcher` - Command writer for the link
    /// * `persistence` - CSV writer, `None` when persistence is disabled
    pub fn new(
        history: HistoryReader,
        counters: IngestCounters,
        dispatcher: CommandDispatcher<S>,
        persistence: Option<PersistenceWriter>,
    ) -> Self {
        Self {
            history,
            counters,
            dispatcher,
            persistence: persistence.map(|writer| Arc::new(Mutex::new(writer))),
            actions: 0,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.history.snapshot()
    }

    /// Latest valid reading of `kind`
    pub fn latest(&self, kind: &SensorKind) -> Option<SensorReading> {
        aggregate::latest(&self.snapshot(), kind)
    }

    pub fn series(&self, kind: &SensorKind) -> Series<SensorReading> {
        aggregate::series(&self.snapshot(), kind)
    }

    pub fn centroid(&self) -> Option<Centroid> {
        aggregate::centroid(&self.snapshot())
    }

    pub fn now(&self) -> Option<CaptureTime> {
        aggregate::now(&self.snapshot())
    }

    /// Full display view from a single snapshot
    pub fn dashboard(&self) -> Dashboard {
        Dashboard::build(&self.snapshot(), self.counters.frames_dropped())
    }

    /// Send a command as a new operator action
    ///
    /// Each call is one rising edge of the action counter, so it is written
    /// exactly once whether or not the write succeeds.
    ///
    /// # Errors
    ///
    /// - `StationError::InvalidCommand` if the request is malformed
    /// - `StationError::Dispatch` if the link write fails
    pub async fn submit_command(
        &mut self,
        target_sensor: &str,
        interval_seconds: Option<f64>,
    ) -> Result<DispatchOutcome> {
        self.submit(&CommandRequest::new(target_sensor, interval_seconds)).await
    }

    /// Same as [`Station::submit_command`] for an already built request
    pub async fn submit(&mut self, request: &CommandRequest) -> Result<DispatchOutcome> {
        self.actions += 1;
        self.dispatcher.submit(self.actions, request).await
    }

    /// Persist every record not yet on disk
    ///
    /// The snapshot is taken before any file is touched. File I/O runs on the
    /// blocking pool; the returned future resolves once the flush has
    /// finished.
    ///
    /// # Errors
    ///
    /// Returns `StationError::Persistence` if a file tail cannot be matched
    /// or a write fails.
    pub async fn trigger_flush(&mut self) -> Result<FlushReport> {
        let Some(writer) = self.persistence.as_ref().map(Arc::clone) else {
            debug!("Persistence disabled, nothing flushed");
            return Ok(FlushReport::default());
        };

        let snapshot = self.history.snapshot();
        let records = snapshot.len();

        let report = tokio::task::spawn_blocking(move || {
            let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
            writer.flush(&snapshot)
        })
        .await
        .map_err(|e| StationError::Persistence(format!("flush task failed: {}", e)))??;

        debug!("Flushed {} rows ({} records in history)", report.total(), records);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::protocol::TelemetryRecord;
    use crate::history::{self, HistoryWriter};
    use crate::serial::port_trait::MockCommandSink;
    use tempfile::TempDir;

    fn station(sink: MockCommandSink, persistence: Option<PersistenceWriter>) -> (HistoryWriter, Station<MockCommandSink>) {
        let (writer, reader) = history::channel();
        let station = Station::new(
            reader,
            IngestCounters::default(),
            CommandDispatcher::new(sink, "\n"),
            persistence,
        );
        (writer, station)
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(OperatorInput::parse("save").unwrap(), Some(OperatorInput::Flush));
        assert_eq!(OperatorInput::parse(" FLUSH ").unwrap(), Some(OperatorInput::Flush));
        assert_eq!(OperatorInput::parse("status").unwrap(), Some(OperatorInput::Status));
        assert_eq!(OperatorInput::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            OperatorInput::parse("Temperature, 5").unwrap(),
            Some(OperatorInput::Command(CommandRequest::new("Temperature", Some(5.0))))
        );
        assert_eq!(
            OperatorInput::parse("GPS").unwrap(),
            Some(OperatorInput::Command(CommandRequest::new("GPS", None)))
        );
        assert_eq!(
            OperatorInput::parse("GPS,").unwrap(),
            Some(OperatorInput::Command(CommandRequest::new("GPS", None)))
        );
    }

    #[test]
    fn test_parse_bad_interval() {
        assert!(matches!(
            OperatorInput::parse("GPS,fast"),
            Err(StationError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_read_api() {
        let (mut writer, station) = station(MockCommandSink::new(), None);
        assert_eq!(station.latest(&SensorKind::Temperature), None);
        assert_eq!(station.now(), None);

        writer.append(TelemetryRecord::new("2024-01-01", "5", SensorKind::Temperature, "21.5"));
        writer.append(TelemetryRecord::new("2024-01-01", "6", SensorKind::Temperature, "22.0"));
        writer.append(TelemetryRecord::new("2024-01-01", "7", SensorKind::Gps, "10,20"));

        assert_eq!(station.latest(&SensorKind::Temperature), Some(SensorReading::Scalar(22.0)));
        assert_eq!(station.series(&SensorKind::Temperature).len(), 2);
        assert_eq!(station.centroid().map(|c| (c.latitude, c.longitude)), Some((10.0, 20.0)));
        assert_eq!(station.now().map(|t| t.time), Some("7".to_string()));

        let dashboard = station.dashboard();
        assert_eq!(dashboard.records, 3);
        assert_eq!(dashboard.battery_label, "unknown");
    }

    #[tokio::test]
    async fn test_each_submit_is_a_new_action() {
        let mut sink = MockCommandSink::new();
        sink.expect_write_all().times(2).returning(|_| Ok(()));
        sink.expect_flush().times(2).returning(|| Ok(()));

        let (_writer, mut station) = station(sink, None);

        let first = station.submit_command("GPS", Some(2.0)).await.unwrap();
        let second = station.submit_command("GPS", Some(2.0)).await.unwrap();
        assert_eq!(first, DispatchOutcome::Sent { bytes: 6 });
        assert_eq!(second, DispatchOutcome::Sent { bytes: 6 });
    }

    #[tokio::test]
    async fn test_invalid_command_is_reported() {
        let mut sink = MockCommandSink::new();
        sink.expect_write_all().times(0);

        let (_writer, mut station) = station(sink, None);
        assert!(matches!(
            station.submit_command("  ", None).await,
            Err(StationError::InvalidCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_flush_without_persistence_is_noop() {
        let (mut writer, mut station) = station(MockCommandSink::new(), None);
        writer.append(TelemetryRecord::new("2024-01-01", "5", SensorKind::Battery, "3.7"));
        assert_eq!(station.trigger_flush().await.unwrap(), FlushReport::default());
    }

    #[tokio::test]
    async fn test_trigger_flush_twice() {
        let dir = TempDir::new().unwrap();
        let persistence = PersistenceWriter::new(dir.path()).unwrap();
        let (mut writer, mut station) = station(MockCommandSink::new(), Some(persistence));

        writer.append(TelemetryRecord::new("2024-01-01", "5", SensorKind::Pressure, "1013.2"));
        writer.append(TelemetryRecord::new("2024-01-01", "6", SensorKind::Pressure, "1013.1"));

        assert_eq!(station.trigger_flush().await.unwrap().rows_for(&SensorKind::Pressure), 2);
        assert_eq!(station.trigger_flush().await.unwrap().total(), 0);

        let contents = std::fs::read_to_string(dir.path().join("pressure.csv")).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }
}
