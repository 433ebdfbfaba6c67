//! End-to-end: wire bytes through decoder, history, aggregation and CSV.

use payload_station::aggregate;
use payload_station::frame::decoder::FrameDecoder;
use payload_station::frame::protocol::{SensorKind, SensorReading, TelemetryRecord};
use payload_station::history::{self, Snapshot};
use payload_station::ingest::{self, IngestCounters, IngestExit};
use payload_station::persistence::PersistenceWriter;
use tempfile::TempDir;
use tokio::io::BufReader;
use tokio::sync::watch;
use tokio_test::io::Builder;

const SESSION: &[u8] = b"2024-05-01\n5\nTemperature\n21.5\n\
2024-05-01\n5\nGPS\n10.0,20.0\n\
2024-05-01\n6\nTemperature\n22.0\n\
2024-05-01\n6\nGPS\n10.0\n\
2024-05-01\n7\nGPS\n20.0,30.0\n\
2024-05-01\n7\nGyroscope\n1.234,-5.0,90\n";

async fn ingest_session(bytes: &[u8]) -> Snapshot {
    let mock = Builder::new().read(bytes).build();
    let (writer, reader) = history::channel();
    let (_tx, rx) = watch::channel(false);

    let summary = ingest::run(FrameDecoder::new(BufReader::new(mock)), writer, IngestCounters::default(), rx)
        .await
        .unwrap();
    assert_eq!(summary.exit, IngestExit::SourceClosed);

    reader.snapshot()
}

#[tokio::test]
async fn test_session_aggregates() {
    let snapshot = ingest_session(SESSION).await;
    assert_eq!(snapshot.len(), 6);

    assert_eq!(
        aggregate::latest(&snapshot, &SensorKind::Temperature),
        Some(SensorReading::Scalar(22.0))
    );
    assert_eq!(
        aggregate::scalar_series(&snapshot, &SensorKind::Temperature).points,
        vec![(5.0, 21.5), (6.0, 22.0)]
    );

    // Malformed "10.0" stays in history but not in GPS aggregation
    assert_eq!(snapshot.filter_by_type(&SensorKind::Gps).count(), 3);
    let gps = aggregate::series(&snapshot, &SensorKind::Gps);
    assert_eq!(gps.len(), 2);
    assert_eq!(gps.rejected, 1);

    let centroid = aggregate::centroid(&snapshot).unwrap();
    assert_eq!((centroid.latitude, centroid.longitude), (15.0, 25.0));

    let attitude = aggregate::latest_attitude(&snapshot);
    assert_eq!(attitude.yaw, "1.23");
    assert_eq!(attitude.pitch, "-5.00");
    assert_eq!(attitude.roll, "90.00");

    assert_eq!(aggregate::latest(&snapshot, &SensorKind::Battery), None);
    assert_eq!(aggregate::display_scalar(aggregate::latest_scalar(&snapshot, &SensorKind::Battery)), "unknown");
}

#[tokio::test]
async fn test_session_persists_once() {
    let dir = TempDir::new().unwrap();
    let snapshot = ingest_session(SESSION).await;

    let mut writer = PersistenceWriter::new(dir.path()).unwrap();
    let first = writer.flush(&snapshot).unwrap();
    assert_eq!(first.rows_for(&SensorKind::Temperature), 2);
    assert_eq!(first.rows_for(&SensorKind::Gps), 3);
    assert_eq!(first.rows_for(&SensorKind::Gyroscope), 1);

    let before = std::fs::read_to_string(writer.path_for(&SensorKind::Gps)).unwrap();
    assert_eq!(writer.flush(&snapshot).unwrap().total(), 0);
    let after = std::fs::read_to_string(writer.path_for(&SensorKind::Gps)).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_restart_appends_only_new_rows() {
    let dir = TempDir::new().unwrap();
    let first_run = ingest_session(SESSION).await;
    PersistenceWriter::new(dir.path()).unwrap().flush(&first_run).unwrap();

    // The payload keeps its clock; after a station restart it replays the
    // same records and then new ones.
    let mut replay = SESSION.to_vec();
    replay.extend_from_slice(b"2024-05-01\n8\nTemperature\n22.5\n2024-05-01\n9\nTemperature\n23.0\n");
    let second_run = ingest_session(&replay).await;

    let mut writer = PersistenceWriter::new(dir.path()).unwrap();
    let report = writer.flush(&second_run).unwrap();
    assert_eq!(report.rows_for(&SensorKind::Temperature), 2);
    assert_eq!(report.rows_for(&SensorKind::Gps), 0);

    let mut reader = csv::Reader::from_path(writer.path_for(&SensorKind::Temperature)).unwrap();
    let times: Vec<String> = reader
        .records()
        .map(|row| row.unwrap()[1].to_string())
        .collect();
    assert_eq!(times, vec!["5", "6", "8", "9"]);
}

#[tokio::test]
async fn test_unknown_tag_kept_but_opaque() {
    let snapshot = ingest_session(b"2024-05-01\n5\nHumidity\n40\n").await;

    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot.last(),
        Some(&TelemetryRecord::new("2024-05-01", "5", SensorKind::Other("Humidity".to_string()), "40"))
    );
    assert_eq!(aggregate::coercion_errors(&snapshot), 0);
}
