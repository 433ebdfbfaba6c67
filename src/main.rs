//! # Payload Station
//!
//! Ground station for a satellite or rocket payload.
//!
//! Reads four-line telemetry frames from the payload's serial link, keeps the
//! full sensor history in memory, publishes a dashboard on a fixed poll
//! cadence and appends the history to per-sensor CSV files.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use payload_station::aggregate::Dashboard;
use payload_station::command::CommandDispatcher;
use payload_station::config::{Config, LoggingConfig};
use payload_station::frame::decoder::FrameDecoder;
use payload_station::history;
use payload_station::ingest::{self, IngestCounters, IngestExit};
use payload_station::persistence::PersistenceWriter;
use payload_station::serial::{CommandSink, SerialLink};
use payload_station::station::{OperatorInput, Station};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the daily log files
const LOG_FILE_PREFIX: &str = "payload-station.log";

/// Operator lines buffered between the console thread and the poll loop
const CONSOLE_QUEUE_DEPTH: usize = 16;

/// Main entry point for the payload station
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, else `config/default.toml`)
///    - Set up logging
///    - Open the serial link and start the ingestion task
///
/// 2. **Poll Loop**
///    - Publish the dashboard every `poll.interval_ms`
///    - Flush to CSV every `persistence.autosave_interval_ms` (if enabled)
///    - Handle operator console lines (`save`, `status`, `<sensor>,<interval>`)
///
/// 3. **Shutdown** (Ctrl+C or telemetry source closed)
///    - Stop and join the ingestion task
///    - Final flush
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded
/// - No serial device can be opened
/// - The data directory cannot be created
/// - Ingestion stopped on a non-transient read failure
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!("Payload Station v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let link = SerialLink::open(&config.serial)?;
    info!("Payload link opened at: {}", link.device_path());
    let (reader, sink) = link.into_split();

    let (writer, history) = history::channel();
    let counters = IngestCounters::default();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let decoder = FrameDecoder::new(reader).with_read_timeout(config.serial.read_timeout());
    let mut ingestion = tokio::spawn(ingest::run(decoder, writer, counters.clone(), shutdown_rx));

    let persistence = if config.persistence.enabled {
        let writer = PersistenceWriter::new(&config.persistence.data_dir)?;
        info!("Persisting to {}", config.persistence.data_dir);
        Some(writer)
    } else {
        info!("Persistence disabled");
        None
    };

    let dispatcher = CommandDispatcher::new(sink, config.serial.command_terminator.clone());
    let mut station = Station::new(history, counters, dispatcher, persistence);

    let mut poll = interval(config.poll.interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut autosave = config.persistence.autosave_interval().map(|period| {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    let mut console = spawn_console();
    let mut console_open = true;
    let dashboard_path = config.poll.dashboard_path.as_deref();

    info!("Polling every {:?}", config.poll.interval());
    info!("Type `save`, `status` or `<sensor>,<interval>`; Ctrl+C to exit");

    let finished = loop {
        tokio::select! {
            _ = poll.tick() => publish_dashboard(&station, dashboard_path),

            _ = autosave_tick(&mut autosave) => flush(&mut station).await,

            line = console.recv(), if console_open => match line {
                Some(line) => handle_operator_line(&mut station, &line).await,
                None => {
                    debug!("Operator console closed");
                    console_open = false;
                }
            },

            result = &mut ingestion => break Some(result),

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break None;
            }
        }
    };

    // Ignored if ingestion already stopped on its own
    let _ = shutdown_tx.send(true);
    let result = match finished {
        Some(result) => result,
        None => ingestion.await,
    };

    flush(&mut station).await;
    publish_dashboard(&station, dashboard_path);

    let summary = result.context("ingestion task failed")??;
    match summary.exit {
        IngestExit::SourceClosed => warn!("Telemetry source closed"),
        IngestExit::Shutdown => debug!("Ingestion stopped on request"),
    }
    info!(
        "Total frames: {} decoded, {} dropped",
        summary.frames_decoded, summary.frames_dropped
    );

    Ok(())
}

/// Set up console logging, plus daily log files when `log_dir` is set
///
/// `RUST_LOG` overrides the configured level. The returned guard must be
/// held until exit so buffered file output is written.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Read operator lines on a dedicated thread
///
/// A blocking stdin read must not hold up runtime shutdown, so it stays off
/// the runtime's blocking pool.
fn spawn_console() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(CONSOLE_QUEUE_DEPTH);

    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Operator console read failed: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

async fn autosave_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn handle_operator_line<S: CommandSink>(station: &mut Station<S>, line: &str) {
    let input = match OperatorInput::parse(line) {
        Ok(Some(input)) => input,
        Ok(None) => return,
        Err(e) => {
            warn!("{}", e);
            return;
        }
    };

    match input {
        OperatorInput::Flush => flush(station).await,
        OperatorInput::Status => log_status(&station.dashboard()),
        OperatorInput::Command(request) => {
            if let Err(e) = station.submit(&request).await {
                warn!("{}", e);
            }
        }
    }
}

async fn flush<S: CommandSink>(station: &mut Station<S>) {
    if let Err(e) = station.trigger_flush().await {
        error!("Flush failed: {}", e);
    }
}

fn publish_dashboard<S: CommandSink>(station: &Station<S>, path: Option<&str>) {
    let dashboard = station.dashboard();
    debug!(
        "Dashboard: {} records, temperature {:?}, battery {}",
        dashboard.records, dashboard.temperature, dashboard.battery_label
    );

    if let Some(path) = path {
        if let Err(e) = dashboard.write_json(path) {
            warn!("Failed to write dashboard to {}: {}", path, e);
        }
    }
}

fn log_status(dashboard: &Dashboard) {
    match &dashboard.now {
        Some(now) => info!("Records: {} (last at {} {})", dashboard.records, now.date, now.time),
        None => info!("Records: 0"),
    }
    info!(
        "Temperature: {:?} (mean {:?}), pressure: {:?}, battery: {}",
        dashboard.temperature, dashboard.temperature_mean, dashboard.pressure, dashboard.battery_label
    );
    if let Some(centroid) = &dashboard.centroid {
        info!(
            "GPS centroid: {:.6}, {:.6} over {} fixes",
            centroid.latitude, centroid.longitude, centroid.fixes
        );
    }
    info!(
        "Attitude: yaw {} pitch {} roll {}",
        dashboard.attitude.yaw, dashboard.attitude.pitch, dashboard.attitude.roll
    );
    info!(
        "Coercion errors: {}, frames dropped: {}",
        dashboard.coercion_errors, dashboard.frames_dropped
    );
}
