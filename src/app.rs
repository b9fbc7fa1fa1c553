//! Core application runner (business logic) for `datagator`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically. One call to [`run_cycle`] is one
//! wake cycle of the logger: advance the reset counter, run whatever tasks
//! are due, stamp and route their records, and cache the time anchor.

use crate::frame::AdvertisementFrame;
use crate::ingest::AdvertisementIngestor;
use crate::mac_address::MacAddress;
use crate::output::console::ConsoleSink;
use crate::output::csv::CsvSink;
use crate::output::{LogRouter, Record};
use crate::peripherals::{HostPeripherals, Peripherals, UpdateOutcome, telemetry_record};
use crate::reconciler::{
    NetworkTimeSource, NoNetworkTime, ReconcilerConfig, SystemClock, TimestampReconciler,
};
use crate::scanner::{Backend, ScanError};
use crate::scheduler::{DutyCycleScheduler, ScheduleConfig, ScheduleError, TaskKind, Tick};
use crate::store::{JsonFileStore, KeyValueStore, StoreError};
use clap::Parser;
use log::{debug, info, warn};
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the wake cycle.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// File holding the reset counter, task ticks and time anchor.
    #[arg(long, default_value = "datagator-state.json")]
    pub store: PathBuf,

    /// Reset counter bound; the counter starts a new epoch after this tick.
    #[arg(long, default_value_t = 120)]
    pub max_count: Tick,

    /// Ticks between wired sensor readings.
    #[arg(long, default_value_t = 5)]
    pub wired_interval: Tick,

    /// Ticks between BLE sensor scans.
    #[arg(long, default_value_t = 5)]
    pub wireless_interval: Tick,

    /// Ticks between firmware update checks.
    #[arg(long, default_value_t = 60)]
    pub update_interval: Tick,

    /// Ticks between telemetry records.
    #[arg(long, default_value_t = 5)]
    pub telemetry_interval: Tick,

    /// Wall-clock minutes per tick when deriving relative time.
    #[arg(long, default_value_t = 1)]
    pub minutes_per_tick: i64,

    /// Length of the BLE scan window.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    #[arg(long, default_value = "10s", value_parser = crate::throttle::parse_duration)]
    pub scan_window: Duration,

    /// Throttle frames per sensor to at most one per interval.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::throttle::parse_duration)]
    pub throttle: Option<Duration>,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Never bring up the network; timestamps are relative to the cached anchor.
    #[arg(long)]
    pub offline: bool,

    /// Bring up the network this cycle even if no task is due.
    #[arg(long)]
    pub network_request: bool,

    /// Directory for daily CSV logs. Without it records only go to stdout.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Address of this aggregator, used in telemetry and wired topics.
    #[arg(long, default_value_t = MacAddress::default())]
    pub aggregator: MacAddress,

    /// Local offset from UTC in minutes for absolute timestamps.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub utc_offset: i32,

    /// Number of wake cycles to run before exiting.
    #[arg(long, default_value_t = 1)]
    pub cycles: u32,

    /// Sleep between wake cycles.
    #[arg(long, default_value = "64s", value_parser = crate::throttle::parse_duration)]
    pub sleep: Duration,

    /// Verbose output, log dropped frames and scheduler decisions
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options::parse_from(["datagator"])
    }
}

impl Options {
    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            max_count: self.max_count,
            wired_interval: self.wired_interval,
            wireless_interval: self.wireless_interval,
            update_interval: self.update_interval,
            telemetry_interval: self.telemetry_interval,
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_count: self.max_count,
            minutes_per_tick: self.minutes_per_tick,
        }
    }
}

/// Errors returned by the wake cycle.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        backend: Backend,
        window: Duration,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<AdvertisementFrame>, ScanError>> + Send + '_>,
    >;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        backend: Backend,
        window: Duration,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<AdvertisementFrame>, ScanError>> + Send + '_>,
    > {
        Box::pin(async move { crate::scanner::start_scan(backend, window).await })
    }
}

/// Everything outside the core that a cycle talks to.
pub struct Collaborators<'a> {
    pub scanner: &'a dyn Scanner,
    pub clock: &'a mut dyn NetworkTimeSource,
    pub peripherals: &'a mut dyn Peripherals,
    pub router: &'a mut LogRouter,
}

/// What one wake cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub tick: Tick,
    /// Corrupt counter state was reset this cycle.
    pub recovered: bool,
    /// Nothing was due; the radios stayed off.
    pub idle: bool,
    pub tasks: Vec<TaskKind>,
    /// Records delivered to at least one sink.
    pub records: usize,
    /// Records stamped with relative or unknown time.
    pub relative_records: usize,
    /// The time anchor was written to the store.
    pub anchor_cached: bool,
}

/// Run one wake cycle against `store`.
pub async fn run_cycle<S>(
    options: &Options,
    store: &mut S,
    io: &mut Collaborators<'_>,
) -> Result<CycleReport, RunError>
where
    S: KeyValueStore + ?Sized,
{
    let reconciler_config = options.reconciler_config();
    reconciler_config.validate()?;
    let mut scheduler = DutyCycleScheduler::boot(store, options.schedule_config())?;
    let tick = scheduler.current_tick();
    let plan = scheduler.plan(options.network_request);

    let mut report = CycleReport {
        tick,
        recovered: scheduler.recovered(),
        idle: plan.is_idle(),
        ..CycleReport::default()
    };
    if plan.is_idle() {
        info!("tick {tick}: nothing due, skipping network bring-up");
        return Ok(report);
    }

    let network_up = plan.bring_up_network && !options.offline;
    debug!(
        "tick {tick}: due {:?}, network {}",
        plan.tasks,
        if network_up { "up" } else { "down" }
    );

    let mut reconciler = TimestampReconciler::load(&*store, reconciler_config)?;

    for kind in plan.tasks {
        if kind.records_before_run() {
            scheduler.mark_fired(store, kind)?;
        }

        let records = match run_task(kind, options, io).await {
            Ok(records) => records,
            Err(e) => {
                warn!("{kind} task failed: {e}");
                Vec::new()
            }
        };

        for record in &records {
            let network_time = if network_up { io.clock.now() } else { None };
            let (timestamp, relative) = reconciler.next_timestamp(tick, network_time);
            if io.router.route(&timestamp, record) > 0 {
                report.records += 1;
                if relative {
                    report.relative_records += 1;
                }
            }
        }

        if !kind.records_before_run() {
            scheduler.mark_fired(store, kind)?;
        }
        report.tasks.push(kind);
    }

    report.anchor_cached = reconciler.commit(store, report.records > 0)?;
    Ok(report)
}

async fn run_task(
    kind: TaskKind,
    options: &Options,
    io: &mut Collaborators<'_>,
) -> Result<Vec<Record>, RunError> {
    match kind {
        TaskKind::WiredSensors => io
            .peripherals
            .read_wired()
            .iter()
            .map(|reading| reading.to_record(options.aggregator))
            .collect::<Result<Vec<_>, _>>()
            .map_err(RunError::from),
        TaskKind::WirelessSensors => scan_sensors(options, io.scanner).await,
        TaskKind::FirmwareUpdate => {
            match io.peripherals.check_firmware_update() {
                UpdateOutcome::UpToDate => debug!("firmware is up to date"),
                UpdateOutcome::Installed { version } => info!("installed firmware {version}"),
                UpdateOutcome::Failed(reason) => warn!("firmware update failed: {reason}"),
            }
            Ok(Vec::new())
        }
        TaskKind::Telemetry => {
            let battery = io.peripherals.battery();
            Ok(vec![telemetry_record(options.aggregator, battery)?])
        }
    }
}

/// Listen for one scan window and turn what was heard into records.
async fn scan_sensors(options: &Options, scanner: &dyn Scanner) -> Result<Vec<Record>, RunError> {
    let mut frames = scanner
        .start_scan(options.backend, options.scan_window)
        .await?;
    let mut ingestor = AdvertisementIngestor::new(options.aggregator, options.throttle);
    let mut records = Vec::new();

    // The backend closes the channel when the window ends; the deadline only
    // guards against a backend that never does.
    let deadline = tokio::time::Instant::now() + options.scan_window + Duration::from_secs(1);
    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, frames.recv()).await {
        if let Some(record) = ingestor.ingest(&frame) {
            records.push(record);
        }
    }

    info!(
        "scan window closed: {} readings, {} frames dropped",
        ingestor.accepted(),
        ingestor.dropped()
    );
    Ok(records)
}

/// Run `options.cycles` wake cycles against the on-disk store, writing
/// records to `out` and, if configured, to daily CSV files.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: impl Write + Send + 'static,
) -> Result<Vec<CycleReport>, RunError> {
    let mut store = JsonFileStore::open(&options.store)?;

    let mut router = LogRouter::new().with_sink(ConsoleSink::new(out));
    if let Some(dir) = &options.log_dir {
        router = router.with_sink(CsvSink::new(dir)?);
    }

    let mut system_clock = SystemClock {
        offset_minutes: options.utc_offset,
    };
    let mut no_clock = NoNetworkTime;
    let clock: &mut dyn NetworkTimeSource = if options.offline {
        &mut no_clock
    } else {
        &mut system_clock
    };
    let mut peripherals = HostPeripherals::default();

    let mut io = Collaborators {
        scanner,
        clock,
        peripherals: &mut peripherals,
        router: &mut router,
    };

    let mut reports = Vec::new();
    for cycle in 0..options.cycles {
        if cycle > 0 {
            debug!("sleeping {:?}", options.sleep);
            tokio::time::sleep(options.sleep).await;
        }
        let report = run_cycle(&options, &mut store, &mut io).await?;
        info!(
            "tick {}: {} records from {} tasks",
            report.tick,
            report.records,
            report.tasks.len()
        );
        reports.push(report);
    }

    Ok(reports)
}
