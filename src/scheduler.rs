//! Duty-cycle task scheduling driven by the persistent reset counter.
//!
//! Time is measured in ticks, one per wake cycle. The counter lives in the
//! store and is incremented once per boot. Each task remembers the tick it
//! last ran at; a task is due once its interval has elapsed since then.
//!
//! The counter is bounded by `max_count`. When it runs past the bound, or a
//! task claims to have run in the future, the state is treated as corrupt
//! and every slot is reset to tick 1, starting a new epoch.

use crate::store::{KeyValueStore, StoreError, keys};
use log::{debug, info, warn};
use std::fmt;
use thiserror::Error;

/// One wake cycle.
pub type Tick = i64;

/// Error types for the scheduler.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// The persisted counter state cannot be trusted
    #[error("Counter corrupt at tick {tick}: {reason}")]
    CounterCorrupt { tick: Tick, reason: String },
    #[error("Invalid schedule configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The periodic tasks, in the order they run within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    WiredSensors,
    WirelessSensors,
    FirmwareUpdate,
    Telemetry,
}

impl TaskKind {
    /// Run order. Later tasks may rely on network state set up by earlier ones.
    pub const PRIORITY: [TaskKind; 4] = [
        TaskKind::WiredSensors,
        TaskKind::WirelessSensors,
        TaskKind::FirmwareUpdate,
        TaskKind::Telemetry,
    ];

    /// Slot holding the tick this task last ran at.
    pub fn store_key(self) -> &'static str {
        match self {
            TaskKind::WiredSensors => keys::ANALOG_T0,
            TaskKind::WirelessSensors => keys::HT_T0,
            TaskKind::FirmwareUpdate => keys::OTA_T0,
            TaskKind::Telemetry => keys::TLM_T0,
        }
    }

    /// A successful firmware update restarts the device and never returns,
    /// so that task is accounted for before it runs.
    pub fn records_before_run(self) -> bool {
        self == TaskKind::FirmwareUpdate
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::WiredSensors => "wired",
            TaskKind::WirelessSensors => "wireless",
            TaskKind::FirmwareUpdate => "firmware-update",
            TaskKind::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counter bound and per-task intervals, all in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub max_count: Tick,
    pub wired_interval: Tick,
    pub wireless_interval: Tick,
    pub update_interval: Tick,
    pub telemetry_interval: Tick,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_count: 120,
            wired_interval: 5,
            wireless_interval: 5,
            update_interval: 60,
            telemetry_interval: 5,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self, kind: TaskKind) -> Tick {
        match kind {
            TaskKind::WiredSensors => self.wired_interval,
            TaskKind::WirelessSensors => self.wireless_interval,
            TaskKind::FirmwareUpdate => self.update_interval,
            TaskKind::Telemetry => self.telemetry_interval,
        }
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.max_count <= 0 {
            return Err(ScheduleError::InvalidConfig(format!(
                "max count must be positive, got {}",
                self.max_count
            )));
        }
        for kind in TaskKind::PRIORITY {
            let interval = self.interval(kind);
            if interval <= 0 {
                return Err(ScheduleError::InvalidConfig(format!(
                    "{kind} interval must be positive, got {interval}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedule {
    pub kind: TaskKind,
    pub last_run_tick: Tick,
    pub interval_ticks: Tick,
}

impl TaskSchedule {
    pub fn is_due(&self, current_tick: Tick) -> bool {
        current_tick - self.last_run_tick >= self.interval_ticks
    }
}

/// What one wake cycle should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePlan {
    /// Due tasks in run order.
    pub tasks: Vec<TaskKind>,
    pub bring_up_network: bool,
}

impl CyclePlan {
    /// Nothing to run and no reason to power the radios.
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty() && !self.bring_up_network
    }
}

#[derive(Debug, Clone)]
pub struct DutyCycleScheduler {
    config: ScheduleConfig,
    current_tick: Tick,
    schedules: [TaskSchedule; 4],
    recovered: bool,
}

impl DutyCycleScheduler {
    /// Advance the reset counter for this boot and load the schedule.
    ///
    /// On first boot the counter and every task slot are created at 1.
    /// The new counter value is persisted before anything else happens.
    pub fn boot<S>(store: &mut S, config: ScheduleConfig) -> Result<Self, ScheduleError>
    where
        S: KeyValueStore + ?Sized,
    {
        config.validate()?;

        let tick = if store.contains(keys::RESET_COUNT) {
            let count = match store.get_int(keys::RESET_COUNT) {
                Ok(count) => count.unwrap_or(0),
                Err(e @ StoreError::TypeMismatch { .. }) => {
                    warn!("{e}; starting a new epoch");
                    return Ok(Self::new_epoch(store, config)?);
                }
                Err(e) => return Err(e.into()),
            };
            let tick = count.saturating_add(1);
            store.put_int(keys::RESET_COUNT, tick)?;
            tick
        } else {
            info!("first boot, initializing schedule");
            store.put_int(keys::RESET_COUNT, 1)?;
            for kind in TaskKind::PRIORITY {
                store.put_int(kind.store_key(), 1)?;
            }
            1
        };
        debug!("reset count {tick}");

        Self::from_store(store, config, tick)
    }

    /// Load the task slots for `current_tick`, repairing corrupt state.
    pub fn from_store<S>(
        store: &mut S,
        config: ScheduleConfig,
        current_tick: Tick,
    ) -> Result<Self, ScheduleError>
    where
        S: KeyValueStore + ?Sized,
    {
        config.validate()?;

        let mut schedules = TaskKind::PRIORITY.map(|kind| TaskSchedule {
            kind,
            last_run_tick: 0,
            interval_ticks: config.interval(kind),
        });
        let mut unreadable = None;
        for schedule in &mut schedules {
            match store.int_or_default(schedule.kind.store_key()) {
                Ok(tick) => schedule.last_run_tick = tick,
                Err(e @ StoreError::TypeMismatch { .. }) => unreadable = Some(e),
                Err(e) => return Err(e.into()),
            }
        }

        let mut scheduler = Self {
            config,
            current_tick,
            schedules,
            recovered: false,
        };

        let health = match unreadable {
            Some(e) => Err(ScheduleError::CounterCorrupt {
                tick: current_tick,
                reason: e.to_string(),
            }),
            None => scheduler.check_invariants(),
        };
        if let Err(e) = health {
            if current_tick == config.max_count + 1 {
                info!("counter passed {}, starting a new epoch", config.max_count);
            } else {
                warn!("{e}; starting a new epoch");
            }
            scheduler.recover(store)?;
        }

        Ok(scheduler)
    }

    pub fn check_invariants(&self) -> Result<(), ScheduleError> {
        let tick = self.current_tick;
        if !(0..=self.config.max_count).contains(&tick) {
            return Err(ScheduleError::CounterCorrupt {
                tick,
                reason: format!("outside 0..={}", self.config.max_count),
            });
        }
        if let Some(ahead) = self.schedules.iter().find(|s| s.last_run_tick > tick) {
            return Err(ScheduleError::CounterCorrupt {
                tick,
                reason: format!("{} last ran at {}", ahead.kind, ahead.last_run_tick),
            });
        }
        Ok(())
    }

    /// Start over at tick 1 without reading any slot.
    fn new_epoch<S>(store: &mut S, config: ScheduleConfig) -> Result<Self, StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        let mut scheduler = Self {
            config,
            current_tick: 1,
            schedules: TaskKind::PRIORITY.map(|kind| TaskSchedule {
                kind,
                last_run_tick: 1,
                interval_ticks: config.interval(kind),
            }),
            recovered: false,
        };
        scheduler.recover(store)?;
        Ok(scheduler)
    }

    /// Reset the counter and every task to tick 1 and persist all of it.
    fn recover<S>(&mut self, store: &mut S) -> Result<(), StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        self.current_tick = 1;
        self.recovered = true;
        store.put_int(keys::RESET_COUNT, 1)?;
        for schedule in &mut self.schedules {
            schedule.last_run_tick = 1;
            store.put_int(schedule.kind.store_key(), 1)?;
        }
        Ok(())
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Whether loading this cycle had to reset corrupt state.
    pub fn recovered(&self) -> bool {
        self.recovered
    }

    pub fn schedule(&self, kind: TaskKind) -> &TaskSchedule {
        &self.schedules[kind as usize]
    }

    pub fn due_tasks(&self) -> Vec<TaskKind> {
        self.schedules
            .iter()
            .filter(|s| s.is_due(self.current_tick))
            .map(|s| s.kind)
            .collect()
    }

    /// Decide what this cycle does. `network_requested` is an external
    /// request to connect even when nothing is due.
    pub fn plan(&self, network_requested: bool) -> CyclePlan {
        let tasks = self.due_tasks();
        let bring_up_network = network_requested || !tasks.is_empty();
        CyclePlan {
            tasks,
            bring_up_network,
        }
    }

    /// Record that `kind` ran at the current tick. Durable on return.
    pub fn mark_fired<S>(&mut self, store: &mut S, kind: TaskKind) -> Result<(), StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        let tick = self.current_tick;
        store.put_int(kind.store_key(), tick)?;
        self.schedules[kind as usize].last_run_tick = tick;
        info!("{kind} task accounted for at tick {tick}");
        Ok(())
    }

    /// Mark every task as run at the current tick so nothing is due.
    pub fn clear_all<S>(&mut self, store: &mut S) -> Result<(), StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        for kind in TaskKind::PRIORITY {
            store.put_int(kind.store_key(), self.current_tick)?;
            self.schedules[kind as usize].last_run_tick = self.current_tick;
        }
        Ok(())
    }
}
