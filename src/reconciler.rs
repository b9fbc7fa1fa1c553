//! Timestamp reconciliation across wake cycles.
//!
//! With a network clock every record gets absolute time, and that time
//! becomes the anchor together with the tick it was taken at. Without one,
//! time is the anchor plus the ticks elapsed since, corrected for the
//! counter wrapping past its bound. With neither, records carry the
//! unknown timestamp.
//!
//! Relative timestamps are always computed from the anchor and never from
//! each other, and the anchor only moves when absolute time was seen.

use crate::scheduler::{ScheduleError, Tick};
use crate::store::{KeyValueStore, StoreError, keys};
use crate::timestamp::{TimeError, Timestamp};
use log::{debug, warn};
use time::OffsetDateTime;
use time::format_description;

/// An absolute clock reading from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteClock {
    pub epoch_seconds: i64,
    /// Local offset from UTC used when rendering the timestamp.
    pub offset_minutes: i32,
}

/// Source of absolute time, available only while the network is up.
pub trait NetworkTimeSource {
    fn now(&mut self) -> Option<AbsoluteClock>;
}

/// Host system clock, treated as network-synchronized.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    pub offset_minutes: i32,
}

impl NetworkTimeSource for SystemClock {
    fn now(&mut self) -> Option<AbsoluteClock> {
        let now = OffsetDateTime::now_utc();
        if log::log_enabled!(log::Level::Debug)
            && let Ok(format) = format_description::parse_borrowed::<2>(
                "[day].[month].[year] - [hour]:[minute]:[second]"
            )
            && let Ok(text) = now.format(&format)
        {
            debug!("system clock reads {text} UTC");
        }
        Some(AbsoluteClock {
            epoch_seconds: now.unix_timestamp(),
            offset_minutes: self.offset_minutes,
        })
    }
}

/// No network time, as when the device runs offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNetworkTime;

impl NetworkTimeSource for NoNetworkTime {
    fn now(&mut self) -> Option<AbsoluteClock> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    Absolute,
    Relative,
}

/// Persisted anchor plus the mode of the latest stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampState {
    /// Last network-confirmed time.
    pub cached_absolute: Option<Timestamp>,
    /// Tick at which `cached_absolute` was captured.
    pub cached_offset_tick: Tick,
    pub mode: TimeMode,
}

impl Default for TimestampState {
    fn default() -> Self {
        Self {
            cached_absolute: None,
            cached_offset_tick: 0,
            mode: TimeMode::Relative,
        }
    }
}

impl TimestampState {
    /// Read the anchor slots. A missing, sentinel or unreadable timestamp
    /// means there is no anchor, and so does an offset tick outside
    /// `0..=max_count` or a slot holding the wrong type.
    pub fn load<S>(store: &S, max_count: Tick) -> Result<Self, StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        let text = match store.get_string(keys::TIMESTAMP) {
            Ok(text) => text,
            Err(e @ StoreError::TypeMismatch { .. }) => {
                warn!("ignoring cached timestamp: {e}");
                None
            }
            Err(e) => return Err(e),
        };
        let cached_absolute = match text.as_deref().map(Timestamp::parse) {
            None => None,
            Some(Ok(ts)) if ts.is_unknown() => None,
            Some(Ok(ts)) => Some(ts),
            Some(Err(e)) => {
                warn!("ignoring cached timestamp: {e}");
                None
            }
        };

        let cached_offset_tick = match store.int_or_default(keys::LOG_OFFSET) {
            Ok(tick) => tick,
            Err(e @ StoreError::TypeMismatch { .. }) => {
                warn!("ignoring cached timestamp: {e}");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        if cached_absolute.is_some() && !(0..=max_count).contains(&cached_offset_tick) {
            warn!(
                "ignoring cached timestamp: offset tick {cached_offset_tick} outside 0..={max_count}"
            );
            return Ok(Self::default());
        }

        Ok(Self {
            cached_absolute,
            cached_offset_tick,
            mode: TimeMode::Relative,
        })
    }

    /// Write the anchor slots, timestamp first.
    pub fn save<S>(&self, store: &mut S) -> Result<(), StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        let text = self.cached_absolute.unwrap_or(Timestamp::UNKNOWN).format();
        store.put_string(keys::TIMESTAMP, &text)?;
        store.put_int(keys::LOG_OFFSET, self.cached_offset_tick)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Bound of the reset counter; must match the scheduler's.
    pub max_count: Tick,
    /// Wall-clock minutes represented by one tick.
    pub minutes_per_tick: i64,
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.max_count <= 0 {
            return Err(ScheduleError::InvalidConfig(format!(
                "max count must be positive, got {}",
                self.max_count
            )));
        }
        if self.minutes_per_tick <= 0 {
            return Err(ScheduleError::InvalidConfig(format!(
                "minutes per tick must be positive, got {}",
                self.minutes_per_tick
            )));
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_count: 120,
            minutes_per_tick: 1,
        }
    }
}

/// Ticks from `anchor_tick` to `current_tick`, assuming the counter wrapped
/// at `max_count` if the anchor is ahead. Never negative.
///
/// ```
/// use datagator::reconciler::wrapped_delta;
///
/// assert_eq!(wrapped_delta(10, 14, 120), 4);
/// assert_eq!(wrapped_delta(118, 3, 120), 5);
/// ```
pub fn wrapped_delta(anchor_tick: Tick, current_tick: Tick, max_count: Tick) -> Tick {
    let delta = if anchor_tick > current_tick {
        (max_count - anchor_tick) + current_tick
    } else {
        current_tick - anchor_tick
    };
    delta.max(0)
}

#[derive(Debug, Clone)]
pub struct TimestampReconciler {
    config: ReconcilerConfig,
    state: TimestampState,
    anchor_moved: bool,
}

impl TimestampReconciler {
    pub fn new(config: ReconcilerConfig, state: TimestampState) -> Self {
        Self {
            config,
            state,
            anchor_moved: false,
        }
    }

    pub fn load<S>(store: &S, config: ReconcilerConfig) -> Result<Self, StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        Ok(Self::new(config, TimestampState::load(store, config.max_count)?))
    }

    pub fn state(&self) -> &TimestampState {
        &self.state
    }

    /// Stamp a record taken at `current_tick`. The flag is `true` when the
    /// timestamp is relative or unknown.
    pub fn next_timestamp(
        &mut self,
        current_tick: Tick,
        network_time: Option<AbsoluteClock>,
    ) -> (Timestamp, bool) {
        if let Some(clock) = network_time {
            match Timestamp::from_epoch(clock.epoch_seconds, clock.offset_minutes) {
                Ok(ts) => {
                    self.state.cached_absolute = Some(ts);
                    self.state.cached_offset_tick = current_tick;
                    self.state.mode = TimeMode::Absolute;
                    self.anchor_moved = true;
                    return (ts, false);
                }
                Err(e) => warn!("unusable network time {}: {e}", clock.epoch_seconds),
            }
        }

        self.state.mode = TimeMode::Relative;
        match self.relative_timestamp(current_tick) {
            Ok(ts) => (ts, true),
            Err(TimeError::NoReferenceAvailable) => (Timestamp::UNKNOWN, true),
            Err(e) => {
                warn!("cannot derive relative time at tick {current_tick}: {e}");
                (Timestamp::UNKNOWN, true)
            }
        }
    }

    /// Anchor plus elapsed ticks, without touching the anchor.
    pub fn relative_timestamp(&self, current_tick: Tick) -> Result<Timestamp, TimeError> {
        let anchor = self
            .state
            .cached_absolute
            .ok_or(TimeError::NoReferenceAvailable)?;
        let delta = wrapped_delta(
            self.state.cached_offset_tick,
            current_tick,
            self.config.max_count,
        );
        anchor.add_minutes(delta.saturating_mul(self.config.minutes_per_tick))
    }

    /// Persist the anchor at the end of a cycle. Nothing is written unless
    /// records were logged and absolute time moved the anchor. Returns
    /// whether the store was written.
    pub fn commit<S>(&mut self, store: &mut S, logged: bool) -> Result<bool, StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        if !logged {
            debug!("nothing logged, anchor not cached");
            return Ok(false);
        }
        if !self.anchor_moved {
            return Ok(false);
        }
        self.state.save(store)?;
        self.anchor_moved = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    // 03-07-2024T09:05:00+0
    const ANCHOR_EPOCH: i64 = 1_709_802_300;

    fn clock(epoch_seconds: i64) -> Option<AbsoluteClock> {
        Some(AbsoluteClock {
            epoch_seconds,
            offset_minutes: 0,
        })
    }

    fn anchored(tick: Tick) -> TimestampReconciler {
        let mut reconciler =
            TimestampReconciler::new(ReconcilerConfig::default(), TimestampState::default());
        reconciler.next_timestamp(tick, clock(ANCHOR_EPOCH));
        reconciler
    }

    #[test]
    fn wraparound_delta() {
        assert_eq!(wrapped_delta(118, 3, 120), 5);
        assert_eq!(wrapped_delta(3, 3, 120), 0);
        assert_eq!(wrapped_delta(1, 120, 120), 119);
        assert_eq!(wrapped_delta(500, 3, 120), 0);
    }

    #[test]
    fn out_of_range_offset_tick_means_no_anchor() {
        let mut store = MemoryStore::new();
        store
            .put_string(keys::TIMESTAMP, "03-07-2024T09:05:00+0")
            .unwrap();
        store.put_int(keys::LOG_OFFSET, 500).unwrap();

        let mut reconciler =
            TimestampReconciler::load(&store, ReconcilerConfig::default()).unwrap();
        assert_eq!(reconciler.state(), &TimestampState::default());
        let (ts, relative) = reconciler.next_timestamp(3, None);
        assert!(relative);
        assert!(ts.is_unknown());

        store.put_int(keys::LOG_OFFSET, -2).unwrap();
        assert_eq!(TimestampState::load(&store, 120).unwrap().cached_absolute, None);
    }

    #[test]
    fn mistyped_anchor_slots_mean_no_anchor() {
        let mut store = MemoryStore::new();
        store.put_int(keys::TIMESTAMP, 1_709_802_300).unwrap();
        store.put_int(keys::LOG_OFFSET, 10).unwrap();
        let reconciler = TimestampReconciler::load(&store, ReconcilerConfig::default()).unwrap();
        assert_eq!(reconciler.state().cached_absolute, None);

        store
            .put_string(keys::TIMESTAMP, "03-07-2024T09:05:00+0")
            .unwrap();
        store.put_string(keys::LOG_OFFSET, "ten").unwrap();
        let reconciler = TimestampReconciler::load(&store, ReconcilerConfig::default()).unwrap();
        assert_eq!(reconciler.state(), &TimestampState::default());
    }

    #[test]
    fn config_requires_positive_minutes_per_tick() {
        assert!(ReconcilerConfig::default().validate().is_ok());
        for minutes_per_tick in [0, -1] {
            let config = ReconcilerConfig {
                max_count: 120,
                minutes_per_tick,
            };
            assert!(matches!(
                config.validate(),
                Err(ScheduleError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn network_time_is_absolute_and_sets_anchor() {
        let mut reconciler =
            TimestampReconciler::new(ReconcilerConfig::default(), TimestampState::default());
        let (ts, relative) = reconciler.next_timestamp(42, clock(ANCHOR_EPOCH));

        assert!(!relative);
        assert_eq!(ts.to_string(), "03-07-2024T09:05:00+0");
        assert_eq!(reconciler.state().mode, TimeMode::Absolute);
        assert_eq!(reconciler.state().cached_absolute, Some(ts));
        assert_eq!(reconciler.state().cached_offset_tick, 42);
    }

    #[test]
    fn relative_time_counts_ticks_from_anchor() {
        let mut reconciler = anchored(10);
        let (ts, relative) = reconciler.next_timestamp(14, None);
        assert!(relative);
        assert_eq!(ts.to_string(), "03-07-2024T09:09:00+0");
        assert_eq!(reconciler.state().mode, TimeMode::Relative);
    }

    #[test]
    fn relative_time_across_wraparound() {
        let mut reconciler = anchored(118);
        let (ts, relative) = reconciler.next_timestamp(3, None);
        assert!(relative);
        assert_eq!(ts.to_string(), "03-07-2024T09:10:00+0");
    }

    #[test]
    fn relative_stamps_do_not_move_anchor() {
        let mut reconciler = anchored(10);
        let (first, _) = reconciler.next_timestamp(12, None);
        let (second, _) = reconciler.next_timestamp(15, None);

        assert_eq!(first.to_string(), "03-07-2024T09:07:00+0");
        assert_eq!(second.to_string(), "03-07-2024T09:10:00+0");
        assert_eq!(reconciler.state().cached_offset_tick, 10);
    }

    #[test]
    fn no_reference_gives_sentinel() {
        let mut reconciler =
            TimestampReconciler::new(ReconcilerConfig::default(), TimestampState::default());
        let (ts, relative) = reconciler.next_timestamp(7, None);
        assert!(relative);
        assert!(ts.is_unknown());
        assert_eq!(ts.to_string(), "00-00-0000T00:00:00+0");
        assert_eq!(
            reconciler.relative_timestamp(7),
            Err(TimeError::NoReferenceAvailable)
        );
    }

    #[test]
    fn minutes_per_tick_scales_delta() {
        let config = ReconcilerConfig {
            max_count: 120,
            minutes_per_tick: 2,
        };
        let mut reconciler = TimestampReconciler::new(config, TimestampState::default());
        reconciler.next_timestamp(100, clock(ANCHOR_EPOCH));
        let (ts, _) = reconciler.next_timestamp(110, None);
        assert_eq!(ts.to_string(), "03-07-2024T09:25:00+0");
    }

    #[test]
    fn commit_only_after_logging_with_new_anchor() {
        let mut store = MemoryStore::new();

        let mut reconciler = anchored(10);
        assert!(!reconciler.commit(&mut store, false).unwrap());
        assert!(store.writes().is_empty());

        assert!(reconciler.commit(&mut store, true).unwrap());
        assert_eq!(
            store.get_string(keys::TIMESTAMP).unwrap().as_deref(),
            Some("03-07-2024T09:05:00+0")
        );
        assert_eq!(store.get_int(keys::LOG_OFFSET).unwrap(), Some(10));

        // relative-only cycle leaves the stored anchor alone
        let mut next = TimestampReconciler::load(&store, ReconcilerConfig::default()).unwrap();
        store.clear_writes();
        next.next_timestamp(13, None);
        assert!(!next.commit(&mut store, true).unwrap());
        assert!(store.writes().is_empty());
    }

    #[test]
    fn state_round_trips_through_store() {
        let mut store = MemoryStore::new();
        let state = TimestampState {
            cached_absolute: Some(Timestamp::parse("12-31-2023T23:58:00-300").unwrap()),
            cached_offset_tick: 117,
            mode: TimeMode::Absolute,
        };
        state.save(&mut store).unwrap();

        let loaded = TimestampState::load(&store, 120).unwrap();
        assert_eq!(loaded.cached_absolute, state.cached_absolute);
        assert_eq!(loaded.cached_offset_tick, 117);
        assert_eq!(loaded.mode, TimeMode::Relative);
    }

    #[test]
    fn empty_or_sentinel_store_has_no_anchor() {
        let mut store = MemoryStore::new();
        assert_eq!(TimestampState::load(&store, 120).unwrap(), TimestampState::default());

        store
            .put_string(keys::TIMESTAMP, "00-00-0000T00:00:00+0")
            .unwrap();
        assert_eq!(TimestampState::load(&store, 120).unwrap().cached_absolute, None);

        store.put_string(keys::TIMESTAMP, "garbage").unwrap();
        assert_eq!(TimestampState::load(&store, 120).unwrap().cached_absolute, None);
    }

    #[test]
    fn reboot_uses_persisted_anchor() {
        let mut store = MemoryStore::new();
        let mut first = anchored(118);
        first.commit(&mut store, true).unwrap();

        let mut after_reboot =
            TimestampReconciler::load(&store, ReconcilerConfig::default()).unwrap();
        let (ts, relative) = after_reboot.next_timestamp(3, None);
        assert!(relative);
        assert_eq!(ts.to_string(), "03-07-2024T09:10:00+0");
    }

    #[test]
    fn no_network_source_is_silent() {
        assert_eq!(NoNetworkTime.now(), None);
        let reading = SystemClock { offset_minutes: 60 }.now().unwrap();
        assert_eq!(reading.offset_minutes, 60);
        assert!(reading.epoch_seconds > ANCHOR_EPOCH);
    }
}
