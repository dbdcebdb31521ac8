//! Per-tick metrics and cross-thread unit statistics.
//!
//! [`TickMetrics`] describes the most recent tick and lives on the unit
//! thread. [`UnitStats`] is a block of atomics shared with the spawner so
//! other threads can watch a unit without messaging it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::lifecycle::UnitState;

/// Timing and hand-off data for a single tick.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default)]
pub struct TickMetrics {
    /// Wall-clock time for the whole tick.
    pub total_us: u64,
    /// Per-system execution times: `(name, microseconds)`.
    pub systems_us: Vec<(String, u64)>,
    /// Time spent committing outputs and swapping writers.
    pub commit_us: u64,
    /// Input groups whose snapshot moved to a newer frame at tick start.
    pub fresh_reads: u32,
    /// Input copies discarded because the slot was reclaimed mid-copy.
    pub torn_reads: u32,
    /// Input groups that kept the previous snapshot this tick.
    pub stale_inputs: u32,
    /// Writer swaps this tick that fell back to round-robin.
    pub contended_swaps: u32,
}

/// Counters shared between a unit thread and its observers.
#[derive(Debug)]
pub struct UnitStats {
    ticks: AtomicU64,
    last_frame_us: AtomicU64,
    messages: AtomicU64,
    failed_ticks: AtomicU64,
    state: AtomicU8,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            last_frame_us: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            failed_ticks: AtomicU64::new(0),
            state: AtomicU8::new(UnitState::Uninitialized as u8),
        }
    }
}

impl UnitStats {
    /// Completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Duration of the most recent tick in microseconds.
    pub fn last_frame_us(&self) -> u64 {
        self.last_frame_us.load(Ordering::Relaxed)
    }

    /// Inbox messages handled.
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Ticks that failed.
    pub fn failed_ticks(&self) -> u64 {
        self.failed_ticks.load(Ordering::Relaxed)
    }

    /// Last lifecycle state published by the unit.
    pub fn state(&self) -> UnitState {
        UnitState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn record_tick(&self, frame_us: u64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_frame_us.store(frame_us, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_state(&self, state: UnitState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = TickMetrics::default();
        assert_eq!(m.total_us, 0);
        assert!(m.systems_us.is_empty());
        assert_eq!(m.commit_us, 0);
        assert_eq!(m.fresh_reads, 0);
        assert_eq!(m.torn_reads, 0);
        assert_eq!(m.stale_inputs, 0);
        assert_eq!(m.contended_swaps, 0);
    }

    #[test]
    fn stats_start_uninitialized() {
        let stats = UnitStats::default();
        assert_eq!(stats.state(), UnitState::Uninitialized);
        stats.record_tick(120);
        stats.record_tick(80);
        stats.record_message();
        stats.set_state(UnitState::Running);
        assert_eq!(stats.ticks(), 2);
        assert_eq!(stats.last_frame_us(), 80);
        assert_eq!(stats.messages(), 1);
        assert_eq!(stats.failed_ticks(), 0);
        assert_eq!(stats.state(), UnitState::Running);
    }
}
