//! Thread-context state machine and unit events.
//!
//! ```text
//! Uninitialized --init--> Initializing --start--> Running
//!       |                      |                     |
//!       +--------dispose-------+------dispose--------+--> Disposing --> Disposed
//! ```
//!
//! Transitions only move forward. `dispose` is idempotent: calling it on a
//! unit that is already `Disposing` or `Disposed` does nothing.

use trine_core::UnitId;

/// Lifecycle state of an execution unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UnitState {
    /// Spawned, waiting for its init message.
    Uninitialized = 0,
    /// Bootstrapped; modules registered or registering; not ticking yet.
    Initializing = 1,
    /// Ticking.
    Running = 2,
    /// Dispose hooks running.
    Disposing = 3,
    /// Terminal.
    Disposed = 4,
}

impl UnitState {
    /// Decode a value stored with `as u8`. Unknown values map to
    /// `Disposed`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::Disposing,
            _ => Self::Disposed,
        }
    }

    /// `true` once dispose has begun.
    pub fn is_disposed(self) -> bool {
        matches!(self, Self::Disposing | Self::Disposed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Running)
                | (Uninitialized | Initializing | Running, Disposing)
                | (Disposing, Disposed)
        )
    }
}

/// Lifecycle notification sent by a threaded unit to its spawner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitEvent {
    /// Bootstrap and every module init succeeded.
    Initialized {
        /// Reporting unit.
        unit: UnitId,
    },
    /// Startup failed, or too many ticks failed in a row.
    Failed {
        /// Reporting unit.
        unit: UnitId,
        /// Human-readable cause.
        reason: String,
    },
    /// The unit thread disposed its context and is exiting.
    Stopped {
        /// Reporting unit.
        unit: UnitId,
        /// Ticks completed.
        ticks: u64,
    },
}
