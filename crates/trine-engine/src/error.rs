//! Error types for execution units.
//!
//! Module and wiring errors abort unit startup. System errors fail one
//! tick; the unit keeps running until
//! [`max_consecutive_failures`](crate::UnitConfig::max_consecutive_failures)
//! ticks in a row have failed. Resource and posting errors are returned to
//! the caller that issued the request.

use thiserror::Error;
use trine_buffer::{BufferError, FlagsId, SchemaError, ViewError};
use trine_core::{ResourceId, UnitId};

use crate::config::ConfigError;
use crate::lifecycle::UnitState;

/// A message could not be placed in a unit's inbox.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PostError {
    /// The bounded inbox is full.
    #[error("inbox of {unit} is full")]
    Full {
        /// Destination unit.
        unit: UnitId,
    },
    /// The unit has shut down.
    #[error("{unit} has shut down")]
    Disconnected {
        /// Destination unit.
        unit: UnitId,
    },
}

/// Errors raised by the requester side of the resource protocol.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// No live record with this id.
    #[error("unknown resource {id}")]
    Unknown {
        /// Requested id.
        id: ResourceId,
    },
    /// No port to the owning unit has been registered.
    #[error("no resource port registered for owner {owner}")]
    UnknownOwner {
        /// Owning unit.
        owner: UnitId,
    },
    /// The owner failed to load the resource.
    #[error("loading {id} failed: {reason}")]
    LoadFailed {
        /// Resource id.
        id: ResourceId,
        /// Reason reported by the owner.
        reason: String,
    },
    /// The record was disposed while a caller was waiting on it.
    #[error("{id} was disposed")]
    Disposed {
        /// Resource id.
        id: ResourceId,
    },
    /// Every resource id has been handed out.
    #[error("resource ids exhausted")]
    IdsExhausted,
    /// The load request could not be delivered.
    #[error(transparent)]
    Post(#[from] PostError),
}

/// Errors raised while wiring triple buffers into a unit.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WiringError {
    /// An output buffer was added before the writer of its flag group.
    #[error("no writer registered for {flags}")]
    NoWriter {
        /// Flag group of the buffer.
        flags: FlagsId,
    },
    /// A reader of this flag group is already registered.
    #[error("a reader for {flags} is already registered")]
    DuplicateReader {
        /// Flag group.
        flags: FlagsId,
    },
    /// The writer of this flag group is already registered.
    #[error("the writer for {flags} is already registered")]
    DuplicateWriter {
        /// Flag group.
        flags: FlagsId,
    },
    /// An input buffer was added before the reader of its flag group.
    #[error("no reader registered for {flags}")]
    NoReader {
        /// Flag group of the buffer.
        flags: FlagsId,
    },
}

/// Errors raised while building the system order.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Ordering constraints form a cycle.
    #[error("ordering constraints form a cycle through {systems:?}")]
    Cycle {
        /// Systems left unsorted.
        systems: Vec<String>,
    },
    /// A system with this name is already registered.
    #[error("system `{name}` is already registered")]
    Duplicate {
        /// Offending name.
        name: String,
    },
}

/// Failure of a system or message handler.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Free-form failure.
    #[error("{0}")]
    Failed(String),
    /// Field lookup failed.
    #[error(transparent)]
    View(#[from] ViewError),
    /// Buffer operation failed.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// Resource request failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// Message could not be posted.
    #[error(transparent)]
    Post(#[from] PostError),
}

impl SystemError {
    /// Free-form failure with a reason.
    pub fn msg(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Failure while bootstrapping a unit or initialising a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A module's init function failed; startup was aborted.
    #[error("module `{module}` failed to initialise: {source}")]
    Init {
        /// Module name.
        module: &'static str,
        /// Underlying failure.
        source: Box<ModuleError>,
    },
    /// Free-form failure.
    #[error("{0}")]
    Failed(String),
    /// `block_on` gave up waiting.
    #[error("gave up after waiting {waited_ms} ms")]
    Timeout {
        /// Time waited.
        waited_ms: u64,
    },
    /// `block_on` was called outside module initialisation.
    #[error("block_on is only available during module initialisation")]
    NotInitializing,
    /// The unit's inbox closed while waiting.
    #[error("inbox disconnected")]
    Disconnected,
    /// See [`ResourceError`].
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// See [`BufferError`].
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// See [`SchemaError`].
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// See [`ViewError`].
    #[error(transparent)]
    View(#[from] ViewError),
    /// See [`WiringError`].
    #[error(transparent)]
    Wiring(#[from] WiringError),
    /// See [`ScheduleError`].
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// See [`PostError`].
    #[error(transparent)]
    Post(#[from] PostError),
}

impl ModuleError {
    /// Free-form failure with a reason.
    pub fn msg(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// A tick did not complete.
#[derive(Debug, Error)]
pub enum TickError {
    /// The unit is not in the `Running` state.
    #[error("unit is not running (state: {state:?})")]
    NotRunning {
        /// Current lifecycle state.
        state: UnitState,
    },
    /// A system failed; nothing was committed.
    #[error("system `{system}` failed: {source}")]
    System {
        /// System name.
        system: String,
        /// Underlying failure.
        source: SystemError,
    },
    /// The system order could not be built.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// Snapshotting an input or committing an output failed.
    #[error("buffer hand-off failed: {0}")]
    Buffer(#[from] BufferError),
}

/// Errors raised by unit drivers.
#[derive(Debug, Error)]
pub enum UnitError {
    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Bootstrap or module initialisation failed.
    #[error(transparent)]
    Module(#[from] ModuleError),
    /// The unit reported an initialisation failure.
    #[error("unit failed to initialise: {reason}")]
    InitFailed {
        /// Failure reported by the unit thread.
        reason: String,
    },
    /// `initialize` was called twice.
    #[error("unit was already initialised")]
    AlreadyInitialized,
    /// The unit did not report in time.
    #[error("unit did not become ready in time")]
    Timeout,
    /// The unit thread has exited.
    #[error("unit thread has exited")]
    Disconnected,
    /// The unit thread could not be spawned.
    #[error("failed to spawn unit thread: {0}")]
    Spawn(String),
}
