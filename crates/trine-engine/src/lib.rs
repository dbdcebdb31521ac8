//! Execution units for Trine.
//!
//! An execution unit is a single-threaded worker (game simulation,
//! rendering, the main thread) that owns its state and runs a fixed-rate
//! tick pipeline. Units never share mutable state: they exchange frames
//! through triple buffers from `trine-buffer` and everything else through
//! bounded inbox messages.
//!
//! - [`UnitKind`] describes a unit: its state, message type, and init
//!   payload.
//! - [`ModuleDef`]s extend a unit at startup with systems
//!   ([`SystemDef`]), message handlers, dispose hooks, and per-module
//!   state.
//! - [`ResourceManager`] and [`ResourceHost`] implement the cross-unit
//!   resource protocol.
//! - [`LocalUnit`] drives a unit on the caller's thread;
//!   [`spawn_unit`] drives it on its own thread.
//!
//! ```
//! use trine_core::{ResourceIdAllocator, UnitId};
//! use trine_engine::{
//!     ModuleDef, ModuleError, PendingUnit, SystemDef, UnitConfig, UnitKind, Wiring,
//! };
//!
//! struct Counter;
//!
//! impl UnitKind for Counter {
//!     type State = u64;
//!     type Message = ();
//!     type Init = u64;
//!
//!     fn bootstrap(start: u64, _: &mut Wiring<'_>) -> Result<u64, ModuleError> {
//!         Ok(start)
//!     }
//! }
//!
//! let counting = ModuleDef::<Counter>::new("counting", |ctx| {
//!     ctx.add_system(SystemDef::<Counter>::new("increment", |ctx| {
//!         ctx.state += 1;
//!         Ok(())
//!     }))?;
//!     Ok(())
//! });
//!
//! let pending = PendingUnit::<Counter>::new(
//!     UnitId(1),
//!     UnitConfig::named("counter"),
//!     ResourceIdAllocator::new(),
//! )
//! .unwrap();
//! let mut unit = pending.initialize(10, vec![counting]).unwrap();
//! unit.start();
//! unit.tick().unwrap();
//! unit.tick().unwrap();
//! assert_eq!(*unit.state(), 12);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod host;
pub mod kind;
pub mod lifecycle;
pub mod message;
pub mod metrics;
pub mod module;
pub mod port;
pub mod resource;
pub mod sync;
pub mod system;
pub mod task;
pub mod tick;
pub mod unit;

pub use config::{ConfigError, UnitConfig};
pub use context::{TimeState, UnitContext};
pub use error::{
    ModuleError, PostError, ResourceError, ScheduleError, SystemError, TickError, UnitError,
    WiringError,
};
pub use handler::{HandlerFn, HandlerId, KindOf};
pub use host::ResourceHost;
pub use kind::UnitKind;
pub use lifecycle::{UnitEvent, UnitState};
pub use message::{AppMessage, Control, Envelope, Payload, ResourceMessage};
pub use metrics::{TickMetrics, UnitStats};
pub use module::{ModuleDef, ModuleStore};
pub use port::{ResourcePort, UnitPort};
pub use resource::{downcast, ResourceManager, ResourceOptions, ResourceStatus, ResourceWait};
pub use sync::{CommitSummary, InputId, OutputId, RefreshSummary, SyncPorts, Wiring};
pub use system::{Phase, SystemDef, SystemFn};
pub use tick::TickReport;
pub use unit::{spawn_unit, LocalUnit, PendingUnit, ShutdownReport, UnitHandle};
