//! Trine: single-threaded execution units that share frames through
//! lock-free triple buffers.
//!
//! This is the facade crate re-exporting the public API of the Trine
//! sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use trine::prelude::*;
//!
//! struct Game;
//!
//! struct GameState {
//!     out: OutputId,
//!     hp: u32,
//! }
//!
//! impl UnitKind for Game {
//!     type State = GameState;
//!     type Message = ();
//!     type Init = (FlagWriter, ObjectTripleBuffer);
//!
//!     fn bootstrap(
//!         (writer, buffer): (FlagWriter, ObjectTripleBuffer),
//!         wiring: &mut Wiring<'_>,
//!     ) -> Result<GameState, ModuleError> {
//!         wiring.sync.add_writer(writer)?;
//!         let out = wiring.sync.add_output(buffer)?;
//!         Ok(GameState { out, hp: 100 })
//!     }
//! }
//!
//! let schema = Schema::builder("health")
//!     .field("hp", ElementType::U32, 1)
//!     .build()
//!     .unwrap();
//! let (flags, writer) = TripleBufferFlags::new(1);
//! let health = ObjectTripleBuffer::new(schema, &flags);
//! let mut reader = flags.reader().unwrap();
//!
//! let damage = ModuleDef::<Game>::new("damage", |ctx| {
//!     ctx.add_system(SystemDef::<Game>::new("take_damage", |ctx| {
//!         ctx.state.hp -= 1;
//!         let hp = ctx.state.hp;
//!         ctx.sync.local(ctx.state.out).span::<u32>("hp")?.set(0, hp);
//!         Ok(())
//!     }))?;
//!     Ok(())
//! });
//!
//! let mut game = PendingUnit::<Game>::new(
//!     UnitId(1),
//!     UnitConfig::named("game"),
//!     ResourceIdAllocator::new(),
//! )
//! .unwrap()
//! .initialize((writer, health.clone()), vec![damage])
//! .unwrap();
//! game.start();
//! game.tick().unwrap();
//! game.tick().unwrap();
//!
//! let hp = health
//!     .read_with(&mut reader, |view| view.span::<u32>("hp").unwrap().get(0))
//!     .unwrap();
//! assert_eq!(hp, 98);
//! assert_eq!(flags.latest_generation(), Generation(2));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `trine-core` | Ids, element types, resource id allocation |
//! | [`buffer`] | `trine-buffer` | Schemas, shared regions, triple buffers |
//! | [`engine`] | `trine-engine` | Units, modules, systems, messages, resources |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ids and element types (`trine-core`).
pub use trine_core as types;

/// Schema-typed shared memory and the triple-buffer protocol
/// (`trine-buffer`).
///
/// [`buffer::ObjectTripleBuffer`] is the usual entry point; the
/// [`buffer::TripleBufferFlags`] register decides which slot each side
/// may touch.
pub use trine_buffer as buffer;

/// Execution units (`trine-engine`).
///
/// [`engine::LocalUnit`] for units driven by the caller,
/// [`engine::spawn_unit`] for units on their own thread.
pub use trine_engine as engine;

/// Common imports for typical Trine usage.
///
/// ```rust
/// use trine::prelude::*;
/// ```
pub mod prelude {
    // Ids
    pub use trine_core::{
        ElementType, Generation, ResourceId, ResourceIdAllocator, ResourceKind, TickId, UnitId,
    };

    // Buffers
    pub use trine_buffer::{
        FlagReader, FlagWriter, ObjectBufferView, ObjectTripleBuffer, ReadView, Schema,
        TripleBufferFlags,
    };

    // Errors
    pub use trine_buffer::{BufferError, ReadError, SchemaError, ViewError};
    pub use trine_engine::{ModuleError, ResourceError, SystemError, TickError, UnitError};

    // Units
    pub use trine_engine::{
        spawn_unit, AppMessage, InputId, LocalUnit, ModuleDef, OutputId, PendingUnit, Phase,
        ResourceStatus, SystemDef, UnitConfig, UnitContext, UnitHandle, UnitKind, UnitState,
        Wiring,
    };
}
