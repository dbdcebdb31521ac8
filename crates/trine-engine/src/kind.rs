//! The type-level description of an execution unit.

use crate::error::ModuleError;
use crate::message::AppMessage;
use crate::sync::Wiring;

/// Describes one kind of execution unit (game, render, ...).
///
/// The init message carries [`Init`](Self::Init): every shared-buffer
/// handle, flag-register endpoint, and port the unit needs. `bootstrap`
/// turns it into the unit's owned [`State`](Self::State) and wires buffer
/// endpoints and resource ports into the unit. Modules registered
/// afterwards add systems and handlers.
pub trait UnitKind: Sized + 'static {
    /// State owned by the unit and passed to every system.
    type State: 'static;
    /// Application messages accepted by the unit.
    type Message: AppMessage;
    /// Payload of the init message.
    type Init: Send + 'static;

    /// Build the state from the init payload.
    fn bootstrap(init: Self::Init, wiring: &mut Wiring<'_>) -> Result<Self::State, ModuleError>;
}
