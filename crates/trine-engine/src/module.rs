//! Modules: named init functions that extend a unit.
//!
//! A module adds systems, message handlers, dispose hooks, and per-module
//! state to the unit it is registered with. Modules run once, in the order
//! given, while the unit is `Initializing`. The first failure aborts
//! startup: dispose hooks registered by earlier modules run in reverse and
//! the unit never starts.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::context::UnitContext;
use crate::error::ModuleError;
use crate::kind::UnitKind;

type InitFn<U> = Box<dyn FnOnce(&mut UnitContext<U>) -> Result<(), ModuleError> + Send>;

/// A named module init function.
///
/// `Send` so a module list can travel with the init message to a unit
/// thread.
pub struct ModuleDef<U: UnitKind> {
    name: &'static str,
    init: InitFn<U>,
}

impl<U: UnitKind> ModuleDef<U> {
    /// Module `name` running `init` during unit startup.
    pub fn new(
        name: &'static str,
        init: impl FnOnce(&mut UnitContext<U>) -> Result<(), ModuleError> + Send + 'static,
    ) -> Self {
        Self {
            name,
            init: Box::new(init),
        }
    }

    /// Module name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<U: UnitKind> fmt::Debug for ModuleDef<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Per-module state keyed by type.
///
/// Replaces module-level globals: each module keeps its own state type
/// here and looks it up from systems and handlers.
#[derive(Default)]
pub struct ModuleStore {
    entries: HashMap<TypeId, Box<dyn Any>>,
}

impl ModuleStore {
    /// Store `value`, returning the previous value of the same type.
    pub fn insert<T: 'static>(&mut self, value: T) -> Option<T> {
        self.entries
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Shared access to the stored `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries.get(&TypeId::of::<T>())?.downcast_ref()
    }

    /// Exclusive access to the stored `T`.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.entries.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    /// Remove and return the stored `T`.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// `true` if a `T` is stored.
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ModuleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleStore").field("entries", &self.entries.len()).finish()
    }
}

/// Run every module init in order.
///
/// Inits run synchronously on the unit's own thread. A
/// [`block_on`](UnitContext::block_on) inside one can only be satisfied by
/// a unit running on another thread; waiting on a lockstep unit driven by
/// the same thread times out, because that unit cannot pump until init
/// returns.
pub(crate) fn register_modules<U: UnitKind>(
    ctx: &mut UnitContext<U>,
    modules: Vec<ModuleDef<U>>,
) -> Result<(), ModuleError> {
    for module in modules {
        let name = module.name;
        let span = tracing::debug_span!("module", module = name);
        let _enter = span.enter();
        if let Err(source) = (module.init)(ctx) {
            tracing::warn!(module = name, error = %source, "module init failed, aborting startup");
            ctx.run_dispose_hooks();
            return Err(ModuleError::Init {
                module: name,
                source: Box::new(source),
            });
        }
        ctx.note_module(name);
        tracing::debug!("module initialised");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Camera {
        fov: f32,
    }

    #[test]
    fn store_by_type() {
        let mut store = ModuleStore::default();
        assert!(store.insert(Camera { fov: 60.0 }).is_none());
        assert!(store.insert(3u32).is_none());
        assert_eq!(store.insert(Camera { fov: 90.0 }), Some(Camera { fov: 60.0 }));
        if let Some(n) = store.get_mut::<u32>() {
            *n += 1;
        }
        assert_eq!(store.get::<u32>(), Some(&4));
        assert_eq!(store.len(), 2);
        assert_eq!(store.remove::<Camera>(), Some(Camera { fov: 90.0 }));
        assert!(!store.contains::<Camera>());
        assert!(store.get::<String>().is_none());
    }
}
