//! Message handler registry keyed by message kind.

use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::context::UnitContext;
use crate::error::SystemError;
use crate::kind::UnitKind;
use crate::message::AppMessage;

/// Body of a message handler.
pub type HandlerFn<U> =
    Rc<dyn Fn(&mut UnitContext<U>, &<U as UnitKind>::Message) -> Result<(), SystemError>>;

/// Dispatch tag of a unit's messages.
pub type KindOf<U> = <<U as UnitKind>::Message as AppMessage>::Kind;

/// Identifies a registered handler for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub(crate) struct HandlerRegistry<U: UnitKind> {
    next_id: u64,
    by_kind: IndexMap<KindOf<U>, SmallVec<[(HandlerId, HandlerFn<U>); 2]>>,
}

impl<U: UnitKind> Default for HandlerRegistry<U> {
    fn default() -> Self {
        Self {
            next_id: 0,
            by_kind: IndexMap::new(),
        }
    }
}

impl<U: UnitKind> HandlerRegistry<U> {
    pub(crate) fn register(&mut self, kind: KindOf<U>, handler: HandlerFn<U>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.by_kind.entry(kind).or_default().push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        for list in self.by_kind.values_mut() {
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Handlers for `kind` in registration order. Cloned so handlers may
    /// register or remove handlers while dispatch is in progress.
    pub(crate) fn snapshot(&self, kind: &KindOf<U>) -> SmallVec<[HandlerFn<U>; 2]> {
        self.by_kind
            .get(kind)
            .map(|list| list.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, kind: &KindOf<U>) -> usize {
        self.by_kind.get(kind).map_or(0, |list| list.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;
    use crate::sync::Wiring;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Kind {
        Ping,
        Pong,
    }

    struct Msg(Kind);

    impl AppMessage for Msg {
        type Kind = Kind;
        fn kind(&self) -> Kind {
            self.0
        }
    }

    struct Echo;

    impl UnitKind for Echo {
        type State = ();
        type Message = Msg;
        type Init = ();

        fn bootstrap(_: (), _: &mut Wiring<'_>) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn noop() -> HandlerFn<Echo> {
        Rc::new(|_: &mut UnitContext<Echo>, _: &Msg| Ok(()))
    }

    #[test]
    fn register_and_remove() {
        let mut reg = HandlerRegistry::<Echo>::default();
        let a = reg.register(Kind::Ping, noop());
        let b = reg.register(Kind::Ping, noop());
        assert_ne!(a, b);
        assert_eq!(reg.count(&Kind::Ping), 2);
        assert_eq!(reg.count(&Kind::Pong), 0);
        assert!(reg.remove(a));
        assert!(!reg.remove(a));
        assert_eq!(reg.snapshot(&Kind::Ping).len(), 1);
        assert!(reg.snapshot(&Kind::Pong).is_empty());
    }
}
