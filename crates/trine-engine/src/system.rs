//! System registration and ordering.
//!
//! Systems run once per tick, grouped by [`Phase`] (`Pre`, `Main`, `Post`).
//! Inside a phase, `before` / `after` constraints are resolved with a
//! topological sort; ties fall back to registration order, so an
//! unconstrained pipeline runs in the order systems were added.
//! Constraints naming an unknown system, or one in another phase, are
//! ignored.
//!
//! The sorted order is cached and rebuilt after the system set changes.
//! A tick takes the order once before running anything, so systems added
//! or removed by a system take effect on the next tick.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::context::UnitContext;
use crate::error::{ScheduleError, SystemError};
use crate::kind::UnitKind;

/// Execution phase of a system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Runs first: input sampling, reading other units' frames.
    Pre,
    /// Simulation and gameplay.
    Main,
    /// Runs last: writing outputs before commit.
    Post,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Phase; 3] = [Phase::Pre, Phase::Main, Phase::Post];
}

/// Body of a system.
pub type SystemFn<U> = Rc<dyn Fn(&mut UnitContext<U>) -> Result<(), SystemError>>;

/// A named system with ordering constraints.
pub struct SystemDef<U: UnitKind> {
    name: String,
    phase: Phase,
    before: SmallVec<[String; 2]>,
    after: SmallVec<[String; 2]>,
    run: SystemFn<U>,
}

impl<U: UnitKind> SystemDef<U> {
    /// A `Main`-phase system with no constraints.
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(&mut UnitContext<U>) -> Result<(), SystemError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            phase: Phase::Main,
            before: SmallVec::new(),
            after: SmallVec::new(),
            run: Rc::new(run),
        }
    }

    /// Move the system to `phase`.
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Run before the named system.
    pub fn before(mut self, other: impl Into<String>) -> Self {
        self.before.push(other.into());
        self
    }

    /// Run after the named system.
    pub fn after(mut self, other: impl Into<String>) -> Self {
        self.after.push(other.into());
        self
    }

    /// System name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<U: UnitKind> fmt::Debug for SystemDef<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDef")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// A system in its resolved position.
pub(crate) struct ScheduledSystem<U: UnitKind> {
    pub(crate) name: Rc<str>,
    pub(crate) run: SystemFn<U>,
}

pub(crate) type Schedule<U> = Rc<[ScheduledSystem<U>]>;

pub(crate) struct SystemRegistry<U: UnitKind> {
    systems: Vec<SystemDef<U>>,
    cached: Option<Schedule<U>>,
}

impl<U: UnitKind> Default for SystemRegistry<U> {
    fn default() -> Self {
        Self {
            systems: Vec::new(),
            cached: None,
        }
    }
}

impl<U: UnitKind> SystemRegistry<U> {
    pub(crate) fn add(&mut self, def: SystemDef<U>) -> Result<(), ScheduleError> {
        if self.systems.iter().any(|s| s.name == def.name) {
            return Err(ScheduleError::Duplicate { name: def.name });
        }
        self.systems.push(def);
        self.cached = None;
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.systems.len();
        self.systems.retain(|s| s.name != name);
        let removed = self.systems.len() != before;
        if removed {
            self.cached = None;
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.systems.len()
    }

    /// The current order, rebuilt if the system set changed.
    pub(crate) fn schedule(&mut self) -> Result<Schedule<U>, ScheduleError> {
        if let Some(cached) = &self.cached {
            return Ok(Rc::clone(cached));
        }
        let mut order = Vec::with_capacity(self.systems.len());
        for phase in Phase::ALL {
            let members: Vec<usize> = (0..self.systems.len())
                .filter(|&i| self.systems[i].phase == phase)
                .collect();
            for i in sort_phase(&self.systems, &members)? {
                let def = &self.systems[i];
                order.push(ScheduledSystem {
                    name: Rc::from(def.name.as_str()),
                    run: Rc::clone(&def.run),
                });
            }
        }
        let schedule: Schedule<U> = Rc::from(order);
        self.cached = Some(Rc::clone(&schedule));
        tracing::debug!(systems = schedule.len(), "system order rebuilt");
        Ok(schedule)
    }
}

/// Kahn's algorithm over one phase; `members` are registration indices in
/// ascending order. Returns registration indices in execution order.
fn sort_phase<U: UnitKind>(
    systems: &[SystemDef<U>],
    members: &[usize],
) -> Result<Vec<usize>, ScheduleError> {
    let local: IndexMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(pos, &i)| (systems[i].name.as_str(), pos))
        .collect();

    let n = members.len();
    let mut edges: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); n];
    let mut indegree = vec![0usize; n];
    for (pos, &i) in members.iter().enumerate() {
        let def = &systems[i];
        for target in &def.before {
            if let Some(&to) = local.get(target.as_str()) {
                edges[pos].push(to);
                indegree[to] += 1;
            }
        }
        for source in &def.after {
            if let Some(&from) = local.get(source.as_str()) {
                edges[from].push(pos);
                indegree[pos] += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&pos| indegree[pos] == 0)
        .map(Reverse)
        .collect();
    let mut sorted = Vec::with_capacity(n);
    while let Some(Reverse(pos)) = ready.pop() {
        sorted.push(members[pos]);
        for &to in &edges[pos] {
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.push(Reverse(to));
            }
        }
    }

    if sorted.len() < n {
        let systems = (0..n)
            .filter(|&pos| indegree[pos] > 0)
            .map(|pos| systems[members[pos]].name.clone())
            .collect();
        return Err(ScheduleError::Cycle { systems });
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Wiring;
    use crate::error::ModuleError;

    struct Bare;

    impl UnitKind for Bare {
        type State = ();
        type Message = ();
        type Init = ();

        fn bootstrap(_: (), _: &mut Wiring<'_>) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn sys(name: &str) -> SystemDef<Bare> {
        SystemDef::new(name, |_| Ok(()))
    }

    fn names(reg: &mut SystemRegistry<Bare>) -> Vec<String> {
        reg.schedule()
            .unwrap()
            .iter()
            .map(|s| s.name.to_string())
            .collect()
    }

    #[test]
    fn unconstrained_runs_in_registration_order() {
        let mut reg = SystemRegistry::default();
        for n in ["c", "a", "b"] {
            reg.add(sys(n)).unwrap();
        }
        assert_eq!(names(&mut reg), ["c", "a", "b"]);
    }

    #[test]
    fn before_and_after_respected() {
        let mut reg = SystemRegistry::default();
        reg.add(sys("render").after("physics")).unwrap();
        reg.add(sys("physics").after("input")).unwrap();
        reg.add(sys("input")).unwrap();
        reg.add(sys("audio").before("render")).unwrap();
        assert_eq!(names(&mut reg), ["input", "physics", "audio", "render"]);
    }

    #[test]
    fn phases_run_pre_main_post() {
        let mut reg = SystemRegistry::default();
        reg.add(sys("late").phase(Phase::Post)).unwrap();
        reg.add(sys("mid")).unwrap();
        reg.add(sys("early").phase(Phase::Pre)).unwrap();
        // Cross-phase constraint is ignored.
        reg.add(sys("mid2").before("early")).unwrap();
        assert_eq!(names(&mut reg), ["early", "mid", "mid2", "late"]);
    }

    #[test]
    fn unknown_names_ignored() {
        let mut reg = SystemRegistry::default();
        reg.add(sys("a").after("ghost")).unwrap();
        assert_eq!(names(&mut reg), ["a"]);
    }

    #[test]
    fn cycle_reported() {
        let mut reg = SystemRegistry::default();
        reg.add(sys("a").after("b")).unwrap();
        reg.add(sys("b").after("a")).unwrap();
        reg.add(sys("c")).unwrap();
        match reg.schedule() {
            Err(ScheduleError::Cycle { systems }) => assert_eq!(systems, ["a", "b"]),
            other => panic!("expected cycle, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn duplicate_rejected() {
        let mut reg = SystemRegistry::default();
        reg.add(sys("a")).unwrap();
        assert_eq!(
            reg.add(sys("a")),
            Err(ScheduleError::Duplicate { name: "a".into() })
        );
    }

    #[test]
    fn order_cached_until_changed() {
        let mut reg = SystemRegistry::default();
        reg.add(sys("a")).unwrap();
        let first = reg.schedule().unwrap();
        let second = reg.schedule().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(reg.remove("a"));
        assert!(!reg.remove("a"));
        let third = reg.schedule().unwrap();
        assert!(!Rc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 0);
        assert_eq!(reg.len(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Registration order plus `(earlier, later)` pairs over system
        /// labels. Edges only point from lower to higher label, so the
        /// graph is acyclic whatever the registration order.
        fn dag() -> impl Strategy<Value = (Vec<usize>, Vec<(usize, usize)>)> {
            (2usize..12).prop_flat_map(|n| {
                let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
                let edges = proptest::collection::vec((0..n, 0..n), 0..24).prop_map(|pairs| {
                    pairs
                        .into_iter()
                        .filter(|(a, b)| a != b)
                        .map(|(a, b)| (a.min(b), a.max(b)))
                        .collect::<Vec<_>>()
                });
                (order, edges)
            })
        }

        proptest! {
            #[test]
            fn acyclic_constraints_always_hold((order, edges) in dag(), use_before in any::<bool>()) {
                let mut reg = SystemRegistry::<Bare>::default();
                for &label in &order {
                    let mut def = sys(&format!("s{label}"));
                    for &(earlier, later) in &edges {
                        if use_before && earlier == label {
                            def = def.before(format!("s{later}"));
                        } else if !use_before && later == label {
                            def = def.after(format!("s{earlier}"));
                        }
                    }
                    reg.add(def).unwrap();
                }

                let ran = names(&mut reg);
                prop_assert_eq!(ran.len(), order.len());
                let position = |label: usize| {
                    ran.iter().position(|n| *n == format!("s{label}")).unwrap()
                };
                for &(earlier, later) in &edges {
                    prop_assert!(position(earlier) < position(later));
                }
                if edges.is_empty() {
                    let registered: Vec<String> =
                        order.iter().map(|l| format!("s{l}")).collect();
                    prop_assert_eq!(ran, registered);
                }
            }
        }
    }
}
