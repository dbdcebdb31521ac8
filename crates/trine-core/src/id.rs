//! Strongly-typed identifiers and the shared [`ResourceIdAllocator`].

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Identifies an execution unit (simulation, render, main, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

impl From<u32> for UnitId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Opaque handle to a resource managed across execution units.
///
/// `ResourceId(0)` is reserved as "no resource" so ids can be embedded in
/// `U32` schema fields, where a zeroed region reads as empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl ResourceId {
    /// The "no resource" sentinel.
    pub const NONE: ResourceId = ResourceId(0);

    /// Returns `true` for the [`NONE`](Self::NONE) sentinel.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Interpret a raw value read from a buffer field.
    ///
    /// Returns `None` for the zero sentinel.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Raw value suitable for storing in a `U32` field.
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Resource type tag, e.g. `"texture"` or `"material"`.
///
/// Owning units register one loader per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind(pub &'static str);

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Publication counter of a triple buffer.
///
/// Generation 0 means nothing has been published yet; the first commit
/// publishes generation 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen {}", self.0)
    }
}

/// Monotonically increasing tick counter of one execution unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(pub u64);

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints [`ResourceId`]s from one counter shared by every unit.
///
/// Cloning yields a handle to the same counter, so ids minted by different
/// units never collide. The first id handed out is 1 and the last is
/// `u32::MAX`; the counter never wraps back to [`ResourceId::NONE`].
#[derive(Clone, Debug)]
pub struct ResourceIdAllocator {
    next: Arc<AtomicU32>,
}

impl Default for ResourceIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceIdAllocator {
    /// Create a fresh allocator.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Mint the next id, or `None` once every non-zero `u32` has been
    /// handed out. Thread-safe.
    pub fn allocate(&self) -> Option<ResourceId> {
        // A stored 0 marks the space as exhausted.
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| {
                (next != 0).then(|| next.wrapping_add(1))
            })
            .ok()
            .map(ResourceId)
    }

    /// Number of ids minted so far across all handles.
    pub fn minted(&self) -> u32 {
        match self.next.load(Ordering::Relaxed) {
            0 => u32::MAX,
            next => next - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_zero_is_none() {
        assert!(ResourceId::NONE.is_none());
        assert_eq!(ResourceId::from_raw(0), None);
        assert_eq!(ResourceId::from_raw(7), Some(ResourceId(7)));
        assert_eq!(ResourceId(7).to_raw(), 7);
    }

    #[test]
    fn allocator_starts_at_one() {
        let ids = ResourceIdAllocator::new();
        assert_eq!(ids.allocate(), Some(ResourceId(1)));
        assert_eq!(ids.allocate(), Some(ResourceId(2)));
        assert_eq!(ids.minted(), 2);
    }

    #[test]
    fn allocator_stops_before_the_sentinel() {
        let ids = ResourceIdAllocator {
            next: Arc::new(AtomicU32::new(u32::MAX - 1)),
        };
        let other = ids.clone();
        assert_eq!(ids.allocate(), Some(ResourceId(u32::MAX - 1)));
        assert_eq!(other.allocate(), Some(ResourceId(u32::MAX)));
        assert_eq!(ids.allocate(), None);
        assert_eq!(other.allocate(), None);
        assert_eq!(ids.minted(), u32::MAX);
    }

    #[test]
    fn cloned_allocators_share_counter() {
        let a = ResourceIdAllocator::new();
        let b = a.clone();
        let x = a.allocate();
        let y = b.allocate();
        assert_ne!(x, y);
        assert_eq!(a.minted(), 2);
    }

    #[test]
    fn allocator_unique_across_threads() {
        let ids = ResourceIdAllocator::new();
        let mut all: Vec<ResourceId> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let ids = ids.clone();
                    s.spawn(move || (0..250).map(|_| ids.allocate().unwrap()).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert!(all.iter().all(|id| !id.is_none()));
    }

    proptest::proptest! {
        #[test]
        fn interleaved_handles_mint_a_dense_sequence(
            picks in proptest::collection::vec(0usize..4, 1..200),
        ) {
            let first = ResourceIdAllocator::new();
            let handles: Vec<_> = (0..4).map(|_| first.clone()).collect();
            for (n, &pick) in picks.iter().enumerate() {
                proptest::prop_assert_eq!(handles[pick].allocate(), Some(ResourceId(n as u32 + 1)));
            }
            proptest::prop_assert_eq!(first.minted() as usize, picks.len());
        }
    }

    #[test]
    fn display_formats() {
        assert_eq!(UnitId(2).to_string(), "unit#2");
        assert_eq!(ResourceId(9).to_string(), "res#9");
        assert_eq!(ResourceKind("texture").to_string(), "texture");
        assert_eq!(Generation(3).to_string(), "gen 3");
    }
}
