//! Requester side of the remote resource protocol.
//!
//! A unit creates a resource record for data owned by another unit (the
//! render unit owns GPU textures, the game unit refers to them by id).
//! Creation mints a [`ResourceId`] from the shared allocator, records the
//! request as `Loading`, and posts a `LoadRequest` to the owner. The owner
//! answers `Loaded` or `LoadError`, which the unit routes back here between
//! ticks.
//!
//! References are counted. The count starts at zero; the
//! `remove_resource_ref` that leaves it at zero disposes the record, posts
//! `Dispose` to the owner exactly once, and runs the record's dispose hook.
//! Replies that arrive for a disposed record are dropped.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use indexmap::{IndexMap, IndexSet};
use trine_core::{ResourceId, ResourceIdAllocator, ResourceKind, UnitId};

use crate::error::ResourceError;
use crate::message::{Payload, ResourceMessage};
use crate::port::ResourcePort;

/// Load state of a resource record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceStatus {
    /// Request sent, no reply yet.
    Loading,
    /// The owner reported success.
    Loaded,
    /// The owner reported failure.
    Error(String),
}

type DisposeHook = Box<dyn FnOnce(&mut ResourceManager)>;

/// Optional settings for [`ResourceManager::create_resource_with`].
#[derive(Default)]
pub struct ResourceOptions {
    /// Debug name forwarded to the owner.
    pub name: Option<String>,
    /// Runs when the record is disposed. Typically releases the refs this
    /// resource holds on its dependencies.
    pub on_dispose: Option<DisposeHook>,
}

impl ResourceOptions {
    /// Options carrying a debug name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            on_dispose: None,
        }
    }

    /// Attach a dispose hook.
    pub fn on_dispose(mut self, hook: impl FnOnce(&mut ResourceManager) + 'static) -> Self {
        self.on_dispose = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for ResourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("name", &self.name)
            .field("on_dispose", &self.on_dispose.is_some())
            .finish()
    }
}

type Outcome = Result<Payload, ResourceError>;

#[derive(Default)]
struct WaitSlot {
    outcome: Option<Outcome>,
    waker: Option<Waker>,
}

fn resolve(slot: &RefCell<WaitSlot>, outcome: Outcome) {
    let mut slot = slot.borrow_mut();
    slot.outcome = Some(outcome);
    if let Some(waker) = slot.waker.take() {
        waker.wake();
    }
}

/// Future returned by [`ResourceManager::wait_for`].
///
/// Resolves on the unit thread when the owner replies, or immediately if
/// the reply already arrived.
pub struct ResourceWait {
    slot: Rc<RefCell<WaitSlot>>,
}

impl ResourceWait {
    fn ready(outcome: Outcome) -> Self {
        Self {
            slot: Rc::new(RefCell::new(WaitSlot {
                outcome: Some(outcome),
                waker: None,
            })),
        }
    }
}

impl Future for ResourceWait {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let mut slot = self.slot.borrow_mut();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

struct ResourceRecord {
    kind: ResourceKind,
    owner: UnitId,
    name: Option<String>,
    status: ResourceStatus,
    ref_count: u32,
    payload: Option<Payload>,
    on_dispose: Option<DisposeHook>,
    waiters: Vec<Rc<RefCell<WaitSlot>>>,
}

/// Downcast a shared payload.
pub fn downcast<T: Any + Send + Sync>(payload: Payload) -> Option<Arc<T>> {
    payload.downcast::<T>().ok()
}

/// Per-unit table of resources requested from other units.
pub struct ResourceManager {
    unit: UnitId,
    ids: ResourceIdAllocator,
    reply_to: ResourcePort,
    owners: IndexMap<UnitId, ResourcePort>,
    records: IndexMap<ResourceId, ResourceRecord>,
    awaiting_ack: IndexSet<ResourceId>,
    disposed: u64,
}

impl ResourceManager {
    pub(crate) fn new(unit: UnitId, ids: ResourceIdAllocator, reply_to: ResourcePort) -> Self {
        Self {
            unit,
            ids,
            reply_to,
            owners: IndexMap::new(),
            records: IndexMap::new(),
            awaiting_ack: IndexSet::new(),
            disposed: 0,
        }
    }

    /// Register the resource port of a unit that owns resources.
    pub fn add_owner(&mut self, port: ResourcePort) {
        self.owners.insert(port.unit(), port);
    }

    /// Request a resource of `kind` from `owner`.
    pub fn create_resource<P: Any + Send>(
        &mut self,
        owner: UnitId,
        kind: ResourceKind,
        payload: P,
    ) -> Result<ResourceId, ResourceError> {
        self.create_resource_with(owner, kind, payload, ResourceOptions::default())
    }

    /// Request a resource with a name and/or dispose hook.
    ///
    /// The record starts `Loading` with a reference count of zero.
    pub fn create_resource_with<P: Any + Send>(
        &mut self,
        owner: UnitId,
        kind: ResourceKind,
        payload: P,
        options: ResourceOptions,
    ) -> Result<ResourceId, ResourceError> {
        let port = self
            .owners
            .get(&owner)
            .ok_or(ResourceError::UnknownOwner { owner })?;
        let id = self.ids.allocate().ok_or(ResourceError::IdsExhausted)?;
        port.post(ResourceMessage::LoadRequest {
            id,
            kind,
            name: options.name.clone(),
            payload: Box::new(payload),
            reply_to: self.reply_to.clone(),
        })?;
        tracing::debug!(%id, %kind, %owner, "resource requested");
        self.records.insert(
            id,
            ResourceRecord {
                kind,
                owner,
                name: options.name,
                status: ResourceStatus::Loading,
                ref_count: 0,
                payload: None,
                on_dispose: options.on_dispose,
                waiters: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Increment the reference count. Returns the new count.
    pub fn add_resource_ref(&mut self, id: ResourceId) -> Result<u32, ResourceError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(ResourceError::Unknown { id })?;
        record.ref_count += 1;
        Ok(record.ref_count)
    }

    /// Decrement the reference count, disposing the record when it is
    /// left at zero. Returns the remaining count; unknown or already
    /// disposed ids are a no-op returning zero.
    pub fn remove_resource_ref(&mut self, id: ResourceId) -> u32 {
        let Some(record) = self.records.get_mut(&id) else {
            tracing::trace!(%id, "remove_resource_ref on unknown resource ignored");
            return 0;
        };
        record.ref_count = record.ref_count.saturating_sub(1);
        let remaining = record.ref_count;
        if remaining == 0 {
            self.dispose(id);
        }
        remaining
    }

    fn dispose(&mut self, id: ResourceId) {
        let Some(mut record) = self.records.shift_remove(&id) else {
            return;
        };
        for waiter in record.waiters.drain(..) {
            resolve(&waiter, Err(ResourceError::Disposed { id }));
        }
        match self.owners.get(&record.owner) {
            Some(port) => {
                let sent = port.post(ResourceMessage::Dispose {
                    id,
                    reply_to: self.reply_to.clone(),
                });
                match sent {
                    Ok(()) => {
                        self.awaiting_ack.insert(id);
                    }
                    Err(e) => tracing::warn!(%id, error = %e, "dispose request not delivered"),
                }
            }
            None => tracing::warn!(%id, owner = %record.owner, "owner port missing at dispose"),
        }
        tracing::debug!(%id, kind = %record.kind, "resource disposed");
        self.disposed += 1;
        if let Some(hook) = record.on_dispose.take() {
            hook(self);
        }
    }

    /// Current reference count.
    pub fn ref_count(&self, id: ResourceId) -> Option<u32> {
        self.records.get(&id).map(|r| r.ref_count)
    }

    /// Current load state. `None` once disposed.
    pub fn status(&self, id: ResourceId) -> Option<&ResourceStatus> {
        self.records.get(&id).map(|r| &r.status)
    }

    /// Debug name given at creation.
    pub fn name(&self, id: ResourceId) -> Option<&str> {
        self.records.get(&id).and_then(|r| r.name.as_deref())
    }

    /// Kind requested at creation.
    pub fn kind(&self, id: ResourceId) -> Option<ResourceKind> {
        self.records.get(&id).map(|r| r.kind)
    }

    /// Payload of a loaded resource.
    pub fn payload<T: Any + Send + Sync>(&self, id: ResourceId) -> Option<Arc<T>> {
        let payload = self.records.get(&id)?.payload.clone()?;
        downcast(payload)
    }

    /// Future resolving to the loaded payload or the load failure.
    pub fn wait_for(&mut self, id: ResourceId) -> ResourceWait {
        let Some(record) = self.records.get_mut(&id) else {
            return ResourceWait::ready(Err(ResourceError::Unknown { id }));
        };
        match (&record.status, &record.payload) {
            (ResourceStatus::Loaded, Some(payload)) => ResourceWait::ready(Ok(Arc::clone(payload))),
            (ResourceStatus::Error(reason), _) => ResourceWait::ready(Err(ResourceError::LoadFailed {
                id,
                reason: reason.clone(),
            })),
            _ => {
                let slot = Rc::new(RefCell::new(WaitSlot::default()));
                record.waiters.push(Rc::clone(&slot));
                ResourceWait { slot }
            }
        }
    }

    /// Live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if no records are live.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records disposed so far.
    pub fn disposed_count(&self) -> u64 {
        self.disposed
    }

    /// `true` while a `Dispose` for `id` has not been acknowledged.
    pub fn is_awaiting_dispose(&self, id: ResourceId) -> bool {
        self.awaiting_ack.contains(&id)
    }

    /// Route an owner reply.
    pub(crate) fn handle(&mut self, msg: ResourceMessage) {
        match msg {
            ResourceMessage::Loaded { id, payload } => {
                let Some(record) = self.records.get_mut(&id) else {
                    tracing::trace!(%id, "late Loaded for disposed resource dropped");
                    return;
                };
                record.status = ResourceStatus::Loaded;
                record.payload = Some(Arc::clone(&payload));
                for waiter in record.waiters.drain(..) {
                    resolve(&waiter, Ok(Arc::clone(&payload)));
                }
            }
            ResourceMessage::LoadError { id, reason } => {
                let Some(record) = self.records.get_mut(&id) else {
                    tracing::trace!(%id, "late LoadError for disposed resource dropped");
                    return;
                };
                tracing::warn!(%id, kind = %record.kind, %reason, "resource load failed");
                for waiter in record.waiters.drain(..) {
                    resolve(
                        &waiter,
                        Err(ResourceError::LoadFailed {
                            id,
                            reason: reason.clone(),
                        }),
                    );
                }
                record.status = ResourceStatus::Error(reason);
            }
            ResourceMessage::Disposed { id } => {
                if !self.awaiting_ack.shift_remove(&id) {
                    tracing::trace!(%id, "unexpected Disposed ignored");
                }
            }
            other => {
                tracing::trace!(?other, "owner-side message routed to requester ignored");
            }
        }
    }

    /// Dispose every live record regardless of its count.
    pub(crate) fn dispose_all(&mut self) {
        while let Some(id) = self.records.keys().next().copied() {
            self.dispose(id);
        }
    }

    /// Unit this manager belongs to.
    pub fn unit(&self) -> UnitId {
        self.unit
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("unit", &self.unit)
            .field("live", &self.records.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
