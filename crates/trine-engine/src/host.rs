//! Owner side of the remote resource protocol.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use trine_core::{ResourceId, ResourceKind, UnitId};

use crate::message::{Payload, ResourceMessage};
use crate::port::ResourcePort;
use crate::resource::downcast;

type Loader = Box<dyn FnMut(ResourceId, Box<dyn Any + Send>) -> Result<Payload, String>>;

struct HostedResource {
    kind: ResourceKind,
    name: Option<String>,
    payload: Payload,
}

/// Loads and holds resources requested by other units.
///
/// One loader is registered per [`ResourceKind`]. A `LoadRequest` runs the
/// loader on the owning unit's thread and replies `Loaded` or
/// `LoadError`; an unknown kind replies `LoadError`. A `Dispose` drops the
/// local value and replies `Disposed`, once.
#[derive(Default)]
pub struct ResourceHost {
    loaders: IndexMap<ResourceKind, Loader>,
    hosted: IndexMap<ResourceId, HostedResource>,
    loads: u64,
    disposals: u64,
}

impl ResourceHost {
    /// Empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the loader for `kind`, replacing any previous one.
    ///
    /// The loader receives the requester's payload as `P`; a request
    /// carrying another type fails with a `LoadError`.
    pub fn register_loader<P, R, F>(&mut self, kind: ResourceKind, mut load: F)
    where
        P: Any + Send,
        R: Any + Send + Sync,
        F: FnMut(ResourceId, P) -> Result<R, String> + 'static,
    {
        self.loaders.insert(
            kind,
            Box::new(move |id: ResourceId, payload: Box<dyn Any + Send>| -> Result<Payload, String> {
                let input = payload
                    .downcast::<P>()
                    .map_err(|_| format!("payload for {kind} has the wrong type"))?;
                let value = load(id, *input)?;
                Ok(Arc::new(value) as Payload)
            }),
        );
    }

    /// `true` if a loader is registered for `kind`.
    pub fn has_loader(&self, kind: ResourceKind) -> bool {
        self.loaders.contains_key(&kind)
    }

    /// Local value of a loaded resource.
    pub fn get<T: Any + Send + Sync>(&self, id: ResourceId) -> Option<Arc<T>> {
        let hosted = self.hosted.get(&id)?;
        downcast(Arc::clone(&hosted.payload))
    }

    /// Kind and debug name of a hosted resource.
    pub fn describe(&self, id: ResourceId) -> Option<(ResourceKind, Option<&str>)> {
        self.hosted
            .get(&id)
            .map(|h| (h.kind, h.name.as_deref()))
    }

    /// Resources currently held.
    pub fn len(&self) -> usize {
        self.hosted.len()
    }

    /// `true` if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.hosted.is_empty()
    }

    /// Successful loads so far.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    /// Disposals so far.
    pub fn disposals(&self) -> u64 {
        self.disposals
    }

    /// Serve a request from another unit.
    pub(crate) fn handle(&mut self, unit: UnitId, msg: ResourceMessage) {
        match msg {
            ResourceMessage::LoadRequest {
                id,
                kind,
                name,
                payload,
                reply_to,
            } => {
                let reply = match self.loaders.get_mut(&kind) {
                    Some(load) => match load(id, payload) {
                        Ok(value) => {
                            self.loads += 1;
                            self.hosted.insert(
                                id,
                                HostedResource {
                                    kind,
                                    name,
                                    payload: Arc::clone(&value),
                                },
                            );
                            tracing::debug!(%id, %kind, "resource loaded");
                            ResourceMessage::Loaded { id, payload: value }
                        }
                        Err(reason) => ResourceMessage::LoadError { id, reason },
                    },
                    None => ResourceMessage::LoadError {
                        id,
                        reason: format!("{unit} has no loader for kind `{kind}`"),
                    },
                };
                send_reply(&reply_to, reply);
            }
            ResourceMessage::Dispose { id, reply_to } => {
                // Failed loads hold nothing here but still need the ack.
                if self.hosted.shift_remove(&id).is_some() {
                    self.disposals += 1;
                    tracing::debug!(%id, "hosted resource released");
                } else {
                    tracing::trace!(%id, "dispose for resource not held acknowledged");
                }
                send_reply(&reply_to, ResourceMessage::Disposed { id });
            }
            other => {
                tracing::trace!(?other, "requester-side message routed to host ignored");
            }
        }
    }
}

fn send_reply(port: &ResourcePort, msg: ResourceMessage) {
    let id = msg.id();
    if let Err(e) = port.post(msg) {
        tracing::warn!(%id, error = %e, "resource reply not delivered");
    }
}

impl fmt::Debug for ResourceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHost")
            .field("kinds", &self.loaders.keys().collect::<Vec<_>>())
            .field("hosted", &self.hosted.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Envelope;
    use crate::port::mailbox;
    use crossbeam_channel::Receiver;

    const MESH: ResourceKind = ResourceKind("mesh");

    fn requester() -> (ResourcePort, Receiver<Envelope<()>>) {
        let (port, rx) = mailbox::<()>(UnitId(1), 8);
        (port.resource_port(), rx)
    }

    fn reply(rx: &Receiver<Envelope<()>>) -> ResourceMessage {
        match rx.try_recv().unwrap() {
            Envelope::Resource(msg) => msg,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn request(id: u32, kind: ResourceKind, payload: impl Any + Send, reply_to: &ResourcePort) -> ResourceMessage {
        ResourceMessage::LoadRequest {
            id: ResourceId(id),
            kind,
            name: Some("cube".into()),
            payload: Box::new(payload),
            reply_to: reply_to.clone(),
        }
    }

    #[test]
    fn load_replies_loaded_and_holds_value() {
        let (port, rx) = requester();
        let mut host = ResourceHost::new();
        host.register_loader(MESH, |_, vertices: u32| Ok(vec![0.0f32; vertices as usize]));
        host.handle(UnitId(2), request(1, MESH, 3u32, &port));

        assert!(matches!(reply(&rx), ResourceMessage::Loaded { .. }));
        assert_eq!(host.get::<Vec<f32>>(ResourceId(1)).map(|v| v.len()), Some(3));
        assert_eq!(host.describe(ResourceId(1)), Some((MESH, Some("cube"))));
        assert_eq!(host.loads(), 1);
    }

    #[test]
    fn unknown_kind_and_bad_payload_reply_error() {
        let (port, rx) = requester();
        let mut host = ResourceHost::new();
        host.register_loader(MESH, |_, n: u32| Ok(n));
        host.handle(UnitId(2), request(1, ResourceKind("sound"), (), &port));
        host.handle(UnitId(2), request(2, MESH, "not a u32", &port));
        for _ in 0..2 {
            assert!(matches!(reply(&rx), ResourceMessage::LoadError { .. }));
        }
        assert!(host.is_empty());
    }

    #[test]
    fn loader_error_is_forwarded() {
        let (port, rx) = requester();
        let mut host = ResourceHost::new();
        host.register_loader(MESH, |_, _: ()| Err::<(), _>("corrupt".to_string()));
        host.handle(UnitId(2), request(1, MESH, (), &port));
        match reply(&rx) {
            ResourceMessage::LoadError { reason, .. } => assert_eq!(reason, "corrupt"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn every_dispose_is_acknowledged() {
        let (port, rx) = requester();
        let mut host = ResourceHost::new();
        host.register_loader(MESH, |_, n: u32| Ok(n));
        host.handle(UnitId(2), request(1, MESH, 1u32, &port));
        reply(&rx);
        // Held, repeated, and never loaded.
        for id in [1, 1, 9] {
            host.handle(
                UnitId(2),
                ResourceMessage::Dispose {
                    id: ResourceId(id),
                    reply_to: port.clone(),
                },
            );
        }
        for id in [1, 1, 9] {
            match reply(&rx) {
                ResourceMessage::Disposed { id: acked } => assert_eq!(acked, ResourceId(id)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(host.disposals(), 1);
        assert!(host.get::<u32>(ResourceId(1)).is_none());
    }
}
