//! Messages carried by a unit's inbox.
//!
//! Every unit has one bounded inbox of [`Envelope`]s. Lifecycle control,
//! the resource protocol, and application messages share it, so a unit
//! observes them in the order they were sent.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use trine_core::{ResourceId, ResourceKind};

use crate::port::ResourcePort;

/// Application message type of a unit.
///
/// Dispatch is keyed by [`kind`](Self::kind), a plain `Copy` tag (usually
/// a fieldless enum), so handler lookup never compares strings.
///
/// ```
/// use trine_engine::AppMessage;
///
/// #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// enum InputKind { Key, Resize }
///
/// enum Input { Key(u32), Resize { width: u32, height: u32 } }
///
/// impl AppMessage for Input {
///     type Kind = InputKind;
///     fn kind(&self) -> InputKind {
///         match self {
///             Input::Key(_) => InputKind::Key,
///             Input::Resize { .. } => InputKind::Resize,
///         }
///     }
/// }
/// ```
pub trait AppMessage: Send + 'static {
    /// Dispatch tag.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + 'static;

    /// Tag of this message.
    fn kind(&self) -> Self::Kind;
}

/// Units that accept no application messages.
impl AppMessage for () {
    type Kind = ();

    fn kind(&self) {}
}

/// Lifecycle commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Leave `Initializing` and begin ticking.
    Start,
    /// Dispose and exit.
    Stop,
}

/// Loaded resource payload, shared between the owner and requesters.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Resource protocol messages.
///
/// Requesters send `LoadRequest` and `Dispose`; owners answer with
/// `Loaded` or `LoadError`, and with `Disposed` once a dispose is done.
pub enum ResourceMessage {
    /// Ask the owning unit to load a resource.
    LoadRequest {
        /// Id minted by the requester.
        id: ResourceId,
        /// Loader to use.
        kind: ResourceKind,
        /// Optional debug name.
        name: Option<String>,
        /// Loader input.
        payload: Box<dyn Any + Send>,
        /// Where to send the reply.
        reply_to: ResourcePort,
    },
    /// The owner finished loading.
    Loaded {
        /// Resource id.
        id: ResourceId,
        /// Loaded value.
        payload: Payload,
    },
    /// The owner could not load the resource.
    LoadError {
        /// Resource id.
        id: ResourceId,
        /// Loader's reason.
        reason: String,
    },
    /// Ask the owning unit to release a resource.
    Dispose {
        /// Resource id.
        id: ResourceId,
        /// Where to send the acknowledgement.
        reply_to: ResourcePort,
    },
    /// The owner released the resource.
    Disposed {
        /// Resource id.
        id: ResourceId,
    },
}

impl ResourceMessage {
    /// Id the message refers to.
    pub fn id(&self) -> ResourceId {
        match self {
            Self::LoadRequest { id, .. }
            | Self::Loaded { id, .. }
            | Self::LoadError { id, .. }
            | Self::Dispose { id, .. }
            | Self::Disposed { id } => *id,
        }
    }

    /// `true` for messages handled by the owning side.
    pub fn is_request(&self) -> bool {
        matches!(self, Self::LoadRequest { .. } | Self::Dispose { .. })
    }
}

impl fmt::Debug for ResourceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadRequest { id, kind, name, .. } => f
                .debug_struct("LoadRequest")
                .field("id", id)
                .field("kind", kind)
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Loaded { id, .. } => f.debug_struct("Loaded").field("id", id).finish_non_exhaustive(),
            Self::LoadError { id, reason } => f
                .debug_struct("LoadError")
                .field("id", id)
                .field("reason", reason)
                .finish(),
            Self::Dispose { id, .. } => f.debug_struct("Dispose").field("id", id).finish_non_exhaustive(),
            Self::Disposed { id } => f.debug_struct("Disposed").field("id", id).finish(),
        }
    }
}

/// One inbox entry.
pub enum Envelope<M> {
    /// Lifecycle command.
    Control(Control),
    /// Resource protocol message.
    Resource(ResourceMessage),
    /// Application message.
    App(M),
}

impl<M> fmt::Debug for Envelope<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control(c) => f.debug_tuple("Control").field(c).finish(),
            Self::Resource(r) => f.debug_tuple("Resource").field(r).finish(),
            Self::App(_) => f.write_str("App(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_classification() {
        let loaded = ResourceMessage::Loaded {
            id: ResourceId(4),
            payload: Arc::new(1u8),
        };
        assert!(!loaded.is_request());
        assert_eq!(loaded.id(), ResourceId(4));
        assert!(format!("{loaded:?}").contains("Loaded"));
    }
}
