//! Sending halves of unit inboxes.
//!
//! A [`UnitPort`] is typed by the destination's application message. A
//! [`ResourcePort`] erases that type so units with different message types
//! can exchange resource protocol traffic.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use trine_core::UnitId;

use crate::error::PostError;
use crate::message::{AppMessage, Control, Envelope, ResourceMessage};

/// How long lifecycle commands wait for room in a full inbox.
const CONTROL_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Sending half of a unit's inbox.
pub struct UnitPort<M> {
    unit: UnitId,
    tx: Sender<Envelope<M>>,
}

impl<M> Clone for UnitPort<M> {
    fn clone(&self) -> Self {
        Self {
            unit: self.unit,
            tx: self.tx.clone(),
        }
    }
}

impl<M> fmt::Debug for UnitPort<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitPort").field("unit", &self.unit).finish()
    }
}

/// Create a unit inbox of `capacity` entries.
pub(crate) fn mailbox<M: AppMessage>(
    unit: UnitId,
    capacity: usize,
) -> (UnitPort<M>, Receiver<Envelope<M>>) {
    let (tx, rx) = bounded(capacity);
    (UnitPort { unit, tx }, rx)
}

fn map_try_send<T>(unit: UnitId, err: TrySendError<T>) -> PostError {
    match err {
        TrySendError::Full(_) => PostError::Full { unit },
        TrySendError::Disconnected(_) => PostError::Disconnected { unit },
    }
}

impl<M: AppMessage> UnitPort<M> {
    /// Destination unit.
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Post an application message. Never blocks.
    pub fn post(&self, msg: M) -> Result<(), PostError> {
        self.tx
            .try_send(Envelope::App(msg))
            .map_err(|e| map_try_send(self.unit, e))
    }

    /// Ask the unit to start ticking.
    pub fn start(&self) -> Result<(), PostError> {
        self.control(Control::Start)
    }

    /// Ask the unit to dispose and exit.
    pub fn stop(&self) -> Result<(), PostError> {
        self.control(Control::Stop)
    }

    /// Lifecycle commands wait briefly for room instead of failing on a
    /// momentarily full inbox.
    fn control(&self, cmd: Control) -> Result<(), PostError> {
        self.tx
            .send_timeout(Envelope::Control(cmd), CONTROL_SEND_TIMEOUT)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => PostError::Full { unit: self.unit },
                SendTimeoutError::Disconnected(_) => PostError::Disconnected { unit: self.unit },
            })
    }

    /// Type-erased port for resource protocol traffic.
    pub fn resource_port(&self) -> ResourcePort {
        let unit = self.unit;
        let tx = self.tx.clone();
        ResourcePort {
            unit,
            send: Arc::new(move |msg| {
                tx.try_send(Envelope::Resource(msg))
                    .map_err(|e| map_try_send(unit, e))
            }),
        }
    }
}

type SendFn = dyn Fn(ResourceMessage) -> Result<(), PostError> + Send + Sync;

/// Resource protocol entry point of a unit, independent of its message
/// type.
#[derive(Clone)]
pub struct ResourcePort {
    unit: UnitId,
    send: Arc<SendFn>,
}

impl ResourcePort {
    /// Destination unit.
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Deliver a resource message. Never blocks.
    pub fn post(&self, msg: ResourceMessage) -> Result<(), PostError> {
        (self.send)(msg)
    }
}

impl fmt::Debug for ResourcePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePort").field("unit", &self.unit).finish()
    }
}

// Compile-time assertion: ports cross threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ResourcePort>();
    assert::<UnitPort<()>>();
};
