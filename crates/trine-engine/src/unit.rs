//! Unit drivers.
//!
//! A unit starts as a [`PendingUnit`]: its inbox exists and other units may
//! already post to it, but nothing is handled until the init message
//! arrives. From there it is driven one of two ways:
//!
//! - [`LocalUnit`] runs on the caller's thread. The caller decides when to
//!   [`pump`](LocalUnit::pump) the inbox and when to
//!   [`tick`](LocalUnit::tick), which makes multi-unit scenarios
//!   deterministic in tests.
//! - [`UnitHandle`] runs the unit on a named background thread at its
//!   configured tick rate, draining the inbox between ticks.
//!
//! # Threaded loop
//!
//! ```text
//! loop {
//!     pump inbox (non-blocking) and local tasks
//!     apply Start / Stop
//!     if Running and the deadline passed:
//!         tick
//!         deadline = now + max(budget - frame - tick_slack, 0)
//!     wait on the inbox until the deadline
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use trine_core::{ResourceIdAllocator, UnitId};

use crate::config::UnitConfig;
use crate::context::UnitContext;
use crate::error::{PostError, TickError, UnitError};
use crate::kind::UnitKind;
use crate::lifecycle::{UnitEvent, UnitState};
use crate::message::Envelope;
use crate::metrics::UnitStats;
use crate::module::{register_modules, ModuleDef};
use crate::port::{mailbox, ResourcePort, UnitPort};
use crate::tick::TickReport;

/// Inbox wait while the unit is not ticking.
const IDLE_WAIT: Duration = Duration::from_millis(10);

// ── PendingUnit ────────────────────────────────────────────────────

/// A unit whose inbox exists but which has not been initialised.
pub struct PendingUnit<U: UnitKind> {
    id: UnitId,
    config: UnitConfig,
    ids: ResourceIdAllocator,
    port: UnitPort<U::Message>,
    inbox: Receiver<Envelope<U::Message>>,
    stats: Arc<UnitStats>,
}

impl<U: UnitKind> PendingUnit<U> {
    /// Create the unit's inbox. `ids` is the allocator shared by every
    /// unit of the program.
    pub fn new(id: UnitId, config: UnitConfig, ids: ResourceIdAllocator) -> Result<Self, UnitError> {
        config.validate()?;
        let (port, inbox) = mailbox(id, config.inbox_capacity);
        Ok(Self {
            id,
            config,
            ids,
            port,
            inbox,
            stats: Arc::new(UnitStats::default()),
        })
    }

    /// Unit id.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Port for application and lifecycle messages.
    pub fn port(&self) -> UnitPort<U::Message> {
        self.port.clone()
    }

    /// Port for resource protocol messages.
    pub fn resource_port(&self) -> ResourcePort {
        self.port.resource_port()
    }

    /// Counters shared with other threads.
    pub fn stats(&self) -> Arc<UnitStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver the init message: bootstrap the state, then run every
    /// module init in order. On failure the unit is disposed and the
    /// error returned.
    pub fn initialize(self, init: U::Init, modules: Vec<ModuleDef<U>>) -> Result<LocalUnit<U>, UnitError> {
        let span = tracing::info_span!("unit", unit = %self.config.name, id = %self.id);
        let ctx = {
            let _enter = span.enter();
            let mut ctx = UnitContext::bootstrap(
                self.id,
                self.config,
                self.ids,
                self.port.resource_port(),
                self.inbox,
                Arc::clone(&self.stats),
                init,
            )?;
            if let Err(e) = register_modules(&mut ctx, modules) {
                tracing::error!(error = %e, "unit failed to initialise");
                ctx.dispose();
                return Err(e.into());
            }
            ctx
        };
        Ok(LocalUnit {
            ctx,
            port: self.port,
            span,
        })
    }
}

// ── LocalUnit ──────────────────────────────────────────────────────

/// A unit driven on the caller's thread.
pub struct LocalUnit<U: UnitKind> {
    ctx: UnitContext<U>,
    port: UnitPort<U::Message>,
    span: tracing::Span,
}

impl<U: UnitKind> fmt::Debug for LocalUnit<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUnit").field("id", &self.ctx.id()).finish_non_exhaustive()
    }
}

impl<U: UnitKind> LocalUnit<U> {
    /// Unit id.
    pub fn id(&self) -> UnitId {
        self.ctx.id()
    }

    /// Port for application and lifecycle messages.
    pub fn port(&self) -> UnitPort<U::Message> {
        self.port.clone()
    }

    /// Port for resource protocol messages.
    pub fn resource_port(&self) -> ResourcePort {
        self.port.resource_port()
    }

    /// The unit's context.
    pub fn context(&self) -> &UnitContext<U> {
        &self.ctx
    }

    /// Exclusive access to the context, e.g. to request resources from
    /// outside any system.
    pub fn context_mut(&mut self) -> &mut UnitContext<U> {
        &mut self.ctx
    }

    /// The unit's state.
    pub fn state(&self) -> &U::State {
        &self.ctx.state
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> UnitState {
        self.ctx.lifecycle()
    }

    /// Counters shared with other threads.
    pub fn stats(&self) -> Arc<UnitStats> {
        Arc::clone(self.ctx.stats())
    }

    /// Leave `Initializing` and begin ticking.
    pub fn start(&mut self) {
        let _enter = self.span.enter();
        self.ctx.start(Instant::now());
    }

    /// Handle every message waiting in the inbox, poll local tasks, and
    /// act on `Start` / `Stop`. Returns the number of messages handled.
    pub fn pump(&mut self) -> usize {
        let _enter = self.span.enter();
        let handled = self.ctx.pump();
        self.ctx.apply_requests(Instant::now());
        handled
    }

    /// Run one tick now.
    pub fn tick(&mut self) -> Result<TickReport, TickError> {
        self.tick_at(Instant::now())
    }

    /// Run one tick as if the clock read `now`.
    pub fn tick_at(&mut self, now: Instant) -> Result<TickReport, TickError> {
        let _enter = self.span.enter();
        let result = self.ctx.run_tick(now);
        if let Err(e) = &result {
            if !matches!(e, TickError::NotRunning { .. }) && self.ctx.failure_budget_exhausted() {
                tracing::error!(
                    failures = self.ctx.consecutive_failures,
                    "failure budget exhausted, disposing unit"
                );
                self.ctx.dispose();
            }
        }
        result
    }

    /// Pump, then tick.
    pub fn step(&mut self) -> Result<TickReport, TickError> {
        self.pump();
        self.tick()
    }

    /// Run dispose hooks and release every resource. Idempotent.
    pub fn dispose(&mut self) {
        let _enter = self.span.enter();
        self.ctx.dispose();
    }

    /// Threaded loop; returns once the unit is disposed.
    fn run(&mut self, events: &Sender<UnitEvent>) {
        let _enter = self.span.enter();
        let mut next_tick = Instant::now();
        loop {
            self.ctx.pump();
            let now = Instant::now();
            self.ctx.apply_requests(now);
            match self.ctx.lifecycle() {
                UnitState::Disposing | UnitState::Disposed => break,
                UnitState::Running if now >= next_tick => {
                    let result = self.ctx.run_tick(now);
                    if result.is_err() && self.ctx.failure_budget_exhausted() {
                        let reason = format!(
                            "{} consecutive ticks failed",
                            self.ctx.consecutive_failures
                        );
                        tracing::error!(%reason, "unit failed");
                        let _ = events.send(UnitEvent::Failed {
                            unit: self.ctx.id(),
                            reason,
                        });
                        self.ctx.dispose();
                        break;
                    }
                    next_tick = Instant::now() + self.ctx.config().remainder(now.elapsed());
                }
                _ => {}
            }

            let wait = if self.ctx.lifecycle() == UnitState::Running {
                next_tick.saturating_duration_since(Instant::now())
            } else {
                IDLE_WAIT
            };
            match self.ctx.inbox().recv_timeout(wait) {
                Ok(env) => self.ctx.handle_envelope(env),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.ctx.dispose();
                    break;
                }
            }
        }
    }
}

impl<U: UnitKind> Drop for LocalUnit<U> {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ── UnitHandle ─────────────────────────────────────────────────────

struct InitMessage<U: UnitKind> {
    init: U::Init,
    modules: Vec<ModuleDef<U>>,
}

/// Report from [`UnitHandle::shutdown`].
#[derive(Debug)]
pub struct ShutdownReport {
    /// Time from the stop request until the thread was joined.
    pub total_ms: u64,
    /// Whether the thread was joined without panicking.
    pub joined: bool,
    /// Ticks the unit completed.
    pub ticks: u64,
}

/// Spawn a unit on a named background thread.
///
/// The thread waits for [`UnitHandle::initialize`]; messages posted before
/// then wait in the inbox.
pub fn spawn_unit<U: UnitKind>(
    id: UnitId,
    config: UnitConfig,
    ids: ResourceIdAllocator,
) -> Result<UnitHandle<U>, UnitError> {
    let name = config.name.clone();
    let pending = PendingUnit::<U>::new(id, config, ids)?;
    let port = pending.port();
    let stats = pending.stats();
    let (init_tx, init_rx) = bounded::<InitMessage<U>>(1);
    let (event_tx, event_rx) = unbounded();
    let thread = thread::Builder::new()
        .name(name)
        .spawn(move || run_unit(pending, init_rx, event_tx))
        .map_err(|e| UnitError::Spawn(e.to_string()))?;
    Ok(UnitHandle {
        id,
        port,
        init_tx: Some(init_tx),
        events: event_rx,
        stats,
        thread: Some(thread),
    })
}

fn run_unit<U: UnitKind>(
    pending: PendingUnit<U>,
    init_rx: Receiver<InitMessage<U>>,
    events: Sender<UnitEvent>,
) {
    let unit = pending.id();
    let stats = pending.stats();
    let Ok(InitMessage { init, modules }) = init_rx.recv() else {
        tracing::debug!(%unit, "handle dropped before init");
        stats.set_state(UnitState::Disposed);
        let _ = events.send(UnitEvent::Stopped { unit, ticks: 0 });
        return;
    };
    match pending.initialize(init, modules) {
        Ok(mut local) => {
            let _ = events.send(UnitEvent::Initialized { unit });
            local.run(&events);
        }
        Err(e) => {
            stats.set_state(UnitState::Disposed);
            let _ = events.send(UnitEvent::Failed {
                unit,
                reason: e.to_string(),
            });
        }
    }
    let _ = events.send(UnitEvent::Stopped {
        unit,
        ticks: stats.ticks(),
    });
}

/// A unit running on its own thread.
///
/// Dropping the handle shuts the unit down.
pub struct UnitHandle<U: UnitKind> {
    id: UnitId,
    port: UnitPort<U::Message>,
    init_tx: Option<Sender<InitMessage<U>>>,
    events: Receiver<UnitEvent>,
    stats: Arc<UnitStats>,
    thread: Option<JoinHandle<()>>,
}

impl<U: UnitKind> UnitHandle<U> {
    /// Unit id.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Send the init message. Only the first call is accepted.
    pub fn initialize(&mut self, init: U::Init, modules: Vec<ModuleDef<U>>) -> Result<(), UnitError> {
        let tx = self.init_tx.take().ok_or(UnitError::AlreadyInitialized)?;
        tx.send(InitMessage { init, modules })
            .map_err(|_| UnitError::Disconnected)
    }

    /// Block until the unit reports the outcome of its initialisation.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), UnitError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(UnitEvent::Initialized { .. }) => return Ok(()),
                Ok(UnitEvent::Failed { reason, .. }) => return Err(UnitError::InitFailed { reason }),
                Ok(UnitEvent::Stopped { .. }) => return Err(UnitError::Disconnected),
                Err(RecvTimeoutError::Timeout) => return Err(UnitError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(UnitError::Disconnected),
            }
        }
    }

    /// Next lifecycle event, waiting up to `timeout`.
    pub fn next_event(&self, timeout: Duration) -> Option<UnitEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Ask the unit to start ticking.
    pub fn start(&self) -> Result<(), PostError> {
        self.port.start()
    }

    /// Post an application message.
    pub fn post(&self, msg: U::Message) -> Result<(), PostError> {
        self.port.post(msg)
    }

    /// Port for application and lifecycle messages.
    pub fn port(&self) -> UnitPort<U::Message> {
        self.port.clone()
    }

    /// Port for resource protocol messages.
    pub fn resource_port(&self) -> ResourcePort {
        self.port.resource_port()
    }

    /// Counters shared with the unit thread.
    pub fn stats(&self) -> &Arc<UnitStats> {
        &self.stats
    }

    /// Last lifecycle state published by the unit.
    pub fn lifecycle(&self) -> UnitState {
        self.stats.state()
    }

    /// Stop the unit and join its thread. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let Some(thread) = self.thread.take() else {
            return ShutdownReport {
                total_ms: 0,
                joined: true,
                ticks: self.stats.ticks(),
            };
        };
        let start = Instant::now();
        // A unit still waiting for init wakes up when the sender drops.
        self.init_tx.take();
        loop {
            match self.port.stop() {
                Ok(()) | Err(PostError::Disconnected { .. }) => break,
                Err(PostError::Full { .. }) => thread::yield_now(),
            }
        }
        let joined = thread.join().is_ok();
        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            joined,
            ticks: self.stats.ticks(),
        };
        tracing::info!(unit = %self.id, ticks = report.ticks, total_ms = report.total_ms, "unit shut down");
        report
    }
}

impl<U: UnitKind> Drop for UnitHandle<U> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}
