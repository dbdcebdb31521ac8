//! The per-unit context passed to every system, handler, and module.
//!
//! [`UnitContext`] owns everything a unit touches: its state, its buffer
//! endpoints, its side of the resource protocol, its systems and handlers,
//! and its inbox. There are no process-wide singletons; all of this is
//! reached through `&mut UnitContext`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use trine_core::{ResourceIdAllocator, TickId, UnitId};

use crate::config::UnitConfig;
use crate::error::{ModuleError, ScheduleError, SystemError};
use crate::handler::{HandlerId, HandlerRegistry, KindOf};
use crate::host::ResourceHost;
use crate::kind::UnitKind;
use crate::lifecycle::UnitState;
use crate::message::{AppMessage, Control, Envelope, ResourceMessage};
use crate::metrics::{TickMetrics, UnitStats};
use crate::module::ModuleStore;
use crate::port::ResourcePort;
use crate::resource::ResourceManager;
use crate::sync::{SyncPorts, Wiring};
use crate::system::{SystemDef, SystemRegistry};
use crate::task::{self, TaskQueue};

// ── TimeState ──────────────────────────────────────────────────────

/// Tick clock of a unit.
#[derive(Clone, Debug, Default)]
pub struct TimeState {
    tick: TickId,
    dt: f64,
    elapsed: Duration,
    started: Option<Instant>,
    last: Option<Instant>,
}

impl TimeState {
    /// Ticks run so far. The first tick is 1.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// Seconds since the previous tick, clamped to `max_dt`.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Wall-clock time since the unit started.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn start(&mut self, now: Instant) {
        self.started = Some(now);
        self.last = Some(now);
    }

    pub(crate) fn advance(&mut self, now: Instant, max_dt: Duration) {
        let delta = self
            .last
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.dt = delta.min(max_dt).as_secs_f64();
        self.last = Some(now);
        if let Some(started) = self.started {
            self.elapsed = now.saturating_duration_since(started);
        }
        self.tick = TickId(self.tick.0 + 1);
    }
}

// ── UnitContext ────────────────────────────────────────────────────

type DisposeHook<U> = Box<dyn FnOnce(&mut UnitContext<U>)>;

/// Everything owned by one execution unit.
pub struct UnitContext<U: UnitKind> {
    /// Unit state built by [`UnitKind::bootstrap`].
    pub state: U::State,
    /// Triple-buffer endpoints.
    pub sync: SyncPorts,
    /// Resources this unit requested from others.
    pub resources: ResourceManager,
    /// Resources this unit owns for others.
    pub host: ResourceHost,
    /// Per-module state.
    pub modules: ModuleStore,
    id: UnitId,
    config: UnitConfig,
    pub(crate) lifecycle: UnitState,
    pub(crate) time: TimeState,
    pub(crate) systems: SystemRegistry<U>,
    handlers: HandlerRegistry<U>,
    dispose_hooks: Vec<DisposeHook<U>>,
    tasks: TaskQueue<U>,
    inbox: Receiver<Envelope<U::Message>>,
    deferred: VecDeque<Envelope<U::Message>>,
    pub(crate) metrics: TickMetrics,
    pub(crate) stats: Arc<UnitStats>,
    pub(crate) consecutive_failures: u32,
    registered_modules: Vec<&'static str>,
    start_requested: bool,
    stop_requested: bool,
}

impl<U: UnitKind> UnitContext<U> {
    /// Build the context from the init payload. The unit is left
    /// `Initializing`.
    pub(crate) fn bootstrap(
        id: UnitId,
        config: UnitConfig,
        ids: ResourceIdAllocator,
        reply_to: ResourcePort,
        inbox: Receiver<Envelope<U::Message>>,
        stats: Arc<UnitStats>,
        init: U::Init,
    ) -> Result<Self, ModuleError> {
        let mut sync = SyncPorts::new();
        let mut resources = ResourceManager::new(id, ids, reply_to);
        let mut host = ResourceHost::new();
        let state = {
            let mut wiring = Wiring {
                unit: id,
                sync: &mut sync,
                resources: &mut resources,
                host: &mut host,
            };
            U::bootstrap(init, &mut wiring)?
        };
        stats.set_state(UnitState::Initializing);
        tracing::info!(unit = %id, "unit bootstrapped");
        Ok(Self {
            state,
            sync,
            resources,
            host,
            modules: ModuleStore::default(),
            id,
            config,
            lifecycle: UnitState::Initializing,
            time: TimeState::default(),
            systems: SystemRegistry::default(),
            handlers: HandlerRegistry::default(),
            dispose_hooks: Vec::new(),
            tasks: TaskQueue::default(),
            inbox,
            deferred: VecDeque::new(),
            metrics: TickMetrics::default(),
            stats,
            consecutive_failures: 0,
            registered_modules: Vec::new(),
            start_requested: false,
            stop_requested: false,
        })
    }

    /// Unit id.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Unit name from its configuration.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration the unit was spawned with.
    pub fn config(&self) -> &UnitConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> UnitState {
        self.lifecycle
    }

    /// Tick clock.
    pub fn time(&self) -> &TimeState {
        &self.time
    }

    /// Metrics of the last completed tick.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    /// Counters shared with other threads.
    pub fn stats(&self) -> &Arc<UnitStats> {
        &self.stats
    }

    /// Modules initialised so far, in order.
    pub fn modules_registered(&self) -> &[&'static str] {
        &self.registered_modules
    }

    // ── systems and handlers ──

    /// Add a system. Takes effect from the next tick.
    pub fn add_system(&mut self, def: SystemDef<U>) -> Result<(), ScheduleError> {
        self.systems.add(def)
    }

    /// Remove a system by name. Takes effect from the next tick.
    pub fn remove_system(&mut self, name: &str) -> bool {
        self.systems.remove(name)
    }

    /// Names of all systems in execution order.
    pub fn system_order(&mut self) -> Result<Vec<String>, ScheduleError> {
        Ok(self
            .systems
            .schedule()?
            .iter()
            .map(|s| s.name.to_string())
            .collect())
    }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Register a handler for messages of `kind`. Handlers of one kind
    /// run in registration order.
    pub fn register_message_handler(
        &mut self,
        kind: KindOf<U>,
        handler: impl Fn(&mut UnitContext<U>, &U::Message) -> Result<(), SystemError> + 'static,
    ) -> HandlerId {
        self.handlers.register(kind, std::rc::Rc::new(handler))
    }

    /// Remove a handler. Returns `false` if it was already removed.
    pub fn remove_message_handler(&mut self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    /// Handlers registered for `kind`.
    pub fn handler_count(&self, kind: KindOf<U>) -> usize {
        self.handlers.count(&kind)
    }

    /// Register a hook run on dispose. Hooks run in reverse registration
    /// order.
    pub fn on_dispose(&mut self, hook: impl FnOnce(&mut UnitContext<U>) + 'static) {
        self.dispose_hooks.push(Box::new(hook));
    }

    // ── local tasks ──

    /// Run `future` on this unit and hand its output to `then` once it
    /// resolves.
    ///
    /// Futures are polled after each batch of inbox messages, so a
    /// [`ResourceWait`](crate::ResourceWait) completes in the pump that
    /// delivers its reply.
    pub fn spawn<F, T, C>(&mut self, future: F, then: C)
    where
        F: Future<Output = T> + 'static,
        T: 'static,
        C: FnOnce(&mut UnitContext<U>, T) + 'static,
    {
        self.tasks.push(future, then);
    }

    /// Futures spawned and not yet resolved.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for `future` during module initialisation, serving resource
    /// replies from the inbox meanwhile.
    ///
    /// Other messages received while waiting are held back and delivered
    /// in order after init. Gives up after
    /// [`init_timeout`](UnitConfig::init_timeout).
    ///
    /// Init is synchronous, so the owner of whatever is awaited must run
    /// on another thread (see [`spawn_unit`](crate::spawn_unit)). A
    /// lockstep owner on the calling thread never pumps and the wait times
    /// out.
    pub fn block_on<F: Future>(&mut self, future: F) -> Result<F::Output, ModuleError> {
        if self.lifecycle != UnitState::Initializing {
            return Err(ModuleError::NotInitializing);
        }
        let timeout = self.config.init_timeout;
        let deadline = Instant::now() + timeout;
        let mut disconnected = false;
        let out = task::block_on_with(future, || {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.inbox.recv_timeout(remaining) {
                Ok(Envelope::Resource(msg)) => {
                    self.stats.record_message();
                    self.route_resource(msg);
                    true
                }
                Ok(other) => {
                    self.deferred.push_back(other);
                    true
                }
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    false
                }
            }
        });
        match out {
            Some(value) => Ok(value),
            None if disconnected => Err(ModuleError::Disconnected),
            None => Err(ModuleError::Timeout {
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }

    // ── driver hooks ──

    pub(crate) fn note_module(&mut self, name: &'static str) {
        self.registered_modules.push(name);
    }

    pub(crate) fn inbox(&self) -> &Receiver<Envelope<U::Message>> {
        &self.inbox
    }

    pub(crate) fn handle_envelope(&mut self, env: Envelope<U::Message>) {
        self.stats.record_message();
        match env {
            Envelope::Control(Control::Start) => self.start_requested = true,
            Envelope::Control(Control::Stop) => self.stop_requested = true,
            Envelope::Resource(msg) => self.route_resource(msg),
            Envelope::App(msg) => self.dispatch(msg),
        }
    }

    fn route_resource(&mut self, msg: ResourceMessage) {
        if msg.is_request() {
            self.host.handle(self.id, msg);
        } else {
            self.resources.handle(msg);
        }
    }

    fn dispatch(&mut self, msg: U::Message) {
        let kind = msg.kind();
        if self.lifecycle.is_disposed() {
            tracing::trace!(?kind, "message after dispose dropped");
            return;
        }
        let handlers = self.handlers.snapshot(&kind);
        if handlers.is_empty() {
            tracing::trace!(?kind, "no handler registered, message ignored");
            return;
        }
        for handler in handlers {
            if let Err(error) = handler(self, &msg) {
                tracing::warn!(?kind, %error, "message handler failed");
            }
        }
    }

    /// Handle everything waiting in the inbox without blocking, then poll
    /// local tasks. Stops early once a `Stop` is received.
    pub(crate) fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(env) = self.deferred.pop_front() {
            self.handle_envelope(env);
            handled += 1;
        }
        while !self.stop_requested {
            let Ok(env) = self.inbox.try_recv() else {
                break;
            };
            self.handle_envelope(env);
            handled += 1;
        }
        self.poll_tasks();
        handled
    }

    pub(crate) fn poll_tasks(&mut self) {
        for then in self.tasks.poll_ready() {
            then(self);
        }
    }

    /// Act on pending `Start` / `Stop` requests.
    pub(crate) fn apply_requests(&mut self, now: Instant) {
        if self.stop_requested {
            self.dispose();
        } else if self.start_requested && self.lifecycle == UnitState::Initializing {
            self.start_requested = false;
            self.start(now);
        }
    }

    pub(crate) fn start(&mut self, now: Instant) {
        if self.lifecycle != UnitState::Initializing {
            return;
        }
        self.time.start(now);
        self.set_lifecycle(UnitState::Running);
    }

    fn set_lifecycle(&mut self, next: UnitState) {
        debug_assert!(
            self.lifecycle.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.lifecycle,
            next
        );
        tracing::info!(unit = %self.id, from = ?self.lifecycle, to = ?next, "lifecycle transition");
        self.lifecycle = next;
        self.stats.set_state(next);
    }

    pub(crate) fn run_dispose_hooks(&mut self) {
        let hooks = std::mem::take(&mut self.dispose_hooks);
        for hook in hooks.into_iter().rev() {
            hook(self);
        }
    }

    /// Run dispose hooks, dispose every resource record, drop local
    /// tasks. Idempotent.
    pub(crate) fn dispose(&mut self) {
        if self.lifecycle.is_disposed() {
            return;
        }
        self.set_lifecycle(UnitState::Disposing);
        self.run_dispose_hooks();
        self.resources.dispose_all();
        self.tasks.clear();
        self.set_lifecycle(UnitState::Disposed);
    }
}
