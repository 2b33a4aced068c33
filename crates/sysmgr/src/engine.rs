//! The state transition engine.
//!
//! A transition is decided under the [`TransitionLock`] and executed by the
//! permit holder:
//!
//! 1. capture the caller priority and elevate to the engine priority,
//! 2. snapshot the current state and publish the transition sentinel,
//! 3. call the callbacks registered for the target in ascending rank order,
//! 4. commit the target,
//! 5. release the lock,
//! 6. restore the caller priority.
//!
//! Callbacks run synchronously on the caller's task. Readers on other tasks
//! observe [`SysState::TransitionInProgress`] from step 2 until step 4.
//!
//! The first [`fatal_error`](StateTransitionEngine::fatal_error) halts the
//! engine for good: the state stays readable, but every later lock request
//! and transition is refused through the fatal handler.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::SysConfig;
use crate::error::{LockError, RegistryError};
use crate::fatal::FatalHandler;
use crate::lock::TransitionLock;
use crate::port::Port;
use crate::priority::{TaskPriority, TaskPriorityGuard};
use crate::registry::{CallbackRef, CallbackRegistry};
use crate::states::{StandardState, StateSet, SysState};
use crate::store::StateStore;
use crate::trace::{byte, records, TraceHook, Tracer};

pub struct StateTransitionEngine<S: StateSet = StandardState> {
    store: StateStore<S>,
    lock: TransitionLock,
    registry: CallbackRegistry<S>,
    engine_priority: TaskPriority,
    port: Arc<dyn Port>,
    fatal: Arc<dyn FatalHandler>,
    halted: AtomicBool,
    tracer: Tracer,
}

impl<S: StateSet> StateTransitionEngine<S> {
    pub fn new(
        config: &SysConfig<S>,
        port: Arc<dyn Port>,
        fatal: Arc<dyn FatalHandler>,
        trace: Option<TraceHook>,
    ) -> Result<Self, RegistryError> {
        let registry = CallbackRegistry::with_slots(|state| config.callback_slots(state))?;
        info!(
            "system state initialised to {} (engine at {})",
            config.initial_state.name(),
            config.engine_priority
        );
        Ok(Self {
            store: StateStore::new(config.initial_state),
            lock: TransitionLock::new(config.lock_name.clone()),
            registry,
            engine_priority: config.engine_priority,
            port,
            fatal,
            halted: AtomicBool::new(false),
            tracer: Tracer::new(trace),
        })
    }

    /// Current state; never blocks.
    pub fn state(&self) -> SysState<S> {
        self.store.get()
    }

    pub fn lock(&self) -> &TransitionLock {
        &self.lock
    }

    pub fn registry(&self) -> &CallbackRegistry<S> {
        &self.registry
    }

    pub fn engine_priority(&self) -> TaskPriority {
        self.engine_priority
    }

    pub fn port(&self) -> &dyn Port {
        self.port.as_ref()
    }

    pub fn register(
        &self,
        state: S,
        rank: usize,
        callback: CallbackRef<S>,
    ) -> Result<(), RegistryError> {
        self.registry.register(state, rank, callback)?;
        self.tracer
            .emit(records::REGISTER, &[byte(state.index()), byte(rank)]);
        Ok(())
    }

    /// Halts the engine, then hands `message` to the fatal handler.
    pub fn fatal_error(&self, message: &str) -> ! {
        self.halted.store(true, Ordering::Release);
        self.fatal.fatal_error(message)
    }

    /// True once any task reported a fatal error.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Stops `task` if the system is halted.
    pub(crate) fn ensure_running(&self, task: &str) {
        if self.is_halted() {
            self.fatal
                .fatal_error(&format!("task `{task}` stopped: system halted"))
        }
    }

    pub(crate) fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Blocks until `task` owns the transition lock named `name`.
    pub(crate) fn acquire<'a>(
        &'a self,
        name: &str,
        task: &'a str,
    ) -> Result<TransitionPermit<'a, S>, LockError> {
        self.ensure_running(task);
        self.lock.acquire(name, task)?;
        if self.is_halted() {
            self.lock.release();
            self.ensure_running(task);
        }
        let priority = self.port.current_priority().map_or(u8::MAX, TaskPriority::raw);
        self.tracer.emit(records::LOCK, &[priority]);
        Ok(TransitionPermit {
            engine: self,
            task,
            settled: false,
            _task_bound: PhantomData,
        })
    }

    fn release_lock(&self) {
        self.lock.release();
        self.tracer
            .emit(records::UNLOCK, &[byte(self.store.get().to_raw())]);
    }

    fn execute(&self, target: S, task: &str) {
        if self.is_halted() {
            self.release_lock();
            self.ensure_running(task);
        }
        let guard = match TaskPriorityGuard::elevate(self.port.as_ref(), self.engine_priority) {
            Ok(guard) => guard,
            Err(err) => self.fatal_error(&format!(
                "task `{task}` cannot enter {} for a transition: {err}",
                self.engine_priority
            )),
        };

        let old = match self.store.get() {
            SysState::Stable(old) => old,
            SysState::TransitionInProgress => {
                self.fatal_error("transition started while another is in progress")
            }
        };
        self.store.set_sentinel();
        self.tracer.emit(
            records::TRANSITION_BEGIN,
            &[byte(old.index()), byte(target.index()), guard.saved().raw()],
        );

        for (rank, slot) in self.registry.slots_for(target).iter().enumerate() {
            if let Some(callback) = slot {
                self.tracer
                    .emit(records::CALLBACK, &[byte(target.index()), byte(rank)]);
                callback.on_transition(old, target);
            }
        }

        // A fatal error raised during dispatch leaves the sentinel in place.
        self.ensure_running(task);
        self.store.commit(target);
        self.release_lock();

        if let Err(err) = guard.restore() {
            self.fatal_error(&format!("task `{task}` priority not restored: {err}"));
        }

        self.tracer.emit(
            records::TRANSITION_END,
            &[byte(old.index()), byte(target.index())],
        );
        info!("system state {} -> {} by `{task}`", old.name(), target.name());
    }
}

/// Proof that the calling task holds the transition lock.
///
/// Obtained from [`TaskContext::lock_transition`](crate::TaskContext::lock_transition)
/// and bound to the task that took it. Consume it with
/// [`transition_to`](Self::transition_to) or [`release`](Self::release);
/// dropping it releases the lock as well but is reported.
#[must_use = "the transition lock stays held until the permit is used"]
pub struct TransitionPermit<'a, S: StateSet> {
    engine: &'a StateTransitionEngine<S>,
    task: &'a str,
    settled: bool,
    _task_bound: PhantomData<*const ()>,
}

impl<S: StateSet> TransitionPermit<'_, S> {
    /// State observed under the lock; stable while the permit is held.
    pub fn state(&self) -> SysState<S> {
        self.engine.state()
    }

    /// Gives the lock back without changing the state.
    pub fn release(mut self) {
        self.settled = true;
        self.engine.release_lock();
    }

    /// Moves the system to `target` and releases the lock.
    ///
    /// If a callback panics, the caller priority is restored while unwinding
    /// but the lock stays held and readers keep observing the sentinel.
    pub fn transition_to(mut self, target: S) {
        self.settled = true;
        self.engine.execute(target, self.task);
    }
}

impl<S: StateSet> Drop for TransitionPermit<'_, S> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("transition permit of `{}` dropped unused", self.task);
            self.engine.release_lock();
        } else {
            debug!("transition permit of `{}` settled", self.task);
        }
    }
}
