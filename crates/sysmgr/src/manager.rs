//! Public handle on the system manager and the per-task context.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::config::SysConfig;
use crate::engine::{StateTransitionEngine, TransitionPermit};
use crate::error::{LockError, PortError, RegistryError};
use crate::fatal::{FatalHandler, HaltOnFatal};
use crate::lifecycle::ComponentLifecycleDispatcher;
use crate::port::host::HostPort;
use crate::port::{Port, TaskHandle};
use crate::priority::TaskPriority;
use crate::states::{StandardState, StateSet, SysState};
use crate::trace::TraceHook;

/// Name of the task running the component lifecycle.
pub const COMPONENT_MANAGER_TASK: &str = "CmpMgrTask";

struct Shared<S: StateSet> {
    engine: StateTransitionEngine<S>,
    config: SysConfig<S>,
}

/// Cloneable handle on one system manager instance.
pub struct SystemManager<S: StateSet = StandardState> {
    shared: Arc<Shared<S>>,
}

impl<S: StateSet> Clone for SystemManager<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: StateSet> SystemManager<S> {
    pub fn builder(config: SysConfig<S>) -> SystemManagerBuilder<S> {
        SystemManagerBuilder::new(config)
    }

    /// Current system state, callable from any context.
    pub fn state(&self) -> SysState<S> {
        self.shared.engine.state()
    }

    pub fn config(&self) -> &SysConfig<S> {
        &self.shared.config
    }

    pub fn engine(&self) -> &StateTransitionEngine<S> {
        &self.shared.engine
    }

    /// Registers `callback` for transitions into `state` at `rank`.
    ///
    /// Implementors of [`TransitionCallback`](crate::TransitionCallback) go through
    /// [`StateTransitionEngine::register`] instead.
    pub fn register_callback<F>(&self, state: S, rank: usize, callback: F) -> Result<(), RegistryError>
    where
        F: Fn(S, S) + Send + Sync + 'static,
    {
        self.shared.engine.register(state, rank, Arc::new(callback))
    }

    /// Creates task `name` with the priority and affinity of the task table,
    /// or the default creation priority when the table does not list it.
    pub fn spawn_task<F>(&self, name: &str, entry: F) -> Result<TaskHandle, PortError>
    where
        F: FnOnce(TaskContext<S>) + Send + 'static,
    {
        let spec = self.shared.config.task_spec(name);
        info!(
            "creating task `{}` at {} on {}",
            spec.name, spec.priority, spec.affinity
        );
        let manager = self.clone();
        let task = spec.name.clone();
        self.shared
            .engine
            .port()
            .spawn(spec, Box::new(move || entry(TaskContext::new(manager, task))))
    }

    /// Turns the calling thread into task `name`.
    pub fn adopt_current_task(&self, name: &str) -> Result<TaskContext<S>, PortError> {
        let spec = self.shared.config.task_spec(name);
        self.shared.engine.port().adopt_current(&spec)?;
        Ok(TaskContext::new(self.clone(), spec.name))
    }

    /// Starts the component manager task running `dispatcher`.
    ///
    /// A hook failure is reported through the fatal handler on that task.
    pub fn start(&self, dispatcher: ComponentLifecycleDispatcher<S>) -> Result<TaskHandle, PortError> {
        self.spawn_task(COMPONENT_MANAGER_TASK, move |ctx| match dispatcher.run(&ctx) {
            Ok(stats) => info!(
                "component manager stopped after {} cycles ({} overruns)",
                stats.cycles, stats.overruns
            ),
            Err(err) => ctx.fatal_error(&err.to_string()),
        })
    }

    /// Lifecycle dispatcher using the configured period and overrun policy.
    pub fn dispatcher(&self) -> ComponentLifecycleDispatcher<S> {
        ComponentLifecycleDispatcher::new(self.shared.config.cycle_period)
            .overrun_policy(self.shared.config.overrun_policy)
    }

    pub fn fatal_error(&self, message: &str) -> ! {
        self.shared.engine.fatal_error(message)
    }
}

pub struct SystemManagerBuilder<S: StateSet> {
    config: SysConfig<S>,
    port: Arc<dyn Port>,
    fatal: Arc<dyn FatalHandler>,
    trace: Option<TraceHook>,
}

impl<S: StateSet> SystemManagerBuilder<S> {
    fn new(config: SysConfig<S>) -> Self {
        Self {
            config,
            port: Arc::new(HostPort::new()),
            fatal: Arc::new(HaltOnFatal),
            trace: None,
        }
    }

    pub fn port(mut self, port: impl Port) -> Self {
        self.port = Arc::new(port);
        self
    }

    pub fn fatal_handler(mut self, handler: impl FatalHandler) -> Self {
        self.fatal = Arc::new(handler);
        self
    }

    pub fn trace_hook(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    pub fn build(self) -> Result<SystemManager<S>, RegistryError> {
        let engine = StateTransitionEngine::new(&self.config, self.port, self.fatal, self.trace)
            .inspect_err(|err| error!("system manager initialisation failed: {err}"))?;
        Ok(SystemManager {
            shared: Arc::new(Shared {
                engine,
                config: self.config,
            }),
        })
    }
}

/// Capabilities of a task created or adopted by the manager.
///
/// The transition API is only reachable from here, which keeps it out of
/// interrupt handlers and foreign threads. The context cannot leave its task.
pub struct TaskContext<S: StateSet = StandardState> {
    manager: SystemManager<S>,
    name: String,
    _task_bound: PhantomData<*const ()>,
}

impl<S: StateSet> TaskContext<S> {
    fn new(manager: SystemManager<S>, name: String) -> Self {
        Self {
            manager,
            name,
            _task_bound: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Result<TaskPriority, PortError> {
        self.port().current_priority()
    }

    pub fn state(&self) -> SysState<S> {
        self.manager.state()
    }

    /// Takes the transition lock, blocking until it is free.
    ///
    /// Taking it twice from the same task never returns.
    pub fn lock_transition(&self) -> TransitionPermit<'_, S> {
        let name = &self.manager.config().lock_name;
        match self.lock_transition_named(name) {
            Ok(permit) => permit,
            Err(err) => self.fatal_error(&err.to_string()),
        }
    }

    /// Takes the lock registered under `name`. Any error is fatal for the
    /// caller.
    pub fn lock_transition_named(&self, name: &str) -> Result<TransitionPermit<'_, S>, LockError> {
        self.manager.engine().acquire(name, &self.name)
    }

    pub fn register_callback<F>(&self, state: S, rank: usize, callback: F) -> Result<(), RegistryError>
    where
        F: Fn(S, S) + Send + Sync + 'static,
    {
        self.manager.register_callback(state, rank, callback)
    }

    pub fn spawn_task<F>(&self, name: &str, entry: F) -> Result<TaskHandle, PortError>
    where
        F: FnOnce(TaskContext<S>) + Send + 'static,
    {
        self.manager.spawn_task(name, entry)
    }

    pub fn now(&self) -> Instant {
        self.port().now()
    }

    pub fn sleep(&self, duration: Duration) {
        let port = self.port();
        port.sleep_until(port.now() + duration);
    }

    pub fn sleep_until(&self, deadline: Instant) {
        self.port().sleep_until(deadline);
    }

    pub fn fatal_error(&self, message: &str) -> ! {
        self.manager.fatal_error(&format!("[{}] {message}", self.name))
    }

    pub fn manager(&self) -> &SystemManager<S> {
        &self.manager
    }

    fn port(&self) -> &dyn Port {
        self.manager.engine().port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemTask;
    use crate::fatal::PanicOnFatal;
    use crate::priority::CpuAffinity;
    use std::sync::mpsc;

    fn manager() -> SystemManager {
        let config = SysConfig::builder(StandardState::NoConf)
            .task(SystemTask::new("Worker", 100).on_core(0))
            .build()
            .unwrap();
        SystemManager::builder(config)
            .fatal_handler(PanicOnFatal)
            .build()
            .unwrap()
    }

    #[test]
    fn spawned_task_uses_task_table() {
        let manager = manager();
        let (tx, rx) = mpsc::channel();
        let handle = manager
            .spawn_task("Worker", move |ctx| {
                tx.send((ctx.name().to_owned(), ctx.priority().unwrap()))
                    .unwrap();
            })
            .unwrap();
        handle.join().unwrap();

        assert_eq!(rx.recv().unwrap(), ("Worker".to_owned(), TaskPriority::new(100)));
        assert_eq!(manager.config().task_spec("Worker").affinity, CpuAffinity::Core(0));
    }

    #[test]
    fn unlisted_task_gets_default_priority() {
        let manager = manager();
        let (tx, rx) = mpsc::channel();
        manager
            .spawn_task("Helper", move |ctx| tx.send(ctx.priority().unwrap()).unwrap())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(rx.recv().unwrap(), TaskPriority::DEFAULT_CREATION);
    }

    #[test]
    fn wrong_lock_name_is_reported() {
        let manager = manager();
        let ctx = manager.adopt_current_task("Worker").unwrap();
        let err = ctx.lock_transition_named("SemOther").err();
        assert_eq!(err, Some(LockError::UnknownLock("SemOther".into())));
        assert!(!manager.engine().lock().is_held());
    }

    #[test]
    fn fatal_error_names_the_task() {
        let manager = manager();
        let outcome = manager
            .spawn_task("Worker", |ctx| ctx.fatal_error("lost configuration"))
            .unwrap()
            .join();
        assert!(matches!(outcome, Err(PortError::TaskPanicked(name)) if name == "Worker"));
    }
}
