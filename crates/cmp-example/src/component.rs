//! The example component.
//!
//! Shows what a component does at each lifecycle step: registers its
//! transition callbacks, creates its own task, and drives reconfiguration of
//! the system from its cycle hook.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use sysmgr::{
    Component, Hook, HookError, HookResult, StandardState, TaskContext, TransitionPermit,
};

use crate::adapt;

/// Name of the task created by the component.
pub const EXAMPLE_TASK: &str = "ExampleTask";

/// Period of the consistency check of [`EXAMPLE_TASK`].
pub const EXAMPLE_TASK_PERIOD: Duration = Duration::from_millis(1);

#[derive(Default)]
struct Shared {
    new_config: AtomicBool,
    reset: AtomicBool,
    stop: AtomicBool,
    /// Only written from transition callbacks.
    configured: Mutex<bool>,
    checks: AtomicU64,
}

/// Host-side controls and observations of the example component.
#[derive(Clone, Default)]
pub struct ExampleTriggers {
    shared: Arc<Shared>,
}

impl ExampleTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that a new configuration was received.
    pub fn request_new_config(&self) {
        self.shared.new_config.store(true, Ordering::Release);
    }

    /// Asks for an unconditional return to `NO_CONF`.
    pub fn request_reset(&self) {
        self.shared.reset.store(true, Ordering::Release);
    }

    /// Makes [`EXAMPLE_TASK`] return after its current check.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    pub fn is_configured(&self) -> bool {
        *self.shared.configured.lock()
    }

    /// Number of consistency checks performed by [`EXAMPLE_TASK`].
    pub fn consistency_checks(&self) -> u64 {
        self.shared.checks.load(Ordering::Acquire)
    }

    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::AcqRel)
    }
}

pub struct ExampleComponent {
    triggers: ExampleTriggers,
}

impl ExampleComponent {
    pub fn new(triggers: ExampleTriggers) -> Self {
        Self { triggers }
    }

    fn register_callbacks(&self, ctx: &TaskContext) -> HookResult {
        for (state, rank) in [
            (StandardState::Configured, adapt::CONFIGURED_EXAMPLE_RANK),
            (StandardState::NoConf, adapt::NOCONF_EXAMPLE_RANK),
            (StandardState::FatalError, adapt::FATALERROR_EXAMPLE_RANK),
        ] {
            let shared = Arc::clone(&self.triggers.shared);
            ctx.register_callback(state, rank, move |old, new| on_transition(&shared, old, new))
                .map_err(|err| HookError::fatal(err.to_string()))?;
        }
        Ok(())
    }

    fn spawn_task(&self, ctx: &TaskContext) -> HookResult {
        let shared = Arc::clone(&self.triggers.shared);
        let task = ctx
            .spawn_task(EXAMPLE_TASK, move |ctx| example_task(&ctx, &shared))
            .map_err(|err| HookError::fatal(err.to_string()))?;
        debug!("{} running", task.name());
        Ok(())
    }

    /// Takes the lock the way every component must: by the board's lock name.
    fn lock<'a>(ctx: &'a TaskContext) -> Result<TransitionPermit<'a, StandardState>, HookError> {
        ctx.lock_transition_named(adapt::TRANSITION_LOCK)
            .map_err(|err| HookError::fatal(format!("transition lock unavailable: {err}")))
    }

    fn reconfigure(ctx: &TaskContext) -> HookResult {
        let permit = Self::lock(ctx)?;
        if permit.state() == StandardState::Configured {
            permit.transition_to(StandardState::NoConf);
        } else {
            permit.release();
        }

        let permit = Self::lock(ctx)?;
        if permit.state() != StandardState::NoConf {
            warn!("configuration refused in state {}", permit.state());
            permit.release();
            return Ok(());
        }
        permit.transition_to(StandardState::Configuring);

        // The configuration transfer happens outside the lock.
        debug!("configuration written");

        let permit = Self::lock(ctx)?;
        if permit.state() == StandardState::Configuring {
            permit.transition_to(StandardState::Configured);
        } else {
            warn!("state changed to {} while configuring", permit.state());
            permit.release();
        }
        Ok(())
    }

    fn reset(ctx: &TaskContext) -> HookResult {
        Self::lock(ctx)?.transition_to(StandardState::NoConf);
        Ok(())
    }
}

impl Component for ExampleComponent {
    fn name(&self) -> &str {
        "CmpExample"
    }

    fn on_hook(&mut self, hook: Hook, ctx: &TaskContext) -> HookResult {
        match hook {
            Hook::InitVar => self.register_callbacks(ctx),
            Hook::InitTasks => self.spawn_task(ctx),
            Hook::Cycle => {
                if ExampleTriggers::take(&self.triggers.shared.new_config) {
                    info!("new configuration received");
                    Self::reconfigure(ctx)?;
                }
                if ExampleTriggers::take(&self.triggers.shared.reset) {
                    info!("configuration reset requested");
                    Self::reset(ctx)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn on_transition(shared: &Shared, old: StandardState, new: StandardState) {
    debug!("example leaving {old} for {new}");
    match new {
        StandardState::NoConf => *shared.configured.lock() = false,
        StandardState::Configured => *shared.configured.lock() = true,
        StandardState::Configuring | StandardState::FatalError => {}
    }
}

/// Checks that the component is configured whenever the system is.
fn example_task(ctx: &TaskContext, shared: &Shared) {
    while !shared.stop.load(Ordering::Acquire) {
        {
            let configured = shared.configured.lock();
            if ctx.state() == StandardState::Configured && !*configured {
                drop(configured);
                ctx.fatal_error("system configured but example component is not");
            }
        }
        shared.checks.fetch_add(1, Ordering::AcqRel);
        ctx.sleep(EXAMPLE_TASK_PERIOD);
    }
    debug!("{} stopped", ctx.name());
}
