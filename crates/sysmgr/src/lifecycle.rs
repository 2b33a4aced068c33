//! Component lifecycle: one-shot initialisation hooks, then the periodic cycle.

use core::fmt;
use std::time::Duration;

use log::{debug, info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{HookError, LifecycleError};
use crate::manager::TaskContext;
use crate::states::{StandardState, StateSet};
use crate::trace::{byte, records};

/// Lifecycle hooks, in dispatch order.
///
/// The `*First` and `*End` hooks are insertion points around each main
/// initialisation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    InitHwFirst,
    InitHw,
    InitHwEnd,
    InitVarFirst,
    InitVar,
    InitVarEnd,
    InitTasksFirst,
    InitTasks,
    InitTasksEnd,
    LastInitFirst,
    LastInit,
    LastInitEnd,
    Cycle,
}

impl Hook {
    /// Hooks run exactly once, before the first [`Hook::Cycle`].
    pub const ONE_SHOT: [Hook; 12] = [
        Hook::InitHwFirst,
        Hook::InitHw,
        Hook::InitHwEnd,
        Hook::InitVarFirst,
        Hook::InitVar,
        Hook::InitVarEnd,
        Hook::InitTasksFirst,
        Hook::InitTasks,
        Hook::InitTasksEnd,
        Hook::LastInitFirst,
        Hook::LastInit,
        Hook::LastInitEnd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Hook::InitHwFirst => "CMP_INITHW_FIRST",
            Hook::InitHw => "CMP_INITHW",
            Hook::InitHwEnd => "CMP_INITHW_END",
            Hook::InitVarFirst => "CMP_INITVAR_FIRST",
            Hook::InitVar => "CMP_INITVAR",
            Hook::InitVarEnd => "CMP_INITVAR_END",
            Hook::InitTasksFirst => "CMP_INITTASKS_FIRST",
            Hook::InitTasks => "CMP_INITTASKS",
            Hook::InitTasksEnd => "CMP_INITTASKS_END",
            Hook::LastInitFirst => "CMP_LASTINIT_FIRST",
            Hook::LastInit => "CMP_LASTINIT",
            Hook::LastInitEnd => "CMP_LASTINIT_END",
            Hook::Cycle => "CMP_CYCLE",
        }
    }

    pub fn is_one_shot(self) -> bool {
        self != Hook::Cycle
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type HookResult = Result<(), HookError>;

/// A pluggable firmware component.
pub trait Component<S: StateSet = StandardState>: Send {
    fn name(&self) -> &str;

    /// Runs one lifecycle step on the component manager task.
    fn on_hook(&mut self, hook: Hook, ctx: &TaskContext<S>) -> HookResult;
}

/// What the periodic phase does when a cycle ends after its next deadline.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// Drop the missed deadlines and wait for the next future one.
    #[default]
    Skip,
    /// Run the missed cycles back to back.
    CatchUp,
    /// Sleep one full period after every cycle; deadlines drift.
    FixedDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStats {
    pub cycles: u64,
    pub overruns: u64,
    pub skipped_periods: u64,
}

pub struct ComponentLifecycleDispatcher<S: StateSet = StandardState> {
    components: Vec<Box<dyn Component<S>>>,
    period: Duration,
    policy: OverrunPolicy,
    cycle_limit: Option<u64>,
}

impl<S: StateSet> ComponentLifecycleDispatcher<S> {
    /// A zero `period` runs the cycle hook back to back, without deadlines.
    pub fn new(period: Duration) -> Self {
        Self {
            components: Vec::new(),
            period,
            policy: OverrunPolicy::default(),
            cycle_limit: None,
        }
    }

    /// Adds a component; hooks reach components in registration order.
    pub fn register(mut self, component: impl Component<S> + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    pub fn overrun_policy(mut self, policy: OverrunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stops after `cycles` cycle hooks instead of running forever.
    pub fn cycle_limit(mut self, cycles: u64) -> Self {
        self.cycle_limit = Some(cycles);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Runs every one-shot hook, seals the callback registry, then cycles.
    ///
    /// Returns only when the cycle limit is reached or a hook fails.
    pub fn run(mut self, ctx: &TaskContext<S>) -> Result<CycleStats, LifecycleError> {
        for hook in Hook::ONE_SHOT {
            self.dispatch(hook, ctx)?;
        }
        ctx.manager().engine().registry().seal();
        info!(
            "{} components initialised, cycling every {:?}",
            self.components.len(),
            self.period
        );

        let mut stats = CycleStats::default();
        let mut deadline = ctx.now() + self.period;
        loop {
            if self.cycle_limit.is_some_and(|limit| stats.cycles >= limit) {
                return Ok(stats);
            }
            ctx.manager().engine().ensure_running(ctx.name());
            self.dispatch(Hook::Cycle, ctx)?;
            stats.cycles += 1;
            if self.cycle_limit.is_some_and(|limit| stats.cycles >= limit) {
                return Ok(stats);
            }

            if self.period.is_zero() {
                continue;
            }
            if self.policy == OverrunPolicy::FixedDelay {
                ctx.sleep(self.period);
                continue;
            }

            let now = ctx.now();
            if now > deadline {
                let late = now - deadline;
                stats.overruns += 1;
                let mut skipped: u64 = 0;
                if self.policy == OverrunPolicy::Skip {
                    skipped = missed_deadlines(late, self.period);
                    deadline += self.period * u32::try_from(skipped).unwrap_or(u32::MAX);
                    stats.skipped_periods += skipped;
                }
                warn!(
                    "cycle {} ended {late:?} after its deadline, {skipped} deadlines skipped",
                    stats.cycles
                );
                let mut payload = [0u8; 16];
                payload[..8].copy_from_slice(&stats.cycles.to_le_bytes());
                payload[8..].copy_from_slice(&skipped.to_le_bytes());
                ctx.manager()
                    .engine()
                    .tracer()
                    .emit(records::CYCLE_OVERRUN, &payload);
            }
            ctx.sleep_until(deadline);
            deadline += self.period;
        }
    }

    fn dispatch(&mut self, hook: Hook, ctx: &TaskContext<S>) -> Result<(), LifecycleError> {
        let tracer = ctx.manager().engine().tracer();
        for (position, component) in self.components.iter_mut().enumerate() {
            tracer.emit(records::HOOK, &[hook as u8, byte(position)]);
            component
                .on_hook(hook, ctx)
                .map_err(|source| LifecycleError::HookFailed {
                    component: component.name().to_owned(),
                    hook,
                    source,
                })?;
        }
        if hook.is_one_shot() {
            debug!("hook {hook} done");
        }
        Ok(())
    }
}

/// Deadlines missed when a cycle ends `late` after its own deadline.
fn missed_deadlines(late: Duration, period: Duration) -> u64 {
    match late.as_nanos().checked_div(period.as_nanos()) {
        Some(whole) => u64::try_from(whole).unwrap_or(u64::MAX).saturating_add(1),
        None => 0,
    }
}
