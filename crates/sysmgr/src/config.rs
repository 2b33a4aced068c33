//! System configuration: state slots, priorities, lifecycle period and the
//! system task table.

use std::time::Duration;

#[cfg(feature = "serde")]
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lifecycle::OverrunPolicy;
use crate::lock::TRANSITION_LOCK_NAME;
use crate::port::TaskSpec;
use crate::priority::{CpuAffinity, TaskPriority};
use crate::states::StateSet;

/// Default period of the `Cycle` hook.
pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_millis(50);

/// Entry of the system task table.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemTask {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub affinity: CpuAffinity,
    pub priority: TaskPriority,
    /// Whether the task reads or changes the system state. Such tasks must
    /// run below the engine priority.
    #[cfg_attr(feature = "serde", serde(default = "may_transition_default"))]
    pub may_transition: bool,
}

#[cfg(feature = "serde")]
fn may_transition_default() -> bool {
    true
}

impl SystemTask {
    pub fn new(name: impl Into<String>, priority: impl Into<TaskPriority>) -> Self {
        Self {
            name: name.into(),
            affinity: CpuAffinity::Any,
            priority: priority.into(),
            may_transition: true,
        }
    }

    pub fn on_core(mut self, core: u8) -> Self {
        self.affinity = CpuAffinity::Core(core);
        self
    }

    /// Marks a task that never touches the system state.
    pub fn independent(mut self) -> Self {
        self.may_transition = false;
        self
    }

    pub fn spec(&self) -> TaskSpec {
        TaskSpec::new(self.name.clone(), self.priority).with_affinity(self.affinity)
    }
}

/// Validated configuration of a system manager.
#[derive(Debug, Clone)]
pub struct SysConfig<S: StateSet> {
    pub initial_state: S,
    callback_slots: Vec<usize>,
    pub engine_priority: TaskPriority,
    pub cycle_period: Duration,
    pub overrun_policy: OverrunPolicy,
    pub lock_name: String,
    pub tasks: Vec<SystemTask>,
    pub default_task_priority: TaskPriority,
}

impl<S: StateSet> SysConfig<S> {
    pub fn builder(initial_state: S) -> SysConfigBuilder<S> {
        SysConfigBuilder::new(initial_state)
    }

    /// Number of callback ranks reserved for `state`.
    pub fn callback_slots(&self, state: S) -> usize {
        self.callback_slots[state.index()]
    }

    pub fn task(&self, name: &str) -> Option<&SystemTask> {
        self.tasks.iter().find(|task| task.name == name)
    }

    /// Creation parameters for `name`; unknown tasks get the default creation
    /// priority on any core.
    pub fn task_spec(&self, name: &str) -> TaskSpec {
        match self.task(name) {
            Some(task) => task.spec(),
            None => TaskSpec::new(name, self.default_task_priority),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SysConfigBuilder<S: StateSet> {
    config: SysConfig<S>,
}

impl<S: StateSet> SysConfigBuilder<S> {
    fn new(initial_state: S) -> Self {
        Self {
            config: SysConfig {
                initial_state,
                callback_slots: vec![0; S::COUNT],
                engine_priority: TaskPriority::DEFAULT_ENGINE,
                cycle_period: DEFAULT_CYCLE_PERIOD,
                overrun_policy: OverrunPolicy::default(),
                lock_name: TRANSITION_LOCK_NAME.to_owned(),
                tasks: Vec::new(),
                default_task_priority: TaskPriority::DEFAULT_CREATION,
            },
        }
    }

    pub fn initial_state(mut self, state: S) -> Self {
        self.config.initial_state = state;
        self
    }

    /// Reserves `slots` callback ranks for `state`.
    pub fn callback_slots(mut self, state: S, slots: usize) -> Self {
        self.config.callback_slots[state.index()] = slots;
        self
    }

    pub fn engine_priority(mut self, priority: impl Into<TaskPriority>) -> Self {
        self.config.engine_priority = priority.into();
        self
    }

    pub fn cycle_period(mut self, period: Duration) -> Self {
        self.config.cycle_period = period;
        self
    }

    pub fn overrun_policy(mut self, policy: OverrunPolicy) -> Self {
        self.config.overrun_policy = policy;
        self
    }

    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.config.lock_name = name.into();
        self
    }

    pub fn default_task_priority(mut self, priority: impl Into<TaskPriority>) -> Self {
        self.config.default_task_priority = priority.into();
        self
    }

    pub fn task(mut self, task: SystemTask) -> Self {
        self.config.tasks.push(task);
        self
    }

    /// Adds `task`, replacing any entry with the same name.
    pub fn override_task(mut self, task: SystemTask) -> Self {
        self.config.tasks.retain(|existing| existing.name != task.name);
        self.config.tasks.push(task);
        self
    }

    pub fn build(self) -> Result<SysConfig<S>, ConfigError> {
        let config = self.config;

        if config.cycle_period.is_zero() {
            return Err(ConfigError::ZeroCyclePeriod);
        }
        if config.lock_name.is_empty() {
            return Err(ConfigError::EmptyLockName);
        }
        for (position, task) in config.tasks.iter().enumerate() {
            if task.name.is_empty() {
                return Err(ConfigError::EmptyTaskName);
            }
            if config.tasks[..position]
                .iter()
                .any(|earlier| earlier.name == task.name)
            {
                return Err(ConfigError::DuplicateTask(task.name.clone()));
            }
            if task.may_transition && !config.engine_priority.is_more_urgent_than(task.priority) {
                return Err(ConfigError::PriorityNotBelowEngine {
                    task: task.name.clone(),
                    priority: task.priority,
                    engine: config.engine_priority,
                });
            }
        }

        Ok(config)
    }
}

/// File form of [`SysConfig`]; every field is optional and overrides the
/// builder it is applied to.
///
/// ```toml
/// initial_state = "NO_CONF"
/// cycle_period_ms = 50
/// overrun_policy = "skip"
///
/// [callback_slots]
/// CONFIGURED = 2
///
/// [[tasks]]
/// name = "ExampleTask"
/// priority = 100
/// affinity = { core = 0 }
/// ```
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub initial_state: Option<String>,
    pub engine_priority: Option<TaskPriority>,
    pub cycle_period_ms: Option<u64>,
    pub overrun_policy: Option<OverrunPolicy>,
    pub lock_name: Option<String>,
    pub default_task_priority: Option<TaskPriority>,
    pub callback_slots: BTreeMap<String, usize>,
    pub tasks: Vec<SystemTask>,
}

#[cfg(feature = "serde")]
impl ConfigFile {
    pub fn apply<S: StateSet>(
        self,
        mut builder: SysConfigBuilder<S>,
    ) -> Result<SysConfigBuilder<S>, ConfigError> {
        if let Some(name) = self.initial_state {
            builder = builder.initial_state(resolve_state(&name)?);
        }
        if let Some(priority) = self.engine_priority {
            builder = builder.engine_priority(priority);
        }
        if let Some(millis) = self.cycle_period_ms {
            builder = builder.cycle_period(Duration::from_millis(millis));
        }
        if let Some(policy) = self.overrun_policy {
            builder = builder.overrun_policy(policy);
        }
        if let Some(name) = self.lock_name {
            builder = builder.lock_name(name);
        }
        if let Some(priority) = self.default_task_priority {
            builder = builder.default_task_priority(priority);
        }
        for (name, slots) in self.callback_slots {
            builder = builder.callback_slots(resolve_state(&name)?, slots);
        }
        for task in self.tasks {
            builder = builder.override_task(task);
        }
        Ok(builder)
    }
}

#[cfg(feature = "serde")]
fn resolve_state<S: StateSet>(name: &str) -> Result<S, ConfigError> {
    S::from_name(name).ok_or_else(|| ConfigError::UnknownState(name.to_owned()))
}
