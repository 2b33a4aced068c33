//! Adaptation layer of the reference firmware.
//!
//! Everything a board integrator edits when adding a component lives here:
//! callback ranks per state, the system task table, and the list of
//! components driven by the component manager task.

use std::time::Duration;

use sysmgr::{
    ComponentLifecycleDispatcher, ConfigError, StandardState, StateSet, SysConfig,
    SysConfigBuilder, SystemTask, TaskPriority, COMPONENT_MANAGER_TASK,
};

use crate::component::{ExampleComponent, ExampleTriggers, EXAMPLE_TASK};

/// Name of the transition lock on this board.
pub const TRANSITION_LOCK: &str = "SemSysStateTransition";

pub const INITIAL_STATE: StandardState = StandardState::NoConf;
pub const ENGINE_PRIORITY: TaskPriority = TaskPriority::new(10);
pub const EXAMPLE_TASK_PRIORITY: TaskPriority = TaskPriority::new(100);
pub const CMP_MGR_TASK_PRIORITY: TaskPriority = TaskPriority::new(102);
pub const CYCLE_PERIOD: Duration = Duration::from_millis(50);

pub const NOCONF_EXAMPLE_RANK: usize = 0;
pub const NOCONF_CALLBACKS: usize = 1;

pub const CONFIGURING_CALLBACKS: usize = 0;

pub const CONFIGURED_EXAMPLE_RANK: usize = 0;
pub const CONFIGURED_CALLBACKS: usize = 1;

pub const FATALERROR_EXAMPLE_RANK: usize = 0;
pub const FATALERROR_CALLBACKS: usize = 1;

pub fn callback_slots(state: StandardState) -> usize {
    match state {
        StandardState::NoConf => NOCONF_CALLBACKS,
        StandardState::Configuring => CONFIGURING_CALLBACKS,
        StandardState::Configured => CONFIGURED_CALLBACKS,
        StandardState::FatalError => FATALERROR_CALLBACKS,
    }
}

/// Tasks whose priority and core are imposed at creation.
pub fn system_tasks() -> Vec<SystemTask> {
    vec![
        SystemTask::new(EXAMPLE_TASK, EXAMPLE_TASK_PRIORITY).on_core(0),
        SystemTask::new(COMPONENT_MANAGER_TASK, CMP_MGR_TASK_PRIORITY).on_core(0),
    ]
}

/// Board defaults, ready for overrides before `build`.
pub fn config_builder() -> SysConfigBuilder<StandardState> {
    let builder = SysConfig::builder(INITIAL_STATE)
        .engine_priority(ENGINE_PRIORITY)
        .cycle_period(CYCLE_PERIOD)
        .lock_name(TRANSITION_LOCK);
    let builder = StandardState::ALL
        .iter()
        .fold(builder, |builder, &state| {
            builder.callback_slots(state, callback_slots(state))
        });
    system_tasks().into_iter().fold(builder, SysConfigBuilder::task)
}

pub fn system_config() -> Result<SysConfig<StandardState>, ConfigError> {
    config_builder().build()
}

/// Adds every component of the board to `dispatcher`, in hook order.
pub fn register_components(
    dispatcher: ComponentLifecycleDispatcher,
    triggers: &ExampleTriggers,
) -> ComponentLifecycleDispatcher {
    dispatcher.register(ExampleComponent::new(triggers.clone()))
}
