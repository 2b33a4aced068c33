//! # sysmgr
//!
//! System state manager and component lifecycle dispatcher for multi-task
//! firmware.
//!
//! One [`SystemManager`] owns the global system state. Any task can read it at
//! any time; tasks created through the manager can take the transition lock
//! and move the system to another state, notifying the components that
//! registered interest in the target, in rank order. A component manager task
//! brings every [`Component`] through its initialisation hooks once and then
//! calls its cycle hook periodically.
//!
//! ## Module Overview
//! - [`states`]    – State sets and the reader-facing [`SysState`].
//! - [`store`]     – Lock-free current-state storage.
//! - [`lock`]      – The named transition lock.
//! - [`registry`]  – Per-state, ranked transition callbacks.
//! - [`engine`]    – Transition sequencing and [`TransitionPermit`].
//! - [`lifecycle`] – Component hooks and the periodic dispatcher.
//! - [`manager`]   – Public handle, task creation and [`TaskContext`].
//! - [`port`]      – Scheduler services; [`HostPort`] for hosted builds.
//! - [`config`]    – Configuration, task table and the optional file form.
//! - [`trace`]     – Numbered binary trace records.
//!
//! ```no_run
//! use sysmgr::{StandardState, SysConfig, SystemManager};
//!
//! let config = SysConfig::builder(StandardState::NoConf)
//!     .callback_slots(StandardState::Configured, 1)
//!     .build()?;
//! let manager = SystemManager::builder(config).build()?;
//! manager.register_callback(StandardState::Configured, 0, |old, new| {
//!     println!("{old} -> {new}");
//! })?;
//!
//! let ctx = manager.adopt_current_task("Init")?;
//! ctx.lock_transition().transition_to(StandardState::Configured);
//! assert_eq!(manager.state(), StandardState::Configured);
//! # Ok::<(), sysmgr::SysError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fatal;
pub mod lifecycle;
pub mod lock;
pub mod manager;
pub mod port;
pub mod priority;
pub mod registry;
pub mod states;
pub mod store;
pub mod trace;

pub use config::{SysConfig, SysConfigBuilder, SystemTask, DEFAULT_CYCLE_PERIOD};
#[cfg(feature = "serde")]
pub use config::ConfigFile;
pub use engine::{StateTransitionEngine, TransitionPermit};
pub use error::{
    ConfigError, HookError, LifecycleError, LockError, PortError, RegistryError, SysError,
    SysResult,
};
pub use fatal::{FatalHandler, HaltOnFatal, PanicOnFatal};
pub use lifecycle::{Component, ComponentLifecycleDispatcher, CycleStats, Hook, HookResult, OverrunPolicy};
pub use lock::{TransitionLock, TRANSITION_LOCK_NAME};
pub use manager::{SystemManager, SystemManagerBuilder, TaskContext, COMPONENT_MANAGER_TASK};
pub use port::host::HostPort;
pub use port::{Port, TaskHandle, TaskSpec};
pub use priority::{CpuAffinity, TaskPriority, TaskPriorityGuard};
pub use registry::{CallbackRef, CallbackRegistry, TransitionCallback};
pub use states::{StandardState, StateSet, SysState};
pub use store::StateStore;
pub use trace::{records, TraceHook};

#[cfg(test)]
mod tests;
