//! Error types shared by the system manager.
//!
//! Every concern gets its own enum so callers can match precisely; [`SysError`]
//! gathers them for call sites that only need to report.

use std::io;

use thiserror::Error;

use crate::lifecycle::Hook;
use crate::priority::TaskPriority;

/// Failures reported by a [`Port`](crate::port::Port).
#[derive(Error, Debug)]
pub enum PortError {
    /// The calling thread was never registered as a task.
    #[error("calling thread is not a registered task")]
    NotATask,
    /// The port refused to apply a priority.
    #[error("priority {0} rejected by the port")]
    PriorityRejected(TaskPriority),
    /// The underlying scheduler could not create the task.
    #[error("failed to spawn task `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    /// The task terminated by panicking.
    #[error("task `{0}` panicked")]
    TaskPanicked(String),
}

/// Failures of [`TransitionLock`](crate::lock::TransitionLock) acquisition.
///
/// Callers treat every variant as fatal; none of them is retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The requested lock name does not resolve to the transition lock.
    #[error("unknown transition lock `{0}`")]
    UnknownLock(String),
}

/// Failures of [`CallbackRegistry`](crate::registry::CallbackRegistry) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The rank lies outside the slot array configured for the state.
    #[error("rank {rank} out of range for state {state} ({slots} slots)")]
    RankOutOfRange {
        state: &'static str,
        rank: usize,
        slots: usize,
    },
    /// Registration attempted after the periodic phase began.
    #[error("callback registry is sealed")]
    Sealed,
    /// The slot arrays could not be allocated.
    #[error("cannot allocate {slots} callback slots for state {state}")]
    Allocation { state: &'static str, slots: usize },
}

/// Invalid configuration detected while building a [`SysConfig`](crate::config::SysConfig).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cycle period must be non-zero")]
    ZeroCyclePeriod,
    #[error("task name must not be empty")]
    EmptyTaskName,
    #[error("task `{0}` is declared twice")]
    DuplicateTask(String),
    #[error("task `{task}` priority {priority} is not below engine priority {engine}")]
    PriorityNotBelowEngine {
        task: String,
        priority: TaskPriority,
        engine: TaskPriority,
    },
    #[error("unknown system state `{0}`")]
    UnknownState(String),
    #[error("lock name must not be empty")]
    EmptyLockName,
}

/// Error returned by a component hook. Any hook error halts the system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("{0}")]
    Fatal(String),
}

impl HookError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

/// Failures surfaced by the lifecycle dispatcher.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("component `{component}` failed in hook {hook}: {source}")]
    HookFailed {
        component: String,
        hook: Hook,
        #[source]
        source: HookError,
    },
}

/// Umbrella error for manager-level operations.
#[derive(Error, Debug)]
pub enum SysError {
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

pub type SysResult<T> = Result<T, SysError>;
