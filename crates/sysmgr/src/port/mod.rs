//! Scheduler capabilities consumed by the system manager.
//!
//! The manager never creates threads or touches priorities directly; it goes
//! through a [`Port`]. Target ports wrap the RTOS task services, [`host`]
//! provides a `std::thread` implementation for simulation and tests.

use std::thread::JoinHandle;
use std::time::Instant;

use crate::error::PortError;
use crate::priority::{CpuAffinity, TaskPriority};

pub mod host;

/// Entry point of a spawned task.
pub type TaskEntry = Box<dyn FnOnce() + Send + 'static>;

/// Creation parameters of a task, resolved from the task table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub priority: TaskPriority,
    pub affinity: CpuAffinity,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            name: name.into(),
            priority,
            affinity: CpuAffinity::Any,
        }
    }

    pub fn with_affinity(mut self, affinity: CpuAffinity) -> Self {
        self.affinity = affinity;
        self
    }
}

/// Handle on a spawned task.
pub struct TaskHandle {
    name: String,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn new(name: impl Into<String>, join: Option<JoinHandle<()>>) -> Self {
        Self {
            name: name.into(),
            join,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the task to return.
    pub fn join(self) -> Result<(), PortError> {
        match self.join {
            Some(handle) => handle
                .join()
                .map_err(|_| PortError::TaskPanicked(self.name)),
            None => Ok(()),
        }
    }
}

/// RTOS services the manager depends on.
pub trait Port: Send + Sync + 'static {
    /// Creates and starts a task running `entry`.
    fn spawn(&self, spec: TaskSpec, entry: TaskEntry) -> Result<TaskHandle, PortError>;

    /// Registers the calling thread as the task described by `spec`.
    fn adopt_current(&self, spec: &TaskSpec) -> Result<(), PortError>;

    fn current_priority(&self) -> Result<TaskPriority, PortError>;

    fn set_current_priority(&self, priority: TaskPriority) -> Result<(), PortError>;

    fn now(&self) -> Instant;

    /// Suspends the calling task until `deadline`.
    fn sleep_until(&self, deadline: Instant);
}
