//! Task priorities and the elevated execution context used by transitions.
//!
//! Priorities follow the RTOS convention of the target platform: a lower
//! number is more urgent. The engine priority must be more urgent than every
//! task that can request a transition.

use core::fmt;

use log::error;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::PortError;
use crate::port::Port;

/// Type-safe task priority (lower value = more urgent).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriority(u8);

impl TaskPriority {
    /// Most urgent priority.
    pub const HIGHEST: TaskPriority = TaskPriority(0);

    /// Least urgent priority.
    pub const LOWEST: TaskPriority = TaskPriority(255);

    /// Priority given to tasks missing from the task table.
    pub const DEFAULT_CREATION: TaskPriority = TaskPriority(255);

    /// Default priority of the transition engine.
    pub const DEFAULT_ENGINE: TaskPriority = TaskPriority(10);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// True when `self` preempts `other`.
    pub const fn is_more_urgent_than(self, other: TaskPriority) -> bool {
        self.0 < other.0
    }
}

impl From<u8> for TaskPriority {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

/// Core placement of a task on multi-core targets.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CpuAffinity {
    /// Let the scheduler balance the task.
    #[default]
    Any,
    Core(u8),
}

impl fmt::Display for CpuAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any core"),
            Self::Core(core) => write!(f, "core {core}"),
        }
    }
}

/// Scoped priority elevation.
///
/// Captures the calling task's priority, raises it to the requested level and
/// restores the captured value when [`restore`](Self::restore) is called or,
/// failing that, when the guard is dropped (including during unwinding).
#[must_use = "dropping the guard immediately restores the priority"]
pub struct TaskPriorityGuard<'a> {
    port: &'a dyn Port,
    saved: TaskPriority,
    restored: bool,
}

impl<'a> TaskPriorityGuard<'a> {
    pub fn elevate(port: &'a dyn Port, elevated: TaskPriority) -> Result<Self, PortError> {
        let saved = port.current_priority()?;
        port.set_current_priority(elevated)?;
        Ok(Self {
            port,
            saved,
            restored: false,
        })
    }

    /// Priority captured before elevation.
    pub fn saved(&self) -> TaskPriority {
        self.saved
    }

    pub fn restore(mut self) -> Result<(), PortError> {
        self.restored = true;
        self.port.set_current_priority(self.saved)
    }
}

impl Drop for TaskPriorityGuard<'_> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(err) = self.port.set_current_priority(self.saved) {
                error!("failed to restore {} after elevation: {err}", self.saved);
            }
        }
    }
}
