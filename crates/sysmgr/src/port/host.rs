//! Host port built on `std::thread`.
//!
//! Host threads have no real-time priorities, so each task keeps a *logical*
//! priority in thread-local storage. Affinity is recorded and logged only.

use std::cell::RefCell;
use std::thread;
use std::time::Instant;

use log::debug;

use super::{Port, TaskEntry, TaskHandle, TaskSpec};
use crate::error::PortError;
use crate::priority::TaskPriority;

thread_local! {
    static CURRENT_TASK: RefCell<Option<TaskSpec>> = const { RefCell::new(None) };
}

/// [`Port`] implementation for hosted (POSIX/Windows) builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPort;

impl HostPort {
    pub fn new() -> Self {
        Self
    }

    /// Name of the task bound to the calling thread, if any.
    pub fn current_task_name() -> Option<String> {
        CURRENT_TASK.with(|task| task.borrow().as_ref().map(|spec| spec.name.clone()))
    }

    fn bind(spec: TaskSpec) {
        debug!(
            "task `{}` bound at {} on {}",
            spec.name, spec.priority, spec.affinity
        );
        CURRENT_TASK.with(|task| *task.borrow_mut() = Some(spec));
    }
}

impl Port for HostPort {
    fn spawn(&self, spec: TaskSpec, entry: TaskEntry) -> Result<TaskHandle, PortError> {
        let name = spec.name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                Self::bind(spec);
                entry();
            })
            .map_err(|source| PortError::Spawn {
                name: name.clone(),
                source,
            })?;
        Ok(TaskHandle::new(name, Some(join)))
    }

    fn adopt_current(&self, spec: &TaskSpec) -> Result<(), PortError> {
        Self::bind(spec.clone());
        Ok(())
    }

    fn current_priority(&self) -> Result<TaskPriority, PortError> {
        CURRENT_TASK.with(|task| {
            task.borrow()
                .as_ref()
                .map(|spec| spec.priority)
                .ok_or(PortError::NotATask)
        })
    }

    fn set_current_priority(&self, priority: TaskPriority) -> Result<(), PortError> {
        CURRENT_TASK.with(|task| match task.borrow_mut().as_mut() {
            Some(spec) => {
                spec.priority = priority;
                Ok(())
            }
            None => Err(PortError::NotATask),
        })
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}
