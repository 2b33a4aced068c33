//! Binary lock guarding the right to decide a state transition.
//!
//! The lock is resolved by name, waits forever, and is not re-entrant: a task
//! acquiring it twice blocks on itself. That misuse is logged before the task
//! blocks so the hang is attributable.

use std::thread::{self, ThreadId};

use log::{debug, error};
use parking_lot::{Condvar, Mutex};

use crate::error::LockError;

/// Name of the transition lock when the configuration does not override it.
pub const TRANSITION_LOCK_NAME: &str = "SysStateTransition";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub task: String,
    pub thread: ThreadId,
}

pub struct TransitionLock {
    name: String,
    holder: Mutex<Option<LockHolder>>,
    freed: Condvar,
}

impl TransitionLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holder: Mutex::new(None),
            freed: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub fn holder(&self) -> Option<LockHolder> {
        self.holder.lock().clone()
    }

    /// Blocks until the lock is free, then takes it for `task`.
    pub(crate) fn acquire(&self, name: &str, task: &str) -> Result<(), LockError> {
        if name != self.name {
            return Err(LockError::UnknownLock(name.to_owned()));
        }

        let me = thread::current().id();
        let mut holder = self.holder.lock();
        if let Some(current) = holder.as_ref() {
            if current.thread == me {
                error!(
                    "task `{task}` acquires `{}` it already holds; it will never return",
                    self.name
                );
            }
        }
        while holder.is_some() {
            self.freed.wait(&mut holder);
        }
        *holder = Some(LockHolder {
            task: task.to_owned(),
            thread: me,
        });
        debug!("`{}` taken by `{task}`", self.name);
        Ok(())
    }

    pub(crate) fn release(&self) {
        let previous = self.holder.lock().take();
        if let Some(previous) = previous {
            debug!("`{}` released by `{}`", self.name, previous.task);
        }
        self.freed.notify_one();
    }
}
