//! Binary trace records.
//!
//! A [`TraceHook`] receives a record number and a small payload for every
//! lock, transition, callback and lifecycle event. Payload bytes are state
//! indices, ranks and priorities; wider values are little-endian.

use std::sync::Arc;

pub type TraceHook = Arc<dyn Fn(u8, &[u8]) + Send + Sync>;

pub mod records {
    /// `[task_priority]`
    pub const LOCK: u8 = 70;
    /// `[state]`
    pub const UNLOCK: u8 = 71;
    /// `[old, new, saved_priority]`
    pub const TRANSITION_BEGIN: u8 = 72;
    /// `[new, rank]`
    pub const CALLBACK: u8 = 73;
    /// `[old, new]`
    pub const TRANSITION_END: u8 = 74;
    /// `[hook, component]`
    pub const HOOK: u8 = 75;
    /// `[cycle: u64, skipped: u64]`
    pub const CYCLE_OVERRUN: u8 = 76;
    /// `[state, rank]`
    pub const REGISTER: u8 = 77;
}

#[derive(Clone, Default)]
pub(crate) struct Tracer {
    hook: Option<TraceHook>,
}

impl Tracer {
    pub(crate) fn new(hook: Option<TraceHook>) -> Self {
        Self { hook }
    }

    pub(crate) fn emit(&self, record: u8, payload: &[u8]) {
        if let Some(hook) = &self.hook {
            hook(record, payload);
        }
    }
}

/// Narrows an index to a payload byte, saturating.
pub(crate) fn byte(value: usize) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}
