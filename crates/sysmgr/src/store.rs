//! Current system state.
//!
//! The value is a single atomic word, so readers on any core observe either a
//! committed member or the transition sentinel, never a torn value.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::states::{StateSet, SysState};

pub struct StateStore<S: StateSet> {
    raw: AtomicUsize,
    _states: PhantomData<fn() -> S>,
}

impl<S: StateSet> StateStore<S> {
    pub fn new(initial: S) -> Self {
        Self {
            raw: AtomicUsize::new(initial.index()),
            _states: PhantomData,
        }
    }

    /// Lock-free read; may return [`SysState::TransitionInProgress`].
    pub fn get(&self) -> SysState<S> {
        SysState::from_raw(self.raw.load(Ordering::Acquire))
    }

    /// Caller must hold the transition lock.
    pub(crate) fn set_sentinel(&self) {
        self.raw
            .store(SysState::<S>::TransitionInProgress.to_raw(), Ordering::Release);
    }

    /// Caller must hold the transition lock.
    pub(crate) fn commit(&self, state: S) {
        self.raw.store(state.index(), Ordering::Release);
    }
}
