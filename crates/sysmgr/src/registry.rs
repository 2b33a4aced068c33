//! Per-state callback slots.
//!
//! Each state owns a dense array of ranks `0..N`, with `N` taken from the
//! configuration when the registry is created. Transitions into a state call
//! the filled slots of that state in ascending rank order.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::RegistryError;
use crate::states::StateSet;

/// Reaction of a component to a committed transition.
///
/// Called on the task that performs the transition, at the engine priority,
/// while readers observe the transition sentinel.
pub trait TransitionCallback<S>: Send + Sync {
    fn on_transition(&self, old: S, new: S);
}

impl<S, F> TransitionCallback<S> for F
where
    F: Fn(S, S) + Send + Sync,
{
    fn on_transition(&self, old: S, new: S) {
        self(old, new)
    }
}

pub type CallbackRef<S> = Arc<dyn TransitionCallback<S>>;

struct Table<S> {
    slots: Vec<Vec<Option<CallbackRef<S>>>>,
    sealed: bool,
}

pub struct CallbackRegistry<S: StateSet> {
    table: Mutex<Table<S>>,
}

impl<S: StateSet> CallbackRegistry<S> {
    /// Allocates `slot_count(state)` empty slots for every state.
    pub fn with_slots(slot_count: impl Fn(S) -> usize) -> Result<Self, RegistryError> {
        let mut slots = Vec::with_capacity(S::COUNT);
        for &state in S::ALL {
            let count = slot_count(state);
            let mut ranks = Vec::new();
            ranks
                .try_reserve_exact(count)
                .map_err(|_| RegistryError::Allocation {
                    state: state.name(),
                    slots: count,
                })?;
            ranks.resize_with(count, || None);
            slots.push(ranks);
        }

        Ok(Self {
            table: Mutex::new(Table {
                slots,
                sealed: false,
            }),
        })
    }

    pub fn slot_count(&self, state: S) -> usize {
        self.table.lock().slots[state.index()].len()
    }

    /// Stores `callback` at `rank` for `state`.
    ///
    /// An out-of-range rank writes nothing. A filled slot is overwritten.
    pub fn register(
        &self,
        state: S,
        rank: usize,
        callback: CallbackRef<S>,
    ) -> Result<(), RegistryError> {
        let mut table = self.table.lock();
        if table.sealed {
            warn!("callback for {} rank {rank} rejected: registry sealed", state.name());
            return Err(RegistryError::Sealed);
        }

        let ranks = &mut table.slots[state.index()];
        let Some(slot) = ranks.get_mut(rank) else {
            let slots = ranks.len();
            warn!(
                "callback for {} rank {rank} rejected: only {slots} slots",
                state.name()
            );
            return Err(RegistryError::RankOutOfRange {
                state: state.name(),
                rank,
                slots,
            });
        };

        if slot.replace(callback).is_some() {
            warn!("callback for {} rank {rank} replaced", state.name());
        } else {
            debug!("callback registered for {} rank {rank}", state.name());
        }
        Ok(())
    }

    /// Copy of the slots of `state`, in rank order.
    pub fn slots_for(&self, state: S) -> Vec<Option<CallbackRef<S>>> {
        self.table.lock().slots[state.index()].clone()
    }

    /// Rejects every later registration.
    pub fn seal(&self) {
        self.table.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.table.lock().sealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::StandardState;
    use std::sync::Mutex as StdMutex;

    fn standard_slots(state: StandardState) -> usize {
        match state {
            StandardState::NoConf => 1,
            StandardState::Configuring => 0,
            StandardState::Configured => 2,
            StandardState::FatalError => 1,
        }
    }

    fn recorder(
        log: &Arc<StdMutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> CallbackRef<StandardState> {
        let log = Arc::clone(log);
        Arc::new(move |_old: StandardState, _new: StandardState| {
            log.lock().unwrap().push(tag)
        })
    }

    #[test]
    fn slots_start_empty() {
        let registry = CallbackRegistry::with_slots(standard_slots).unwrap();
        assert_eq!(registry.slot_count(StandardState::Configured), 2);
        assert_eq!(registry.slot_count(StandardState::Configuring), 0);
        assert!(registry
            .slots_for(StandardState::Configured)
            .iter()
            .all(Option::is_none));
    }

    #[test]
    fn out_of_range_rank_changes_nothing() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = CallbackRegistry::with_slots(standard_slots).unwrap();
        registry
            .register(StandardState::NoConf, 0, recorder(&log, "kept"))
            .unwrap();

        let err = registry
            .register(StandardState::NoConf, 1, recorder(&log, "stray"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::RankOutOfRange {
                state: "NO_CONF",
                rank: 1,
                slots: 1
            }
        );
        assert!(registry
            .register(StandardState::Configuring, 0, recorder(&log, "stray"))
            .is_err());

        let slots = registry.slots_for(StandardState::NoConf);
        assert_eq!(slots.len(), 1);
        slots[0]
            .as_ref()
            .unwrap()
            .on_transition(StandardState::Configured, StandardState::NoConf);
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn filled_slot_is_overwritten() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = CallbackRegistry::with_slots(standard_slots).unwrap();
        registry
            .register(StandardState::FatalError, 0, recorder(&log, "first"))
            .unwrap();
        registry
            .register(StandardState::FatalError, 0, recorder(&log, "second"))
            .unwrap();

        for slot in registry.slots_for(StandardState::FatalError).iter().flatten() {
            slot.on_transition(StandardState::NoConf, StandardState::FatalError);
        }
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn sealed_registry_rejects_registration() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = CallbackRegistry::with_slots(standard_slots).unwrap();
        registry.seal();
        assert!(registry.is_sealed());
        assert_eq!(
            registry.register(StandardState::NoConf, 0, recorder(&log, "late")),
            Err(RegistryError::Sealed)
        );
        assert!(registry.slots_for(StandardState::NoConf)[0].is_none());
    }

    #[test]
    fn impossible_allocation_is_reported() {
        let result = CallbackRegistry::<StandardState>::with_slots(|state| match state {
            StandardState::Configured => usize::MAX,
            _ => 1,
        });
        assert!(matches!(
            result,
            Err(RegistryError::Allocation { state: "CONFIGURED", slots: usize::MAX })
        ));
    }
}
