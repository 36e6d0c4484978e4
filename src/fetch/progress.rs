//! Registry of in-flight fetches and their progressive state

use crate::types::{ProgressiveState, TrackId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Shared handle on the state of one in-flight fetch
pub(crate) type StateSender = Arc<watch::Sender<ProgressiveState>>;

/// Outcome of registering interest in a fetch
pub(crate) enum Registration {
    /// No fetch was running; the caller owns the new one and must start it
    Owner(StateSender),
    /// A fetch was already running; the caller observes it
    Attached(watch::Receiver<ProgressiveState>),
    /// An evicted fetch is still winding down; the caller must wait for it to exit
    Draining(watch::Receiver<ProgressiveState>),
}

struct Slot {
    state: StateSender,
    evicted: bool,
}

/// At most one entry per identifier
///
/// An evicted fetch keeps its slot until its task releases it, so a new fetch for
/// the same identifier never runs alongside it.
#[derive(Default)]
pub(crate) struct InFlightRegistry {
    inner: Mutex<HashMap<TrackId, Slot>>,
}

impl InFlightRegistry {
    fn map(&self) -> MutexGuard<'_, HashMap<TrackId, Slot>> {
        // the map holds no invariants a panicking holder could break
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a fetch for `id`, or attach to the one already running
    pub(crate) fn register(&self, id: &TrackId) -> Registration {
        let mut map = self.map();
        if let Some(slot) = map.get(id) {
            let rx = slot.state.subscribe();
            return if slot.evicted {
                Registration::Draining(rx)
            } else {
                Registration::Attached(rx)
            };
        }

        let (tx, _rx) = watch::channel(ProgressiveState::default());
        let tx = Arc::new(tx);
        map.insert(
            id.clone(),
            Slot {
                state: tx.clone(),
                evicted: false,
            },
        );
        Registration::Owner(tx)
    }

    /// Snapshot of the state of an in-flight fetch
    pub(crate) fn snapshot(&self, id: &TrackId) -> Option<ProgressiveState> {
        self.map()
            .get(id)
            .filter(|slot| !slot.evicted)
            .map(|slot| slot.state.borrow().clone())
    }

    /// Whether `owner` is still the registered, non-evicted fetch for `id`
    pub(crate) fn is_current(&self, id: &TrackId, owner: &StateSender) -> bool {
        self.map()
            .get(id)
            .is_some_and(|slot| !slot.evicted && Arc::ptr_eq(&slot.state, owner))
    }

    /// Remove the entry for `id` if it belongs to `owner`
    pub(crate) fn release(&self, id: &TrackId, owner: &StateSender) {
        let mut map = self.map();
        if map
            .get(id)
            .is_some_and(|slot| Arc::ptr_eq(&slot.state, owner))
        {
            map.remove(id);
        }
    }

    /// Mark the fetch for `id` as evicted (its result will be discarded)
    ///
    /// Returns false if no live fetch was registered.
    pub(crate) fn forget(&self, id: &TrackId) -> bool {
        match self.map().get_mut(id) {
            Some(slot) if !slot.evicted => {
                slot.evicted = true;
                true
            }
            _ => false,
        }
    }

    /// Mark every fetch as evicted
    pub(crate) fn forget_all(&self) {
        for slot in self.map().values_mut() {
            slot.evicted = true;
        }
    }

    /// Number of running fetches, evicted ones included
    pub(crate) fn len(&self) -> usize {
        self.map().len()
    }
}
