//! Progress reporting for sync cycles.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Snapshot published after every batch and once more when a cycle ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    /// Items seen this cycle: finished plus still queued.
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: bool,
}

type ProgressCallback = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ProgressHub {
    callbacks: Mutex<Vec<(u64, ProgressCallback)>>,
    next_id: Mutex<u64>,
}

impl ProgressHub {
    fn callbacks(&self) -> MutexGuard<'_, Vec<(u64, ProgressCallback)>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        cb: impl Fn(&SyncProgress) + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        self.callbacks().push((id, Arc::new(cb)));
        Subscription {
            id,
            hub: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut callbacks = self.callbacks();
        let before = callbacks.len();
        callbacks.retain(|(cb_id, _)| *cb_id != id);
        callbacks.len() != before
    }

    /// Calls every subscriber outside the lock.
    pub(crate) fn publish(&self, progress: &SyncProgress) {
        let snapshot: Vec<ProgressCallback> =
            self.callbacks().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for cb in snapshot {
            cb(progress);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks().len()
    }
}

/// Handle returned by `on_progress`. Dropping it keeps the callback
/// registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: Weak<ProgressHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the callback. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => hub.remove(self.id),
            None => false,
        }
    }
}
