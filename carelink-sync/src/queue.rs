//! Dependency-aware, priority-ordered work queue.
//!
//! Items are kept sorted by priority (highest first), then by enqueue time
//! (oldest first). `dequeue` hands out the first item in that order whose
//! dependencies are all absent, and parks it in a separate "processing" set
//! until the caller reports the outcome.
//!
//! A dependency blocks while it is queued or processing. Once it leaves
//! both, for whatever reason, dependents become eligible; a prerequisite
//! dropped after exhausting its retries does not hold them back.

use carelink_model::now_millis;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// One unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem<T> {
    pub id: String,
    pub data: T,
    pub priority: i32,
    /// Milliseconds since the Unix epoch at first enqueue.
    pub timestamp: i64,
    pub retry_count: u32,
    /// Ids that must leave the queue before this item is handed out.
    pub dependencies: Vec<String>,
    /// Tie-break for items enqueued within the same millisecond.
    seq: u64,
}

/// What `mark_as_failed` did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back in the queue one priority step lower.
    Requeued { retry_count: u32 },
    /// Out of retries; gone for good.
    Dropped,
    /// The id was neither queued nor processing.
    Unknown,
}

struct QueueState<T> {
    items: Vec<QueueItem<T>>,
    processing: HashMap<String, QueueItem<T>>,
    next_seq: u64,
}

impl<T> QueueState<T> {
    fn sort(&mut self) {
        self.items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.timestamp.cmp(&b.timestamp))
                .then(a.seq.cmp(&b.seq))
        });
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }

    fn is_present(&self, id: &str) -> bool {
        self.processing.contains_key(id) || self.items.iter().any(|i| i.id == id)
    }

    fn is_ready(&self, item: &QueueItem<T>) -> bool {
        item.dependencies
            .iter()
            .all(|dep| dep == &item.id || !self.is_present(dep))
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Thread-safe priority queue. Enqueue (user actions) and dequeue (the sync
/// loop) may come from different tasks; all state sits behind one mutex.
pub struct PriorityQueue<T> {
    state: Mutex<QueueState<T>>,
    max_retries: u32,
}

impl<T: Clone> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<T: Clone> PriorityQueue<T> {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: Vec::new(),
                processing: HashMap::new(),
                next_seq: 0,
            }),
            max_retries,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Adds an item, or updates the queued item with the same id in place.
    ///
    /// An update replaces data, priority and dependencies but keeps the
    /// retry count and queue position timestamp. Returns `true` when a new
    /// entry was created.
    pub fn enqueue(
        &self,
        id: impl Into<String>,
        data: T,
        priority: i32,
        dependencies: Vec<String>,
    ) -> bool {
        let id = id.into();
        let mut state = self.state();

        let inserted = match state.position(&id) {
            Some(pos) => {
                let existing = &mut state.items[pos];
                existing.data = data;
                existing.priority = priority;
                existing.dependencies = dependencies;
                false
            }
            None => {
                // An item already handed out keeps its retry history.
                let retry_count = state
                    .processing
                    .get(&id)
                    .map(|p| p.retry_count)
                    .unwrap_or(0);
                let seq = state.take_seq();
                state.items.push(QueueItem {
                    id: id.clone(),
                    data,
                    priority,
                    timestamp: now_millis(),
                    retry_count,
                    dependencies,
                    seq,
                });
                true
            }
        };
        state.sort();
        debug!("Enqueued {} ({} queued)", id, state.items.len());
        inserted
    }

    /// Hands out the highest-ranked ready item and marks it processing.
    pub fn dequeue(&self) -> Option<QueueItem<T>> {
        let mut state = self.state();
        let pos = state
            .items
            .iter()
            .position(|item| state.is_ready(item))?;
        let item = state.items.remove(pos);
        state.processing.insert(item.id.clone(), item.clone());
        Some(item)
    }

    /// Hands out up to `max` ready items, in rank order.
    ///
    /// Items whose dependencies are handed out earlier in the same batch
    /// stay queued.
    pub fn dequeue_batch(&self, max: usize) -> Vec<QueueItem<T>> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.dequeue() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Finishes a processing item.
    pub fn mark_as_complete(&self, id: &str) {
        self.state().processing.remove(id);
    }

    /// Abandons a processing item without re-enqueueing it. A newer entry
    /// queued under the same id while it was in flight is left alone.
    pub fn mark_as_dropped(&self, id: &str) -> bool {
        self.state().processing.remove(id).is_some()
    }

    /// Records a failure. Below `max_retries` the item goes back in one
    /// priority step lower; otherwise it is dropped permanently.
    pub fn mark_as_failed(&self, id: &str) -> FailureOutcome {
        let mut state = self.state();

        // Already re-enqueued with newer data: the queued copy takes the
        // penalty in place of the failed one.
        if let Some(pos) = state.position(id) {
            let processing = state.processing.remove(id);
            let queued = &mut state.items[pos];
            queued.retry_count = processing
                .map(|p| p.retry_count)
                .unwrap_or(queued.retry_count)
                .max(queued.retry_count)
                + 1;
            let retry_count = queued.retry_count;
            if retry_count < self.max_retries {
                queued.priority -= 1;
                state.sort();
                return FailureOutcome::Requeued { retry_count };
            }
            state.items.remove(pos);
            warn!("Dropping {} after {} failed attempt(s)", id, retry_count);
            return FailureOutcome::Dropped;
        }

        let Some(mut item) = state.processing.remove(id) else {
            return FailureOutcome::Unknown;
        };
        item.retry_count += 1;
        if item.retry_count >= self.max_retries {
            warn!("Dropping {} after {} failed attempt(s)", id, item.retry_count);
            return FailureOutcome::Dropped;
        }

        let retry_count = item.retry_count;
        item.priority -= 1;
        item.timestamp = now_millis();
        item.seq = state.take_seq();
        state.items.push(item);
        state.sort();
        FailureOutcome::Requeued { retry_count }
    }

    /// Puts a processing item back exactly as it was handed out, without
    /// touching its retry count or position.
    pub fn requeue(&self, id: &str) -> bool {
        let mut state = self.state();
        let Some(item) = state.processing.remove(id) else {
            return false;
        };
        if state.position(id).is_none() {
            state.items.push(item);
            state.sort();
        }
        true
    }

    /// Removes an item from both the queue and the processing set.
    pub fn discard(&self, id: &str) -> bool {
        let mut state = self.state();
        let was_processing = state.processing.remove(id).is_some();
        let was_queued = match state.position(id) {
            Some(pos) => {
                state.items.remove(pos);
                true
            }
            None => false,
        };
        was_processing || was_queued
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    /// Number of queued (not processing) items.
    pub fn size(&self) -> usize {
        self.state().items.len()
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.items.clear();
        state.processing.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state().position(id).is_some()
    }

    pub fn is_processing(&self, id: &str) -> bool {
        self.state().processing.contains_key(id)
    }

    pub fn processing_count(&self) -> usize {
        self.state().processing.len()
    }

    /// Queued ids in rank order (ignoring readiness).
    pub fn queued_ids(&self) -> Vec<String> {
        self.state().items.iter().map(|i| i.id.clone()).collect()
    }

    /// Snapshot of a queued item.
    pub fn get(&self, id: &str) -> Option<QueueItem<T>> {
        let state = self.state();
        state.position(id).map(|pos| state.items[pos].clone())
    }
}
