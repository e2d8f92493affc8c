//! In-flight task bookkeeping.

use crate::resilience::saturating_millis;
use crate::types::{Provenance, RequestDescriptor, Task, TaskId};
use futures::future::AbortHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

struct Entry {
    request: Arc<RequestDescriptor>,
    endpoint: u64,
    abort: AbortHandle,
    started: Instant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCountersSnapshot {
    /// Network tasks started.
    pub dispatched: u64,
    /// Network tasks that ran to completion (any outcome) and were delivered.
    pub completed: u64,
    /// Network tasks stopped by cancellation.
    pub cancelled: u64,
    /// Completions that arrived after their task had already been removed.
    pub orphaned: u64,
}

#[derive(Default)]
pub(crate) struct SessionCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    orphaned: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn snapshot(&self) -> SessionCountersSnapshot {
        SessionCountersSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }
}

/// The set of network tasks currently running in a session.
///
/// Entries are added when a task is dispatched and removed exactly once: by
/// cancellation or by the task's own completion, whichever comes first.
#[derive(Default)]
pub(crate) struct InflightTable {
    entries: Mutex<HashMap<TaskId, Entry>>,
    counters: SessionCounters,
}

impl InflightTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        id: TaskId,
        endpoint: u64,
        request: Arc<RequestDescriptor>,
        abort: AbortHandle,
    ) -> InflightGuard<'_> {
        self.lock().insert(
            id,
            Entry {
                request,
                endpoint,
                abort,
                started: Instant::now(),
            },
        );
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(task_id = id.get(), endpoint, "task dispatched");
        InflightGuard {
            table: self,
            id,
            done: false,
        }
    }

    /// Cancel one task. Returns false when the task is unknown or already done.
    pub(crate) fn cancel(&self, id: TaskId) -> bool {
        let entry = self.lock().remove(&id);
        match entry {
            Some(entry) => {
                entry.abort.abort();
                debug!(
                    task_id = id.get(),
                    elapsed_ms = saturating_millis(entry.started.elapsed()),
                    "task cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Cancel every running task; returns how many were cancelled.
    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<(TaskId, Entry)> = self.lock().drain().collect();
        for (_, entry) in &drained {
            entry.abort.abort();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelled all tasks");
        }
        drained.len()
    }

    pub(crate) fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .lock()
            .iter()
            .map(|(id, e)| Task::new(Some(*id), e.request.clone(), Provenance::Network))
            .collect();
        tasks.sort_by_key(|t| t.id());
        tasks
    }

    pub(crate) fn tasks_for_endpoint(&self, endpoint: u64) -> Vec<TaskId> {
        self.lock()
            .iter()
            .filter(|(_, e)| e.endpoint == endpoint)
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its task from the table when dropped, so a dispatch future that is
/// itself dropped mid-flight leaves nothing behind.
pub(crate) struct InflightGuard<'a> {
    table: &'a InflightTable,
    id: TaskId,
    done: bool,
}

impl InflightGuard<'_> {
    /// Mark the task complete. Returns false when the task had already been
    /// removed, i.e. the completion is orphaned.
    pub(crate) fn complete(mut self) -> bool {
        self.done = true;
        let matched = self.table.lock().remove(&self.id).is_some();
        if !matched {
            self.table
                .counters
                .orphaned
                .fetch_add(1, Ordering::Relaxed);
            warn!(task_id = self.id.get(), "completion for unknown task (orphaned)");
        }
        matched
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.table.lock().remove(&self.id);
        }
    }
}
