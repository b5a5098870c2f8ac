//! ---
//! sgrid_section: "02-messaging-ipc-data-model"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Task schema and transport seams."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::collections::VecDeque;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::task::Task;

/// Read seam over pending (not yet consumed) tasks.
pub trait TaskReader: Send + Sync {
    /// Snapshot of the tasks addressed to `consumer_id`, oldest first.
    fn pending_tasks(&self, consumer_id: &str) -> Vec<Task>;
}

/// Emission seam of the task transport.
pub trait TaskSink: Send + Sync {
    /// Enqueue a task unless an equivalent one is already pending for the
    /// same consumer. Returns whether the task was accepted.
    fn submit(&self, task: Task) -> bool;
}

/// In-memory task broker: per-consumer FIFO queues with submit-time
/// deduplication.
///
/// Single-process stand-in for the external transport; the dedup rule
/// (equality ignoring producer identity) is the contract the orchestrator
/// relies on for idempotent emission.
#[derive(Debug, Default)]
pub struct MemoryTaskBroker {
    queues: Mutex<IndexMap<String, VecDeque<Task>>>,
}

impl MemoryTaskBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest pending task for a consumer.
    pub fn take_next(&self, consumer_id: &str) -> Option<Task> {
        let mut queues = self.queues.lock();
        queues.get_mut(consumer_id).and_then(VecDeque::pop_front)
    }

    pub fn pending_count(&self, consumer_id: &str) -> usize {
        self.queues
            .lock()
            .get(consumer_id)
            .map_or(0, VecDeque::len)
    }
}

impl TaskReader for MemoryTaskBroker {
    fn pending_tasks(&self, consumer_id: &str) -> Vec<Task> {
        self.queues
            .lock()
            .get(consumer_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl TaskSink for MemoryTaskBroker {
    fn submit(&self, task: Task) -> bool {
        let mut queues = self.queues.lock();
        let queue = queues.entry(task.consumer_id.clone()).or_default();
        if queue.iter().any(|pending| pending.is_equivalent(&task)) {
            debug!(
                consumer = %task.consumer_id,
                kind = task.kind(),
                "equivalent task already pending; submission suppressed"
            );
            return false;
        }
        trace!(consumer = %task.consumer_id, kind = task.kind(), "task enqueued");
        queue.push_back(task);
        true
    }
}
