//! Table of in-flight requests awaiting a worker reply.
//!
//! The table maps each [`TaskId`] to the completion handle of the caller
//! waiting on it. It is owned by exactly one control task and is never shared,
//! so it needs no locking. Completion handles are `oneshot` senders consumed
//! by value, which makes double resolution impossible: once an entry has been
//! removed, a second reply for the same id finds nothing and is reported as
//! an orphan.
//!
//! Optional per-task deadlines are tracked in a [`DelayQueue`]. When a
//! deadline fires, the entry is removed and the caller rejected with
//! [`Error::TaskTimeout`]; the worker keeps computing and its eventual reply
//! becomes an orphan.

use crate::{Error, Reply, Result, TaskId, WorkerId};
use core::future::poll_fn;
use core::time::Duration;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio_util::time::{DelayQueue, delay_queue};

/// Completion handle for a caller blocked in `run`.
pub(crate) type Responder<O> = oneshot::Sender<Result<O>>;

struct PendingRequest<O> {
    respond: Responder<O>,
    created_at: Instant,
    deadline: Option<(delay_queue::Key, Duration)>,
    worker: Option<WorkerId>,
}

/// Outcome counters, reported through `status()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub crashed: u64,
    pub orphaned: u64,
}

pub(crate) struct PendingTable<O> {
    entries: HashMap<TaskId, PendingRequest<O>>,
    deadlines: DelayQueue<TaskId>,
    counters: Counters,
}

impl<O> PendingTable<O> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            deadlines: DelayQueue::new(),
            counters: Counters::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    pub const fn counters(&self) -> Counters {
        self.counters
    }

    /// Draws a task id that is not currently in flight.
    pub fn next_id(&self) -> TaskId {
        loop {
            let id = TaskId::random();
            if !self.entries.contains_key(&id) {
                return id;
            }
            tracing::warn!("Task id collision on {id}, drawing again");
        }
    }

    /// Registers a caller before its task is handed to any worker, so a fast
    /// reply can never arrive ahead of its entry.
    pub fn register(&mut self, id: TaskId, respond: Responder<O>, timeout: Option<Duration>) {
        debug_assert!(!self.entries.contains_key(&id), "task {id} registered twice");

        let deadline = timeout.map(|timeout| (self.deadlines.insert(id, timeout), timeout));
        self.entries.insert(
            id,
            PendingRequest {
                respond,
                created_at: Instant::now(),
                deadline,
                worker: None,
            },
        );
    }

    /// Records which worker is computing `id`.
    pub fn assign(&mut self, id: TaskId, worker: WorkerId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.worker = Some(worker);
        }
    }

    /// Settles the entry matching `reply.id` with the reply's payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrphanReply`] when no entry matches. Nothing is
    /// resolved in that case.
    pub fn resolve(&mut self, reply: Reply<O>) -> Result<()> {
        let Reply { id, result } = reply;
        let Some(entry) = self.take(id) else {
            self.counters.orphaned += 1;
            return Err(Error::OrphanReply { task_id: id });
        };

        let outcome = match result {
            Ok(output) => {
                self.counters.completed += 1;
                Ok(output)
            }
            Err(message) => {
                self.counters.failed += 1;
                Err(Error::TaskFailed { task_id: id, message })
            }
        };
        settle(id, entry, outcome);
        Ok(())
    }

    /// Rejects a single entry. Returns `false` if it was not pending.
    pub fn reject(&mut self, id: TaskId, error: Error) -> bool {
        match self.take(id) {
            Some(entry) => {
                self.count_rejection(&error);
                settle(id, entry, Err(error));
                true
            }
            None => false,
        }
    }

    /// Rejects every entry currently assigned to `worker`.
    pub fn reject_assigned(&mut self, worker: WorkerId, error: &Error) -> usize {
        let ids: Vec<TaskId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.worker == Some(worker))
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter(|id| self.reject(*id, error.clone()))
            .count()
    }

    /// Rejects every pending entry.
    pub fn reject_all(&mut self, error: &Error) -> usize {
        let ids: Vec<TaskId> = self.entries.keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.reject(*id, error.clone()))
            .count()
    }

    pub fn has_deadlines(&self) -> bool {
        !self.deadlines.is_empty()
    }

    /// Waits for the next deadline to fire. Resolves to `None` immediately
    /// when no deadline is registered; guard with [`Self::has_deadlines`].
    pub async fn next_expired(&mut self) -> Option<TaskId> {
        poll_fn(|cx| self.deadlines.poll_expired(cx))
            .await
            .map(|expired| expired.into_inner())
    }

    /// Rejects `id` with [`Error::TaskTimeout`] after its deadline fired.
    pub fn expire(&mut self, id: TaskId) -> bool {
        // The deadline key was consumed by `next_expired`; removing it again
        // could evict an unrelated entry that reused the slot.
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        let timeout = entry
            .deadline
            .as_ref()
            .map_or(Duration::ZERO, |(_, timeout)| *timeout);
        self.counters.timed_out += 1;
        settle(id, entry, Err(Error::TaskTimeout { task_id: id, timeout }));
        true
    }

    fn take(&mut self, id: TaskId) -> Option<PendingRequest<O>> {
        let entry = self.entries.remove(&id)?;
        if let Some((key, _)) = &entry.deadline {
            self.deadlines.try_remove(key);
        }
        Some(entry)
    }

    fn count_rejection(&mut self, error: &Error) {
        match error {
            Error::TaskTimeout { .. } => self.counters.timed_out += 1,
            Error::WorkerCrashed { .. } => self.counters.crashed += 1,
            _ => {}
        }
    }
}

fn settle<O>(id: TaskId, entry: PendingRequest<O>, outcome: Result<O>) {
    tracing::trace!(
        "Task {id} settled after {:?} (ok = {})",
        entry.created_at.elapsed(),
        outcome.is_ok()
    );
    if entry.respond.send(outcome).is_err() {
        tracing::debug!("Caller for task {id} went away before completion");
    }
}
