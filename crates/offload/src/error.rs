//! Error types for the offload subsystem.
//!
//! Every failure a caller can observe arrives as an [`Error`] from `run`.
//! Nothing on the control task panics or hangs a caller: a request is
//! either resolved with its output or rejected with one of these variants.
//!
//! ## Error Cases
//! - `WorkerCrashed`: the worker thread died before replying.
//! - `TaskTimeout`: the deadline elapsed before a reply arrived.
//! - `OrphanReply`: a reply named an unknown or expired task. Logged by the
//!   control task, never handed to a caller.
//! - `PoolExhausted`: every worker is busy and the queue is full.
//! - `HostShuttingDown`: the host or pool is draining or stopped.
//! - `TaskFailed`: the workload returned an error for this task.
//! - `WorkerSpawn`: the OS refused to start a worker thread.
//! - `InvalidConfig`: a host or pool was configured with unusable values, or
//!   a call asked for a deadline beyond `MAX_REQUEST_TIMEOUT`.

use crate::{TaskId, WorkerId};
use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the dispatch host and worker pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The worker terminated before producing a reply.
    #[error("Worker {worker_id} crashed before replying")]
    WorkerCrashed { worker_id: WorkerId },

    /// No reply arrived before the deadline.
    #[error("Task {task_id} timed out after {timeout:?}")]
    TaskTimeout { task_id: TaskId, timeout: Duration },

    /// A reply referenced a task that is no longer pending.
    #[error("Orphan reply for task {task_id}")]
    OrphanReply { task_id: TaskId },

    /// Queueing is disabled or full and every worker is busy.
    #[error("Worker pool exhausted ({busy} busy, {queued} queued)")]
    PoolExhausted { busy: usize, queued: usize },

    /// The host is in the process of shutting down.
    #[error("Host is shutting down")]
    HostShuttingDown,

    /// The workload reported an error for this task.
    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    /// A worker thread could not be started.
    #[error("Failed to spawn worker: {context}")]
    WorkerSpawn { context: String },

    /// The supplied configuration cannot be used.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}
