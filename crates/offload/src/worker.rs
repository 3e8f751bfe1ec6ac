//! Worker units: isolated OS threads that run a [`Workload`] per task.
//!
//! A worker owns nothing shared. It receives [`Task`]s on its own unbounded
//! channel, computes each one synchronously, and emits exactly one
//! [`WorkerEvent::Reply`] per task on the event channel it shares with its
//! siblings. Blocking happens only on the worker's own thread, so the control
//! task that owns the pending table is never stalled by a computation.
//!
//! Dropping the [`WorkerHandle`] closes the inbound channel and trips the
//! worker's stop token. The thread finishes the computation it is currently
//! running, discards anything still queued (its callers have already been
//! settled by the owner) and exits. Whether it exits cleanly or by panicking,
//! a drop guard reports the exit with [`WorkerEvent::Exited`].

use crate::{Error, Reply, Result, Task, WorkerId, Workload};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Messages emitted by worker threads to their owning control task.
#[derive(Debug)]
pub enum WorkerEvent<O> {
    /// The single reply for a task.
    Reply { worker_id: WorkerId, reply: Reply<O> },

    /// The worker thread has stopped. `panicked` is set when the thread is
    /// unwinding from a workload panic rather than leaving its loop normally.
    Exited { worker_id: WorkerId, panicked: bool },
}

/// Control-side handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle<I> {
    id: WorkerId,
    tx: mpsc::UnboundedSender<Task<I>>,
    stop: CancellationToken,
}

impl<I: Send + 'static> WorkerHandle<I> {
    /// Starts a worker thread named `offload-worker-{id}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerSpawn`] if the OS refuses to create the thread.
    pub fn spawn<W>(
        id: WorkerId,
        workload: Arc<W>,
        events: mpsc::UnboundedSender<WorkerEvent<W::Output>>,
    ) -> Result<Self>
    where
        W: Workload<Input = I>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let worker_stop = stop.clone();

        std::thread::Builder::new()
            .name(format!("offload-worker-{id}"))
            .spawn(move || worker_loop(id, rx, workload, events, worker_stop))
            .map_err(|e| Error::WorkerSpawn {
                context: format!("worker {id}: {e}"),
            })?;

        Ok(Self { id, tx, stop })
    }

    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Hands a task to the worker.
    ///
    /// Gives the task back if the worker thread has already gone away. The
    /// matching [`WorkerEvent::Exited`] is delivered separately.
    pub fn send(&self, task: Task<I>) -> core::result::Result<(), Task<I>> {
        self.tx.send(task).map_err(|mpsc::error::SendError(task)| task)
    }
}

impl<I> Drop for WorkerHandle<I> {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Body of a worker thread. Runs until the handle is dropped, the event
/// channel closes, or the workload panics.
fn worker_loop<W: Workload>(
    worker_id: WorkerId,
    rx: mpsc::UnboundedReceiver<Task<W::Input>>,
    workload: Arc<W>,
    events: mpsc::UnboundedSender<WorkerEvent<W::Output>>,
    stop: CancellationToken,
) {
    let _exit = ExitGuard {
        worker_id,
        events: events.clone(),
    };
    // Bound after the guard so the inbound channel is closed before the exit
    // is reported.
    let mut rx = rx;

    tracing::trace!("Worker {worker_id} started");

    while let Some(task) = rx.blocking_recv() {
        if stop.is_cancelled() {
            tracing::debug!("Worker {worker_id} stopping, discarding task {}", task.id);
            break;
        }

        let Task {
            id,
            input,
            created_at,
        } = task;

        let result = workload.compute(input).map_err(|e| e.to_string());

        tracing::trace!(
            "Worker {worker_id} finished task {id} in {:?}",
            created_at.elapsed()
        );

        let reply = Reply { id, result };
        if events.send(WorkerEvent::Reply { worker_id, reply }).is_err() {
            tracing::debug!("Worker {worker_id} event channel closed, exiting");
            break;
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}

/// Reports the worker's exit on drop, including exits caused by unwinding.
struct ExitGuard<O> {
    worker_id: WorkerId,
    events: mpsc::UnboundedSender<WorkerEvent<O>>,
}

impl<O> Drop for ExitGuard<O> {
    fn drop(&mut self) {
        let panicked = std::thread::panicking();
        // The owner may already be gone during teardown.
        let _ = self.events.send(WorkerEvent::Exited {
            worker_id: self.worker_id,
            panicked,
        });
    }
}
