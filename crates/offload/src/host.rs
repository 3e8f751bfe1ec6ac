//! Single-worker dispatch host.
//!
//! [`DispatchHost`] owns exactly one worker thread and a pending-request table
//! keyed by [`TaskId`]. Every `run` call is registered before its task is
//! sent, the worker processes tasks in arrival order, and each reply is
//! matched back to its caller by id. Replies that match nothing are dropped
//! with a warning.
//!
//! The worker is started eagerly in [`DispatchHost::new`]. If it dies, every
//! request waiting on it is rejected with [`Error::WorkerCrashed`] and, unless
//! disabled, a replacement is started for later calls.
//!
//! [`TaskId`]: crate::TaskId

use crate::command::{Command, Control};
use crate::pending::{PendingTable, Responder};
use crate::worker::{WorkerEvent, WorkerHandle};
use crate::{
    DispatchState, DispatchStatus, Error, HostConfig, Result, Task, WorkerId, Workload,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Dispatches tasks to a single dedicated worker thread.
///
/// Cheap to clone; all clones talk to the same control task. Dropping every
/// clone without calling [`shutdown`](Self::shutdown) still drains the host in
/// the background.
pub struct DispatchHost<W: Workload> {
    control: Control<W>,
}

impl<W: Workload> Clone for DispatchHost<W> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
        }
    }
}

impl<W: Workload> DispatchHost<W> {
    /// Starts the worker and the control task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unusable settings and
    /// [`Error::WorkerSpawn`] if the worker thread cannot be started.
    pub fn new(workload: W, config: HostConfig) -> Result<Self> {
        Self::with_shared_workload(Arc::new(workload), config)
    }

    pub fn with_shared_workload(workload: Arc<W>, config: HostConfig) -> Result<Self> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let first = WorkerId::new(0);
        let worker = WorkerHandle::spawn(first, Arc::clone(&workload), events_tx.clone())?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let host = HostControl {
            workload,
            config,
            worker: Some(worker),
            last_worker: first,
            next_worker: 1,
            events_tx,
            pending: PendingTable::new(),
            state: DispatchState::Running,
        };
        tokio::spawn(host.run(commands_rx, events_rx));

        tracing::debug!("Dispatch host started with worker {first}");
        Ok(Self {
            control: Control::new(commands_tx, CancellationToken::new()),
        })
    }

    /// Runs one task and waits for its result, using the configured default
    /// deadline if any.
    pub async fn run(&self, input: W::Input) -> Result<W::Output> {
        self.control.submit(input, None).await
    }

    /// Runs one task with an explicit deadline. On expiry the caller is
    /// rejected with [`Error::TaskTimeout`]; the worker is not interrupted.
    pub async fn run_with_timeout(&self, input: W::Input, timeout: Duration) -> Result<W::Output> {
        self.control.submit(input, Some(timeout)).await
    }

    pub async fn status(&self) -> DispatchStatus {
        self.control.status().await
    }

    /// Stops accepting work, rejects everything still pending with
    /// [`Error::HostShuttingDown`], and waits (bounded by the shutdown
    /// timeout) for the worker to exit. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        self.control.shutdown().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.control.is_shutting_down()
    }
}

/// State owned by the host's control task.
struct HostControl<W: Workload> {
    workload: Arc<W>,
    config: HostConfig,
    worker: Option<WorkerHandle<W::Input>>,
    last_worker: WorkerId,
    next_worker: usize,
    events_tx: mpsc::UnboundedSender<WorkerEvent<W::Output>>,
    pending: PendingTable<W::Output>,
    state: DispatchState,
}

impl<W: Workload> HostControl<W> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<W>>,
        mut events: mpsc::UnboundedReceiver<WorkerEvent<W::Output>>,
    ) {
        let mut waiters = Vec::new();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit { input, timeout, respond }) => {
                        self.submit(input, timeout, respond);
                    }
                    Some(Command::Status { respond }) => {
                        let _ = respond.send(self.status());
                    }
                    Some(Command::Shutdown { done }) => {
                        waiters.push(done);
                        break;
                    }
                    None => {
                        tracing::debug!("All host handles dropped");
                        break;
                    }
                },
                Some(event) = events.recv() => self.on_event(event),
                Some(id) = self.pending.next_expired(), if self.pending.has_deadlines() => {
                    if self.pending.expire(id) {
                        tracing::debug!("Task {id} timed out");
                    }
                }
            }
        }

        self.drain(&mut commands, &mut events, waiters).await;
    }

    fn submit(&mut self, input: W::Input, timeout: Option<Duration>, respond: Responder<W::Output>) {
        let Some(worker) = &self.worker else {
            let _ = respond.send(Err(Error::WorkerCrashed {
                worker_id: self.last_worker,
            }));
            return;
        };

        let id = self.pending.next_id();
        self.pending
            .register(id, respond, timeout.or(self.config.request_timeout));
        self.pending.assign(id, worker.id());

        if worker.send(Task::new(id, input)).is_err() {
            // The worker died; its exit event rejects everything assigned to
            // it, this task included.
            tracing::debug!("Worker {} is gone, task {id} awaits crash handling", worker.id());
        }
    }

    fn on_event(&mut self, event: WorkerEvent<W::Output>) {
        match event {
            WorkerEvent::Reply { worker_id, reply } => {
                if let Err(e) = self.pending.resolve(reply) {
                    tracing::warn!("Dropping reply from worker {worker_id}: {e}");
                }
            }
            WorkerEvent::Exited {
                worker_id,
                panicked,
            } => self.on_worker_exit(worker_id, panicked),
        }
    }

    fn on_worker_exit(&mut self, worker_id: WorkerId, panicked: bool) {
        if self.worker.as_ref().map(WorkerHandle::id) != Some(worker_id) {
            tracing::debug!("Ignoring exit of retired worker {worker_id}");
            return;
        }
        self.worker = None;

        let crashed = Error::WorkerCrashed { worker_id };
        let rejected = self.pending.reject_assigned(worker_id, &crashed);
        tracing::warn!(
            "Worker {worker_id} exited unexpectedly (panicked = {panicked}), rejected {rejected} pending tasks"
        );

        if self.config.respawn {
            let id = WorkerId::new(self.next_worker);
            self.next_worker += 1;
            match WorkerHandle::spawn(id, Arc::clone(&self.workload), self.events_tx.clone()) {
                Ok(worker) => {
                    tracing::info!("Respawned worker {id} to replace worker {worker_id}");
                    self.last_worker = id;
                    self.worker = Some(worker);
                }
                Err(e) => tracing::error!("Failed to respawn worker: {e}"),
            }
        }
    }

    fn status(&self) -> DispatchStatus {
        let counters = self.pending.counters();
        let workers = usize::from(self.worker.is_some());
        let pending = self.pending.len();
        let busy = pending.min(workers);

        DispatchStatus {
            state: self.state,
            workers,
            idle: workers - busy,
            busy,
            queued: pending - busy,
            pending,
            completed: counters.completed,
            failed: counters.failed,
            timed_out: counters.timed_out,
            crashed: counters.crashed,
            orphaned: counters.orphaned,
        }
    }

    async fn drain(
        mut self,
        commands: &mut mpsc::UnboundedReceiver<Command<W>>,
        events: &mut mpsc::UnboundedReceiver<WorkerEvent<W::Output>>,
        mut waiters: Vec<oneshot::Sender<()>>,
    ) {
        self.state = DispatchState::Draining;
        let rejected = self.pending.reject_all(&Error::HostShuttingDown);
        tracing::info!("Dispatch host draining, rejected {rejected} pending tasks");

        // Dropping the handle closes the worker's inbound channel; it exits
        // once its current computation returns.
        let mut outstanding = self.worker.take().map(|worker| worker.id());
        let deadline = Instant::now() + self.config.shutdown_timeout;

        while let Some(worker_id) = outstanding {
            tokio::select! {
                event = events.recv() => match event {
                    Some(WorkerEvent::Exited { worker_id: exited, .. }) if exited == worker_id => {
                        outstanding = None;
                    }
                    Some(WorkerEvent::Exited { .. }) => {}
                    Some(WorkerEvent::Reply { reply, .. }) => {
                        // Everything was rejected above; late replies are orphans.
                        let _ = self.pending.resolve(reply);
                    }
                    None => break,
                },
                Some(command) = commands.recv() => {
                    command.refuse(|| self.status(), &mut waiters);
                }
                () = sleep_until(deadline) => {
                    tracing::warn!(
                        "Worker {worker_id} did not exit within {:?}, detaching",
                        self.config.shutdown_timeout
                    );
                    break;
                }
            }
        }

        self.state = DispatchState::Stopped;
        for done in waiters {
            let _ = done.send(());
        }
        tracing::info!("Dispatch host stopped");
    }
}
