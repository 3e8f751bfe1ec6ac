//! Bounded pool of reusable worker threads.
//!
//! This module defines [`WorkerPool`], which spreads tasks over up to
//! `max_workers` worker threads, one task per worker at a time. Tasks that
//! arrive while every worker is busy wait in a FIFO queue and are handed to
//! the next worker that becomes idle.
//!
//! All bookkeeping (pending table, worker table, queue) lives on a single
//! control task. Callers and workers only exchange messages with it, so the
//! dispatch path takes no locks.
//!
//! ## Worker lifecycle
//!
//! - `Idle → Busy` when a task is assigned, `Busy → Idle` when its reply
//!   arrives (even if the caller already timed out).
//! - `Busy → Crashed`: the worker is removed, only its own task is rejected
//!   with [`Error::WorkerCrashed`], and a replacement is started if
//!   `respawn` is enabled.
//! - In elastic mode (`worker_idle_timeout` set) workers are started on
//!   demand and retired after sitting idle for the timeout.
//!
//! ## Shutdown
//!
//! `Running → Draining → Stopped`. Draining rejects every queued and in-flight
//! request with [`Error::HostShuttingDown`], stops every worker, and waits up
//! to `shutdown_timeout` for them to exit.

use crate::command::{Command, Control};
use crate::pending::{PendingTable, Responder};
use crate::worker::{WorkerEvent, WorkerHandle};
use crate::{
    DispatchState, DispatchStatus, Error, PoolConfig, Result, Task, TaskId, WorkerId, Workload,
};
use core::time::Duration;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, sleep_until};
use tokio_util::sync::CancellationToken;

/// Lower bound on how often the idle reaper runs in elastic mode.
const MIN_REAP_PERIOD: Duration = Duration::from_millis(10);

/// A pool of worker threads sharing one pending-request table.
///
/// Cheap to clone; all clones talk to the same control task.
pub struct WorkerPool<W: Workload> {
    control: Control<W>,
}

impl<W: Workload> Clone for WorkerPool<W> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
        }
    }
}

impl<W: Workload> WorkerPool<W> {
    /// Starts the control task and, unless the pool is elastic, all
    /// `max_workers` workers.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unusable settings and
    /// [`Error::WorkerSpawn`] if a worker thread cannot be started.
    pub fn new(workload: W, config: PoolConfig) -> Result<Self> {
        Self::with_shared_workload(Arc::new(workload), config)
    }

    pub fn with_shared_workload(workload: Arc<W>, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut pool = PoolControl {
            workload,
            config,
            workers: BTreeMap::new(),
            queue: VecDeque::new(),
            next_worker: 0,
            last_crashed: None,
            lost: 0,
            events_tx,
            pending: PendingTable::new(),
            state: DispatchState::Running,
        };

        if !pool.config.is_elastic() {
            for _ in 0..pool.config.max_workers {
                pool.spawn_worker()?;
            }
        }

        tracing::debug!(
            "Worker pool started ({} workers, max {}, elastic = {})",
            pool.workers.len(),
            pool.config.max_workers,
            pool.config.is_elastic()
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(pool.run(commands_rx, events_rx));

        Ok(Self {
            control: Control::new(commands_tx, CancellationToken::new()),
        })
    }

    /// Runs one task and waits for its result, using the configured default
    /// deadline if any.
    pub async fn run(&self, input: W::Input) -> Result<W::Output> {
        self.control.submit(input, None).await
    }

    /// Runs one task with an explicit deadline. The deadline covers time spent
    /// queued as well as time spent computing.
    pub async fn run_with_timeout(&self, input: W::Input, timeout: Duration) -> Result<W::Output> {
        self.control.submit(input, Some(timeout)).await
    }

    pub async fn status(&self) -> DispatchStatus {
        self.control.status().await
    }

    /// Gracefully shuts down the pool.
    ///
    /// - Refuses new requests immediately.
    /// - Rejects every queued and in-flight request with
    ///   [`Error::HostShuttingDown`].
    /// - Stops every worker and waits up to `shutdown_timeout` for them to
    ///   exit; stragglers are detached.
    pub async fn shutdown(&self) -> Result<()> {
        self.control.shutdown().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.control.is_shutting_down()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle { since: Instant },
    Busy { task_id: TaskId },
}

struct WorkerRecord<I> {
    handle: WorkerHandle<I>,
    state: WorkerState,
}

struct Queued<I> {
    id: TaskId,
    input: I,
    created_at: std::time::Instant,
}

/// State owned by the pool's control task.
struct PoolControl<W: Workload> {
    workload: Arc<W>,
    config: PoolConfig,
    workers: BTreeMap<WorkerId, WorkerRecord<W::Input>>,
    queue: VecDeque<Queued<W::Input>>,
    next_worker: usize,
    last_crashed: Option<WorkerId>,
    /// Crashed workers an elastic pool may not replace (`respawn = false`).
    lost: usize,
    events_tx: mpsc::UnboundedSender<WorkerEvent<W::Output>>,
    pending: PendingTable<W::Output>,
    state: DispatchState,
}

impl<W: Workload> PoolControl<W> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<W>>,
        mut events: mpsc::UnboundedReceiver<WorkerEvent<W::Output>>,
    ) {
        let mut reaper = self.config.worker_idle_timeout.map(|idle_timeout| {
            let mut interval = tokio::time::interval((idle_timeout / 2).max(MIN_REAP_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
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
                        tracing::debug!("All pool handles dropped");
                        break;
                    }
                },
                Some(event) = events.recv() => self.on_event(event),
                Some(id) = self.pending.next_expired(), if self.pending.has_deadlines() => {
                    self.on_expired(id);
                }
                () = tick(&mut reaper) => self.reap_idle(),
            }
        }

        self.drain(&mut commands, &mut events, waiters).await;
    }

    fn submit(&mut self, input: W::Input, timeout: Option<Duration>, respond: Responder<W::Output>) {
        let timeout = timeout.or(self.config.request_timeout);

        if let Some(worker_id) = self.idle_worker().or_else(|| self.grow()) {
            let id = self.pending.next_id();
            self.pending.register(id, respond, timeout);
            self.assign(worker_id, Task::new(id, input));
            return;
        }

        if self.workers.is_empty() {
            // Only reachable when crashed workers are not being replaced.
            let _ = respond.send(Err(self.no_workers_error()));
            return;
        }

        if let Some(max_queued) = self.config.max_queued
            && self.queue.len() >= max_queued
        {
            let _ = respond.send(Err(Error::PoolExhausted {
                busy: self.busy_count(),
                queued: self.queue.len(),
            }));
            return;
        }

        let id = self.pending.next_id();
        self.pending.register(id, respond, timeout);
        self.queue.push_back(Queued {
            id,
            input,
            created_at: std::time::Instant::now(),
        });
        tracing::trace!("Task {id} queued ({} waiting)", self.queue.len());
    }

    fn assign(&mut self, worker_id: WorkerId, task: Task<W::Input>) {
        let Some(record) = self.workers.get_mut(&worker_id) else {
            self.pending.reject(task.id, Error::WorkerCrashed { worker_id });
            return;
        };

        record.state = WorkerState::Busy { task_id: task.id };
        self.pending.assign(task.id, worker_id);

        let task_id = task.id;
        if record.handle.send(task).is_err() {
            // The worker died; its exit event rejects this task.
            tracing::debug!("Worker {worker_id} is gone, task {task_id} awaits crash handling");
        }
    }

    /// Hands queued tasks to idle (or newly started) workers in FIFO order.
    fn dispatch_queued(&mut self) {
        while !self.queue.is_empty() {
            let Some(worker_id) = self.idle_worker().or_else(|| self.grow()) else {
                break;
            };
            let Some(Queued {
                id,
                input,
                created_at,
            }) = self.queue.pop_front()
            else {
                break;
            };
            if !self.pending.contains(id) {
                continue;
            }
            self.assign(
                worker_id,
                Task {
                    id,
                    input,
                    created_at,
                },
            );
        }
    }

    fn on_event(&mut self, event: WorkerEvent<W::Output>) {
        match event {
            WorkerEvent::Reply { worker_id, reply } => {
                if let Some(record) = self.workers.get_mut(&worker_id) {
                    match record.state {
                        WorkerState::Busy { task_id } if task_id == reply.id => {
                            record.state = WorkerState::Idle {
                                since: Instant::now(),
                            };
                        }
                        state => {
                            tracing::warn!(
                                "Worker {worker_id} replied for task {} while {state:?}",
                                reply.id
                            );
                        }
                    }
                }

                if let Err(e) = self.pending.resolve(reply) {
                    tracing::warn!("Dropping reply from worker {worker_id}: {e}");
                }
                self.dispatch_queued();
            }
            WorkerEvent::Exited {
                worker_id,
                panicked,
            } => self.on_worker_exit(worker_id, panicked),
        }
    }

    fn on_worker_exit(&mut self, worker_id: WorkerId, panicked: bool) {
        if self.workers.remove(&worker_id).is_none() {
            tracing::debug!("Retired worker {worker_id} exited");
            return;
        }

        let crashed = Error::WorkerCrashed { worker_id };
        let rejected = self.pending.reject_assigned(worker_id, &crashed);
        self.last_crashed = Some(worker_id);
        tracing::warn!(
            "Worker {worker_id} exited unexpectedly (panicked = {panicked}), rejected {rejected} tasks"
        );

        // Elastic pools grow back on demand in `dispatch_queued`, unless
        // crashed workers are not to be replaced.
        if !self.config.respawn {
            self.lost += 1;
        } else if !self.config.is_elastic() {
            match self.spawn_worker() {
                Ok(id) => tracing::info!("Respawned worker {id} to replace worker {worker_id}"),
                Err(e) => tracing::error!("Failed to respawn worker: {e}"),
            }
        }

        if self.workers.is_empty() && !self.can_grow() {
            let error = self.no_workers_error();
            for queued in self.queue.drain(..) {
                self.pending.reject(queued.id, error.clone());
            }
            tracing::error!("No workers left in pool");
        }

        self.dispatch_queued();
    }

    fn on_expired(&mut self, id: TaskId) {
        if self.pending.expire(id) {
            tracing::debug!("Task {id} timed out");
            // A queued task never reaches a worker; an assigned one keeps its
            // worker busy until the orphan reply comes back.
            self.queue.retain(|queued| queued.id != id);
        }
    }

    /// Retires workers that have been idle longer than `worker_idle_timeout`.
    fn reap_idle(&mut self) {
        let Some(idle_timeout) = self.config.worker_idle_timeout else {
            return;
        };
        let now = Instant::now();
        let expired: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, record)| {
                matches!(record.state, WorkerState::Idle { since } if now.duration_since(since) >= idle_timeout)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            // Dropping the record stops the thread; its exit event is ignored.
            self.workers.remove(&id);
            tracing::debug!("Retired idle worker {id}");
        }
    }

    fn spawn_worker(&mut self) -> Result<WorkerId> {
        let id = WorkerId::new(self.next_worker);
        self.next_worker += 1;

        let handle = WorkerHandle::spawn(id, Arc::clone(&self.workload), self.events_tx.clone())?;
        self.workers.insert(
            id,
            WorkerRecord {
                handle,
                state: WorkerState::Idle {
                    since: Instant::now(),
                },
            },
        );
        tracing::trace!("Worker {id} spawned");
        Ok(id)
    }

    fn can_grow(&self) -> bool {
        self.config.is_elastic() && self.workers.len() + self.lost < self.config.max_workers
    }

    /// Starts an extra worker when the pool is elastic and below its cap.
    fn grow(&mut self) -> Option<WorkerId> {
        if !self.can_grow() {
            return None;
        }
        match self.spawn_worker() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!("Failed to grow pool: {e}");
                None
            }
        }
    }

    fn idle_worker(&self) -> Option<WorkerId> {
        self.workers
            .iter()
            .find(|(_, record)| matches!(record.state, WorkerState::Idle { .. }))
            .map(|(id, _)| *id)
    }

    fn busy_count(&self) -> usize {
        self.workers
            .values()
            .filter(|record| matches!(record.state, WorkerState::Busy { .. }))
            .count()
    }

    fn no_workers_error(&self) -> Error {
        self.last_crashed
            .map_or(Error::HostShuttingDown, |worker_id| Error::WorkerCrashed {
                worker_id,
            })
    }

    fn status(&self) -> DispatchStatus {
        let counters = self.pending.counters();
        let busy = self.busy_count();

        DispatchStatus {
            state: self.state,
            workers: self.workers.len(),
            idle: self.workers.len() - busy,
            busy,
            queued: self.queue.len(),
            pending: self.pending.len(),
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
        // === Phase 1: Refuse new work and settle every caller ===
        self.state = DispatchState::Draining;
        self.queue.clear();
        let rejected = self.pending.reject_all(&Error::HostShuttingDown);
        tracing::info!("Worker pool draining, rejected {rejected} queued or in-flight tasks");

        // === Phase 2: Stop every worker ===
        let mut outstanding: HashSet<WorkerId> = self.workers.keys().copied().collect();
        self.workers.clear();

        // === Phase 3: Wait for exits, bounded by the shutdown timeout ===
        let deadline = Instant::now() + self.config.shutdown_timeout;
        while !outstanding.is_empty() {
            tokio::select! {
                event = events.recv() => match event {
                    Some(WorkerEvent::Exited { worker_id, .. }) => {
                        outstanding.remove(&worker_id);
                    }
                    Some(WorkerEvent::Reply { reply, .. }) => {
                        let _ = self.pending.resolve(reply);
                    }
                    None => break,
                },
                Some(command) = commands.recv() => {
                    command.refuse(|| self.status(), &mut waiters);
                }
                () = sleep_until(deadline) => {
                    tracing::warn!(
                        "{} workers did not exit within {:?}, detaching",
                        outstanding.len(),
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
        tracing::info!("Worker pool shutdown complete");
    }
}

/// Completes on the next reaper tick, or never when the pool is fixed-size.
async fn tick(reaper: &mut Option<Interval>) {
    match reaper {
        Some(interval) => {
            interval.tick().await;
        }
        None => core::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Crashy, Gauge, Recorder, Sleepy, eventually};
    use crate::MAX_REQUEST_TIMEOUT;
    use crate::{Fibonacci, fibonacci};
    use futures::future::join_all;
    use tokio::time::timeout;

    fn spawn_run<W: Workload>(
        pool: &WorkerPool<W>,
        input: W::Input,
    ) -> tokio::task::JoinHandle<Result<W::Output>> {
        let pool = pool.clone();
        tokio::spawn(async move { pool.run(input).await })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_get_their_own_results() {
        let pool = WorkerPool::new(Fibonacci, PoolConfig::default().with_max_workers(4)).unwrap();

        let inputs: Vec<u64> = (0..32).map(|i| (i * 7) % 27).collect();
        let results = join_all(inputs.iter().map(|&n| pool.run(n))).await;

        for (n, result) in inputs.iter().zip(results) {
            assert_eq!(result, Ok(fibonacci(*n)), "n = {n}");
        }
        let status = pool.status().await;
        assert_eq!(status.completed, 32);
        assert_eq!(status.pending, 0);
        assert_eq!(status.orphaned, 0);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn max_workers_bounds_parallelism() {
        let gauge = Gauge::default();
        let pool = WorkerPool::new(gauge.clone(), PoolConfig::default().with_max_workers(2)).unwrap();

        let calls: Vec<_> = (0..5).map(|_| spawn_run(&pool, 80)).collect();

        loop {
            let status = pool.status().await;
            assert!(status.busy <= 2, "busy = {}", status.busy);
            assert_eq!(status.workers, 2);
            if status.completed == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        for call in calls {
            assert_eq!(call.await.unwrap(), Ok(80));
        }
        assert_eq!(gauge.peak(), 2);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queue_is_served_in_submission_order() {
        let recorder = Recorder::default();
        let pool =
            WorkerPool::new(recorder.clone(), PoolConfig::default().with_max_workers(1)).unwrap();

        let mut calls = Vec::new();
        for (submitted, input) in (1..=5_u64).enumerate() {
            calls.push(spawn_run(&pool, input));
            let probe = &pool;
            eventually(move || async move {
                let status = probe.status().await;
                status.pending as u64 + status.completed == submitted as u64 + 1
            })
            .await;
        }

        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
        assert_eq!(recorder.seen(), vec![1, 2, 3, 4, 5]);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_rejects_queued_and_in_flight() {
        let pool = WorkerPool::new(
            Sleepy,
            PoolConfig::default()
                .with_max_workers(2)
                .with_shutdown_timeout(Duration::from_secs(2)),
        )
        .unwrap();

        let calls: Vec<_> = (0..5).map(|_| spawn_run(&pool, 300)).collect();
        let probe = &pool;
        eventually(move || async move {
            let status = probe.status().await;
            status.busy == 2 && status.queued == 3
        })
        .await;

        pool.shutdown().await.unwrap();

        for call in calls {
            let result = timeout(Duration::from_secs(2), call).await.unwrap().unwrap();
            assert_eq!(result, Err(Error::HostShuttingDown));
        }
        assert_eq!(pool.run(1).await, Err(Error::HostShuttingDown));
        assert_eq!(pool.status().await.state, DispatchState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn crash_only_affects_its_own_task() {
        let pool = WorkerPool::new(Crashy, PoolConfig::default().with_max_workers(2)).unwrap();

        let (crashed, survived) = tokio::join!(pool.run(0), pool.run(150));

        assert!(matches!(crashed, Err(Error::WorkerCrashed { .. })));
        assert_eq!(survived, Ok(300));

        // The replacement keeps the pool at full size.
        assert_eq!(pool.run(5).await, Ok(10));
        let status = pool.status().await;
        assert_eq!(status.workers, 2);
        assert_eq!(status.crashed, 1);
        assert_eq!(status.completed, 2);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn crashed_workers_are_not_replaced_without_respawn() {
        let pool = WorkerPool::new(
            Crashy,
            PoolConfig::default().with_max_workers(1).with_respawn(false),
        )
        .unwrap();

        assert_eq!(
            pool.run(0).await,
            Err(Error::WorkerCrashed {
                worker_id: WorkerId::new(0)
            })
        );
        assert_eq!(
            pool.run(1).await,
            Err(Error::WorkerCrashed {
                worker_id: WorkerId::new(0)
            })
        );
        assert_eq!(pool.status().await.workers, 0);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn full_queue_rejects_immediately() {
        let pool = WorkerPool::new(
            Sleepy,
            PoolConfig::default().with_max_workers(1).with_max_queued(1),
        )
        .unwrap();

        let first = spawn_run(&pool, 150);
        let probe = &pool;
        eventually(move || async move { probe.status().await.busy == 1 }).await;
        let second = spawn_run(&pool, 1);
        eventually(move || async move { probe.status().await.queued == 1 }).await;

        assert_eq!(
            pool.run(1).await,
            Err(Error::PoolExhausted { busy: 1, queued: 1 })
        );
        assert_eq!(first.await.unwrap(), Ok(150));
        assert_eq!(second.await.unwrap(), Ok(1));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn disabled_queue_rejects_when_saturated() {
        let pool = WorkerPool::new(
            Sleepy,
            PoolConfig::default().with_max_workers(1).with_max_queued(0),
        )
        .unwrap();

        let first = spawn_run(&pool, 100);
        let probe = &pool;
        eventually(move || async move { probe.status().await.busy == 1 }).await;

        assert_eq!(
            pool.run(1).await,
            Err(Error::PoolExhausted { busy: 1, queued: 0 })
        );
        assert_eq!(first.await.unwrap(), Ok(100));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queued_task_times_out_without_running() {
        let recorder = Recorder::default();
        let pool =
            WorkerPool::new(recorder.clone(), PoolConfig::default().with_max_workers(1)).unwrap();

        let first = spawn_run(&pool, 150);
        let probe = &pool;
        eventually(move || async move { probe.status().await.busy == 1 }).await;

        let result = pool.run_with_timeout(7, Duration::from_millis(30)).await;
        assert!(matches!(result, Err(Error::TaskTimeout { .. })));
        assert_eq!(pool.status().await.queued, 0);

        assert_eq!(first.await.unwrap(), Ok(150));
        let status = pool.status().await;
        assert_eq!(status.timed_out, 1);
        assert_eq!(status.orphaned, 0);
        assert_eq!(recorder.seen(), vec![150]);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_timeout_frees_worker_on_orphan_reply() {
        let pool = WorkerPool::new(Sleepy, PoolConfig::default().with_max_workers(1)).unwrap();

        let result = pool.run_with_timeout(120, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::TaskTimeout { .. })));

        // Served once the orphan reply returns the worker to idle.
        assert_eq!(pool.run(5).await, Ok(5));
        let status = pool.status().await;
        assert_eq!(status.orphaned, 1);
        assert_eq!(status.idle, 1);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn elastic_pool_grows_on_demand_and_retires_idle_workers() {
        let pool = WorkerPool::new(
            Fibonacci,
            PoolConfig::default()
                .with_max_workers(2)
                .with_worker_idle_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        assert_eq!(pool.status().await.workers, 0);

        let (a, b) = tokio::join!(pool.run(20), pool.run(21));
        assert_eq!(a, Ok(fibonacci(20)));
        assert_eq!(b, Ok(fibonacci(21)));

        let probe = &pool;
        eventually(move || async move { probe.status().await.workers == 0 }).await;

        // And grows back afterwards.
        assert_eq!(pool.run(10).await, Ok(55));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn elastic_pool_without_respawn_does_not_regrow_after_crash() {
        let pool = WorkerPool::new(
            Crashy,
            PoolConfig::default()
                .with_max_workers(1)
                .with_worker_idle_timeout(Duration::from_secs(5))
                .with_respawn(false),
        )
        .unwrap();

        let crashed = Error::WorkerCrashed {
            worker_id: WorkerId::new(0),
        };
        assert_eq!(pool.run(0).await, Err(crashed.clone()));
        assert_eq!(pool.run(1).await, Err(crashed));

        let status = pool.status().await;
        assert_eq!(status.workers, 0);
        assert_eq!(status.crashed, 1);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn oversized_timeout_is_rejected_without_disturbing_other_calls() {
        let pool = WorkerPool::new(Sleepy, PoolConfig::default().with_max_workers(2)).unwrap();

        let in_flight = spawn_run(&pool, 100);
        let probe = &pool;
        eventually(move || async move { probe.status().await.busy == 1 }).await;

        let too_long = MAX_REQUEST_TIMEOUT + Duration::from_secs(1);
        assert!(matches!(
            pool.run_with_timeout(1, too_long).await,
            Err(Error::InvalidConfig { .. })
        ));
        assert_eq!(pool.run_with_timeout(1, MAX_REQUEST_TIMEOUT).await, Ok(1));

        assert_eq!(in_flight.await.unwrap(), Ok(100));
        assert_eq!(pool.run(2).await, Ok(2));
        assert_eq!(pool.status().await.state, DispatchState::Running);
        assert!(!pool.is_shutting_down());
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let result = WorkerPool::new(Fibonacci, PoolConfig::default().with_max_workers(0));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
