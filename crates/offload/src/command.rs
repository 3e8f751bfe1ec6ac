//! Caller-to-control-task protocol shared by the host and the pool.
//!
//! Callers never touch the pending table. They send a [`Command`] over an
//! unbounded channel and wait on a `oneshot` for the answer, which keeps all
//! bookkeeping on the single control task.

use crate::config::check_timeout_bound;
use crate::pending::Responder;
use crate::{DispatchState, DispatchStatus, Error, Result, Workload};
use core::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub(crate) enum Command<W: Workload> {
    /// Run one task. `timeout: None` applies the configured default.
    Submit {
        input: W::Input,
        timeout: Option<Duration>,
        respond: Responder<W::Output>,
    },

    Status {
        respond: oneshot::Sender<DispatchStatus>,
    },

    /// Drain and stop. `done` fires once every worker has exited or the
    /// shutdown timeout has elapsed.
    Shutdown { done: oneshot::Sender<()> },
}

impl<W: Workload> Command<W> {
    /// Answers a command that arrives after draining has begun.
    pub fn refuse(
        self,
        status: impl FnOnce() -> DispatchStatus,
        waiters: &mut Vec<oneshot::Sender<()>>,
    ) {
        match self {
            Self::Submit { respond, .. } => {
                let _ = respond.send(Err(Error::HostShuttingDown));
            }
            Self::Status { respond } => {
                let _ = respond.send(status());
            }
            Self::Shutdown { done } => waiters.push(done),
        }
    }
}

/// Caller-side handle to a control task.
pub(crate) struct Control<W: Workload> {
    commands: mpsc::UnboundedSender<Command<W>>,
    shutdown_token: CancellationToken,
}

impl<W: Workload> Clone for Control<W> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            shutdown_token: self.shutdown_token.clone(),
        }
    }
}

impl<W: Workload> Control<W> {
    pub fn new(
        commands: mpsc::UnboundedSender<Command<W>>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            commands,
            shutdown_token,
        }
    }

    pub async fn submit(&self, input: W::Input, timeout: Option<Duration>) -> Result<W::Output> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::HostShuttingDown);
        }
        if let Some(timeout) = timeout {
            check_timeout_bound(timeout)?;
        }

        let (respond, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                input,
                timeout,
                respond,
            })
            .map_err(|_| Error::HostShuttingDown)?;

        // A dropped responder means the control task is gone.
        rx.await.unwrap_or(Err(Error::HostShuttingDown))
    }

    pub async fn status(&self) -> DispatchStatus {
        let (respond, rx) = oneshot::channel();
        if self.commands.send(Command::Status { respond }).is_err() {
            return DispatchStatus::stopped();
        }
        rx.await.unwrap_or_else(|_| DispatchStatus::stopped())
    }

    pub async fn shutdown(&self) -> Result<()> {
        // Refuse new work immediately, even before the control task has
        // picked up the shutdown command.
        self.shutdown_token.cancel();

        let (done, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).is_err() {
            tracing::debug!("Shutdown requested after control task exited");
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}

impl DispatchStatus {
    /// Status reported once the control task has exited.
    pub(crate) const fn stopped() -> Self {
        Self {
            state: DispatchState::Stopped,
            workers: 0,
            idle: 0,
            busy: 0,
            queued: 0,
            pending: 0,
            completed: 0,
            failed: 0,
            timed_out: 0,
            crashed: 0,
            orphaned: 0,
        }
    }
}
