use crate::{DispatchHost, DispatchStatus, Result, WorkerPool, Workload};
use core::time::Duration;

/// Either dispatch shape behind one interface.
///
/// Lets callers pick a single dedicated worker or a bounded pool at startup
/// without being generic over which one they hold.
pub enum Dispatcher<W: Workload> {
    Host(DispatchHost<W>),
    Pool(WorkerPool<W>),
}

impl<W: Workload> Clone for Dispatcher<W> {
    fn clone(&self) -> Self {
        match self {
            Self::Host(host) => Self::Host(host.clone()),
            Self::Pool(pool) => Self::Pool(pool.clone()),
        }
    }
}

impl<W: Workload> From<DispatchHost<W>> for Dispatcher<W> {
    fn from(host: DispatchHost<W>) -> Self {
        Self::Host(host)
    }
}

impl<W: Workload> From<WorkerPool<W>> for Dispatcher<W> {
    fn from(pool: WorkerPool<W>) -> Self {
        Self::Pool(pool)
    }
}

impl<W: Workload> Dispatcher<W> {
    pub async fn run(&self, input: W::Input) -> Result<W::Output> {
        match self {
            Self::Host(host) => host.run(input).await,
            Self::Pool(pool) => pool.run(input).await,
        }
    }

    pub async fn run_with_timeout(&self, input: W::Input, timeout: Duration) -> Result<W::Output> {
        match self {
            Self::Host(host) => host.run_with_timeout(input, timeout).await,
            Self::Pool(pool) => pool.run_with_timeout(input, timeout).await,
        }
    }

    pub async fn status(&self) -> DispatchStatus {
        match self {
            Self::Host(host) => host.status().await,
            Self::Pool(pool) => pool.status().await,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        match self {
            Self::Host(host) => host.shutdown().await,
            Self::Pool(pool) => pool.shutdown().await,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        match self {
            Self::Host(host) => host.is_shutting_down(),
            Self::Pool(pool) => pool.is_shutting_down(),
        }
    }
}
