//! Caller-facing compute service.
//!
//! [`ComputeService`] validates the requested input, forwards it to the
//! dispatcher as a single task and records request telemetry. It carries no
//! other logic; all scheduling, correlation and shutdown behavior lives in
//! the `offload` crate.

use crate::server::{
    config::{DispatchMode, ServerConfig},
    service::error::{Result, ServiceError},
    telemetry::{
        decrement_tasks_inflight, increment_requests, increment_task_errors,
        increment_tasks_inflight, record_task_duration,
    },
};
use offload::{DispatchHost, DispatchStatus, Dispatcher, Fibonacci, WorkerPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
pub struct ComputeService {
    config: ServerConfig,
    dispatcher: Dispatcher<Fibonacci>,
    inflight: Arc<AtomicUsize>,
}

/// Counts one request as in flight until dropped, including when axum drops
/// the handler future because the client went away.
struct InflightGuard {
    inflight: Arc<AtomicUsize>,
}

impl InflightGuard {
    fn new(inflight: &Arc<AtomicUsize>) -> Self {
        inflight.fetch_add(1, Ordering::Relaxed);
        increment_tasks_inflight();
        Self {
            inflight: Arc::clone(inflight),
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        decrement_tasks_inflight();
    }
}

impl ComputeService {
    /// Starts the dispatcher selected by `config.dispatch_mode`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ServerConfig) -> offload::Result<Self> {
        let dispatcher = match config.dispatch_mode {
            DispatchMode::Host => DispatchHost::new(Fibonacci, config.host_config())?.into(),
            DispatchMode::Pool => WorkerPool::new(Fibonacci, config.pool_config())?.into(),
        };

        Ok(Self {
            config,
            dispatcher,
            inflight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Computes the `n`th Fibonacci number on a worker thread.
    #[tracing::instrument(skip(self))]
    pub async fn compute(&self, n: u64) -> Result<u64> {
        if n > self.config.max_input {
            increment_task_errors();
            return Err(ServiceError::InvalidRequest {
                reason: format!(
                    "Input {} exceeds maximum allowed ({})",
                    n, self.config.max_input
                ),
            });
        }

        let start = std::time::Instant::now();
        increment_requests();

        let guard = InflightGuard::new(&self.inflight);
        let result = self.dispatcher.run(n).await;
        drop(guard);

        match result {
            Ok(value) => {
                record_task_duration(start.elapsed().as_secs_f64() * 1000.0);
                Ok(value)
            }
            Err(e) => {
                increment_task_errors();
                tracing::debug!("Compute {n} failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Number of `compute` calls currently waiting on the dispatcher.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Relaxed)
    }

    pub async fn status(&self) -> DispatchStatus {
        self.dispatcher.status().await
    }

    /// Rejects everything still pending and stops the workers.
    pub async fn shutdown(&self) -> offload::Result<()> {
        self.dispatcher.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig {
            dispatch_mode: DispatchMode::Pool,
            max_workers: 2,
            worker_idle_timeout: None,
            request_timeout: None,
            max_queued: None,
            shutdown_timeout: Duration::from_millis(100),
            max_input: 45,
            server_addr: "127.0.0.1:0".to_string(),
        }
    }

    #[tokio::test]
    async fn dropped_request_is_no_longer_in_flight() {
        let service = ComputeService::new(config()).unwrap();

        // Abandon the call while the worker is still computing, as axum does
        // when the client disconnects.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), service.compute(38)).await;
        assert!(abandoned.is_err());
        assert_eq!(service.inflight(), 0);

        assert_eq!(service.compute(10).await.unwrap(), 55);
        assert_eq!(service.inflight(), 0);
        service.shutdown().await.unwrap();
    }
}
