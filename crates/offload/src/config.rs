use crate::{Error, Result};
use core::time::Duration;

/// How long shutdown waits for worker threads to finish their current task
/// before detaching them.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest accepted task deadline. The deadline timer wheel cannot represent
/// instants much beyond two years out.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Settings for a single-worker [`DispatchHost`](crate::DispatchHost).
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Deadline applied to `run` calls that do not specify their own.
    pub request_timeout: Option<Duration>,
    /// Upper bound on how long shutdown waits for the worker to exit.
    pub shutdown_timeout: Duration,
    /// Replace the worker after it crashes.
    pub respawn: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            respawn: true,
        }
    }
}

impl HostConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_respawn(mut self, respawn: bool) -> Self {
        self.respawn = respawn;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_request_timeout(self.request_timeout)
    }
}

/// Settings for a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of workers, and therefore of computations running in
    /// parallel. Defaults to the number of logical CPUs.
    pub max_workers: usize,
    /// When set, the pool is elastic: workers are started on demand and
    /// retired after sitting idle this long. When unset, `max_workers`
    /// workers are started up front and kept for the life of the pool.
    pub worker_idle_timeout: Option<Duration>,
    /// Deadline applied to `run` calls that do not specify their own.
    pub request_timeout: Option<Duration>,
    /// Maximum number of tasks waiting for a worker. `None` queues without
    /// limit; `Some(0)` disables queueing entirely.
    pub max_queued: Option<usize>,
    /// Upper bound on how long shutdown waits for workers to exit.
    pub shutdown_timeout: Duration,
    /// Replace workers that crash. In an elastic pool a crashed worker is
    /// replaced on demand; with `respawn` off its slot is lost for good.
    pub respawn: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            worker_idle_timeout: None,
            request_timeout: None,
            max_queued: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            respawn: true,
        }
    }
}

impl PoolConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = Some(max_queued);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_respawn(mut self, respawn: bool) -> Self {
        self.respawn = respawn;
        self
    }

    pub const fn is_elastic(&self) -> bool {
        self.worker_idle_timeout.is_some()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::InvalidConfig {
                reason: "max_workers must be greater than 0".to_string(),
            });
        }
        if self.worker_idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidConfig {
                reason: "worker_idle_timeout must be greater than 0".to_string(),
            });
        }
        validate_request_timeout(self.request_timeout)
    }
}

fn validate_request_timeout(timeout: Option<Duration>) -> Result<()> {
    let Some(timeout) = timeout else {
        return Ok(());
    };
    if timeout.is_zero() {
        return Err(Error::InvalidConfig {
            reason: "request_timeout must be greater than 0".to_string(),
        });
    }
    check_timeout_bound(timeout)
}

/// Rejects deadlines too far out to be scheduled.
pub(crate) fn check_timeout_bound(timeout: Duration) -> Result<()> {
    if timeout > MAX_REQUEST_TIMEOUT {
        return Err(Error::InvalidConfig {
            reason: format!(
                "timeout {timeout:?} exceeds the maximum of {MAX_REQUEST_TIMEOUT:?}"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_defaults_to_hardware_parallelism() {
        let config = PoolConfig::default();
        assert_eq!(config.max_workers, num_cpus::get());
        assert!(!config.is_elastic());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let err = PoolConfig::default().with_max_workers(0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_zero_durations() {
        assert!(
            PoolConfig::default()
                .with_worker_idle_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            HostConfig::default()
                .with_request_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn rejects_request_timeouts_beyond_the_deadline_limit() {
        let too_long = MAX_REQUEST_TIMEOUT + Duration::from_secs(1);
        assert!(
            HostConfig::default()
                .with_request_timeout(too_long)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::default()
                .with_request_timeout(too_long)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::default()
                .with_request_timeout(MAX_REQUEST_TIMEOUT)
                .validate()
                .is_ok()
        );
    }
}
