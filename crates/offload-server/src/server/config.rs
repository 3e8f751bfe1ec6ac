use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use offload::{HostConfig, MAX_FIBONACCI_INPUT, MAX_REQUEST_TIMEOUT, PoolConfig};

/// Dispatch topology used by the server.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// A single dedicated worker thread.
    Host,
    /// A bounded pool of worker threads with a FIFO queue.
    Pool,
}

/// Runtime configuration for the `offload-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single machine.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "offload-server",
    version,
    about = "An HTTP service that offloads Fibonacci computations to worker threads"
)]
pub struct CliArgs {
    /// Whether to run one dedicated worker (`host`) or a pool (`pool`).
    ///
    /// Environment variable: `DISPATCH_MODE`
    #[arg(long, env = "DISPATCH_MODE", value_enum, default_value_t = DispatchMode::Pool)]
    pub dispatch_mode: DispatchMode,

    /// Upper bound on concurrently running worker threads in pool mode.
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `MAX_WORKERS`
    #[arg(long, env = "MAX_WORKERS", default_value_t = num_cpus::get())]
    pub max_workers: usize,

    /// Retire pool workers after they sit idle this long. When unset every
    /// worker is started up front and kept for the lifetime of the process.
    ///
    /// Environment variable: `WORKER_IDLE_TIMEOUT_MS`
    #[arg(long, env = "WORKER_IDLE_TIMEOUT_MS")]
    pub worker_idle_timeout_ms: Option<u64>,

    /// Default deadline applied to every task. When unset tasks wait for as
    /// long as the computation takes.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Maximum number of tasks waiting for a free pool worker. `0` disables
    /// queuing; unset means unbounded.
    ///
    /// Environment variable: `MAX_QUEUED`
    #[arg(long, env = "MAX_QUEUED")]
    pub max_queued: Option<usize>,

    /// Seconds to wait for workers to exit during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Largest `n` accepted by `GET /compute/{n}`. The naive recursion is
    /// exponential, so keep this well below the overflow limit of 93.
    ///
    /// Environment variable: `MAX_INPUT`
    #[arg(long, env = "MAX_INPUT", default_value_t = 45)]
    pub max_input: u64,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub server_addr: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub dispatch_mode: DispatchMode,
    pub max_workers: usize,
    pub worker_idle_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub max_queued: Option<usize>,
    pub shutdown_timeout: Duration,
    pub max_input: u64,
    pub server_addr: String,
}

impl ServerConfig {
    pub fn host_config(&self) -> HostConfig {
        let config = HostConfig::default().with_shutdown_timeout(self.shutdown_timeout);
        match self.request_timeout {
            Some(timeout) => config.with_request_timeout(timeout),
            None => config,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        let mut config = PoolConfig::default()
            .with_max_workers(self.max_workers)
            .with_shutdown_timeout(self.shutdown_timeout);
        if let Some(timeout) = self.worker_idle_timeout {
            config = config.with_worker_idle_timeout(timeout);
        }
        if let Some(timeout) = self.request_timeout {
            config = config.with_request_timeout(timeout);
        }
        if let Some(max_queued) = self.max_queued {
            config = config.with_max_queued(max_queued);
        }
        config
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_workers == 0 {
            bail!("MAX_WORKERS must be greater than 0");
        }

        if args.worker_idle_timeout_ms == Some(0) {
            bail!("WORKER_IDLE_TIMEOUT_MS must be greater than 0 when set");
        }

        if args.request_timeout_ms == Some(0) {
            bail!("REQUEST_TIMEOUT_MS must be greater than 0 when set");
        }

        if let Some(ms) = args.request_timeout_ms
            && u128::from(ms) > MAX_REQUEST_TIMEOUT.as_millis()
        {
            bail!(
                "REQUEST_TIMEOUT_MS ({}) exceeds the maximum deadline ({})",
                ms,
                MAX_REQUEST_TIMEOUT.as_millis()
            );
        }

        if args.shutdown_timeout == 0 {
            bail!("SHUTDOWN_TIMEOUT must be greater than 0");
        }

        if args.max_input > MAX_FIBONACCI_INPUT {
            bail!(
                "MAX_INPUT ({}) exceeds the largest Fibonacci input that fits in 64 bits ({})",
                args.max_input,
                MAX_FIBONACCI_INPUT
            );
        }

        Ok(Self {
            dispatch_mode: args.dispatch_mode,
            max_workers: args.max_workers,
            worker_idle_timeout: args.worker_idle_timeout_ms.map(Duration::from_millis),
            request_timeout: args.request_timeout_ms.map(Duration::from_millis),
            max_queued: args.max_queued,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            max_input: args.max_input,
            server_addr: args.server_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = core::iter::once("offload-server").chain(args.iter().copied());
        let args = CliArgs::try_parse_from(argv)?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn defaults_select_an_eager_pool() {
        let config = parse(&["--max-workers", "4"]).unwrap();
        assert_eq!(config.dispatch_mode, DispatchMode::Pool);
        assert_eq!(config.max_input, 45);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));

        let pool = config.pool_config();
        assert_eq!(pool.max_workers, 4);
        assert!(!pool.is_elastic());
        assert_eq!(pool.request_timeout, None);
        assert_eq!(pool.max_queued, None);
    }

    #[test]
    fn optional_limits_flow_into_the_pool() {
        let config = parse(&[
            "--dispatch-mode",
            "pool",
            "--max-workers",
            "2",
            "--worker-idle-timeout-ms",
            "500",
            "--request-timeout-ms",
            "250",
            "--max-queued",
            "0",
        ])
        .unwrap();

        let pool = config.pool_config();
        assert!(pool.is_elastic());
        assert_eq!(pool.worker_idle_timeout, Some(Duration::from_millis(500)));
        assert_eq!(pool.request_timeout, Some(Duration::from_millis(250)));
        assert_eq!(pool.max_queued, Some(0));
    }

    #[test]
    fn host_mode_carries_the_request_timeout() {
        let config = parse(&["--dispatch-mode", "host", "--request-timeout-ms", "100"]).unwrap();
        assert_eq!(config.dispatch_mode, DispatchMode::Host);
        assert_eq!(
            config.host_config().request_timeout,
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(parse(&["--max-workers", "0"]).is_err());
        assert!(parse(&["--request-timeout-ms", "0"]).is_err());
        let too_long = (MAX_REQUEST_TIMEOUT.as_millis() + 1).to_string();
        assert!(parse(&["--request-timeout-ms", &too_long]).is_err());
        assert!(parse(&["--worker-idle-timeout-ms", "0"]).is_err());
        assert!(parse(&["--shutdown-timeout", "0"]).is_err());
        assert!(parse(&["--max-input", "94"]).is_err());
        assert!(parse(&["--max-input", "93"]).is_ok());
    }
}
