use serde::Serialize;

/// Lifecycle of a host or pool: `Running → Draining → Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Running,
    Draining,
    Stopped,
}

/// Point-in-time snapshot of a host or pool, taken by its control task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchStatus {
    pub state: DispatchState,
    pub workers: usize,
    pub idle: usize,
    pub busy: usize,
    pub queued: usize,
    pub pending: usize,
    /// Tasks resolved with an output.
    pub completed: u64,
    /// Tasks rejected because the workload returned an error.
    pub failed: u64,
    pub timed_out: u64,
    /// Tasks rejected because their worker died.
    pub crashed: u64,
    /// Replies that matched no pending task.
    pub orphaned: u64,
}
