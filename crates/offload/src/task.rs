use core::fmt;
use rand::{Rng, rng};
use serde::Serialize;
use std::time::Instant;

/// Opaque 128-bit token identifying one in-flight task.
///
/// Drawn from the thread-local RNG, which is ChaCha-based and reseeded
/// periodically. A collision would silently misroute a result, so the pending
/// table additionally re-draws if the token is already in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(u128);

impl TaskId {
    /// Draws a fresh random token.
    pub fn random() -> Self {
        Self(rng().random())
    }

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Identity of a worker unit, unique for the lifetime of its host or pool.
///
/// A respawned worker always receives a new id, so events from a dead worker
/// can never be mistaken for events from its replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkerId(usize);

impl WorkerId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work sent from the control task to a worker.
#[derive(Debug)]
pub struct Task<I> {
    pub id: TaskId,
    pub input: I,
    pub created_at: Instant,
}

impl<I> Task<I> {
    pub fn new(id: TaskId, input: I) -> Self {
        Self {
            id,
            input,
            created_at: Instant::now(),
        }
    }
}

/// The single answer a worker emits for a [`Task`].
///
/// `result` carries the workload output, or the workload's error rendered as
/// a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<O> {
    pub id: TaskId,
    pub result: Result<O, String>,
}
