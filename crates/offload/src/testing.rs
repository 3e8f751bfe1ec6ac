//! Workloads and helpers used by the unit tests.

use crate::Workload;
use core::convert::Infallible;
use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Sleeps for `input` milliseconds, then echoes the input.
#[derive(Debug, Default)]
pub struct Sleepy;

impl Workload for Sleepy {
    type Input = u64;
    type Output = u64;
    type Error = Infallible;

    fn compute(&self, millis: u64) -> Result<u64, Infallible> {
        std::thread::sleep(Duration::from_millis(millis));
        Ok(millis)
    }
}

/// Panics on input `0` after a short delay; otherwise sleeps for `input`
/// milliseconds and returns `input * 2`.
#[derive(Debug, Default)]
pub struct Crashy;

impl Workload for Crashy {
    type Input = u64;
    type Output = u64;
    type Error = Infallible;

    fn compute(&self, input: u64) -> Result<u64, Infallible> {
        if input == 0 {
            std::thread::sleep(Duration::from_millis(50));
            panic!("intentional worker crash");
        }
        std::thread::sleep(Duration::from_millis(input));
        Ok(input * 2)
    }
}

/// Records how many computations run at the same time.
#[derive(Debug, Default, Clone)]
pub struct Gauge {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Workload for Gauge {
    type Input = u64;
    type Output = u64;
    type Error = Infallible;

    fn compute(&self, millis: u64) -> Result<u64, Infallible> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(millis));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(millis)
    }
}

/// Polls `probe` until it reports `true`, failing the test after five
/// seconds.
pub async fn eventually<F, Fut>(mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !probe().await {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Records the inputs it sees in execution order, sleeping for `input`
/// milliseconds each time.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<u64>>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<u64> {
        self.seen.lock().unwrap().clone()
    }
}

impl Workload for Recorder {
    type Input = u64;
    type Output = u64;
    type Error = Infallible;

    fn compute(&self, millis: u64) -> Result<u64, Infallible> {
        self.seen.lock().unwrap().push(millis);
        std::thread::sleep(Duration::from_millis(millis));
        Ok(millis)
    }
}
