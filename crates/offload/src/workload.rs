use core::fmt;

/// A pure, synchronous computation executed on a worker thread.
///
/// Implementations must not keep cross-task state: identical inputs are
/// expected to produce identical outputs, regardless of which worker runs
/// them or in which order tasks arrive.
///
/// Returning `Err` is a normal, per-task failure and is delivered to the
/// caller as [`Error::TaskFailed`]. Panicking kills the worker thread and is
/// reported as [`Error::WorkerCrashed`].
///
/// [`Error::TaskFailed`]: crate::Error::TaskFailed
/// [`Error::WorkerCrashed`]: crate::Error::WorkerCrashed
pub trait Workload: Send + Sync + 'static {
    type Input: Send + fmt::Debug + 'static;
    type Output: Send + fmt::Debug + 'static;
    type Error: fmt::Display;

    fn compute(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}

/// Largest `n` whose Fibonacci number fits in a `u64`.
pub const MAX_FIBONACCI_INPUT: u64 = 93;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FibonacciError {
    #[error("fibonacci({n}) overflows u64 (max input is {MAX_FIBONACCI_INPUT})")]
    Overflow { n: u64 },
}

/// Placeholder CPU-bound workload: naive recursive Fibonacci.
///
/// Deliberately exponential so that moderately sized inputs keep a worker
/// busy for a noticeable amount of time.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fibonacci;

impl Workload for Fibonacci {
    type Input = u64;
    type Output = u64;
    type Error = FibonacciError;

    fn compute(&self, n: u64) -> Result<u64, FibonacciError> {
        if n > MAX_FIBONACCI_INPUT {
            return Err(FibonacciError::Overflow { n });
        }
        Ok(fibonacci(n))
    }
}

/// `fibonacci(0) = 0`, `fibonacci(1) = 1`, `fibonacci(n) = fibonacci(n - 1) +
/// fibonacci(n - 2)`.
///
/// Callers must keep `n <= MAX_FIBONACCI_INPUT`.
pub fn fibonacci(n: u64) -> u64 {
    if n < 2 {
        n
    } else {
        fibonacci(n - 1) + fibonacci(n - 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iterative(n: u64) -> u64 {
        let (mut a, mut b) = (0_u64, 1_u64);
        for _ in 0..n {
            // The final step computes fib(n + 1), which overflows for n = 93.
            let next = a.wrapping_add(b);
            a = b;
            b = next;
        }
        a
    }

    #[test]
    fn base_cases() {
        assert_eq!(Fibonacci.compute(0), Ok(0));
        assert_eq!(Fibonacci.compute(1), Ok(1));
    }

    #[test]
    fn compute_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(Fibonacci.compute(10), Ok(55));
        }
    }

    #[test]
    fn matches_iterative_definition() {
        for n in 0..=25 {
            assert_eq!(fibonacci(n), iterative(n), "n = {n}");
        }
    }

    #[test]
    fn rejects_inputs_that_overflow() {
        assert_eq!(
            Fibonacci.compute(MAX_FIBONACCI_INPUT + 1),
            Err(FibonacciError::Overflow { n: 94 })
        );
        assert_eq!(iterative(MAX_FIBONACCI_INPUT), 12_200_160_415_121_876_738);
    }
}
