//! Execution modes and the per-worker dynamic-scope cell.
//!
//! Every worker carries a stack of execution modes. The bottom entry is
//! [`ExecutionMode::Parallel`] and the stack is never empty; controlled
//! statements and forks push a mode for the dynamic extent of a body and
//! pop it on every exit path.

use crate::perworker::PerWorker;
use lazy_static::lazy_static;

/// Mode governing nested granularity decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Caller demands parallel execution; overrides any prediction.
    ForceParallel,
    /// Caller demands sequential execution; overrides any prediction.
    ForceSequential,
    /// Inside a sequential region; nested statements stay sequential.
    Sequential,
    /// Inside a parallel region; nested decisions follow prediction.
    Parallel,
    /// Inside a bootstrapping measurement: the estimator is undefined and
    /// one cold run is being timed end-to-end while running parallel code.
    Unknown,
}

/// Combines the caller mode `p` with the callee mode `c`.
///
/// Force* always wins; otherwise a sequential caller sticks; otherwise the
/// callee decides.
#[inline]
pub fn combine(p: ExecutionMode, c: ExecutionMode) -> ExecutionMode {
    use ExecutionMode::*;
    if c == ForceParallel || c == ForceSequential {
        return c;
    }
    if p == Sequential {
        return Sequential;
    }
    c
}

lazy_static! {
    static ref MODE_STACK: PerWorker<Vec<ExecutionMode>> =
        PerWorker::new(|| vec![ExecutionMode::Parallel]);
}

/// Reads the calling worker's current mode.
#[inline]
pub fn current() -> ExecutionMode {
    MODE_STACK.with_mine(|stack| *stack.last().expect("mode stack never empty"))
}

/// Number of mode frames on the calling worker, counting the base frame.
pub fn stack_depth() -> usize {
    MODE_STACK.with_mine(|stack| stack.len())
}

struct ModeGuard;

impl Drop for ModeGuard {
    fn drop(&mut self) {
        MODE_STACK.with_mine(|stack| {
            stack.pop();
            debug_assert!(!stack.is_empty(), "mode stack underflow");
        });
    }
}

/// Runs `body` with `mode` pushed on the calling worker's stack.
///
/// The pop happens on every exit path, including unwinding.
pub fn with_mode<R>(mode: ExecutionMode, body: impl FnOnce() -> R) -> R {
    MODE_STACK.with_mine(|stack| stack.push(mode));
    let _guard = ModeGuard;
    body()
}
