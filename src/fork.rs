//! Granularity-controlled fork/join.
//!
//! [`fork2`] splits into two tasks only when the current execution mode
//! permits parallelism, propagating the mode to both children. The
//! primitive fork is delegated to the external work-stealing runtime
//! (`rayon::join` under the `rayon` feature); without a runtime it
//! degrades to inline sequential execution.

use crate::config::{self, Policy, Strategy};
use crate::logging;
use crate::measure;
use crate::mode::{self, ExecutionMode};
use std::sync::atomic::{AtomicU64, Ordering};

static FORKS_ISSUED: AtomicU64 = AtomicU64::new(0);

/// Number of primitive forks issued so far in this process.
pub fn forks_issued() -> u64 {
    FORKS_ISSUED.load(Ordering::Relaxed)
}

/// Runs both bodies, in parallel when a runtime is linked, and joins.
///
/// No promise is made about which worker resumes after the join.
pub fn primitive_fork2<F1, F2, R1, R2>(f1: F1, f2: F2) -> (R1, R2)
where
    F1: FnOnce() -> R1 + Send,
    F2: FnOnce() -> R2 + Send,
    R1: Send,
    R2: Send,
{
    FORKS_ISSUED.fetch_add(1, Ordering::Relaxed);
    logging::fork();
    #[cfg(feature = "rayon")]
    {
        rayon::join(f1, f2)
    }
    #[cfg(not(feature = "rayon"))]
    {
        (f1(), f2())
    }
}

/// Mode-respecting fork: sequentialises inside sequential regions (and
/// inside honest bootstrapping measurements), otherwise forks with the
/// current mode pushed on each child's worker.
pub fn fork2<F1, F2, R1, R2>(f1: F1, f2: F2) -> (R1, R2)
where
    F1: FnOnce() -> R1 + Send,
    F2: FnOnce() -> R2 + Send,
    R1: Send,
    R2: Send,
{
    match config::policy() {
        Policy::SequentialBaseline | Policy::ParallelElision => return (f1(), f2()),
        Policy::Manual => return primitive_fork2(f1, f2),
        Policy::ByPrediction => {}
    }

    let current = mode::current();
    let sequentialise = matches!(
        current,
        ExecutionMode::Sequential | ExecutionMode::ForceSequential
    ) || (current == ExecutionMode::Unknown && config::strategy() == Strategy::Honest);
    if sequentialise {
        return (f1(), f2());
    }

    if current == ExecutionMode::Unknown && config::strategy() == Strategy::Optimistic {
        // close the open interval around the fork and recombine the
        // per-branch work sums after the join: the measurement tracks
        // serial work, not the wall-clock span
        measure::pause();
        let ((r1, left), (r2, right)) = primitive_fork2(
            || measured_branch(current, f1),
            || measured_branch(current, f2),
        );
        measure::add(left + right);
        measure::resume();
        (r1, r2)
    } else {
        primitive_fork2(
            || mode::with_mode(current, f1),
            || mode::with_mode(current, f2),
        )
    }
}

/// Runs one branch inside a fresh measurement on whichever worker picks
/// it up, returning the branch's accumulated work.
fn measured_branch<F, R>(current: ExecutionMode, f: F) -> (R, f64)
where
    F: FnOnce() -> R,
{
    let open = measure::open();
    let result = mode::with_mode(current, f);
    let work = measure::close(open);
    (result, work)
}
