//! Per-worker timing accumulators for bootstrapping measurements.
//!
//! While an estimator is still undefined, a controlled statement times its
//! parallel body end-to-end. The accumulated quantity is `work`: cycles
//! attributable to the open measurement on this worker, approximating the
//! serial sum of the region rather than its wall-clock span. A fork closes
//! the interval before splitting and recombines per-branch work after the
//! join; nested statements under the optimistic strategy add compensation
//! credit directly to `work`.

use crate::clock::{self, Cycles};
use crate::perworker::PerWorker;
use lazy_static::lazy_static;

struct MeasureState {
    work: f64,
    timer: Cycles,
    nested_unknown: u32,
}

lazy_static! {
    static ref STATE: PerWorker<MeasureState> = PerWorker::new(|| MeasureState {
        work: 0.0,
        timer: 0,
        nested_unknown: 0,
    });
}

/// Saved accumulator state, restored when a measurement closes.
pub(crate) struct OpenMeasurement {
    saved_work: f64,
    saved_timer: Cycles,
}

/// Opens a measurement on the calling worker: saves the enclosing state
/// and starts a fresh interval.
pub(crate) fn open() -> OpenMeasurement {
    STATE.with_mine(|s| {
        let saved = OpenMeasurement {
            saved_work: s.work,
            saved_timer: s.timer,
        };
        s.work = 0.0;
        s.timer = clock::now();
        s.nested_unknown += 1;
        saved
    })
}

/// Closes the measurement, returning total accumulated cycles and
/// restoring the enclosing state.
pub(crate) fn close(saved: OpenMeasurement) -> f64 {
    STATE.with_mine(|s| {
        let total = s.work + clock::since(s.timer);
        s.work = saved.saved_work;
        s.timer = saved.saved_timer;
        s.nested_unknown -= 1;
        total
    })
}

/// Folds the open interval into `work` ahead of a fork.
pub(crate) fn pause() {
    STATE.with_mine(|s| s.work += clock::since(s.timer));
}

/// Reopens the interval after a join.
pub(crate) fn resume() {
    STATE.with_mine(|s| s.timer = clock::now());
}

/// Adds cycles to the open measurement: per-branch totals after a join,
/// or compensation credit for nested statements. Credit may be negative.
pub(crate) fn add(cycles: f64) {
    STATE.with_mine(|s| s.work += cycles);
}

/// True while a bootstrapping measurement is open on the calling worker.
pub(crate) fn in_unknown() -> bool {
    STATE.with_mine(|s| s.nested_unknown > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_restores_enclosing_state() {
        std::thread::spawn(|| {
            assert!(!in_unknown());
            let outer = open();
            assert!(in_unknown());
            add(100.0);

            let inner = open();
            add(7.0);
            let inner_total = close(inner);
            assert!(inner_total >= 7.0);

            // the inner measurement must not leak into the outer work sum
            let outer_total = close(outer);
            assert!(outer_total >= 100.0);
            assert!(!in_unknown());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_pause_resume_accumulates() {
        std::thread::spawn(|| {
            let m = open();
            pause();
            add(50.0);
            resume();
            let total = close(m);
            assert!(total >= 50.0);
        })
        .join()
        .unwrap();
    }
}
