//! A fresh estimator bootstraps through one Unknown-mode run, then
//! follows prediction.

use grainctl::{cstmt, ByPrediction, ExecutionMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

fn spin_for(d: Duration) {
    let start = Instant::now();
    while start.elapsed() < d {
        std::hint::spin_loop();
    }
}

#[test]
fn undefined_estimator_bootstraps_then_goes_parallel() {
    let ctrl = ByPrediction::new("bootstrap");
    assert!(ctrl.estimator().is_undefined());

    // first call: the estimator is undefined, so the parallel body runs
    // under a timed Unknown measurement
    let first_mode = Mutex::new(None);
    cstmt(
        &ctrl,
        || 1e6,
        || {
            *first_mode.lock().unwrap() = Some(grainctl::mode::current());
            spin_for(Duration::from_millis(10));
        },
        || panic!("bootstrap must run the parallel body"),
    );
    assert_eq!(*first_mode.lock().unwrap(), Some(ExecutionMode::Unknown));
    assert!(!ctrl.estimator().is_undefined());

    // second call with the same complexity: ~10ms measured over 1e6 units
    // predicts far above kappa, so the parallel body runs outright
    let par_ran = AtomicBool::new(false);
    let seq_ran = AtomicBool::new(false);
    let second_mode = Mutex::new(None);
    cstmt(
        &ctrl,
        || 1e6,
        || {
            *second_mode.lock().unwrap() = Some(grainctl::mode::current());
            par_ran.store(true, Ordering::SeqCst);
        },
        || seq_ran.store(true, Ordering::SeqCst),
    );
    assert_eq!(*second_mode.lock().unwrap(), Some(ExecutionMode::Parallel));
    assert!(par_ran.load(Ordering::SeqCst));
    assert!(!seq_ran.load(Ordering::SeqCst));
}
