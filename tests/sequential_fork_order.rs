//! A fork inside a sequential region runs its bodies in program order
//! without touching the fork primitive.

use grainctl::{cstmt, fork2, forks_issued, ByPrediction};
use std::sync::Mutex;

fn cycles_for_us(us: f64) -> f64 {
    us * grainctl::config::ticks_per_microsecond()
}

#[test]
fn sequential_statement_never_issues_primitive_forks() {
    let ctrl = ByPrediction::new("seq_fork_order");
    // predicts well under kappa: the sequential body runs
    ctrl.estimator().report(1000.0, cycles_for_us(1.0));

    let before = forks_issued();
    let order = Mutex::new(Vec::new());

    cstmt(
        &ctrl,
        || 100.0,
        || panic!("predicted sequential, parallel body must not run"),
        || {
            fork2(
                || order.lock().unwrap().push(1),
                || {
                    fork2(
                        || order.lock().unwrap().push(2),
                        || order.lock().unwrap().push(3),
                    );
                },
            );
        },
    );

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(forks_issued(), before);
}
