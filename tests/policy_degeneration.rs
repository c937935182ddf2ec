//! Compile-time-switch analogues: the runtime policy degenerates the
//! controller into a sequential baseline, a parallel elision, or a manual
//! always-fork mode.

use grainctl::{cstmt, fork2, forks_issued, ByPrediction, Policy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[test]
fn policies_degenerate_the_controller() {
    let ctrl = ByPrediction::new("policy_site");

    // sequential baseline: sequential body, no learning
    grainctl::config::set_policy(Policy::SequentialBaseline);
    let which = Mutex::new(Vec::new());
    cstmt(
        &ctrl,
        || 1e9,
        || which.lock().unwrap().push("par"),
        || which.lock().unwrap().push("seq"),
    );
    let (a, b) = fork2(|| 1, || 2);
    assert_eq!((a, b), (1, 2));
    assert_eq!(*which.lock().unwrap(), vec!["seq"]);
    assert!(ctrl.estimator().is_undefined());

    // parallel elision: parallel body, no learning, forks stay inline
    grainctl::config::set_policy(Policy::ParallelElision);
    let before = forks_issued();
    let which = Mutex::new(Vec::new());
    cstmt(
        &ctrl,
        || 1e9,
        || which.lock().unwrap().push("par"),
        || which.lock().unwrap().push("seq"),
    );
    let order = Mutex::new(Vec::new());
    fork2(
        || order.lock().unwrap().push(1),
        || order.lock().unwrap().push(2),
    );
    assert_eq!(*which.lock().unwrap(), vec!["par"]);
    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    assert_eq!(forks_issued(), before);
    assert!(ctrl.estimator().is_undefined());

    // manual: bypass the controller, always primitive-fork
    grainctl::config::set_policy(Policy::Manual);
    let before = forks_issued();
    let hits = AtomicUsize::new(0);
    cstmt(
        &ctrl,
        || 1e9,
        || {
            fork2(
                || hits.fetch_add(1, Ordering::SeqCst),
                || hits.fetch_add(1, Ordering::SeqCst),
            );
        },
        || panic!("manual runs the parallel body"),
    );
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(forks_issued(), before + 1);
    assert!(ctrl.estimator().is_undefined());

    grainctl::config::set_policy(Policy::ByPrediction);
}
