//! Controlled statements.
//!
//! A controlled statement wraps a call site that has both a parallel and a
//! sequential rendition. It consults the call site's estimator, picks an
//! execution mode, pushes it for the duration of the chosen body, and
//! feeds measured elapsed time back to the estimator when the run was
//! sequential or a bootstrapping measurement.

use crate::clock;
use crate::config::{self, Policy, Strategy};
use crate::estimator::{complexity, Complexity, Estimator};
use crate::logging;
use crate::measure;
use crate::mode::{self, ExecutionMode};
use std::sync::Arc;

/// Prediction-driven control for one call site; owns the estimator.
pub struct ByPrediction {
    estimator: Arc<Estimator>,
}

impl ByPrediction {
    /// Creates the control, constructing (and registering) its estimator
    /// under `name`.
    pub fn new(name: impl Into<String>) -> ByPrediction {
        ByPrediction {
            estimator: Estimator::new(name),
        }
    }

    /// The call site's estimator.
    pub fn estimator(&self) -> &Arc<Estimator> {
        &self.estimator
    }
}

/// Runs `body` in a region that demands parallel execution regardless of
/// prediction.
pub fn force_parallel<R>(body: impl FnOnce() -> R) -> R {
    mode::with_mode(ExecutionMode::ForceParallel, body)
}

/// Runs `body` in a region that demands sequential execution regardless of
/// prediction.
pub fn force_sequential<R>(body: impl FnOnce() -> R) -> R {
    mode::with_mode(ExecutionMode::ForceSequential, body)
}

/// Picks the callee mode for complexity `m` at a site with estimator
/// `est`. Tiny complexity short-circuits everything, including
/// bootstrapping, so it never perturbs the estimator.
fn decide(est: &Estimator, m: Complexity) -> ExecutionMode {
    if complexity::is_tiny(m) {
        return ExecutionMode::Sequential;
    }
    if config::strategy() == Strategy::Honest && measure::in_unknown() {
        // an outer measurement is open on this worker: stay sequential
        // and learn from the timed run instead
        return ExecutionMode::Sequential;
    }
    if est.is_undefined() {
        return ExecutionMode::Unknown;
    }
    if complexity::is_undefined(m) {
        return ExecutionMode::Parallel;
    }
    if est.predict(m.max(1.0)) <= config::kappa() {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Parallel
    }
}

fn run_sequential_reporting<R>(est: &Estimator, m: Complexity, seq_body: impl FnOnce() -> R) -> R {
    let start = clock::now();
    let result = mode::with_mode(ExecutionMode::Sequential, seq_body);
    let elapsed = clock::since(start);
    est.report(m.max(1.0), elapsed);
    logging::run(
        logging::Run::Sequential,
        est.name(),
        m,
        clock::cycles_to_us(elapsed),
    );
    result
}

fn run_unknown<R>(
    est: &Estimator,
    m: Complexity,
    caller: ExecutionMode,
    par_body: impl FnOnce() -> R,
) -> R {
    let compensate_outer =
        caller == ExecutionMode::Unknown && config::strategy() == Strategy::Optimistic;
    let wall_start = clock::now();
    let open = measure::open();
    let result = mode::with_mode(ExecutionMode::Unknown, par_body);
    let total = measure::close(open);
    est.report(m.max(1.0), total);
    logging::run(
        logging::Run::Unknown,
        est.name(),
        m,
        clock::cycles_to_us(total),
    );
    if compensate_outer {
        // the enclosing measurement saw our wall-clock span; swap it for
        // the now-defined prediction of this region's work
        let elapsed = clock::since(wall_start);
        let predicted_cycles = est.predict(m.max(1.0)) * config::ticks_per_microsecond();
        measure::add(predicted_cycles - elapsed);
    }
    result
}

fn run_parallel<R>(
    est: &Estimator,
    m: Complexity,
    chosen: ExecutionMode,
    caller: ExecutionMode,
    par_body: impl FnOnce() -> R,
) -> R {
    let compensate_outer = caller == ExecutionMode::Unknown
        && config::strategy() == Strategy::Optimistic
        && !complexity::is_undefined(m);
    if !compensate_outer {
        return mode::with_mode(chosen, par_body);
    }
    let start = clock::now();
    let result = mode::with_mode(chosen, par_body);
    let elapsed = clock::since(start);
    logging::run(
        logging::Run::Parallel,
        est.name(),
        m,
        clock::cycles_to_us(elapsed),
    );
    let predicted_cycles = est.predict(m.max(1.0)) * config::ticks_per_microsecond();
    measure::add(predicted_cycles - elapsed);
    result
}

/// Controlled statement with one complexity measure and two bodies.
///
/// The complexity is evaluated once; the chosen body runs under the
/// combined execution mode. Sequential runs (other than tiny ones) and
/// bootstrapping runs report their elapsed time to the estimator.
pub fn cstmt<M, P, S, R>(ctrl: &ByPrediction, complexity_fn: M, par_body: P, seq_body: S) -> R
where
    M: FnOnce() -> Complexity,
    P: FnOnce() -> R,
    S: FnOnce() -> R,
{
    match config::policy() {
        Policy::SequentialBaseline => return seq_body(),
        Policy::ParallelElision | Policy::Manual => return par_body(),
        Policy::ByPrediction => {}
    }
    let est = ctrl.estimator();
    let m = complexity_fn();
    let caller = mode::current();
    let chosen = mode::combine(caller, decide(est, m));
    match chosen {
        ExecutionMode::Sequential => {
            if complexity::is_tiny(m) {
                mode::with_mode(chosen, seq_body)
            } else {
                run_sequential_reporting(est, m, seq_body)
            }
        }
        ExecutionMode::ForceSequential => mode::with_mode(chosen, seq_body),
        ExecutionMode::Unknown => run_unknown(est, m, caller, par_body),
        ExecutionMode::Parallel | ExecutionMode::ForceParallel => {
            run_parallel(est, m, chosen, caller, par_body)
        }
    }
}

/// Controlled statement with a single body used for both renditions.
///
/// Sequential execution still reports, so forced-sequential regions keep
/// feeding the estimator.
pub fn cstmt_single<M, F, R>(ctrl: &ByPrediction, complexity_fn: M, body: F) -> R
where
    M: FnOnce() -> Complexity,
    F: FnOnce() -> R,
{
    match config::policy() {
        Policy::SequentialBaseline | Policy::ParallelElision | Policy::Manual => return body(),
        Policy::ByPrediction => {}
    }
    let est = ctrl.estimator();
    let m = complexity_fn();
    let caller = mode::current();
    let chosen = mode::combine(caller, decide(est, m));
    match chosen {
        ExecutionMode::Sequential => {
            if complexity::is_tiny(m) {
                mode::with_mode(chosen, body)
            } else {
                run_sequential_reporting(est, m, body)
            }
        }
        ExecutionMode::ForceSequential => mode::with_mode(chosen, body),
        ExecutionMode::Unknown => run_unknown(est, m, caller, body),
        ExecutionMode::Parallel | ExecutionMode::ForceParallel => {
            run_parallel(est, m, chosen, caller, body)
        }
    }
}

/// Controlled statement with distinct complexity measures for the two
/// renditions.
///
/// Inside a sequential region only `seq_complexity` is consulted, so the
/// parallel measure (and body) are skipped entirely.
pub fn cstmt_paired<MP, MS, P, S, R>(
    ctrl: &ByPrediction,
    par_complexity: MP,
    seq_complexity: MS,
    par_body: P,
    seq_body: S,
) -> R
where
    MP: FnOnce() -> Complexity,
    MS: FnOnce() -> Complexity,
    P: FnOnce() -> R,
    S: FnOnce() -> R,
{
    let sequential_region = config::policy() == Policy::ByPrediction
        && mode::current() == ExecutionMode::Sequential;
    if sequential_region {
        cstmt(ctrl, seq_complexity, par_body, seq_body)
    } else {
        cstmt(ctrl, par_complexity, par_body, seq_body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::cost;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn cycles_for_us(us: f64) -> f64 {
        us * config::ticks_per_microsecond()
    }

    fn seed(ctrl: &ByPrediction, constant_us_per_unit: f64) {
        ctrl.estimator()
            .report(1000.0, cycles_for_us(constant_us_per_unit * 1000.0));
    }

    #[test]
    fn test_tiny_runs_sequential_without_reporting() {
        let ctrl = ByPrediction::new("cstmt_tiny");
        let par_ran = AtomicBool::new(false);
        let seq_ran = AtomicBool::new(false);

        cstmt(
            &ctrl,
            || complexity::TINY,
            || par_ran.store(true, Ordering::SeqCst),
            || seq_ran.store(true, Ordering::SeqCst),
        );

        assert!(seq_ran.load(Ordering::SeqCst));
        assert!(!par_ran.load(Ordering::SeqCst));
        // the bootstrap was skipped: still no measurement
        assert!(ctrl.estimator().is_undefined());
    }

    #[test]
    fn test_small_predicted_cost_runs_sequential_and_reports() {
        let ctrl = ByPrediction::new("cstmt_small");
        seed(&ctrl, 0.001); // 0.001 us per unit
        let before = ctrl.estimator().report_count();

        let seq_ran = AtomicBool::new(false);
        // predicted = 0.001 * 1000 = 1us <= kappa
        cstmt(&ctrl, || 1000.0, || (), || seq_ran.store(true, Ordering::SeqCst));

        assert!(seq_ran.load(Ordering::SeqCst));
        assert_eq!(ctrl.estimator().report_count(), before + 1);
    }

    #[test]
    fn test_large_predicted_cost_runs_parallel_without_reporting() {
        let ctrl = ByPrediction::new("cstmt_large");
        seed(&ctrl, 10.0);
        let before = ctrl.estimator().report_count();

        let par_ran = AtomicBool::new(false);
        // predicted = 10 * 1e6 us >> kappa
        cstmt(&ctrl, || 1e6, || par_ran.store(true, Ordering::SeqCst), || ());

        assert!(par_ran.load(Ordering::SeqCst));
        assert_eq!(ctrl.estimator().report_count(), before);
    }

    #[test]
    fn test_undefined_complexity_runs_parallel() {
        let ctrl = ByPrediction::new("cstmt_undef_m");
        seed(&ctrl, 10.0);
        let par_ran = AtomicBool::new(false);
        cstmt(
            &ctrl,
            || complexity::UNDEFINED,
            || par_ran.store(true, Ordering::SeqCst),
            || (),
        );
        assert!(par_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_forced_sequential_region_still_learns() {
        let ctrl = ByPrediction::new("cstmt_forced");
        seed(&ctrl, 0.001);
        let before = ctrl.estimator().report_count();

        let seq_ran = AtomicBool::new(false);
        force_sequential(|| {
            // sequential by prediction; the timed run reports as usual
            cstmt(&ctrl, || 100.0, || (), || seq_ran.store(true, Ordering::SeqCst));
        });

        assert!(seq_ran.load(Ordering::SeqCst));
        assert_eq!(ctrl.estimator().report_count(), before + 1);
    }

    #[test]
    fn test_sequential_region_pins_nested_statements() {
        let ctrl_outer = ByPrediction::new("cstmt_nest_outer");
        let ctrl_inner = ByPrediction::new("cstmt_nest_inner");
        seed(&ctrl_outer, 0.0001);
        seed(&ctrl_inner, 10.0);

        let inner_mode = std::sync::Mutex::new(None);
        cstmt(
            &ctrl_outer,
            || 1000.0, // sequential by prediction
            || (),
            || {
                // inner would be parallel by prediction, but the region is
                // sequential
                cstmt_single(&ctrl_inner, || 1e6, || {
                    *inner_mode.lock().unwrap() = Some(mode::current());
                });
            },
        );

        assert_eq!(*inner_mode.lock().unwrap(), Some(ExecutionMode::Sequential));
    }

    #[test]
    fn test_single_body_sequential_still_reports() {
        let ctrl = ByPrediction::new("cstmt_single_report");
        seed(&ctrl, 0.001);
        let before = ctrl.estimator().report_count();
        cstmt_single(&ctrl, || 100.0, || ());
        assert_eq!(ctrl.estimator().report_count(), before + 1);
    }

    #[test]
    fn test_paired_complexity_uses_seq_measure_in_sequential_region() {
        let ctrl = ByPrediction::new("cstmt_paired");
        seed(&ctrl, 1.0);
        let par_measured = AtomicBool::new(false);

        mode::with_mode(ExecutionMode::Sequential, || {
            cstmt_paired(
                &ctrl,
                || {
                    par_measured.store(true, Ordering::SeqCst);
                    1e6
                },
                || 10.0,
                || (),
                || (),
            );
        });

        assert!(!par_measured.load(Ordering::SeqCst));
    }

    #[test]
    fn test_bootstrap_defines_estimator() {
        let ctrl = ByPrediction::new("cstmt_bootstrap");
        assert!(ctrl.estimator().is_undefined());

        let seen_mode = std::sync::Mutex::new(None);
        cstmt(
            &ctrl,
            || 1000.0,
            || {
                *seen_mode.lock().unwrap() = Some(mode::current());
            },
            || (),
        );

        assert_eq!(*seen_mode.lock().unwrap(), Some(ExecutionMode::Unknown));
        assert!(!ctrl.estimator().is_undefined());
        assert!(cost::is_defined(ctrl.estimator().shared_constant()));
    }
}
