//! The constant estimator.
//!
//! Each controlled call site owns one [`Estimator`] that learns a constant
//! `c` such that elapsed microseconds ≈ `c * m` for the site's complexity
//! measure `m`. The estimator keeps a shared constant that only descends,
//! per-worker local constants updated freely by their owners, and a
//! one-shot `estimated` bit that records whether any real measurement has
//! been folded in.

use crate::clock;
use crate::config::{self, UpdateRule};
use crate::constants;
use crate::logging;
use crate::perworker::PerWorker;
use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Caller-supplied abstract size of the work at a call site.
pub type Complexity = f64;

/// Sentinels for [`Complexity`] values.
pub mod complexity {
    use super::Complexity;

    /// Forces sequential execution and skips time measurement.
    pub const TINY: Complexity = -1.0;

    /// Not computed yet; forces parallel execution.
    pub const UNDEFINED: Complexity = -2.0;

    #[inline]
    pub fn is_tiny(m: Complexity) -> bool {
        m == TINY
    }

    #[inline]
    pub fn is_undefined(m: Complexity) -> bool {
        m == UNDEFINED
    }
}

/// Cost in microseconds per unit of complexity, or a predicted cost in
/// microseconds.
pub type Cost = f64;

/// Sentinels for [`Cost`] values.
pub mod cost {
    use super::Cost;

    /// Not learned yet.
    pub const UNDEFINED: Cost = -1.0;

    /// Forces parallel execution.
    pub const UNKNOWN: Cost = -2.0;

    /// Forces sequential execution and skips time measurement.
    pub const TINY: Cost = -3.0;

    /// Fallback constant when nothing is known. Finite and conservative:
    /// one microsecond per unit of complexity, so tiny sizes can still
    /// fall below the threshold while sizeable work goes parallel.
    pub const PESSIMISTIC: Cost = 1.0;

    /// A cost is defined when it is a real (non-sentinel) value.
    #[inline]
    pub fn is_defined(c: Cost) -> bool {
        c >= 0.0
    }
}

const MIN_REPORT_SHARED_FACTOR: f64 = 2.0;
const WEIGHTED_AVERAGE_FACTOR: f64 = 8.0;

/// Per-call-site learner of the microseconds-per-unit constant.
pub struct Estimator {
    name: String,
    update_rule: UpdateRule,
    /// `f64` bits of the shared constant; monotone non-increasing once
    /// defined.
    shared: AtomicU64,
    /// Set exactly once, by the first confirmed measurement (or preload).
    estimated: AtomicBool,
    /// Owner-only local constants.
    locals: PerWorker<Cost>,
    /// Owner-only accepted-report counters.
    reports: PerWorker<u64>,
    /// Owner-only wall timestamp of the last accepted report.
    last_report_us: PerWorker<f64>,
}

impl Estimator {
    /// Creates an estimator with the process-default update rule,
    /// registers it, and preloads its constant when the sidecar knows the
    /// name.
    pub fn new(name: impl Into<String>) -> Arc<Estimator> {
        Estimator::with_rule(name, config::update_rule())
    }

    /// Creates an estimator with an explicit update rule.
    pub fn with_rule(name: impl Into<String>, update_rule: UpdateRule) -> Arc<Estimator> {
        let est = Arc::new(Estimator {
            name: name.into(),
            update_rule,
            shared: AtomicU64::new(cost::UNDEFINED.to_bits()),
            estimated: AtomicBool::new(false),
            locals: PerWorker::new(|| cost::UNDEFINED),
            reports: PerWorker::new(|| 0),
            last_report_us: PerWorker::new(|| f64::NEG_INFINITY),
        });
        if let Some(preloaded) = constants::preloaded(&est.name) {
            est.shared.store(preloaded.to_bits(), Ordering::Relaxed);
            est.estimated.store(true, Ordering::Release);
        }
        constants::register(Arc::clone(&est));
        est
    }

    /// Stable identifier, used as the key in the constants sidecar.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while no confirmed measurement has been folded in.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        !self.estimated.load(Ordering::Acquire)
    }

    /// Current shared constant, [`cost::UNDEFINED`] before definition.
    pub fn shared_constant(&self) -> Cost {
        f64::from_bits(self.shared.load(Ordering::Relaxed))
    }

    /// The calling worker's local constant, [`cost::UNDEFINED`] until the
    /// worker has reported.
    pub fn local_constant(&self) -> Cost {
        self.locals.get()
    }

    /// Total accepted reports across workers. Quiescent-point read.
    pub fn report_count(&self) -> u64 {
        self.reports.reduce(|acc, n| acc + n, 0)
    }

    #[inline]
    fn constant(&self) -> Cost {
        let local = self.locals.get();
        if cost::is_defined(local) {
            local
        } else {
            self.shared_constant()
        }
    }

    #[inline]
    fn constant_or_pessimistic(&self) -> Cost {
        let cst = self.constant();
        if cost::is_defined(cst) {
            cst
        } else {
            cost::PESSIMISTIC
        }
    }

    /// Predicted cost in microseconds for complexity `m`.
    ///
    /// Tiny complexity yields [`cost::TINY`]; an undefined complexity is a
    /// caller bug.
    pub fn predict(&self, m: Complexity) -> Cost {
        if complexity::is_tiny(m) {
            return cost::TINY;
        }
        debug_assert!(m >= 0.0, "predict called with undefined complexity");
        let cst = self.constant_or_pessimistic();
        let predicted = cst * m;
        logging::predict(&self.name, m, predicted, cst);
        predicted
    }

    /// Feeds one measurement: complexity `m` (≥ 1, clamped by the caller)
    /// and elapsed cycles.
    ///
    /// The first confirmed measurement wins a one-shot race and is folded
    /// in without averaging; later reports follow the update rule. A
    /// configured minimum report interval suppresses rapid repeats, but
    /// never the first report.
    pub fn report(&self, m: Complexity, elapsed_cycles: f64) {
        debug_assert!(m >= 1.0, "report complexity must be clamped to >= 1");
        let elapsed_us = clock::cycles_to_us(elapsed_cycles);
        let measured = elapsed_us / m;

        let first = self
            .estimated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            // the first report is never throttled, but it still opens the
            // interval for this worker
            self.last_report_us.set(clock::wall_now_us());
        } else if self.throttled() {
            return;
        }

        let previous = self.constant();
        let new_cst = if first || !cost::is_defined(previous) {
            measured
        } else {
            match self.update_rule {
                UpdateRule::WeightedAverage => {
                    (WEIGHTED_AVERAGE_FACTOR * previous + measured)
                        / (WEIGHTED_AVERAGE_FACTOR + 1.0)
                }
                UpdateRule::MonotoneShared => measured,
            }
        };

        self.locals.set(new_cst);
        self.update_shared(new_cst);
        self.reports.with_mine(|n| *n += 1);
        logging::report(&self.name, m, measured, new_cst);
    }

    /// True when this report arrives within the configured minimum
    /// interval of the worker's previous accepted report.
    fn throttled(&self) -> bool {
        let interval = config::min_report_interval_us();
        if interval <= 0.0 {
            return false;
        }
        let now = clock::wall_now_us();
        self.last_report_us.with_mine(|last| {
            if now - *last < interval {
                true
            } else {
                *last = now;
                false
            }
        })
    }

    /// Descends the shared constant toward `new_cst` in multiplicative
    /// steps of `1 / MIN_REPORT_SHARED_FACTOR`. The shared constant never
    /// increases once defined.
    fn update_shared(&self, new_cst: Cost) {
        let backoff = Backoff::new();
        loop {
            let current_bits = self.shared.load(Ordering::Relaxed);
            let current = f64::from_bits(current_bits);
            let next = if !cost::is_defined(current) {
                new_cst
            } else {
                let step = current / MIN_REPORT_SHARED_FACTOR;
                if new_cst < step {
                    step
                } else {
                    return;
                }
            };
            if self
                .shared
                .compare_exchange_weak(
                    current_bits,
                    next.to_bits(),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                logging::update_shared(&self.name, next);
                return;
            }
            backoff.spin();
        }
    }
}

impl std::fmt::Debug for Estimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("name", &self.name)
            .field("shared", &self.shared_constant())
            .field("estimated", &!self.is_undefined())
            .finish()
    }
}
