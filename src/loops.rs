//! Range-based parallel-for driver.
//!
//! The canonical client of the controller: a loop over `lo..hi` whose
//! complexity over any sub-range comes from a caller-supplied range
//! function. The driver asks the controller once per sub-range; a
//! parallel verdict splits the range in half and forks, a sequential
//! verdict hands the whole sub-range to the sequential body.

use crate::cstmt::{cstmt, ByPrediction};
use crate::estimator::Complexity;
use crate::fork::fork2;

/// Parallel loop with explicit range complexity and sequential body.
pub fn parallel_for_range<C, B, S>(
    ctrl: &ByPrediction,
    lo: i64,
    hi: i64,
    comp_rng: &C,
    body: &B,
    seq_body: &S,
) where
    C: Fn(i64, i64) -> Complexity + Sync,
    B: Fn(i64) + Sync,
    S: Fn(i64, i64) + Sync,
{
    cstmt(
        ctrl,
        || comp_rng(lo, hi),
        || {
            let n = hi - lo;
            if n <= 0 {
                // empty range
            } else if n == 1 {
                body(lo);
            } else {
                let mid = lo + n / 2;
                fork2(
                    || parallel_for_range(ctrl, lo, mid, comp_rng, body, seq_body),
                    || parallel_for_range(ctrl, mid, hi, comp_rng, body, seq_body),
                );
            }
        },
        || seq_body(lo, hi),
    );
}

/// Parallel loop with linear complexity (`hi - lo`) and a default
/// sequential rendition that applies `body` in index order.
pub fn parallel_for<B>(ctrl: &ByPrediction, lo: i64, hi: i64, body: B)
where
    B: Fn(i64) + Sync,
{
    let comp_rng = |l: i64, r: i64| (r - l) as Complexity;
    let seq_body = |l: i64, r: i64| {
        for i in l..r {
            body(i);
        }
    };
    parallel_for_range(ctrl, lo, hi, &comp_rng, &body, &seq_body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_parallel_for_visits_every_index_once() {
        let ctrl = ByPrediction::new("loop_visit");
        let n = 10_000i64;
        let sum = AtomicU64::new(0);
        parallel_for(&ctrl, 0, n, |i| {
            sum.fetch_add(i as u64, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), (n as u64 - 1) * n as u64 / 2);
    }

    #[test]
    fn test_parallel_for_empty_range() {
        let ctrl = ByPrediction::new("loop_empty");
        let hits = AtomicU64::new(0);
        parallel_for(&ctrl, 5, 5, |_| {
            hits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_parallel_for_range_uses_sequential_body_for_small_ranges() {
        let ctrl = ByPrediction::new("loop_seq_body");
        // seed a small constant so the whole range predicts under kappa
        ctrl.estimator()
            .report(1000.0, crate::config::ticks_per_microsecond() * 1.0);

        let seq_spans = std::sync::Mutex::new(Vec::new());
        let comp = |l: i64, r: i64| (r - l) as Complexity;
        let body = |_i: i64| {};
        let seq = |l: i64, r: i64| seq_spans.lock().unwrap().push((l, r));
        parallel_for_range(&ctrl, 0, 64, &comp, &body, &seq);

        let spans = seq_spans.lock().unwrap();
        // predicted cost of the whole range is far below kappa: one span
        assert_eq!(*spans, vec![(0, 64)]);
    }
}
