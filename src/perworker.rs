//! Per-worker local storage.
//!
//! Workers are assigned stable small integer identities on first use. A
//! [`PerWorker`] array gives each worker a cache-line-padded slot with
//! constant-time access to its own entry, plus a traversal over all slots
//! for shutdown-time aggregation.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Compile-time cap on the number of distinct workers.
pub const MAX_WORKERS: usize = 128;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static MY_ID: usize = {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        assert!(
            id < MAX_WORKERS,
            "worker id {} exceeds MAX_WORKERS ({})",
            id,
            MAX_WORKERS
        );
        id
    };
}

/// Returns the calling worker's identity, assigning one on first use.
#[inline]
pub fn my_id() -> usize {
    MY_ID.with(|id| *id)
}

/// A fixed-capacity array with one cache-line-padded slot per worker.
///
/// Each slot is written only by its owning worker. Cross-slot traversal
/// ([`iterate`](PerWorker::iterate), [`reduce`](PerWorker::reduce)) is
/// intended for quiescent points (after a join barrier or at shutdown).
pub struct PerWorker<T> {
    slots: Box<[CachePadded<UnsafeCell<T>>]>,
}

// SAFETY: each slot is accessed mutably only through `with_mine`, which
// resolves to the calling worker's own slot; distinct workers touch
// distinct cache lines. Traversals read other slots and are restricted to
// quiescent points by contract.
unsafe impl<T: Send> Sync for PerWorker<T> {}
unsafe impl<T: Send> Send for PerWorker<T> {}

impl<T> PerWorker<T> {
    /// Creates the array, initialising every slot with `init`.
    pub fn new(init: impl Fn() -> T) -> Self {
        let slots: Vec<_> = (0..MAX_WORKERS)
            .map(|_| CachePadded::new(UnsafeCell::new(init())))
            .collect();
        PerWorker {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Runs `f` with mutable access to the calling worker's slot.
    ///
    /// `f` must not re-enter this array for the same worker; accesses are
    /// kept short and leaf-level by all call sites in this crate.
    #[inline]
    pub fn with_mine<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let slot = &self.slots[my_id()];
        // SAFETY: the slot belongs to the calling worker and `f` cannot
        // leak the reference past this call.
        unsafe { f(&mut *slot.get()) }
    }

    /// Visits every slot in index order.
    pub fn iterate(&self, mut f: impl FnMut(&T)) {
        for slot in self.slots.iter() {
            // SAFETY: quiescent-point traversal per the type contract.
            unsafe { f(&*slot.get()) }
        }
    }

    /// Folds all slots into a single value.
    pub fn reduce(&self, combine: impl Fn(T, &T) -> T, zero: T) -> T {
        let mut acc = Some(zero);
        self.iterate(|item| {
            let folded = combine(acc.take().expect("accumulator present"), item);
            acc = Some(folded);
        });
        acc.expect("accumulator present")
    }
}

impl<T: Copy> PerWorker<T> {
    /// Reads the calling worker's slot.
    #[inline]
    pub fn get(&self) -> T {
        self.with_mine(|v| *v)
    }

    /// Writes the calling worker's slot.
    #[inline]
    pub fn set(&self, value: T) {
        self.with_mine(|v| *v = value)
    }
}
