//! Cycle and wall-clock time sources.
//!
//! Two monotonic clocks back the controller: the CPU cycle counter (cheap,
//! drift-prone across cores) for timing controlled bodies, and a wall clock
//! for rate limiting and log timestamps. Cycle counts convert to
//! microseconds through the configured ticks-per-microsecond calibration.

use lazy_static::lazy_static;
use std::time::Instant;

/// Raw cycle-counter reading.
pub type Cycles = u64;

lazy_static! {
    static ref EPOCH: Instant = Instant::now();
}

/// Reads the cycle counter.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn now() -> Cycles {
    // SAFETY: rdtsc has no preconditions.
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Reads the cycle counter.
///
/// Off x86_64 there is no cheap counter to read; monotonic nanoseconds are
/// scaled by the configured CPU frequency so tick units match the rdtsc
/// path and the same calibration applies.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn now() -> Cycles {
    let ns = EPOCH.elapsed().as_nanos() as f64;
    (ns * crate::config::cpu_frequency_ghz()) as Cycles
}

/// Cycles between two readings.
#[inline]
pub fn elapsed(start: Cycles, end: Cycles) -> f64 {
    end as f64 - start as f64
}

/// Cycles since `start`.
#[inline]
pub fn since(start: Cycles) -> f64 {
    elapsed(start, now())
}

/// Converts a cycle count to microseconds using the configured calibration.
#[inline]
pub fn cycles_to_us(cycles: f64) -> f64 {
    cycles / crate::config::ticks_per_microsecond()
}

/// Microseconds of wall-clock time since process start.
#[inline]
pub fn wall_now_us() -> f64 {
    EPOCH.elapsed().as_secs_f64() * 1e6
}
