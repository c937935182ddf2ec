//! # grainctl - Oracle-Guided Granularity Control
//!
//! A granularity controller for nested fork/join parallelism. At every
//! potentially parallel call site the controller decides whether to run
//! sequentially (avoiding fork overhead) or to fork, driven by an on-line
//! cost model: each site carries a user-supplied *complexity measure* `m`
//! and learns a constant `c` such that predicted time ≈ `c * m`. Work
//! predicted under a threshold κ runs sequentially.
//!
//! ## Architecture
//!
//! - **Estimator**: per-call-site learner holding a monotone shared
//!   constant and per-worker local constants
//! - **Controlled statement** ([`cstmt`]): picks a mode, runs the matching
//!   body, and reports measured time back to the estimator
//! - **Controlled fork** ([`fork2`]): forks only when the current
//!   execution mode permits, propagating the mode to both children
//! - **Per-worker storage**: cache-line-padded slots behind stable small
//!   worker identities
//!
//! The actual fork is delegated to an external work-stealing runtime
//! (`rayon::join` under the default `rayon` feature); without it, forks
//! degrade to inline sequential execution.
//!
//! ## Example
//!
//! ```no_run
//! use grainctl::{cstmt, fork2, ByPrediction};
//!
//! fn fib_seq(n: u64) -> u64 {
//!     if n < 2 { n } else { fib_seq(n - 1) + fib_seq(n - 2) }
//! }
//!
//! fn fib(ctrl: &ByPrediction, n: u64) -> u64 {
//!     if n < 2 {
//!         return n;
//!     }
//!     cstmt(
//!         ctrl,
//!         || 1.618f64.powi(n as i32),
//!         || {
//!             let (a, b) = fork2(|| fib(ctrl, n - 1), || fib(ctrl, n - 2));
//!             a + b
//!         },
//!         || fib_seq(n),
//!     )
//! }
//!
//! let ctrl = ByPrediction::new("fib");
//! println!("{}", fib(&ctrl, 40));
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod cstmt;
pub mod estimator;
pub mod fork;
pub mod logging;
pub mod loops;
pub(crate) mod measure;
pub mod mode;
pub mod perworker;
pub mod site;

pub use config::{Config, Policy, Strategy, UpdateRule};
pub use cstmt::{cstmt, cstmt_paired, cstmt_single, force_parallel, force_sequential, ByPrediction};
pub use estimator::{complexity, cost, Complexity, Cost, Estimator};
pub use fork::{fork2, forks_issued, primitive_fork2};
pub use loops::{parallel_for, parallel_for_range};
pub use mode::ExecutionMode;
pub use perworker::{PerWorker, MAX_WORKERS};
