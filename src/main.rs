use grainctl::{cstmt, fork2, parallel_for_range, ByPrediction, PerWorker};
use std::time::Instant;

fn fib_seq(n: u64) -> u64 {
    if n < 2 {
        n
    } else {
        fib_seq(n - 1) + fib_seq(n - 2)
    }
}

fn fib(ctrl: &ByPrediction, n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    const PHI: f64 = 1.618_033_988_749_895;
    cstmt(
        ctrl,
        || PHI.powi(n as i32),
        || {
            let (a, b) = fork2(|| fib(ctrl, n - 1), || fib(ctrl, n - 2));
            a + b
        },
        || fib_seq(n),
    )
}

fn main() {
    grainctl::config::init_from_env();
    println!("grainctl - oracle-guided granularity control\n");

    // Example 1: granularity-controlled fibonacci
    println!("Example 1: controlled fibonacci");
    let cfib = ByPrediction::new("fib");
    let n = 38;
    let start = Instant::now();
    let result = fib(&cfib, n);
    println!(
        "  fib({}) = {} in {:.3}s ({} forks issued)\n",
        n,
        result,
        start.elapsed().as_secs_f64(),
        grainctl::forks_issued()
    );

    // Example 2: nested parallel-for loops
    println!("Example 2: nested loops");
    let outer = ByPrediction::new("nested_outer");
    let inner = ByPrediction::new("nested_inner");
    let (n_outer, n_inner) = (400i64, 50_000i64);
    let count = PerWorker::new(|| 0u64);

    let start = Instant::now();
    let inner_body = |_: i64| count.with_mine(|c| *c += 1);
    let inner_seq = |l: i64, r: i64| count.with_mine(|c| *c += (r - l) as u64);
    let inner_comp = |l: i64, r: i64| (r - l) as f64;
    parallel_for_range(
        &outer,
        0,
        n_outer,
        &|l, r| ((r - l) * n_inner) as f64,
        &|_i| {
            parallel_for_range(&inner, 0, n_inner, &inner_comp, &inner_body, &inner_seq);
        },
        &|l, r| {
            for _ in l..r {
                inner_seq(0, n_inner);
            }
        },
    );
    let total = count.reduce(|acc, c| acc + c, 0);
    println!(
        "  counted {} iterations in {:.3}s\n",
        total,
        start.elapsed().as_secs_f64()
    );

    // Learned constants
    println!("Learned constants:");
    for (name, constant) in grainctl::constants::snapshot() {
        println!("  {:<16} {:>12.6}", name, constant);
    }

    grainctl::constants::write_if_configured();
    if grainctl::config::estimator_logging() {
        let _ = grainctl::logging::dump_to(std::path::Path::new("estim.log"));
    }
}
