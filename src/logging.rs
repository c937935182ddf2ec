//! Estimator event log.
//!
//! A zero-contention logger: each worker appends formatted lines to its
//! own buffer, and an explicit dump concatenates all buffers into one
//! file. Disabled by default; gate with the `estimator_logging`
//! configuration flag. Lines are tab-separated:
//! `<ms since start> <worker> <event> <estimator> <payload...>`.

use crate::clock;
use crate::config;
use crate::perworker::{self, PerWorker};
use lazy_static::lazy_static;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

lazy_static! {
    static ref BUFFERS: PerWorker<Vec<String>> = PerWorker::new(Vec::new);
}

fn push(line: String) {
    BUFFERS.with_mine(|buf| buf.push(line));
}

fn stamp() -> u64 {
    (clock::wall_now_us() / 1000.0) as u64
}

pub(crate) fn predict(name: &str, m: f64, predicted: f64, constant: f64) {
    if !config::estimator_logging() {
        return;
    }
    push(format!(
        "{}\t{}\testim_predict\t{}\t{}\t{}\t{}",
        stamp(),
        perworker::my_id(),
        name,
        m,
        predicted,
        constant
    ));
}

pub(crate) fn report(name: &str, m: f64, measured: f64, constant: f64) {
    if !config::estimator_logging() {
        return;
    }
    push(format!(
        "{}\t{}\testim_report\t{}\t{}\t{}\t{}",
        stamp(),
        perworker::my_id(),
        name,
        m,
        measured,
        constant
    ));
}

pub(crate) fn update_shared(name: &str, constant: f64) {
    if !config::estimator_logging() {
        return;
    }
    push(format!(
        "{}\t{}\testim_update_shared\t{}\t{}",
        stamp(),
        perworker::my_id(),
        name,
        constant
    ));
}

/// Which kind of controlled run completed.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Run {
    Sequential,
    Parallel,
    Unknown,
}

pub(crate) fn run(kind: Run, name: &str, m: f64, elapsed_us: f64) {
    if !config::estimator_logging() {
        return;
    }
    let label = match kind {
        Run::Sequential => "sequential_run",
        Run::Parallel => "parallel_run",
        Run::Unknown => "unknown_run",
    };
    push(format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        stamp(),
        perworker::my_id(),
        label,
        name,
        m,
        elapsed_us
    ));
}

pub(crate) fn fork() {
    if !config::estimator_logging() {
        return;
    }
    push(format!("{}\t{}\tfork", stamp(), perworker::my_id()));
}

/// Writes every worker's buffered events to `path`, in worker order.
/// Quiescent-point operation.
pub fn dump_to(path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut result = Ok(());
    BUFFERS.iterate(|buf| {
        if result.is_err() {
            return;
        }
        for line in buf {
            if let Err(e) = writeln!(writer, "{}", line) {
                result = Err(e);
                return;
            }
        }
    });
    result?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_dropped_when_disabled() {
        std::thread::spawn(|| {
            report("silent", 1.0, 1.0, 1.0);
            let mine = BUFFERS.with_mine(|b| b.len());
            assert_eq!(mine, 0);
        })
        .join()
        .unwrap();
    }
}
