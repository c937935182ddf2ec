//! Process-wide constants store and estimator registry.
//!
//! Learned constants can persist across runs through a plain-text sidecar
//! file, one `<name> <constant>` entry per line. The preloaded map is
//! filled lazily from the configured sidecar the first time an estimator
//! is constructed; the recorded side is written on demand from every
//! registered estimator that has a defined constant. Persistence is
//! best-effort: a missing file is not an error and malformed lines are
//! skipped.

use crate::config;
use crate::estimator::{cost, Estimator};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

lazy_static! {
    static ref PRELOADED: Mutex<HashMap<String, f64>> = Mutex::new(HashMap::new());
    static ref REGISTRY: Mutex<Vec<Arc<Estimator>>> = Mutex::new(Vec::new());
}

static PRELOAD_ONCE: Once = Once::new();

fn ensure_preloaded() {
    PRELOAD_ONCE.call_once(|| {
        if let Some(path) = config::read_constants_path() {
            load_from(&path);
        }
    });
}

/// Default sidecar location: the executable path with a `cst` extension
/// (`./prog` persists to `./prog.cst`).
pub fn default_sidecar_path() -> Option<std::path::PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.with_extension("cst"))
}

/// Looks up a preloaded constant by estimator name.
pub fn preloaded(name: &str) -> Option<f64> {
    ensure_preloaded();
    PRELOADED.lock().unwrap().get(name).copied()
}

/// Seeds the preloaded map programmatically, as if the sidecar contained
/// `name value`.
pub fn preload_value(name: impl Into<String>, value: f64) {
    PRELOADED.lock().unwrap().insert(name.into(), value);
}

/// Parses a sidecar file into the preloaded map.
///
/// Blank lines are ignored; lines that do not parse as `<name> <f64>` are
/// skipped. A missing or unreadable file loads nothing.
pub fn load_from(path: &Path) {
    let Ok(text) = fs::read_to_string(path) else {
        return;
    };
    let mut map = PRELOADED.lock().unwrap();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(raw)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = raw.parse::<f64>() else {
            continue;
        };
        map.insert(name.to_string(), value);
    }
}

/// Adds an estimator to the process-wide client list.
pub(crate) fn register(estimator: Arc<Estimator>) {
    REGISTRY.lock().unwrap().push(estimator);
}

/// Snapshot of every registered estimator's (name, shared constant),
/// including undefined ones.
pub fn snapshot() -> Vec<(String, f64)> {
    REGISTRY
        .lock()
        .unwrap()
        .iter()
        .map(|est| (est.name().to_string(), est.shared_constant()))
        .collect()
}

/// Writes the sidecar: one line per registered estimator with a defined
/// constant.
pub fn dump_to(path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for est in REGISTRY.lock().unwrap().iter() {
        let constant = est.shared_constant();
        if !cost::is_defined(constant) {
            continue;
        }
        writeln!(writer, "{} {}", est.name(), constant)?;
    }
    writer.flush()
}

/// Dumps to the configured write path, if any. Errors are swallowed;
/// persistence is best-effort.
pub fn write_if_configured() {
    if let Some(path) = config::write_constants_path() {
        let _ = dump_to(&path);
    }
}
