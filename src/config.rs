//! Process-wide configuration.
//!
//! All knobs are plain atomics or lazy globals: they are written once at
//! startup (or explicitly by tests) and read on the hot path without locks.
//! Unparseable environment values are reported on stderr and replaced by
//! defaults.

use lazy_static::lazy_static;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

/// Threshold in microseconds below which predicted work runs sequentially.
pub const DEFAULT_KAPPA_US: f64 = 300.0;

/// Calibration default; ticks-per-microsecond is `ghz * 1000`.
pub const DEFAULT_CPU_FREQUENCY_GHZ: f64 = 2.1;

/// Policy for accounting nested work while a bootstrapping measurement is
/// open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Time the bootstrap region end-to-end on the initiating worker and
    /// ignore nested activity.
    Naive,
    /// Let nested statements run in parallel and compensate the open
    /// measurement with their predicted cost.
    Optimistic,
    /// Force nested statements sequential while a measurement is open on
    /// the worker; most accurate, least parallel during bootstrap.
    Honest,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naive" => Ok(Strategy::Naive),
            "optimistic" => Ok(Strategy::Optimistic),
            "honest" => Ok(Strategy::Honest),
            other => Err(format!("unknown strategy {:?}", other)),
        }
    }
}

/// How an estimator folds a new measurement into its constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRule {
    /// New local constant = (W * old + measured) / (W + 1), W = 8.
    WeightedAverage,
    /// Locals track the raw latest measurement; only the shared constant
    /// smooths, by monotone multiplicative descent.
    MonotoneShared,
}

impl FromStr for UpdateRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted-average" => Ok(UpdateRule::WeightedAverage),
            "monotone-shared" => Ok(UpdateRule::MonotoneShared),
            other => Err(format!("unknown update rule {:?}", other)),
        }
    }
}

/// Global execution policy; everything except `ByPrediction` degenerates
/// the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Normal operation: predict, decide, learn.
    ByPrediction,
    /// Always run the sequential body, never learn.
    SequentialBaseline,
    /// Always run the parallel body, never learn.
    ParallelElision,
    /// Bypass the controller: parallel bodies with unconditional forks.
    Manual,
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prediction" => Ok(Policy::ByPrediction),
            "sequential-baseline" => Ok(Policy::SequentialBaseline),
            "parallel-elision" => Ok(Policy::ParallelElision),
            "manual" => Ok(Policy::Manual),
            other => Err(format!("unknown policy {:?}", other)),
        }
    }
}

/// Startup configuration bundle.
#[derive(Debug, Clone)]
pub struct Config {
    pub kappa_us: f64,
    pub strategy: Strategy,
    pub update_rule: UpdateRule,
    pub policy: Policy,
    /// Load the constants sidecar from this path on first estimator use.
    pub read_constants: Option<PathBuf>,
    /// Dump learned constants to this path at shutdown.
    pub write_constants: Option<PathBuf>,
    pub estimator_logging: bool,
    pub cpu_frequency_ghz: f64,
    /// Minimum wall-clock gap between accepted reports per worker, in
    /// microseconds. Zero disables throttling. The first report of an
    /// estimator is never throttled.
    pub min_report_interval_us: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            kappa_us: DEFAULT_KAPPA_US,
            strategy: Strategy::Optimistic,
            update_rule: UpdateRule::WeightedAverage,
            policy: Policy::ByPrediction,
            read_constants: None,
            write_constants: None,
            estimator_logging: false,
            cpu_frequency_ghz: DEFAULT_CPU_FREQUENCY_GHZ,
            min_report_interval_us: 0.0,
        }
    }
}

impl Config {
    /// Builds a configuration from `GRAINCTL_*` environment variables.
    ///
    /// Unparseable values produce a diagnostic on stderr and fall back to
    /// the default for that option.
    pub fn from_env() -> Config {
        let mut cfg = Config::default();
        if let Some(v) = env_parse::<f64>("GRAINCTL_KAPPA") {
            cfg.kappa_us = v;
        }
        if let Some(v) = env_parse::<Strategy>("GRAINCTL_STRATEGY") {
            cfg.strategy = v;
        }
        if let Some(v) = env_parse::<UpdateRule>("GRAINCTL_UPDATE_RULE") {
            cfg.update_rule = v;
        }
        if let Some(v) = env_parse::<Policy>("GRAINCTL_POLICY") {
            cfg.policy = v;
        }
        if let Ok(v) = std::env::var("GRAINCTL_READ_CONSTANTS") {
            cfg.read_constants = sidecar_path(v);
        }
        if let Ok(v) = std::env::var("GRAINCTL_WRITE_CONSTANTS") {
            cfg.write_constants = sidecar_path(v);
        }
        if let Ok(v) = std::env::var("GRAINCTL_ESTIMATOR_LOG") {
            cfg.estimator_logging = v == "1" || v == "true";
        }
        if let Some(v) = env_parse::<f64>("GRAINCTL_CPU_GHZ") {
            cfg.cpu_frequency_ghz = v;
        }
        if let Some(v) = env_parse::<f64>("GRAINCTL_MIN_REPORT_INTERVAL") {
            cfg.min_report_interval_us = v;
        }
        cfg
    }
}

/// A bare flag value selects the sidecar located by executable name;
/// anything else is an explicit path.
fn sidecar_path(value: String) -> Option<PathBuf> {
    if value == "1" || value == "true" {
        crate::constants::default_sidecar_path()
    } else {
        Some(PathBuf::from(value))
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("grainctl: ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

const STRATEGY_NAIVE: u8 = 0;
const STRATEGY_OPTIMISTIC: u8 = 1;
const STRATEGY_HONEST: u8 = 2;

const RULE_WEIGHTED: u8 = 0;
const RULE_MONOTONE: u8 = 1;

const POLICY_PREDICTION: u8 = 0;
const POLICY_SEQ_BASELINE: u8 = 1;
const POLICY_PAR_ELISION: u8 = 2;
const POLICY_MANUAL: u8 = 3;

static STRATEGY: AtomicU8 = AtomicU8::new(STRATEGY_OPTIMISTIC);
static UPDATE_RULE: AtomicU8 = AtomicU8::new(RULE_WEIGHTED);
static POLICY: AtomicU8 = AtomicU8::new(POLICY_PREDICTION);
static ESTIMATOR_LOGGING: AtomicBool = AtomicBool::new(false);

lazy_static! {
    static ref KAPPA_BITS: AtomicU64 = AtomicU64::new(DEFAULT_KAPPA_US.to_bits());
    static ref TICKS_PER_US_BITS: AtomicU64 =
        AtomicU64::new((DEFAULT_CPU_FREQUENCY_GHZ * 1000.0).to_bits());
    static ref MIN_REPORT_INTERVAL_BITS: AtomicU64 = AtomicU64::new(0f64.to_bits());
    static ref READ_CONSTANTS: Mutex<Option<PathBuf>> = Mutex::new(None);
    static ref WRITE_CONSTANTS: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Applies a configuration bundle to the process-wide state.
pub fn apply(cfg: &Config) {
    set_kappa(cfg.kappa_us);
    set_strategy(cfg.strategy);
    set_update_rule(cfg.update_rule);
    set_policy(cfg.policy);
    set_estimator_logging(cfg.estimator_logging);
    set_cpu_frequency_ghz(cfg.cpu_frequency_ghz);
    set_min_report_interval_us(cfg.min_report_interval_us);
    *READ_CONSTANTS.lock().unwrap() = cfg.read_constants.clone();
    *WRITE_CONSTANTS.lock().unwrap() = cfg.write_constants.clone();
}

/// Reads `GRAINCTL_*` variables and applies them.
pub fn init_from_env() {
    apply(&Config::from_env());
}

pub fn kappa() -> f64 {
    f64::from_bits(KAPPA_BITS.load(Ordering::Relaxed))
}

pub fn set_kappa(kappa_us: f64) {
    KAPPA_BITS.store(kappa_us.to_bits(), Ordering::Relaxed);
}

pub fn strategy() -> Strategy {
    match STRATEGY.load(Ordering::Relaxed) {
        STRATEGY_NAIVE => Strategy::Naive,
        STRATEGY_HONEST => Strategy::Honest,
        _ => Strategy::Optimistic,
    }
}

pub fn set_strategy(strategy: Strategy) {
    let tag = match strategy {
        Strategy::Naive => STRATEGY_NAIVE,
        Strategy::Optimistic => STRATEGY_OPTIMISTIC,
        Strategy::Honest => STRATEGY_HONEST,
    };
    STRATEGY.store(tag, Ordering::Relaxed);
}

pub fn update_rule() -> UpdateRule {
    match UPDATE_RULE.load(Ordering::Relaxed) {
        RULE_MONOTONE => UpdateRule::MonotoneShared,
        _ => UpdateRule::WeightedAverage,
    }
}

pub fn set_update_rule(rule: UpdateRule) {
    let tag = match rule {
        UpdateRule::WeightedAverage => RULE_WEIGHTED,
        UpdateRule::MonotoneShared => RULE_MONOTONE,
    };
    UPDATE_RULE.store(tag, Ordering::Relaxed);
}

pub fn policy() -> Policy {
    match POLICY.load(Ordering::Relaxed) {
        POLICY_SEQ_BASELINE => Policy::SequentialBaseline,
        POLICY_PAR_ELISION => Policy::ParallelElision,
        POLICY_MANUAL => Policy::Manual,
        _ => Policy::ByPrediction,
    }
}

pub fn set_policy(policy: Policy) {
    let tag = match policy {
        Policy::ByPrediction => POLICY_PREDICTION,
        Policy::SequentialBaseline => POLICY_SEQ_BASELINE,
        Policy::ParallelElision => POLICY_PAR_ELISION,
        Policy::Manual => POLICY_MANUAL,
    };
    POLICY.store(tag, Ordering::Relaxed);
}

pub fn estimator_logging() -> bool {
    ESTIMATOR_LOGGING.load(Ordering::Relaxed)
}

pub fn set_estimator_logging(enabled: bool) {
    ESTIMATOR_LOGGING.store(enabled, Ordering::Relaxed);
}

pub fn ticks_per_microsecond() -> f64 {
    f64::from_bits(TICKS_PER_US_BITS.load(Ordering::Relaxed))
}

pub fn cpu_frequency_ghz() -> f64 {
    ticks_per_microsecond() / 1000.0
}

pub fn set_cpu_frequency_ghz(ghz: f64) {
    TICKS_PER_US_BITS.store((ghz * 1000.0).to_bits(), Ordering::Relaxed);
}

pub fn min_report_interval_us() -> f64 {
    f64::from_bits(MIN_REPORT_INTERVAL_BITS.load(Ordering::Relaxed))
}

pub fn set_min_report_interval_us(interval_us: f64) {
    MIN_REPORT_INTERVAL_BITS.store(interval_us.to_bits(), Ordering::Relaxed);
}

pub fn read_constants_path() -> Option<PathBuf> {
    READ_CONSTANTS.lock().unwrap().clone()
}

pub fn write_constants_path() -> Option<PathBuf> {
    WRITE_CONSTANTS.lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.kappa_us, DEFAULT_KAPPA_US);
        assert_eq!(cfg.strategy, Strategy::Optimistic);
        assert_eq!(cfg.update_rule, UpdateRule::WeightedAverage);
        assert_eq!(cfg.policy, Policy::ByPrediction);
        assert_eq!(cfg.cpu_frequency_ghz, DEFAULT_CPU_FREQUENCY_GHZ);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("naive".parse::<Strategy>().unwrap(), Strategy::Naive);
        assert_eq!(
            "optimistic".parse::<Strategy>().unwrap(),
            Strategy::Optimistic
        );
        assert_eq!("honest".parse::<Strategy>().unwrap(), Strategy::Honest);
        assert!("eager".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "sequential-baseline".parse::<Policy>().unwrap(),
            Policy::SequentialBaseline
        );
        assert_eq!(
            "parallel-elision".parse::<Policy>().unwrap(),
            Policy::ParallelElision
        );
        assert_eq!("manual".parse::<Policy>().unwrap(), Policy::Manual);
        assert!("auto".parse::<Policy>().is_err());
    }

    #[test]
    fn test_update_rule_parsing() {
        assert_eq!(
            "weighted-average".parse::<UpdateRule>().unwrap(),
            UpdateRule::WeightedAverage
        );
        assert_eq!(
            "monotone-shared".parse::<UpdateRule>().unwrap(),
            UpdateRule::MonotoneShared
        );
        assert!("ewma".parse::<UpdateRule>().is_err());
    }
}
