//! Run configuration, read once at startup.
//!
//! Every knob can come from the environment (`MAX_BENCH_ITRS`,
//! `MAX_BENCH_SECONDS`, `RESULT_JSON_PATH`). The binary reads the environment
//! first and then applies its command line flags as [`Overrides`].

use std::env;
use std::path::{Path, PathBuf};

use chrono::Local;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{HarnessError, Result};

pub const ENV_MAX_ITERATIONS: &str = "MAX_BENCH_ITRS";
pub const ENV_MAX_SECONDS: &str = "MAX_BENCH_SECONDS";
pub const ENV_RESULT_PATH: &str = "RESULT_JSON_PATH";

pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;
pub const DEFAULT_MAX_SECONDS: u64 = 60 * 60;
pub const DEFAULT_SEED: u64 = 1337;

/// Short identifier of the runtime doing the measuring.
pub const RUNTIME_ID: &str = env!("CARGO_PKG_NAME");
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Human readable runtime identity stored alongside results.
pub fn runtime_description() -> String {
    format!(
        "{RUNTIME_ID} {RUNTIME_VERSION} ({}-{}, pid {})",
        env::consts::ARCH,
        env::consts::OS,
        std::process::id()
    )
}

/// `data/results-<runtime-id>-<version>-<timestamp>.json`, relative to the cwd.
pub fn default_output_path() -> PathBuf {
    let stamp = Local::now().format("%F-%H%M%S");
    PathBuf::from("data").join(format!(
        "results-{RUNTIME_ID}-{RUNTIME_VERSION}-{stamp}.json"
    ))
}

/// Stopping conditions for the iteration loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_iterations: u64,
    pub max_seconds: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_seconds: DEFAULT_MAX_SECONDS,
        }
    }
}

/// Values that take precedence over the environment, e.g. from flags.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub max_iterations: Option<u64>,
    pub max_seconds: Option<u64>,
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub limits: Limits,
    /// Absolute output path, resolved before any workload can `chdir`.
    pub output: PathBuf,
    /// Whether the operator chose `output`; if not, the path is announced on write.
    pub output_explicit: bool,
    pub seed: u64,
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_iterations = parse_u64(ENV_MAX_ITERATIONS, lookup(ENV_MAX_ITERATIONS))?
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        let max_seconds =
            parse_u64(ENV_MAX_SECONDS, lookup(ENV_MAX_SECONDS))?.unwrap_or(DEFAULT_MAX_SECONDS);
        let explicit = lookup(ENV_RESULT_PATH);

        Self::new(
            Limits {
                max_iterations,
                max_seconds,
            },
            explicit.map(PathBuf::from),
            DEFAULT_SEED,
        )
    }

    pub fn new(limits: Limits, output: Option<PathBuf>, seed: u64) -> Result<Self> {
        let output_explicit = output.is_some();
        let output = absolutize(&output.unwrap_or_else(default_output_path))?;
        Ok(Self {
            limits,
            output,
            output_explicit,
            seed,
        })
    }

    /// Replace whatever `overrides` sets. An output path given here counts as
    /// operator-chosen.
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self> {
        if let Some(n) = overrides.max_iterations {
            self.limits.max_iterations = n;
        }
        if let Some(n) = overrides.max_seconds {
            self.limits.max_seconds = n;
        }
        if let Some(path) = overrides.output {
            self.output = absolutize(&path)?;
            self.output_explicit = true;
        }
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }
        Ok(self)
    }

    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }
}

fn parse_u64(key: &'static str, raw: Option<String>) -> Result<Option<u64>> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| HarnessError::Config { key, value }),
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}
