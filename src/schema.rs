//! Result store and its on-disk JSON form.
//!
//! The document is a flat object: one metadata key holding the runtime
//! description, then one key per benchmark mapping to its elapsed seconds.
//!
//! ```text
//! {
//!   "RUNTIME_DESCRIPTION": "rss-harness 0.1.0 (x86_64-linux, pid 4242)",
//!   "sort": [0.0123, 0.0119, 0.0121]
//! }
//! ```

use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

pub const DESCRIPTION_KEY: &str = "RUNTIME_DESCRIPTION";

/// Elapsed seconds per completed iteration, in iteration order.
pub type TimingSeries = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultStore {
    #[serde(rename = "RUNTIME_DESCRIPTION")]
    description: String,

    #[serde(flatten)]
    results: IndexMap<String, TimingSeries>,
}

impl ResultStore {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            results: IndexMap::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Register a finished benchmark, replacing any earlier series under `name`.
    pub fn record(&mut self, name: &str, series: TimingSeries) -> Result<()> {
        if name == DESCRIPTION_KEY {
            return Err(HarnessError::ReservedName(name.to_string()));
        }
        self.results.insert(name.to_string(), series);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.results.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }

    /// Benchmarks in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.results.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to `path`, creating parent directories first.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Owns the [`ResultStore`] for a process and writes it out exactly once:
/// on [`StoreGuard::finish`], or on drop (early return, `?`, panic unwind).
pub struct StoreGuard {
    store: ResultStore,
    path: PathBuf,
    announce: bool,
    written: bool,
}

impl StoreGuard {
    pub fn new(store: ResultStore, path: impl Into<PathBuf>, announce: bool) -> Self {
        Self {
            store,
            path: path.into(),
            announce,
            written: false,
        }
    }

    /// Guard for a fresh store; announces the path unless the operator chose it.
    pub fn from_config(cfg: &HarnessConfig, description: impl Into<String>) -> Self {
        Self::new(
            ResultStore::new(description),
            cfg.output.clone(),
            !cfg.output_explicit,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write now and surface any error; the drop hook will not write again.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.persist()?;
        Ok(self.path.clone())
    }

    fn persist(&mut self) -> Result<()> {
        if self.written {
            return Ok(());
        }
        self.written = true;

        if self.announce {
            println!("Writing file {}", self.path.display());
        }
        self.store.save(&self.path)?;
        info!(path = %self.path.display(), benchmarks = self.store.len(), "results written");
        Ok(())
    }
}

impl Deref for StoreGuard {
    type Target = ResultStore;

    fn deref(&self) -> &ResultStore {
        &self.store
    }
}

impl DerefMut for StoreGuard {
    fn deref_mut(&mut self) -> &mut ResultStore {
        &mut self.store
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "failed to write results");
        }
    }
}
