use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to read the process resident set size.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("no parseable RSS value in {origin}: {text:?}")]
    Parse { origin: String, text: String },

    #[error("no RSS source is available on this system")]
    Unavailable,
}

/// Harness-level errors: configuration, persistence, environment setup.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid value for {key}: {value:?} (expected a non-negative integer)")]
    Config { key: &'static str, value: String },

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("setup command failed: {0}")]
    Setup(String),

    #[error("the `{name}` running this ({expected}) is not the first `{name}` in PATH ({found})")]
    EnvironmentMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("benchmark name {0:?} is reserved for run metadata")]
    ReservedName(String),

    #[error("interrupted before benchmark `{0}` completed")]
    Interrupted(String),
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
