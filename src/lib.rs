use clap::ValueEnum;

pub mod alloc;
pub mod benches;
pub mod config;
pub mod error;
pub mod harness;
pub mod interrupt;
pub mod sampler;
pub mod schema;
pub mod setup;

pub use config::{HarnessConfig, Limits};
pub use error::{HarnessError, SampleError};
pub use harness::{IterationSample, Runner};
pub use sampler::Sampler;
pub use schema::{ResultStore, StoreGuard, TimingSeries};

/// Built-in workload to run.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum Workload {
    /// Every built-in workload.
    #[default]
    All,
    /// Allocate and free many randomly sized buffers.
    AllocChurn,
    /// Build and query a large hash map.
    HashMap,
    /// Sort a large random vector.
    Sort,
    /// JSON serialize and parse a batch of records.
    Json,
}
