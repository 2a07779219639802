//! Built-in workloads for the `rss-harness` binary.
//!
//! Each module registers one or more named benchmarks with the runner. Inputs
//! come from the seeded RNG in [`HarnessConfig`], so two runs with the same
//! seed measure identical work.

pub mod sort;

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::harness::Runner;
use crate::schema::ResultStore;
use crate::Workload;

/// Run every benchmark selected by `workloads`, in declaration order.
pub fn run_selected(
    runner: &mut Runner,
    store: &mut ResultStore,
    cfg: &HarnessConfig,
    workloads: &[Workload],
    hint: u64,
) -> Result<()> {
    let wants = |w: Workload| workloads.iter().any(|s| *s == Workload::All || *s == w);

    if wants(Workload::AllocChurn) {
        churn::run_alloc_churn(runner, store, cfg, hint)?;
    }
    if wants(Workload::HashMap) {
        churn::run_hash_map(runner, store, cfg, hint)?;
    }
    if wants(Workload::Sort) {
        sort::run(runner, store, cfg, hint)?;
    }
    if wants(Workload::Json) {
        json::run(runner, store, cfg, hint)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::NoCompaction;
    use crate::config::Limits;
    use crate::error::SampleError;
    use crate::sampler::{NoHeapStats, NoJit, RssSource, Sampler, TieredRss};
    use std::sync::atomic::AtomicBool;

    static NEVER: AtomicBool = AtomicBool::new(false);

    struct FixedRss;

    impl RssSource for FixedRss {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn rss_bytes(&self) -> std::result::Result<u64, SampleError> {
            Ok(1 << 20)
        }
    }

    fn setup(max_iterations: u64) -> (Runner, ResultStore, HarnessConfig) {
        let limits = Limits {
            max_iterations,
            max_seconds: 3600,
        };
        let sampler = Sampler::new(
            TieredRss::new(vec![Box::new(FixedRss)]),
            Box::new(NoJit),
            Box::new(NoHeapStats),
        );
        let runner = Runner::new(limits, sampler)
            .with_compactor(NoCompaction)
            .with_stop_flag(&NEVER);
        let cfg = HarnessConfig::new(limits, Some("/tmp/unused.json".into()), 1337).unwrap();
        (runner, ResultStore::new("test"), cfg)
    }

    #[test]
    fn all_registers_every_workload_in_order() {
        let (mut runner, mut store, cfg) = setup(1);
        run_selected(&mut runner, &mut store, &cfg, &[Workload::All], 0).unwrap();

        let names: Vec<&str> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["alloc_churn", "hash_map", "sort", "json"]);
        assert!(store.iter().all(|(_, t)| t.len() == 1));
    }

    #[test]
    fn selection_limits_what_runs() {
        let (mut runner, mut store, cfg) = setup(2);
        run_selected(&mut runner, &mut store, &cfg, &[Workload::Json, Workload::Sort], 0).unwrap();

        let names: Vec<&str> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["sort", "json"]);
        assert_eq!(store.get("sort").map(<[f64]>::len), Some(2));
    }
}
