use rand::Rng;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::harness::Runner;
use crate::schema::{ResultStore, TimingSeries};

const LEN: usize = 200_000;

/// Sort a fresh copy of the same random `u64` vector each iteration.
pub fn run(
    runner: &mut Runner,
    store: &mut ResultStore,
    cfg: &HarnessConfig,
    hint: u64,
) -> Result<TimingSeries> {
    let mut rng = cfg.rng();
    let input: Vec<u64> = (0..LEN).map(|_| rng.gen()).collect();

    runner.run(store, "sort", hint, || {
        let mut v = input.clone();
        v.sort_unstable();
        Ok::<_, HarnessError>(v[LEN / 2])
    })
}
