//! The iterate-measure-record loop.

use std::fmt;
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::info;

use crate::alloc::{Compactor, SystemCompactor};
use crate::config::Limits;
use crate::error::HarnessError;
use crate::interrupt;
use crate::sampler::{MemorySample, Sampler};
use crate::schema::{ResultStore, TimingSeries, DESCRIPTION_KEY};

/// Everything observed about one iteration. Only `elapsed_seconds` outlives
/// the log line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationSample {
    pub index: u64,
    pub elapsed_seconds: f64,
    pub memory: MemorySample,
}

impl fmt::Display for IterationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "itr #{}: {}ms RSS: {}MiB JIT-code={}MiB JIT-alloc={}MiB heap_pages={} heap_live_objects={}",
            self.index,
            (self.elapsed_seconds * 1000.0) as u64,
            self.memory.rss_mib() as u64,
            self.memory.jit_code_mib() as u64,
            self.memory.jit_alloc_mib() as u64,
            self.memory.heap.pages,
            self.memory.heap.live_objects,
        )
    }
}

/// True once either limit has been reached.
pub fn should_stop(limits: &Limits, iterations: u64, total_seconds: f64) -> bool {
    iterations >= limits.max_iterations || total_seconds >= limits.max_seconds as f64
}

pub struct Runner {
    limits: Limits,
    sampler: Sampler,
    compactor: Box<dyn Compactor>,
    stop: &'static AtomicBool,
}

impl Runner {
    pub fn new(limits: Limits, sampler: Sampler) -> Self {
        Self {
            limits,
            sampler,
            compactor: Box::new(SystemCompactor),
            stop: interrupt::flag(),
        }
    }

    pub fn with_compactor(mut self, compactor: impl Compactor + 'static) -> Self {
        self.compactor = Box::new(compactor);
        self
    }

    /// Poll `stop` between iterations instead of the process signal flag.
    pub fn with_stop_flag(mut self, stop: &'static AtomicBool) -> Self {
        self.stop = stop;
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Run `workload` until a limit is hit and record its timings under `name`.
    ///
    /// At least one iteration always runs. `_iteration_hint` is accepted for
    /// callers that know their expected iteration count; it does not change
    /// when the loop stops.
    ///
    /// Errors from `workload` are returned as-is, and sampling failures arrive
    /// through `E: From<HarnessError>`. Either way nothing is recorded for
    /// `name`, while earlier entries in `store` are left alone.
    pub fn run<T, E, F>(
        &mut self,
        store: &mut ResultStore,
        name: &str,
        _iteration_hint: u64,
        mut workload: F,
    ) -> Result<TimingSeries, E>
    where
        F: FnMut() -> Result<T, E>,
        E: From<HarnessError>,
    {
        if name == DESCRIPTION_KEY {
            return Err(E::from(HarnessError::ReservedName(name.to_string())));
        }
        info!(benchmark = name, "starting");

        let mut times = TimingSeries::new();
        let mut total_seconds = 0.0;
        let mut iterations = 0u64;

        loop {
            let start = Instant::now();
            black_box(workload()?);
            let elapsed = start.elapsed().as_secs_f64();

            iterations += 1;
            let memory = self
                .sampler
                .sample()
                .map_err(|e| E::from(HarnessError::Sample(e)))?;

            let sample = IterationSample {
                index: iterations,
                elapsed_seconds: elapsed,
                memory,
            };
            println!("{sample}");

            self.compactor.compact();

            times.push(elapsed);
            total_seconds += elapsed;

            if should_stop(&self.limits, iterations, total_seconds) {
                break;
            }
            // Only a benchmark with iterations still to go counts as in flight.
            if self.stop.load(Ordering::SeqCst) {
                return Err(E::from(HarnessError::Interrupted(name.to_string())));
            }
        }

        store.record(name, times.clone())?;
        info!(benchmark = name, iterations, total_seconds, "finished");
        Ok(times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::NoCompaction;
    use crate::error::SampleError;
    use crate::sampler::{HeapStats, JitStats, NoHeapStats, NoJit, RssSource, TieredRss};
    use std::time::Duration;

    static NEVER: AtomicBool = AtomicBool::new(false);

    struct FixedRss(u64);

    impl RssSource for FixedRss {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn rss_bytes(&self) -> Result<u64, SampleError> {
            Ok(self.0)
        }
    }

    struct BrokenRss;

    impl RssSource for BrokenRss {
        fn name(&self) -> &str {
            "broken"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn rss_bytes(&self) -> Result<u64, SampleError> {
            Err(SampleError::Parse {
                origin: "stub".into(),
                text: String::new(),
            })
        }
    }

    fn runner(max_iterations: u64, max_seconds: u64) -> Runner {
        let sampler = Sampler::new(
            TieredRss::new(vec![Box::new(FixedRss(64 * 1024 * 1024))]),
            Box::new(NoJit),
            Box::new(NoHeapStats),
        );
        Runner::new(
            Limits {
                max_iterations,
                max_seconds,
            },
            sampler,
        )
        .with_compactor(NoCompaction)
        .with_stop_flag(&NEVER)
    }

    #[test]
    fn iteration_limit_bounds_series() {
        for n in [1, 2, 5, 17] {
            let mut store = ResultStore::new("d");
            let times = runner(n, 3600)
                .run(&mut store, "noop", 0, || Ok::<_, HarnessError>(()))
                .unwrap();
            assert_eq!(times.len() as u64, n);
            assert!(times.iter().all(|t| *t >= 0.0));
            assert_eq!(store.get("noop"), Some(times.as_slice()));
        }
    }

    #[test]
    fn slow_workload_still_runs_once() {
        let mut store = ResultStore::new("d");
        let times = runner(1000, 0)
            .run(&mut store, "slow", 0, || {
                std::thread::sleep(Duration::from_millis(2));
                Ok::<_, HarnessError>(())
            })
            .unwrap();
        assert_eq!(times.len(), 1);
        assert!(times[0] >= 0.002);
    }

    #[test]
    fn hint_does_not_change_stopping() {
        let mut store = ResultStore::new("d");
        let times = runner(4, 3600)
            .run(&mut store, "hinted", 1_000_000, || Ok::<_, HarnessError>(()))
            .unwrap();
        assert_eq!(times.len(), 4);
    }

    #[test]
    fn workload_error_records_nothing() {
        #[derive(Debug, PartialEq)]
        enum BenchErr {
            Broken(u32),
            Harness(String),
        }
        impl From<HarnessError> for BenchErr {
            fn from(e: HarnessError) -> Self {
                BenchErr::Harness(e.to_string())
            }
        }

        let mut store = ResultStore::new("d");
        let mut r = runner(10, 3600);
        r.run(&mut store, "a", 10, || Ok::<_, BenchErr>(())).unwrap();
        let a_before = store.get("a").unwrap().to_vec();

        let mut calls = 0;
        let err = r
            .run(&mut store, "b", 10, || {
                calls += 1;
                if calls == 3 {
                    Err(BenchErr::Broken(calls))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();

        assert_eq!(err, BenchErr::Broken(3));
        assert!(!store.contains("b"));
        assert_eq!(store.get("a"), Some(a_before.as_slice()));
    }

    #[test]
    fn sampling_failure_aborts_benchmark() {
        let sampler = Sampler::new(
            TieredRss::new(vec![Box::new(BrokenRss)]),
            Box::new(NoJit),
            Box::new(NoHeapStats),
        );
        let mut r = Runner::new(Limits::default(), sampler)
            .with_compactor(NoCompaction)
            .with_stop_flag(&NEVER);
        let mut store = ResultStore::new("d");

        let err = r
            .run(&mut store, "x", 0, || Ok::<_, HarnessError>(()))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Sample(SampleError::Parse { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn stop_flag_discards_in_flight_benchmark() {
        static STOP: AtomicBool = AtomicBool::new(false);
        let mut r = runner(10, 3600).with_stop_flag(&STOP);
        let mut store = ResultStore::new("d");
        r.run(&mut store, "first", 0, || Ok::<_, HarnessError>(()))
            .unwrap();

        let mut calls = 0;
        let err = r
            .run(&mut store, "second", 0, || {
                calls += 1;
                if calls == 2 {
                    STOP.store(true, Ordering::SeqCst);
                }
                Ok::<_, HarnessError>(())
            })
            .unwrap_err();

        assert!(matches!(err, HarnessError::Interrupted(ref n) if n == "second"));
        assert_eq!(calls, 2);
        assert!(!store.contains("second"));
        assert_eq!(store.get("first").map(<[f64]>::len), Some(10));
    }

    #[test]
    fn stop_flag_on_last_iteration_keeps_series() {
        static STOP: AtomicBool = AtomicBool::new(false);
        let mut r = runner(2, 3600).with_stop_flag(&STOP);
        let mut store = ResultStore::new("d");

        let mut calls = 0;
        let times = r
            .run(&mut store, "finished", 0, || {
                calls += 1;
                if calls == 2 {
                    STOP.store(true, Ordering::SeqCst);
                }
                Ok::<_, HarnessError>(())
            })
            .unwrap();

        assert_eq!(times.len(), 2);
        assert_eq!(store.get("finished"), Some(times.as_slice()));
    }

    #[test]
    fn should_stop_on_either_limit() {
        let limits = Limits {
            max_iterations: 3,
            max_seconds: 2,
        };
        assert!(!should_stop(&limits, 1, 0.5));
        assert!(should_stop(&limits, 3, 0.5));
        assert!(should_stop(&limits, 1, 2.0));
        assert!(should_stop(&limits, 5, 9.0));
    }

    #[test]
    fn log_line_labels_each_counter() {
        let sample = IterationSample {
            index: 7,
            elapsed_seconds: 0.0129,
            memory: MemorySample {
                rss_bytes: 150 * 1024 * 1024 + 12,
                jit: JitStats {
                    alloc_bytes: 3 * 1024 * 1024,
                    code_region_bytes: 5 * 1024 * 1024,
                },
                heap: HeapStats {
                    pages: 42,
                    live_objects: 1000,
                },
            },
        };
        assert_eq!(
            sample.to_string(),
            "itr #7: 12ms RSS: 150MiB JIT-code=5MiB JIT-alloc=3MiB heap_pages=42 heap_live_objects=1000"
        );
    }
}
