//! Process memory sampling.
//!
//! RSS is read through a list of tiers. The first tier whose source exists is
//! kept for the life of the [`Sampler`]; each call still re-reads the value.
//! JIT and heap counters are best-effort and read as zero when the
//! capability is missing.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::alloc;
use crate::error::SampleError;

const MIB: f64 = 1024.0 * 1024.0;

/// One way of obtaining the resident set size of the current process.
pub trait RssSource {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether this tier can be used at all here.
    fn is_available(&self) -> bool;

    fn rss_bytes(&self) -> Result<u64, SampleError>;
}

/// Reads the `Rss:` line of `/proc/<pid>/smaps_rollup`.
///
/// The kernel always reports this figure in kB.
#[derive(Clone, Debug)]
pub struct SmapsRollup {
    path: PathBuf,
}

impl SmapsRollup {
    pub fn for_pid(pid: u32) -> Self {
        Self::at(format!("/proc/{pid}/smaps_rollup"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RssSource for SmapsRollup {
    fn name(&self) -> &str {
        "smaps_rollup"
    }

    fn is_available(&self) -> bool {
        self.path.exists()
    }

    fn rss_bytes(&self) -> Result<u64, SampleError> {
        let text = fs::read_to_string(&self.path).map_err(|source| SampleError::Read {
            path: self.path.clone(),
            source,
        })?;
        parse_smaps_rss_kib(&text)
            .map(kib_to_bytes)
            .ok_or_else(|| SampleError::Parse {
                origin: self.path.display().to_string(),
                text: text.lines().find(|l| l.starts_with("Rss")).unwrap_or("").to_string(),
            })
    }
}

/// Shells out to `ps -o rss= -p <pid>`; portable, but only accurate to kB.
#[derive(Clone, Debug)]
pub struct PsCommand {
    program: OsString,
    pid: u32,
}

impl PsCommand {
    pub fn for_pid(pid: u32) -> Self {
        Self::with_program("ps", pid)
    }

    pub fn with_program(program: impl Into<OsString>, pid: u32) -> Self {
        Self {
            program: program.into(),
            pid,
        }
    }

    fn display(&self) -> String {
        format!("{} -o rss= -p {}", self.program.to_string_lossy(), self.pid)
    }
}

impl RssSource for PsCommand {
    fn name(&self) -> &str {
        "ps"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn rss_bytes(&self) -> Result<u64, SampleError> {
        let output = Command::new(&self.program)
            .args(["-o", "rss=", "-p"])
            .arg(self.pid.to_string())
            .output()
            .map_err(|source| SampleError::Spawn {
                command: self.display(),
                source,
            })?;

        if !output.status.success() {
            return Err(SampleError::CommandFailed {
                command: self.display(),
                status: output.status.to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_ps_rss_kib(&text)
            .map(kib_to_bytes)
            .ok_or_else(|| SampleError::Parse {
                origin: self.display(),
                text: text.trim().to_string(),
            })
    }
}

/// Ordered RSS tiers with the chosen one cached after the first lookup.
pub struct TieredRss {
    tiers: Vec<Box<dyn RssSource>>,
    chosen: Option<usize>,
}

impl TieredRss {
    pub fn new(tiers: Vec<Box<dyn RssSource>>) -> Self {
        Self {
            tiers,
            chosen: None,
        }
    }

    /// `smaps_rollup` first, then `ps`.
    pub fn for_current_process() -> Self {
        let pid = std::process::id();
        Self::new(vec![
            Box::new(SmapsRollup::for_pid(pid)),
            Box::new(PsCommand::for_pid(pid)),
        ])
    }

    /// Name of the tier in use, once one has been chosen.
    pub fn chosen(&self) -> Option<&str> {
        self.chosen.map(|i| self.tiers[i].name())
    }

    pub fn rss_bytes(&mut self) -> Result<u64, SampleError> {
        let idx = match self.chosen {
            Some(idx) => idx,
            None => {
                let idx = self
                    .tiers
                    .iter()
                    .position(|t| t.is_available())
                    .ok_or(SampleError::Unavailable)?;
                debug!(tier = self.tiers[idx].name(), "selected RSS source");
                self.chosen = Some(idx);
                idx
            }
        };
        self.tiers[idx].rss_bytes()
    }
}

/// Counters exposed by a just-in-time compiler, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JitStats {
    pub alloc_bytes: u64,
    pub code_region_bytes: u64,
}

pub trait JitStatsSource {
    /// `None` when there is no JIT to ask.
    fn jit_stats(&self) -> Option<JitStats>;
}

/// Native code has no JIT.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoJit;

impl JitStatsSource for NoJit {
    fn jit_stats(&self) -> Option<JitStats> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub pages: u64,
    pub live_objects: u64,
}

pub trait HeapStatsSource {
    /// `None` when no introspectable memory manager is present.
    fn heap_stats(&self) -> Option<HeapStats>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoHeapStats;

impl HeapStatsSource for NoHeapStats {
    fn heap_stats(&self) -> Option<HeapStats> {
        None
    }
}

/// Reads the counters kept by [`alloc::CountingAllocator`].
///
/// Reports zeros unless that allocator is the process's `#[global_allocator]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocatorHeapStats;

impl HeapStatsSource for AllocatorHeapStats {
    fn heap_stats(&self) -> Option<HeapStats> {
        Some(HeapStats {
            pages: alloc::live_bytes().div_ceil(alloc::HEAP_PAGE_SIZE),
            live_objects: alloc::live_objects(),
        })
    }
}

/// Memory side of one iteration sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemorySample {
    pub rss_bytes: u64,
    pub jit: JitStats,
    pub heap: HeapStats,
}

impl MemorySample {
    pub fn rss_mib(&self) -> f64 {
        self.rss_bytes as f64 / MIB
    }

    pub fn jit_alloc_mib(&self) -> f64 {
        self.jit.alloc_bytes as f64 / MIB
    }

    pub fn jit_code_mib(&self) -> f64 {
        self.jit.code_region_bytes as f64 / MIB
    }
}

pub struct Sampler {
    rss: TieredRss,
    jit: Box<dyn JitStatsSource>,
    heap: Box<dyn HeapStatsSource>,
}

impl Sampler {
    pub fn new(
        rss: TieredRss,
        jit: Box<dyn JitStatsSource>,
        heap: Box<dyn HeapStatsSource>,
    ) -> Self {
        Self { rss, jit, heap }
    }

    pub fn for_current_process() -> Self {
        Self::new(
            TieredRss::for_current_process(),
            Box::new(NoJit),
            Box::new(AllocatorHeapStats),
        )
    }

    pub fn rss_source(&self) -> Option<&str> {
        self.rss.chosen()
    }

    pub fn sample(&mut self) -> Result<MemorySample, SampleError> {
        let rss_bytes = self.rss.rss_bytes()?;
        Ok(MemorySample {
            rss_bytes,
            jit: self.jit.jit_stats().unwrap_or_default(),
            heap: self.heap.heap_stats().unwrap_or_default(),
        })
    }
}

fn kib_to_bytes(kib: u64) -> u64 {
    kib.saturating_mul(1024)
}

/// Leading integer of `s` after trimming, ignoring any unit suffix.
fn leading_u64(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Value in kB of the first line starting with `Rss`, e.g. `Rss:  62796 kB`.
pub fn parse_smaps_rss_kib(text: &str) -> Option<u64> {
    let line = text.lines().find(|line| line.starts_with("Rss"))?;
    let (_, value) = line.split_once(':')?;
    leading_u64(value)
}

pub fn parse_ps_rss_kib(text: &str) -> Option<u64> {
    leading_u64(text)
}
