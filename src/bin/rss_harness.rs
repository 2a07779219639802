use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use rss_harness::alloc::CountingAllocator;
use rss_harness::config::{self, Overrides};
use rss_harness::{benches, interrupt, setup};
use rss_harness::{HarnessConfig, ResultStore, Runner, Sampler, StoreGuard, Workload};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[derive(Subcommand, Debug)]
enum Command {
    /// Run built-in workloads and write their per-iteration timings as JSON.
    Run {
        /// Workload(s) to run; defaults to all of them.
        #[arg(long = "bench", value_enum, num_args = 1.., action = clap::ArgAction::Append)]
        benches: Vec<Workload>,

        /// Expected iteration count, passed through to the runner.
        #[arg(long, default_value_t = 0)]
        hint: u64,

        /// Shell command to run before benchmarking. Can be given multiple times.
        #[arg(long = "setup", value_name = "CMD", action = clap::ArgAction::Append)]
        setup: Vec<String>,

        /// Require the first NAME on PATH to be PATH.
        #[arg(long, value_name = "NAME=PATH", action = clap::ArgAction::Append)]
        expect_in_path: Vec<String>,
    },

    /// Print iteration counts and total time per benchmark in a results file.
    Show {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(name = "rss-harness")]
#[command(about = "Time workloads and sample process RSS per iteration (JSON output)")]
struct Args {
    /// Stop after this many iterations [env: MAX_BENCH_ITRS, default: 1000].
    #[arg(long, global = true)]
    max_iterations: Option<u64>,

    /// Stop once this many seconds have been spent inside the workload
    /// [env: MAX_BENCH_SECONDS, default: 3600].
    #[arg(long, global = true)]
    max_seconds: Option<u64>,

    /// Where to write the JSON results [env: RESULT_JSON_PATH].
    /// Defaults to data/results-<id>-<version>-<time>.json.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Seed for workload inputs [default: 1337].
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    cmd: Command,
}

fn check_paths(specs: &[String]) -> anyhow::Result<()> {
    for spec in specs {
        let (name, path) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("--expect-in-path takes NAME=PATH, got {spec:?}"))?;
        setup::ensure_first_in_path(name, Path::new(path))?;
    }
    Ok(())
}

fn run(args: &Args, workloads: &[Workload], hint: u64) -> anyhow::Result<()> {
    let cfg = HarnessConfig::from_env()?.with_overrides(Overrides {
        max_iterations: args.max_iterations,
        max_seconds: args.max_seconds,
        output: args.out.clone(),
        seed: args.seed,
    })?;

    let description = config::runtime_description();
    println!("{description}");

    interrupt::install();
    let mut store = StoreGuard::from_config(&cfg, description);
    let mut runner = Runner::new(cfg.limits, Sampler::for_current_process());

    let workloads = if workloads.is_empty() {
        &[Workload::All][..]
    } else {
        workloads
    };
    benches::run_selected(&mut runner, &mut store, &cfg, workloads, hint)?;

    let path = store.finish()?;
    tracing::debug!(path = %path.display(), "done");
    Ok(())
}

fn show(path: &Path) -> anyhow::Result<()> {
    let store =
        ResultStore::load(path).with_context(|| format!("reading {}", path.display()))?;
    println!("{}", store.description());
    for (name, times) in store.iter() {
        let total: f64 = times.iter().sum();
        println!("  {name:?}: {} iterations, {total:.3}s total", times.len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.cmd {
        Command::Run {
            benches,
            hint,
            setup: commands,
            expect_in_path,
        } => {
            check_paths(expect_in_path)?;
            setup::setup_cmds(commands).context("environment setup failed")?;
            run(&args, benches, *hint)
        }
        Command::Show { path } => show(path),
    }
}
