use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trackbench::{BenchConfig, Benchmark, stitcher};

#[derive(Parser, Debug)]
#[command(name = "trackbench", version, about = "Benchmark multi-object trackers on MOTChallenge-style datasets")]
struct Args {
    /// TOML configuration; built-in DanceTrack defaults when omitted
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every tracker over every sequence
    Run,
    /// Convert run outputs into canonical result files and write the seqmap
    Stitch,
    /// Write the seqmap only
    Manifest,
    /// Run the evaluator on the stitched results
    Evaluate {
        /// Reuse the existing evaluator checkout instead of cloning a fresh one
        #[arg(long)]
        skip_prepare: bool,
    },
    /// Run, stitch, write the seqmap and evaluate
    All {
        #[arg(long)]
        skip_prepare: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BenchConfig::default(),
    };

    match args.command {
        Command::Run => run(&config),
        Command::Stitch => {
            stitch(&config)?;
            manifest(&config)
        }
        Command::Manifest => manifest(&config),
        Command::Evaluate { skip_prepare } => evaluate(&config, skip_prepare),
        Command::All { skip_prepare } => {
            run(&config)?;
            stitch(&config)?;
            manifest(&config)?;
            evaluate(&config, skip_prepare)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config: &BenchConfig) -> Result<()> {
    let catalog = config.catalog().context("run: cannot open dataset")?;
    let sequences = catalog.sequences().context("run: cannot list sequences")?;
    if sequences.is_empty() {
        bail!("run: no sequences under {}", catalog.root().display());
    }

    let benchmark = Benchmark::new(
        sequences,
        config.tracker_factories(),
        config.detector_factory(),
        config.executor(),
        config.benchmark_options(),
    );

    let progress = ProgressBar::new(benchmark.unit_count() as u64);
    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
        .progress_chars("=>-");
    progress.set_style(style);
    progress.set_message("tracking");
    let report = benchmark
        .with_progress(progress.clone())
        .run()
        .context("run: benchmark failed")?;
    progress.finish_with_message("done");

    for (tracker, sequence, reason) in report.failures() {
        error!(stage = "run", tracker, sequence, reason, "unit failed");
    }
    for t in report.throughput() {
        info!(stage = "run", tracker = %t.tracker, sequences = t.sequences, frames = t.frames, fps = t.fps, "throughput");
    }
    if report.completed().next().is_none() {
        bail!("run: no (tracker, sequence) unit completed");
    }
    Ok(())
}

fn stitch(config: &BenchConfig) -> Result<()> {
    let catalog = config.catalog().context("stitch: cannot open dataset")?;
    let report = config
        .stitcher()
        .stitch(&config.paths.runs, &catalog, &config.paths.results)
        .context("stitch: failed")?;
    if report.skipped_files + report.skipped_lines > 0 {
        warn!(
            stage = "stitch",
            files = report.skipped_files,
            lines = report.skipped_lines,
            "skipped unreadable label input"
        );
    }
    if report.trackers.is_empty() {
        warn!(stage = "stitch", runs = %config.paths.runs.display(), "no run directory matched a tracker alias");
    }
    Ok(())
}

fn manifest(config: &BenchConfig) -> Result<()> {
    let catalog = config.catalog().context("manifest: cannot open dataset")?;
    let manifest = config
        .manifest_builder()
        .build(&catalog)
        .context("manifest: cannot list sequences")?;
    manifest
        .write(&config.paths.results)
        .context("manifest: cannot write seqmap")?;
    Ok(())
}

fn evaluate(config: &BenchConfig, skip_prepare: bool) -> Result<()> {
    let adapter = config.evaluation_adapter();
    if !skip_prepare {
        adapter.prepare().context("evaluate: evaluator setup failed")?;
    }

    let manifest = config.paths.results.join(config.manifest_builder().relative_path());
    let trackers = stitcher::stitched_trackers(&config.paths.results)
        .context("evaluate: cannot list stitched trackers")?;
    let outcome = adapter
        .invoke(&manifest, &config.paths.results, &trackers)
        .context("evaluate: failed")?;

    if !outcome.stdout.is_empty() {
        println!("{}", outcome.stdout.trim_end());
    }
    if outcome.timed_out {
        bail!("evaluate: evaluator timed out");
    }
    if !outcome.success {
        bail!("evaluate: evaluator exited with {:?}", outcome.exit_code);
    }
    Ok(())
}
