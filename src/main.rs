//! langfuzz - Coverage-guided fuzzing and load testing for language runtimes
//!
//! Drives an external runtime with generated programs, triages crashes and
//! anomalous behaviors, and finds the load level at which it breaks.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Declare modules (shared with lib.rs)
mod cli;
mod errors;
mod fuzzer;
mod load;
mod reporter;
mod ui;

use cli::commands::{self, load::LoadOptions, run::RunOptions};
use cli::OutputFormat;
use errors::LangFuzzError;
use fuzzer::SuiteProfile;
use load::LoadPattern;
use ui::OutputMode;

/// langfuzz - Fuzz and load test a language runtime
#[derive(Parser)]
#[command(
    name = "langfuzz",
    version,
    about = "Coverage-guided fuzzing and load testing for language runtimes",
    long_about = "langfuzz runs generated programs against a language runtime.\n\n\
                  Features:\n\
                  • Random, mutation and template generation\n\
                  • Crash and behavior triage with deduplication\n\
                  • Coverage-guided corpus growth\n\
                  • Load patterns with breaking-point detection"
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuzz the target, then load test it, under a suite profile
    Run {
        /// Target runtime executable (path or name on PATH)
        #[arg(required = true)]
        target: String,

        /// Arguments placed before the input file
        #[arg(last = true)]
        args: Vec<String>,

        /// Suite profile
        #[arg(short, long, default_value = "standard")]
        suite: SuiteProfile,

        /// Output directory for artifacts
        #[arg(short, long, default_value = "langfuzz-output")]
        output: PathBuf,

        /// Directory for summary reports (defaults to the output directory)
        #[arg(long)]
        reports: Option<PathBuf>,

        /// Number of parallel workers
        #[arg(short = 'W', long, default_value = "4")]
        workers: usize,

        /// Scale the suite's time budget and load test duration
        #[arg(long, default_value = "1.0")]
        duration_multiplier: f64,

        /// Components to run (fuzz, load)
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,

        /// Components to skip (fuzz, load)
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Collect coverage reports from the target
        #[arg(long)]
        coverage: bool,

        /// Seed corpus directory (one program per file)
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Per-execution timeout (e.g. "5s", "500ms")
        #[arg(short, long)]
        timeout: Option<String>,

        /// Stop fuzzing after this many executions
        #[arg(long)]
        max_executions: Option<u64>,

        /// When an exit counts as a crash (default, any-non-zero, signal-only)
        #[arg(long)]
        crash_convention: Option<String>,

        /// Exit non-zero when a unique crash is found
        #[arg(long)]
        ci_strict: bool,
    },

    /// Run a standalone load test against the target
    Load {
        /// Target runtime executable (path or name on PATH)
        #[arg(required = true)]
        target: String,

        /// Arguments placed before the input file
        #[arg(last = true)]
        args: Vec<String>,

        /// Load pattern
        #[arg(short, long, default_value = "constant")]
        pattern: LoadPattern,

        /// Initial number of workers
        #[arg(long, default_value = "1")]
        initial: u32,

        /// Maximum number of workers
        #[arg(long, default_value = "10")]
        max: u32,

        /// Test duration (e.g. "60s", "5m")
        #[arg(short, long, default_value = "60s")]
        duration: String,

        /// Step: workers added per step
        #[arg(long, default_value = "1")]
        step_size: u32,

        /// Step: seconds between steps
        #[arg(long, default_value = "10")]
        step_duration: f64,

        /// Ramp: workers added per second
        #[arg(long, default_value = "0.5")]
        ramp_rate: f64,

        /// Wave: period in seconds
        #[arg(long, default_value = "60")]
        wave_period: f64,

        /// Spike: spike centers in seconds
        #[arg(long, value_delimiter = ',')]
        spikes: Vec<f64>,

        /// Spike: load inside a spike window (defaults to --max)
        #[arg(long)]
        spike_height: Option<u32>,

        /// Random pattern seed
        #[arg(long)]
        seed: Option<u64>,

        /// Per-execution timeout
        #[arg(short, long, default_value = "5s")]
        timeout: String,

        /// Seed corpus directory used as the load workload
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Output directory for artifacts
        #[arg(short, long, default_value = "langfuzz-output")]
        output: PathBuf,

        /// Detect the breaking point from throughput below this ratio
        #[arg(long)]
        throughput_ratio: Option<f64>,
    },
}

fn init_logging(verbosity: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbosity {
            0 => EnvFilter::new("langfuzz=info"),
            1 => EnvFilter::new("langfuzz=debug"),
            2 => EnvFilter::new("langfuzz=trace"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Set the stop flag on Ctrl-C; a second Ctrl-C exits immediately
fn install_ctrl_c(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupted, finishing with a partial report (Ctrl-C again to abort)");
        stop.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

/// Print an error, as a diagnostic when it is a setup error
fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<LangFuzzError>() {
        Some(setup) => {
            let handler = miette::GraphicalReportHandler::new();
            let mut rendered = String::new();
            if handler.render_report(&mut rendered, setup).is_ok() {
                eprintln!("{}", rendered);
            } else {
                eprintln!("Error: {}", setup);
            }
        }
        None => eprintln!("Error: {}", errors::format_error(err)),
    }
}

async fn dispatch(cli: Cli, stop: Arc<AtomicBool>) -> Result<i32> {
    match cli.command {
        Commands::Run {
            target,
            args,
            suite,
            output,
            reports,
            workers,
            duration_multiplier,
            include,
            exclude,
            seed,
            coverage,
            seeds,
            timeout,
            max_executions,
            crash_convention,
            ci_strict,
        } => {
            let options = RunOptions {
                suite,
                output,
                reports,
                workers,
                duration_multiplier,
                include,
                exclude,
                seed,
                coverage,
                seeds,
                timeout,
                max_executions,
                crash_convention,
                ci_strict,
            };
            commands::run::run(
                commands::run::RunArgs {
                    target,
                    target_args: args,
                    options,
                    format: cli.format,
                },
                stop,
            )
            .await
        }
        Commands::Load {
            target,
            args,
            pattern,
            initial,
            max,
            duration,
            step_size,
            step_duration,
            ramp_rate,
            wave_period,
            spikes,
            spike_height,
            seed,
            timeout,
            seeds,
            output,
            throughput_ratio,
        } => {
            let options = LoadOptions {
                pattern,
                initial_load: initial,
                max_load: max,
                duration,
                step_size,
                step_duration_secs: step_duration,
                ramp_rate,
                wave_period_secs: wave_period,
                spike_times_secs: spikes,
                spike_height,
                seed,
                timeout,
                seeds,
                output,
                throughput_ratio,
            };
            commands::load::run(
                commands::load::LoadArgs {
                    target,
                    target_args: args,
                    options,
                    format: cli.format,
                },
                stop,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);
    OutputMode::detect().apply_color_override();

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrl_c(Arc::clone(&stop));

    let code = match dispatch(cli, stop).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            2
        }
    };
    std::process::exit(code);
}
