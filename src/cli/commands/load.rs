//! Load command - Standalone load test against the target

use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::cli::OutputFormat;
use crate::errors::LangFuzzError;
use crate::fuzzer::corpus::Corpus;
use crate::fuzzer::harness::{resolve_target, Executor, ProcessHarness};
use crate::fuzzer::limits::{format_duration, ResourceLimits};
use crate::fuzzer::TestCase;
use crate::load::{
    BreakingPointSignal, LoadPattern, LoadTestConfig, LoadTestController, LoadTestResult,
};
use crate::reporter::write_load_artifact;
use crate::ui::{OutputMode, Printer, ProgressStyle, RunProgress};

/// Ticks below the throughput threshold before the breaking point latches
const THROUGHPUT_SUSTAIN_TICKS: u32 = 3;

/// Arguments for the load command
pub struct LoadArgs {
    /// Target runtime executable
    pub target: String,
    /// Arguments placed before the input file
    pub target_args: Vec<String>,
    pub options: LoadOptions,
    pub format: OutputFormat,
}

/// Load test options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub pattern: LoadPattern,
    pub initial_load: u32,
    pub max_load: u32,
    /// Test duration (e.g. "60s", "5m")
    pub duration: String,
    pub step_size: u32,
    pub step_duration_secs: f64,
    pub ramp_rate: f64,
    pub wave_period_secs: f64,
    pub spike_times_secs: Vec<f64>,
    pub spike_height: Option<u32>,
    pub seed: Option<u64>,
    /// Per-execution timeout (e.g. "5s")
    pub timeout: String,
    pub seeds: Option<PathBuf>,
    pub output: PathBuf,
    /// Use the throughput signal with this ratio instead of the worker count
    pub throughput_ratio: Option<f64>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        let defaults = LoadTestConfig::default();
        Self {
            pattern: LoadPattern::Constant,
            initial_load: defaults.initial_load,
            max_load: defaults.max_load,
            duration: "60s".to_string(),
            step_size: defaults.step_size,
            step_duration_secs: defaults.step_duration_secs,
            ramp_rate: defaults.ramp_rate,
            wave_period_secs: defaults.wave_period_secs,
            spike_times_secs: Vec::new(),
            spike_height: None,
            seed: None,
            timeout: "5s".to_string(),
            seeds: None,
            output: PathBuf::from("langfuzz-output"),
            throughput_ratio: None,
        }
    }
}

impl LoadOptions {
    /// Build a validated load test configuration
    pub fn to_config(&self) -> Result<LoadTestConfig, LangFuzzError> {
        let duration = parse_duration_arg("duration", &self.duration)?;
        let timeout = parse_duration_arg("timeout", &self.timeout)?;

        let spikes = if self.spike_times_secs.is_empty() {
            LoadTestConfig::default().spike_times_secs
        } else {
            self.spike_times_secs.clone()
        };

        let mut config = LoadTestConfig::new(self.pattern)
            .with_loads(self.initial_load, self.max_load)
            .with_duration(duration)
            .with_step(self.step_size, self.step_duration_secs)
            .with_ramp_rate(self.ramp_rate)
            .with_wave_period(self.wave_period_secs)
            .with_spikes(spikes, self.spike_height.unwrap_or(self.max_load))
            .with_test_timeout(timeout);
        if let Some(seed) = self.seed {
            config = config.with_random_seed(seed);
        }
        if let Some(ratio) = self.throughput_ratio {
            config = config.with_breaking_point(BreakingPointSignal::Throughput {
                threshold_ratio: ratio,
                sustain_ticks: THROUGHPUT_SUSTAIN_TICKS,
            });
        }

        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn parse_duration_arg(flag: &str, value: &str) -> Result<Duration, LangFuzzError> {
    ResourceLimits::parse_duration(value)
        .map_err(|e| LangFuzzError::invalid_config(format!("invalid --{} '{}': {}", flag, value, e)))
}

/// Test cases the load workers cycle through
pub(crate) fn load_cases(seed_dir: Option<&Path>) -> Result<Vec<TestCase>, LangFuzzError> {
    let mut corpus = Corpus::new();
    corpus.initialize(seed_dir)?;
    Ok(corpus.seeds().to_vec())
}

/// Run a load test, drawing a progress bar while it runs
pub(crate) async fn execute_load_test(
    config: LoadTestConfig,
    executor: Arc<dyn Executor>,
    cases: Vec<TestCase>,
    stop: Arc<AtomicBool>,
    mode: OutputMode,
) -> LoadTestResult {
    let progress = RunProgress::start(mode, ProgressStyle::Load, config.duration);
    let controller = LoadTestController::new(config, executor, cases).with_stop_flag(stop);

    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let run = controller.run();
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = ticker.tick() => {
                progress.set_elapsed(started.elapsed());
                progress.set_message(format!("{} workers", controller.running_workers()));
            }
        }
    };

    progress.finish_with_message(&match result.breaking_point {
        Some(point) => format!("breaking point at {} workers", point),
        None => "no breaking point".to_string(),
    });
    result
}

/// Run the load command
pub async fn run(args: LoadArgs, stop: Arc<AtomicBool>) -> Result<i32> {
    let LoadArgs {
        target,
        target_args,
        options,
        format,
    } = args;

    let config = options.to_config()?;
    let target_path = resolve_target(&target)?;
    let mode = OutputMode::detect();
    let printer = Printer::with_mode(mode);

    info!("Load testing {} with {} pattern", target, config.pattern);
    debug!("Load config: {:?}", config);

    if format == OutputFormat::Text {
        printer.header("Starting load test...");
        printer.kv("Target", &target_path.display().to_string());
        printer.kv("Pattern", config.pattern.as_str());
        printer.kv(
            "Load",
            &format!("{} → {} workers", config.initial_load, config.max_load),
        );
        printer.kv("Duration", &format_duration(config.duration));
        printer.newline();
    }

    Corpus::new()
        .with_output_dir(options.output.clone())
        .prepare_output()?;
    let cases = load_cases(options.seeds.as_deref())?;
    let executor: Arc<dyn Executor> =
        Arc::new(ProcessHarness::new(target_path).with_args(target_args));

    let result = execute_load_test(config, executor, cases, stop, mode).await;
    let artifact = write_load_artifact(&options.output, &result)?;

    match format {
        OutputFormat::Text => {
            result.print_text();
            println!();
            println!("Artifact: {}", artifact.display().to_string().dimmed());
        }
        OutputFormat::Json => result.print_json()?,
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_build_config() {
        let config = LoadOptions::default().to_config().unwrap();
        assert_eq!(config.pattern, LoadPattern::Constant);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.test_timeout, Duration::from_secs(5));
        assert_eq!(config.breaking_point, BreakingPointSignal::WorkerCount);
    }

    #[test]
    fn step_options_map_through() {
        let options = LoadOptions {
            pattern: LoadPattern::Step,
            initial_load: 10,
            max_load: 100,
            duration: "2m".to_string(),
            step_size: 10,
            step_duration_secs: 30.0,
            seed: Some(9),
            ..LoadOptions::default()
        };
        let config = options.to_config().unwrap();
        assert_eq!(config.initial_load, 10);
        assert_eq!(config.max_load, 100);
        assert_eq!(config.step_size, 10);
        assert_eq!(config.duration, Duration::from_secs(120));
        assert_eq!(config.random_seed, 9);
    }

    #[test]
    fn throughput_ratio_selects_signal() {
        let options = LoadOptions {
            throughput_ratio: Some(0.5),
            ..LoadOptions::default()
        };
        assert_eq!(
            options.to_config().unwrap().breaking_point,
            BreakingPointSignal::Throughput {
                threshold_ratio: 0.5,
                sustain_ticks: THROUGHPUT_SUSTAIN_TICKS
            }
        );
    }

    #[test]
    fn spike_height_defaults_to_max_load() {
        let options = LoadOptions {
            pattern: LoadPattern::Spike,
            max_load: 40,
            spike_times_secs: vec![10.0],
            ..LoadOptions::default()
        };
        assert_eq!(options.to_config().unwrap().spike_height, 40);
    }

    #[test]
    fn bad_duration_is_config_error() {
        let options = LoadOptions {
            duration: "soon".to_string(),
            ..LoadOptions::default()
        };
        let err = options.to_config().unwrap_err();
        assert!(matches!(err, LangFuzzError::InvalidConfig { .. }));
        assert!(err.to_string().contains("--duration"));
    }

    #[test]
    fn builtin_cases_without_seed_dir() {
        let cases = load_cases(None).unwrap();
        assert!(!cases.is_empty());
        assert!(cases.iter().all(|c| c.is_seed()));
    }
}
