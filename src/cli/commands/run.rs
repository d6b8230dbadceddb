//! Run command - Fuzzing and load testing under a suite profile

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::load::{execute_load_test, load_cases, parse_duration_arg};
use crate::cli::OutputFormat;
use crate::errors::LangFuzzError;
use crate::fuzzer::corpus::Corpus;
use crate::fuzzer::harness::{resolve_target, CrashConvention, Executor, ProcessHarness};
use crate::fuzzer::limits::format_duration;
use crate::fuzzer::{Component, FuzzConfig, FuzzSession, SuiteProfile};
use crate::reporter::{
    write_load_artifact, write_summary, ComponentResults, Report, Reportable, RunSummary,
};
use crate::ui::{OutputMode, Printer};

/// Arguments for the run command
pub struct RunArgs {
    /// Target runtime executable
    pub target: String,
    /// Arguments placed before the input file
    pub target_args: Vec<String>,
    pub options: RunOptions,
    pub format: OutputFormat,
}

/// Run options (everything but the target)
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub suite: SuiteProfile,
    pub output: PathBuf,
    /// Reports directory (None = output directory)
    pub reports: Option<PathBuf>,
    pub workers: usize,
    pub duration_multiplier: f64,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub seed: Option<u64>,
    pub coverage: bool,
    pub seeds: Option<PathBuf>,
    /// Per-execution timeout (e.g. "5s")
    pub timeout: Option<String>,
    pub max_executions: Option<u64>,
    /// Crash convention name (default, any-non-zero, signal-only)
    pub crash_convention: Option<String>,
    pub ci_strict: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            suite: SuiteProfile::Standard,
            output: PathBuf::from("langfuzz-output"),
            reports: None,
            workers: 4,
            duration_multiplier: 1.0,
            include: Vec::new(),
            exclude: Vec::new(),
            seed: None,
            coverage: false,
            seeds: None,
            timeout: None,
            max_executions: None,
            crash_convention: None,
            ci_strict: false,
        }
    }
}

impl RunOptions {
    /// Build a validated configuration from the suite defaults and flags
    pub fn to_config(&self) -> Result<FuzzConfig, LangFuzzError> {
        let components = Component::resolve(&self.include, &self.exclude)?;

        let mut config = FuzzConfig::with_suite(self.suite)
            .with_workers(self.workers)
            .with_duration_multiplier(self.duration_multiplier)
            .with_coverage(self.coverage)
            .with_seed_dir(self.seeds.clone())
            .with_output_dir(self.output.clone())
            .with_reports_dir(self.reports.clone())
            .with_components(components)
            .with_ci_strict(self.ci_strict);

        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(timeout) = &self.timeout {
            config = config.with_timeout(parse_duration_arg("timeout", timeout)?);
        }
        if let Some(max) = self.max_executions {
            config = config.with_max_executions(max);
        }

        config.validate()?;
        Ok(config)
    }

    fn convention(&self) -> Result<CrashConvention, LangFuzzError> {
        match &self.crash_convention {
            None => Ok(CrashConvention::default()),
            Some(name) => CrashConvention::parse(name).ok_or_else(|| {
                LangFuzzError::invalid_config(format!(
                    "unknown crash convention '{}' (expected default, any-non-zero or signal-only)",
                    name
                ))
            }),
        }
    }
}

/// Run the run command; returns the process exit status
pub async fn run(args: RunArgs, stop: Arc<AtomicBool>) -> Result<i32> {
    let RunArgs {
        target,
        target_args,
        options,
        format,
    } = args;

    let config = options.to_config()?;
    let convention = options.convention()?;
    let target_path = resolve_target(&target)?;
    let mode = OutputMode::detect();
    let printer = Printer::with_mode(mode);

    info!("Running suite {} against {}", config.suite, target);
    debug!("Config: {:?}", config);

    if format == OutputFormat::Text {
        printer.header("Starting langfuzz run...");
        printer.kv("Target", &target_path.display().to_string());
        printer.kv("Suite", config.suite.as_str());
        printer.kv(
            "Components",
            &config
                .components
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        printer.kv("Budget", &format_duration(config.effective_time_limit()));
        printer.kv("Workers", &config.workers.to_string());
        if let Some(seed) = config.seed {
            printer.kv("Seed", &seed.to_string());
        }
        if config.coverage_guided {
            printer.kv("Coverage", "enabled");
        }
        printer.kv("Output", &config.output_dir.display().to_string());
        printer.newline();
    }

    Corpus::new()
        .with_output_dir(config.output_dir.clone())
        .prepare_output()?;

    let executor: Arc<dyn Executor> = Arc::new(
        ProcessHarness::new(target_path)
            .with_args(target_args)
            .with_convention(convention)
            .with_coverage(config.coverage_guided),
    );

    let started = Instant::now();
    let mut components = ComponentResults::default();

    if config.is_enabled(Component::Fuzz) {
        let mut session = FuzzSession::new(target.clone(), config.clone(), Arc::clone(&executor))?
            .with_stop_flag(Arc::clone(&stop))
            .with_output_mode(mode);
        let results = session.run().await?;
        if format == OutputFormat::Text {
            results.print_text();
            println!();
        }
        components.fuzz = Some(results);
    }

    match config.effective_load_test() {
        Some(_) if stop.load(Ordering::SeqCst) => {
            printer.warning("Cancelled before the load test started");
        }
        Some(load_config) => {
            if format == OutputFormat::Text {
                printer.header(&format!("Load test ({})", load_config.pattern));
            }
            let cases = load_cases(config.seed_dir.as_deref())?;
            let result = execute_load_test(
                load_config,
                Arc::clone(&executor),
                cases,
                Arc::clone(&stop),
                mode,
            )
            .await;
            write_load_artifact(&config.output_dir, &result)?;
            if format == OutputFormat::Text {
                result.print_text();
                println!();
            }
            components.load = Some(result);
        }
        None => debug!("No load test for suite {}", config.suite),
    }

    let summary = RunSummary::new(
        target,
        config.suite,
        components,
        started.elapsed().as_secs_f64(),
    );
    let exit_code = summary.exit_code(config.ci_strict);
    let report = Report::new(summary);
    let reports_dir = config.reports_dir();
    write_summary(&reports_dir, &report)?;

    match format {
        OutputFormat::Text => {
            println!(
                "Reports: {}",
                reports_dir.display().to_string().dimmed()
            );
            if report.data.partial {
                printer.warning("Run was partial");
            }
            if exit_code != 0 {
                printer.error(&format!(
                    "{} unique crash(es) found (CI-strict)",
                    report.data.unique_crashes
                ));
            } else {
                printer.success("Run complete");
            }
        }
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_follow_suite() {
        let config = RunOptions::default().to_config().unwrap();
        assert_eq!(config.suite, SuiteProfile::Standard);
        assert_eq!(config.workers, 4);
        assert_eq!(config.components, Component::ALL.to_vec());
        assert!(config.effective_load_test().is_some());
    }

    #[test]
    fn exclude_load_drops_load_test() {
        let options = RunOptions {
            exclude: vec!["load".to_string()],
            ..RunOptions::default()
        };
        let config = options.to_config().unwrap();
        assert!(!config.is_enabled(Component::Load));
        assert!(config.effective_load_test().is_none());
    }

    #[test]
    fn unknown_component_is_rejected() {
        let options = RunOptions {
            include: vec!["fuz".to_string()],
            ..RunOptions::default()
        };
        assert!(matches!(
            options.to_config().unwrap_err(),
            LangFuzzError::UnknownComponent { .. }
        ));
    }

    #[test]
    fn flags_override_suite_defaults() {
        let options = RunOptions {
            suite: SuiteProfile::Quick,
            duration_multiplier: 0.5,
            timeout: Some("2s".to_string()),
            seed: Some(11),
            max_executions: Some(50),
            reports: Some(PathBuf::from("reports")),
            ..RunOptions::default()
        };
        let config = options.to_config().unwrap();
        assert_eq!(config.effective_time_limit(), Duration::from_secs(15));
        assert_eq!(config.test_timeout, Duration::from_secs(2));
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.resource_limits.max_executions, Some(50));
        assert_eq!(config.reports_dir(), PathBuf::from("reports"));
    }

    #[test]
    fn non_positive_multiplier_is_rejected() {
        let options = RunOptions {
            duration_multiplier: 0.0,
            ..RunOptions::default()
        };
        assert!(options.to_config().is_err());
    }

    #[test]
    fn crash_convention_names() {
        let mut options = RunOptions::default();
        assert_eq!(options.convention().unwrap(), CrashConvention::SignalOrPattern);

        options.crash_convention = Some("signal-only".to_string());
        assert_eq!(options.convention().unwrap(), CrashConvention::SignalOnly);

        options.crash_convention = Some("sometimes".to_string());
        assert!(options.convention().is_err());
    }
}
