//! Reporter - Run summaries and load artifacts
//!
//! Every run ends with `summary.json` and `summary.txt` in the reports
//! directory; load tests additionally leave a timestamped artifact under
//! `load/` in the output directory.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fuzzer::{FuzzResults, SuiteProfile};
use crate::load::LoadTestResult;

pub const SUMMARY_JSON: &str = "summary.json";
pub const SUMMARY_TEXT: &str = "summary.txt";

/// Format results for output
pub trait Reportable {
    fn to_text(&self) -> String;
    fn to_json(&self) -> Result<String>;
}

/// Generic report wrapper
#[derive(Debug, Clone, Serialize)]
pub struct Report<T: Serialize> {
    pub tool: String,
    pub version: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Report<T> {
    pub fn new(data: T) -> Self {
        Self {
            tool: "langfuzz".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}

/// Per-component results of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ComponentResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzz: Option<FuzzResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadTestResult>,
}

/// Top-level summary of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub target: String,
    pub suite: SuiteProfile,
    pub total_tests: u64,
    pub unique_crashes: usize,
    pub unique_behaviors: usize,
    pub coverage_percent: f64,
    pub execution_time_seconds: f64,
    pub tests_per_second: f64,
    pub partial: bool,
    pub components: ComponentResults,
}

impl RunSummary {
    pub fn new(
        target: impl Into<String>,
        suite: SuiteProfile,
        components: ComponentResults,
        execution_time_seconds: f64,
    ) -> Self {
        let fuzz = components.fuzz.as_ref();
        let fuzz_tests = fuzz.map_or(0, |f| f.total_tests);
        let load_tests = components.load.as_ref().map_or(0, |l| l.total_executions);
        let total_tests = fuzz_tests + load_tests;
        let partial = fuzz.is_some_and(|f| f.partial)
            || components.load.as_ref().is_some_and(|l| l.cancelled);

        Self {
            target: target.into(),
            suite,
            total_tests,
            unique_crashes: fuzz.map_or(0, |f| f.unique_crashes),
            unique_behaviors: fuzz.map_or(0, |f| f.unique_behaviors),
            coverage_percent: fuzz.map_or(0.0, |f| f.coverage_percent),
            execution_time_seconds,
            tests_per_second: if execution_time_seconds > 0.0 {
                total_tests as f64 / execution_time_seconds
            } else {
                0.0
            },
            partial,
            components,
        }
    }

    /// Process exit status for this run
    pub fn exit_code(&self, ci_strict: bool) -> i32 {
        if ci_strict && self.unique_crashes > 0 {
            1
        } else {
            0
        }
    }
}

impl Reportable for Report<RunSummary> {
    fn to_text(&self) -> String {
        let summary = &self.data;
        let mut out = String::new();

        let _ = writeln!(out, "langfuzz {} run summary", self.version);
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "Timestamp: {}", self.timestamp);
        let _ = writeln!(out, "Target: {}", summary.target);
        let _ = writeln!(out, "Suite: {}", summary.suite);
        let _ = writeln!(
            out,
            "Execution time: {:.1}s",
            summary.execution_time_seconds
        );
        let _ = writeln!(
            out,
            "Tests: {} ({:.1}/s)",
            summary.total_tests, summary.tests_per_second
        );
        let _ = writeln!(out, "Unique crashes: {}", summary.unique_crashes);
        let _ = writeln!(out, "Unique behaviors: {}", summary.unique_behaviors);
        let _ = writeln!(out, "Coverage: {:.1}%", summary.coverage_percent);
        if summary.partial {
            let _ = writeln!(out, "Status: PARTIAL");
        }

        if let Some(fuzz) = &summary.components.fuzz {
            let _ = writeln!(out);
            let _ = writeln!(out, "[fuzz] {}", fuzz.state);
            if let Some(reason) = &fuzz.stop_reason {
                let _ = writeln!(out, "  Stopped: {}", reason);
            }
            let _ = writeln!(out, "  Interesting inputs: {}", fuzz.interesting_inputs);
            let _ = writeln!(out, "  Timeouts: {}", fuzz.timeouts);
            let _ = writeln!(
                out,
                "  Harness failures: {}",
                fuzz.infrastructure_failures
            );
            for crash in &fuzz.crashes {
                let _ = writeln!(
                    out,
                    "  crash {} [{}/{}] x{}: {}",
                    crash.signature, crash.error_kind, crash.severity, crash.occurrences, crash.message
                );
            }
            for behavior in &fuzz.behaviors {
                let _ = writeln!(
                    out,
                    "  behavior {} [{}/{}] x{}: {}",
                    behavior.signature,
                    behavior.behavior_kind,
                    behavior.severity,
                    behavior.occurrences,
                    behavior.message
                );
            }
        }

        if let Some(load) = &summary.components.load {
            let _ = writeln!(out);
            let _ = writeln!(out, "[load] {}", load.pattern);
            let _ = writeln!(
                out,
                "  Executions: {} ({} failed)",
                load.total_executions, load.failed_executions
            );
            let _ = writeln!(
                out,
                "  Throughput: mean {:.1} ops/s, peak {:.1} ops/s",
                load.mean_throughput(),
                load.peak_throughput()
            );
            match load.breaking_point {
                Some(point) => {
                    let _ = writeln!(out, "  Breaking point: {} workers", point);
                }
                None => {
                    let _ = writeln!(out, "  Breaking point: not reached");
                }
            }
        }

        out
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Write `summary.json` and `summary.txt` into `dir`
pub fn write_summary(dir: &Path, report: &Report<RunSummary>) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports directory {}", dir.display()))?;

    let json_path = dir.join(SUMMARY_JSON);
    fs::write(&json_path, report.to_json()?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    let text_path = dir.join(SUMMARY_TEXT);
    fs::write(&text_path, report.to_text())
        .with_context(|| format!("Failed to write {}", text_path.display()))?;

    tracing::info!("Reports written to {}", dir.display());
    Ok(vec![json_path, text_path])
}

/// Write a load test result under `output_dir/load/`
pub fn write_load_artifact(output_dir: &Path, result: &LoadTestResult) -> Result<PathBuf> {
    let dir = output_dir.join("load");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create load directory {}", dir.display()))?;

    let now = chrono::Utc::now();
    let path = dir.join(format!(
        "load_{}_{}.json",
        result.pattern,
        now.format("%Y%m%dT%H%M%S%.3fZ")
    ));
    let report = Report::new(result);
    fs::write(&path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::debug!("Load artifact written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzer::coverage::CoverageMetrics;
    use crate::fuzzer::RunState;
    use crate::load::LoadPattern;

    fn fuzz_results(unique_crashes: usize, partial: bool) -> FuzzResults {
        FuzzResults {
            target: "lang".to_string(),
            suite: SuiteProfile::Quick,
            state: RunState::TimeBudgetExhausted,
            stop_reason: None,
            partial,
            total_tests: 100,
            unique_crashes,
            total_crashes: unique_crashes as u64,
            unique_behaviors: 2,
            total_behaviors: 5,
            interesting_inputs: 4,
            timeouts: 0,
            infrastructure_failures: 0,
            generation_failures: 0,
            coverage_percent: 42.5,
            coverage: CoverageMetrics::default(),
            duration_secs: 10.0,
            tests_per_second: 10.0,
            crashes: vec![],
            behaviors: vec![],
        }
    }

    fn load_result(cancelled: bool) -> LoadTestResult {
        LoadTestResult {
            pattern: LoadPattern::Step,
            throughput_series: vec![(1.0, 10.0), (2.0, 30.0)],
            breaking_point: Some(8),
            success: !cancelled,
            cancelled,
            samples: vec![],
            total_executions: 40,
            failed_executions: 1,
            duration_secs: 2.0,
        }
    }

    #[test]
    fn summary_json_uses_camel_case_keys() {
        let components = ComponentResults {
            fuzz: Some(fuzz_results(1, false)),
            load: Some(load_result(false)),
        };
        let report = Report::new(RunSummary::new("lang", SuiteProfile::Quick, components, 20.0));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["tool"], "langfuzz");
        assert_eq!(json["totalTests"], 140);
        assert_eq!(json["uniqueCrashes"], 1);
        assert_eq!(json["uniqueBehaviors"], 2);
        assert_eq!(json["coveragePercent"], 42.5);
        assert_eq!(json["executionTimeSeconds"], 20.0);
        assert_eq!(json["testsPerSecond"], 7.0);
        assert_eq!(json["partial"], false);
        assert!(json["components"]["fuzz"].is_object());
        assert_eq!(json["components"]["load"]["breakingPoint"], 8);
    }

    #[test]
    fn partial_from_either_component() {
        let fuzz_partial = RunSummary::new(
            "lang",
            SuiteProfile::Quick,
            ComponentResults {
                fuzz: Some(fuzz_results(0, true)),
                load: None,
            },
            1.0,
        );
        assert!(fuzz_partial.partial);

        let load_cancelled = RunSummary::new(
            "lang",
            SuiteProfile::Quick,
            ComponentResults {
                fuzz: Some(fuzz_results(0, false)),
                load: Some(load_result(true)),
            },
            1.0,
        );
        assert!(load_cancelled.partial);
    }

    #[test]
    fn exit_code_only_in_ci_strict() {
        let crashed = RunSummary::new(
            "lang",
            SuiteProfile::Quick,
            ComponentResults {
                fuzz: Some(fuzz_results(3, false)),
                load: None,
            },
            1.0,
        );
        assert_eq!(crashed.exit_code(false), 0);
        assert_eq!(crashed.exit_code(true), 1);

        let clean = RunSummary::new("lang", SuiteProfile::Quick, ComponentResults::default(), 0.0);
        assert_eq!(clean.exit_code(true), 0);
        assert_eq!(clean.tests_per_second, 0.0);
    }

    #[test]
    fn writes_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let report = Report::new(RunSummary::new(
            "lang",
            SuiteProfile::Standard,
            ComponentResults {
                fuzz: Some(fuzz_results(1, false)),
                load: Some(load_result(false)),
            },
            20.0,
        ));

        let written = write_summary(&reports, &report).unwrap();
        assert_eq!(written.len(), 2);

        let text = std::fs::read_to_string(reports.join(SUMMARY_TEXT)).unwrap();
        assert!(text.contains("Unique crashes: 1"));
        assert!(text.contains("Breaking point: 8 workers"));
        assert!(reports.join(SUMMARY_JSON).exists());
    }

    #[test]
    fn writes_load_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_load_artifact(dir.path(), &load_result(false)).unwrap();

        assert!(path.starts_with(dir.path().join("load")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("load_step_"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["totalExecutions"], 40);
        assert!(json["timestamp"].is_string());
    }
}
