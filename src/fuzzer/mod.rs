//! Fuzz Engine - Coverage-guided fuzzing of language runtimes
//!
//! A [`session::FuzzSession`] drives a pool of executions against the target,
//! triages every result through the crash, behavior and coverage analyzers,
//! and keeps the inputs that taught it something new.

pub mod analysis;
pub mod config;
pub mod corpus;
pub mod coverage;
pub mod generator;
pub mod harness;
pub mod input;
pub mod limits;
pub mod session;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use analysis::{BehaviorRecord, CrashRecord, ErrorKind, Severity};
pub use config::{Component, FuzzConfig, SuiteProfile};
pub use corpus::Corpus;
pub use coverage::{CoverageAnalyzer, CoverageMetrics, CoverageReport};
pub use generator::{GeneratorSettings, GeneratorSuite, Strategy};
pub use harness::{CrashConvention, Executor, HarnessError, ProcessHarness};
pub use input::{GeneratorKind, TestCase, TestResult};
pub use limits::{LimitExceeded, ResourceLimits, ResourceMonitor};
pub use session::{FuzzSession, RunState};

/// Fuzzing session results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzResults {
    pub target: String,
    pub suite: SuiteProfile,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Cancelled, or some executions were lost to harness failures
    pub partial: bool,
    pub total_tests: u64,
    pub unique_crashes: usize,
    pub total_crashes: u64,
    pub unique_behaviors: usize,
    pub total_behaviors: u64,
    pub interesting_inputs: usize,
    pub timeouts: u64,
    pub infrastructure_failures: u64,
    pub generation_failures: u64,
    pub coverage_percent: f64,
    pub coverage: CoverageMetrics,
    pub duration_secs: f64,
    pub tests_per_second: f64,
    pub crashes: Vec<CrashRecord>,
    pub behaviors: Vec<BehaviorRecord>,
}

impl FuzzResults {
    pub fn has_crashes(&self) -> bool {
        self.unique_crashes > 0
    }

    pub fn print_text(&self) {
        use colored::Colorize;

        println!("{}", "Fuzzing Results".cyan().bold());
        println!("{}", "=".repeat(50));
        println!();

        println!("Target: {}", self.target);
        println!("Suite: {}", self.suite);
        println!(
            "Duration: {:.1}s ({})",
            self.duration_secs,
            self.state.to_string().dimmed()
        );
        if let Some(reason) = &self.stop_reason {
            println!("Stopped: {}", reason);
        }
        println!(
            "Tests: {} ({:.1}/s)",
            self.total_tests, self.tests_per_second
        );
        println!("Interesting inputs: {}", self.interesting_inputs);
        if self.timeouts > 0 {
            println!("Timeouts: {}", self.timeouts);
        }
        if self.infrastructure_failures > 0 {
            println!(
                "{}",
                format!("Harness failures: {}", self.infrastructure_failures).yellow()
            );
        }
        println!();

        println!("{}", "Coverage:".yellow());
        println!("  Overall: {:.1}%", self.coverage_percent);
        println!(
            "  Lines: {} ({:.1}%)",
            self.coverage.covered_lines, self.coverage.line_coverage
        );
        println!(
            "  Branches: {} ({:.1}%)",
            self.coverage.covered_branches, self.coverage.branch_coverage
        );
        println!(
            "  Functions: {} ({:.1}%)",
            self.coverage.covered_functions, self.coverage.function_coverage
        );
        println!();

        if self.crashes.is_empty() {
            println!("{}", "No crashes found ✓".green());
        } else {
            println!(
                "{}",
                format!(
                    "Unique crashes: {} ({} total)",
                    self.unique_crashes, self.total_crashes
                )
                .red()
                .bold()
            );
            for crash in &self.crashes {
                println!();
                println!(
                    "  {} [{}] x{}",
                    crash.error_kind.to_string().red(),
                    crash.severity,
                    crash.occurrences
                );
                println!("  Signature: {}", crash.signature.dimmed());
                println!("  Message: {}", crash.message);
                println!("  Input: {}", preview(&crash.input).dimmed());
            }
        }

        if !self.behaviors.is_empty() {
            println!();
            println!(
                "{}",
                format!(
                    "Unique behaviors: {} ({} total)",
                    self.unique_behaviors, self.total_behaviors
                )
                .yellow()
            );
            for behavior in &self.behaviors {
                println!(
                    "  {} [{}] x{}: {}",
                    behavior.behavior_kind, behavior.severity, behavior.occurrences, behavior.message
                );
            }
        }

        if self.partial {
            println!();
            println!("{}", "Results are partial".yellow());
        }
    }

    pub fn print_json(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

/// First line of an input, shortened for display
fn preview(input: &str) -> String {
    let line = input.lines().next().unwrap_or_default();
    if line.chars().count() > 60 {
        format!("{}...", line.chars().take(60).collect::<String>())
    } else {
        line.to_string()
    }
}
