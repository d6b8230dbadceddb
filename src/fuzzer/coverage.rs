//! Coverage Analyzer - Aggregate target coverage reports for guided fuzzing
//!
//! Normalizes per-file coverage reports emitted by the target into four
//! global sets (lines, branches, functions, files). Global coverage only
//! ever grows; a submission is interesting iff it adds at least one element.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Coverage report as emitted by the target's instrumentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    #[serde(default)]
    pub files: BTreeMap<String, FileCoverage>,
}

/// Coverage of a single source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    #[serde(default)]
    pub lines: Vec<u32>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_branches: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_functions: Option<usize>,
}

impl CoverageReport {
    /// Parse a JSON coverage report
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read and parse a coverage report from disk
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content)?)
    }

    /// Add coverage for one file
    pub fn with_file(mut self, file: impl Into<String>, coverage: FileCoverage) -> Self {
        self.files.insert(file.into(), coverage);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The four coverage sets, keyed by `"file:locator"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSet {
    pub lines: BTreeSet<String>,
    pub branches: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub files: BTreeSet<String>,
}

impl CoverageSet {
    /// Total number of elements across all four sets
    pub fn len(&self) -> usize {
        self.lines.len() + self.branches.len() + self.functions.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Elements newly added by one submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageDelta {
    pub lines: usize,
    pub branches: usize,
    pub functions: usize,
    pub files: usize,
}

impl CoverageDelta {
    pub fn total(&self) -> usize {
        self.lines + self.branches + self.functions + self.files
    }
}

/// Percent coverage metrics over everything known so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageMetrics {
    pub line_coverage: f64,
    pub branch_coverage: f64,
    pub function_coverage: f64,
    pub overall_coverage: f64,
    pub covered_lines: usize,
    pub covered_branches: usize,
    pub covered_functions: usize,
    pub files_seen: usize,
}

/// Outcome of analyzing a single coverage report
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageOutcome {
    pub is_interesting: bool,
    pub delta: CoverageDelta,
    pub metrics: CoverageMetrics,
}

/// Coverage statistics for run summaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageStats {
    /// Submissions analyzed
    pub submissions: u64,
    /// Submissions that grew global coverage
    pub interesting_submissions: u64,
    /// Rate of submissions finding new coverage
    pub new_coverage_rate: f64,
    /// Coverage snapshots written to disk
    pub snapshots_written: usize,
    /// Current metrics
    pub metrics: CoverageMetrics,
}

#[derive(Debug, Clone, Copy, Default)]
struct FileCounts {
    covered_lines: usize,
    covered_branches: usize,
    covered_functions: usize,
    known_lines: usize,
    known_branches: usize,
    known_functions: usize,
}

/// Aggregates coverage across a run
pub struct CoverageAnalyzer {
    global: CoverageSet,
    per_file: HashMap<String, FileCounts>,
    snapshot_dir: Option<PathBuf>,
    submissions: u64,
    interesting_submissions: u64,
    snapshots_written: usize,
}

impl Default for CoverageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageAnalyzer {
    /// Create an analyzer that keeps coverage in memory only
    pub fn new() -> Self {
        Self {
            global: CoverageSet::default(),
            per_file: HashMap::new(),
            snapshot_dir: None,
            submissions: 0,
            interesting_submissions: 0,
            snapshots_written: 0,
        }
    }

    /// Persist a snapshot into `dir` every time coverage grows
    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = Some(dir);
        self
    }

    /// Merge a report into global coverage
    pub fn analyze(&mut self, report: &CoverageReport) -> CoverageOutcome {
        self.submissions += 1;
        let mut delta = CoverageDelta::default();

        for (file, coverage) in &report.files {
            if file.is_empty() {
                continue;
            }
            if self.global.files.insert(file.clone()) {
                delta.files += 1;
            }
            let counts = self.per_file.entry(file.clone()).or_default();

            for line in &coverage.lines {
                if self.global.lines.insert(format!("{}:{}", file, line)) {
                    delta.lines += 1;
                    counts.covered_lines += 1;
                }
            }
            for branch in &coverage.branches {
                if self.global.branches.insert(format!("{}:{}", file, branch)) {
                    delta.branches += 1;
                    counts.covered_branches += 1;
                }
            }
            for function in &coverage.functions {
                if self.global.functions.insert(format!("{}:{}", file, function)) {
                    delta.functions += 1;
                    counts.covered_functions += 1;
                }
            }

            counts.known_lines = counts.known_lines.max(coverage.total_lines.unwrap_or(0));
            counts.known_branches = counts
                .known_branches
                .max(coverage.total_branches.unwrap_or(0));
            counts.known_functions = counts
                .known_functions
                .max(coverage.total_functions.unwrap_or(0));
        }

        let is_interesting = delta.total() > 0;
        if is_interesting {
            self.interesting_submissions += 1;
            if self.snapshot_dir.is_some() {
                if let Err(e) = self.persist_snapshot() {
                    tracing::warn!("Failed to write coverage snapshot: {}", e);
                }
            }
        }

        CoverageOutcome {
            is_interesting,
            delta,
            metrics: self.metrics(),
        }
    }

    /// Current percent metrics
    pub fn metrics(&self) -> CoverageMetrics {
        let mut known_lines = 0;
        let mut known_branches = 0;
        let mut known_functions = 0;
        for counts in self.per_file.values() {
            known_lines += counts.known_lines.max(counts.covered_lines);
            known_branches += counts.known_branches.max(counts.covered_branches);
            known_functions += counts.known_functions.max(counts.covered_functions);
        }

        let line_coverage = percent(self.global.lines.len(), known_lines);
        let branch_coverage = percent(self.global.branches.len(), known_branches);
        let function_coverage = percent(self.global.functions.len(), known_functions);

        CoverageMetrics {
            line_coverage,
            branch_coverage,
            function_coverage,
            overall_coverage: (line_coverage + branch_coverage + function_coverage) / 3.0,
            covered_lines: self.global.lines.len(),
            covered_branches: self.global.branches.len(),
            covered_functions: self.global.functions.len(),
            files_seen: self.global.files.len(),
        }
    }

    /// Write the full global coverage sets to a timestamped file
    pub fn persist_snapshot(&mut self) -> anyhow::Result<PathBuf> {
        let dir = self
            .snapshot_dir
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No coverage snapshot directory configured"))?;
        fs::create_dir_all(dir)?;

        let snapshot = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "metrics": self.metrics(),
            "coverage": self.global,
        });
        let filename = format!(
            "coverage_{}_{:04}.json",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            self.snapshots_written
        );
        let path = dir.join(filename);
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        self.snapshots_written += 1;
        Ok(path)
    }

    /// Global coverage accumulated so far
    pub fn global(&self) -> &CoverageSet {
        &self.global
    }

    pub fn stats(&self) -> CoverageStats {
        let new_coverage_rate = if self.submissions > 0 {
            self.interesting_submissions as f64 / self.submissions as f64
        } else {
            0.0
        };

        CoverageStats {
            submissions: self.submissions,
            interesting_submissions: self.interesting_submissions,
            new_coverage_rate,
            snapshots_written: self.snapshots_written,
            metrics: self.metrics(),
        }
    }
}

fn percent(covered: usize, known: usize) -> f64 {
    if known == 0 {
        0.0
    } else {
        covered as f64 / known as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(file: &str, lines: &[u32], branches: &[&str], functions: &[&str]) -> CoverageReport {
        CoverageReport::default().with_file(
            file,
            FileCoverage {
                lines: lines.to_vec(),
                branches: branches.iter().map(|b| b.to_string()).collect(),
                functions: functions.iter().map(|f| f.to_string()).collect(),
                total_lines: Some(10),
                total_branches: Some(4),
                total_functions: Some(2),
            },
        )
    }

    #[test]
    fn first_submission_is_interesting() {
        let mut analyzer = CoverageAnalyzer::new();
        let outcome = analyzer.analyze(&report("a.lang", &[1, 2], &["1:0"], &["main"]));

        assert!(outcome.is_interesting);
        assert_eq!(outcome.delta.lines, 2);
        assert_eq!(outcome.delta.branches, 1);
        assert_eq!(outcome.delta.functions, 1);
        assert_eq!(outcome.delta.files, 1);
        assert!(analyzer.global().lines.contains("a.lang:1"));
    }

    #[test]
    fn repeated_submission_is_not_interesting() {
        let mut analyzer = CoverageAnalyzer::new();
        let r = report("a.lang", &[1, 2], &[], &["main"]);
        analyzer.analyze(&r);
        let outcome = analyzer.analyze(&r);

        assert!(!outcome.is_interesting);
        assert_eq!(outcome.delta.total(), 0);
    }

    #[test]
    fn coverage_is_monotonic() {
        let mut analyzer = CoverageAnalyzer::new();
        let submissions = [
            report("a.lang", &[1, 2, 3], &["1:0"], &["main"]),
            report("a.lang", &[1], &[], &[]),
            report("b.lang", &[], &[], &[]),
            report("a.lang", &[4], &["1:1"], &[]),
            CoverageReport::default(),
        ];

        let mut previous = 0;
        for submission in &submissions {
            let outcome = analyzer.analyze(submission);
            let size = analyzer.global().len();
            assert!(size >= previous);
            assert_eq!(outcome.is_interesting, size > previous);
            previous = size;
        }
    }

    #[test]
    fn metrics_use_known_totals() {
        let mut analyzer = CoverageAnalyzer::new();
        analyzer.analyze(&report("a.lang", &[1, 2, 3, 4, 5], &["1:0", "1:1"], &["main"]));

        let metrics = analyzer.metrics();
        assert!((metrics.line_coverage - 50.0).abs() < 1e-9);
        assert!((metrics.branch_coverage - 50.0).abs() < 1e-9);
        assert!((metrics.function_coverage - 50.0).abs() < 1e-9);
        assert!((metrics.overall_coverage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_without_totals_fall_back_to_covered() {
        let mut analyzer = CoverageAnalyzer::new();
        let r = CoverageReport::default().with_file(
            "a.lang",
            FileCoverage {
                lines: vec![1, 2],
                ..Default::default()
            },
        );
        analyzer.analyze(&r);

        let metrics = analyzer.metrics();
        assert!((metrics.line_coverage - 100.0).abs() < 1e-9);
        assert_eq!(metrics.branch_coverage, 0.0);
    }

    #[test]
    fn empty_analyzer_metrics_are_zero() {
        let analyzer = CoverageAnalyzer::new();
        let metrics = analyzer.metrics();
        assert_eq!(metrics.overall_coverage, 0.0);
        assert_eq!(analyzer.stats().new_coverage_rate, 0.0);
    }

    #[test]
    fn parse_report_json() {
        let json = r#"{"files": {"src/a.lang": {"lines": [1, 5], "branches": ["3:0"],
            "functions": ["main"], "total_lines": 40}}}"#;
        let parsed = CoverageReport::parse(json).unwrap();
        let file = &parsed.files["src/a.lang"];
        assert_eq!(file.lines, vec![1, 5]);
        assert_eq!(file.total_lines, Some(40));
        assert!(file.total_branches.is_none());
    }

    #[test]
    fn malformed_report_is_an_error() {
        assert!(CoverageReport::parse("{\"files\": [1, 2]}").is_err());
        assert!(CoverageReport::parse("not json").is_err());
    }

    #[test]
    fn snapshot_written_on_new_coverage() {
        let dir = tempfile::tempdir().unwrap();
        let mut analyzer = CoverageAnalyzer::new().with_snapshot_dir(dir.path().join("coverage"));

        analyzer.analyze(&report("a.lang", &[1], &[], &[]));
        analyzer.analyze(&report("a.lang", &[1], &[], &[]));
        analyzer.analyze(&report("a.lang", &[2], &[], &[]));

        let written = fs::read_dir(dir.path().join("coverage")).unwrap().count();
        assert_eq!(written, 2);
        assert_eq!(analyzer.stats().snapshots_written, 2);
    }
}
