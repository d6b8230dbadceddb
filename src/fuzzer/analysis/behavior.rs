//! Behavior Analyzer - Flag non-crashing anomalies
//!
//! Checks run in a fixed order and the first matching category wins:
//! timeouts, stderr warnings, stdout anomalies, slow execution, and finally
//! a completed run with a non-zero exit code.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::stack::{StackExtractor, StackFrame};
use super::{compute_signature, Catalogued, Severity, SignatureStore, DEFAULT_RING_CAPACITY};
use crate::fuzzer::input::TestResult;

/// Default execution time above which a run is considered slow
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(1);

/// Output longer than this many characters is flagged
pub const EXCESSIVE_OUTPUT_CHARS: usize = 1000;

/// Kind of anomalous behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Hang,
    PerformanceWarning,
    DeprecationWarning,
    MemoryWarning,
    ResourceLeak,
    PotentialBug,
    Overflow,
    GenericWarning,
    UnusualOutput,
    ExcessiveOutput,
    EmptyOutput,
    BinaryOutput,
    SlowExecution,
    UnexpectedExitCode,
}

impl BehaviorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::Hang => "hang",
            BehaviorKind::PerformanceWarning => "performance_warning",
            BehaviorKind::DeprecationWarning => "deprecation_warning",
            BehaviorKind::MemoryWarning => "memory_warning",
            BehaviorKind::ResourceLeak => "resource_leak",
            BehaviorKind::PotentialBug => "potential_bug",
            BehaviorKind::Overflow => "overflow",
            BehaviorKind::GenericWarning => "warning",
            BehaviorKind::UnusualOutput => "unusual_output",
            BehaviorKind::ExcessiveOutput => "excessive_output",
            BehaviorKind::EmptyOutput => "empty_output",
            BehaviorKind::BinaryOutput => "binary_output",
            BehaviorKind::SlowExecution => "slow_execution",
            BehaviorKind::UnexpectedExitCode => "unexpected_exit_code",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            BehaviorKind::Hang => Severity::High,
            BehaviorKind::MemoryWarning
            | BehaviorKind::ResourceLeak
            | BehaviorKind::PotentialBug
            | BehaviorKind::Overflow
            | BehaviorKind::UnusualOutput
            | BehaviorKind::BinaryOutput => Severity::Medium,
            BehaviorKind::PerformanceWarning
            | BehaviorKind::SlowExecution
            | BehaviorKind::DeprecationWarning
            | BehaviorKind::GenericWarning
            | BehaviorKind::ExcessiveOutput
            | BehaviorKind::EmptyOutput
            | BehaviorKind::UnexpectedExitCode => Severity::Low,
        }
    }
}

impl std::fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stderr warning patterns, most specific first
const WARNING_PATTERN_TABLE: &[(&str, BehaviorKind)] = &[
    (
        r"(?i)performance|slow path|took too long",
        BehaviorKind::PerformanceWarning,
    ),
    (r"(?i)deprecat", BehaviorKind::DeprecationWarning),
    (
        r"(?i)memory (usage|warning|pressure)|high memory|large allocation",
        BehaviorKind::MemoryWarning,
    ),
    (
        r"(?i)\bleak(ed|s)?\b|unclosed|not (closed|released)",
        BehaviorKind::ResourceLeak,
    ),
    (
        r"(?i)potential (bug|issue|problem)|possibl[ey] unintended|suspicious",
        BehaviorKind::PotentialBug,
    ),
    (
        r"(?i)overflow|precision loss|truncat",
        BehaviorKind::Overflow,
    ),
    (r"(?i)\bwarn(ing)?\b", BehaviorKind::GenericWarning),
];

const UNUSUAL_TOKEN_PATTERN: &str = r"\b(NaN|-?Infinity|undefined)\b";

/// A unique behavior retained in the catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub signature: String,
    pub behavior_kind: BehaviorKind,
    pub severity: Severity,
    pub message: String,
    pub stack_frames: Vec<StackFrame>,
    pub first_seen_test_case_id: String,
    pub input: String,
    pub execution_time_ms: u64,
    pub occurrences: u64,
    pub timestamp: String,
}

impl Catalogued for BehaviorRecord {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn set_occurrences(&mut self, occurrences: u64) {
        self.occurrences = occurrences;
    }
}

/// Outcome of behavior analysis for one result
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorOutcome {
    pub is_interesting: bool,
    pub signature: Option<String>,
    pub is_duplicate: bool,
    pub behavior_kind: Option<BehaviorKind>,
    pub severity: Severity,
}

impl BehaviorOutcome {
    pub fn none() -> Self {
        Self {
            is_interesting: false,
            signature: None,
            is_duplicate: false,
            behavior_kind: None,
            severity: Severity::Unknown,
        }
    }

    /// An anomaly never seen before in this run
    pub fn is_new(&self) -> bool {
        self.is_interesting && !self.is_duplicate
    }
}

/// Classifies non-crashing results and keeps the unique behavior catalogue
pub struct BehaviorAnalyzer {
    warnings: Vec<(Regex, BehaviorKind)>,
    unusual_tokens: Option<Regex>,
    stacks: StackExtractor,
    slow_threshold: Duration,
    store: SignatureStore<BehaviorRecord>,
}

impl Default for BehaviorAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorAnalyzer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Create an analyzer retaining at most `capacity` unique behaviors
    pub fn with_capacity(capacity: usize) -> Self {
        let warnings = WARNING_PATTERN_TABLE
            .iter()
            .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, *kind)))
            .collect();

        Self {
            warnings,
            unusual_tokens: Regex::new(UNUSUAL_TOKEN_PATTERN).ok(),
            stacks: StackExtractor::new(),
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            store: SignatureStore::new(capacity),
        }
    }

    /// Set the slow-execution threshold
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Analyze one result
    pub fn analyze(&mut self, result: &TestResult) -> BehaviorOutcome {
        if result.crashed {
            return BehaviorOutcome::none();
        }

        let Some((kind, message)) = self.classify(result) else {
            return BehaviorOutcome::none();
        };

        let frames = self.stacks.extract(&result.stderr);
        let severity = kind.severity();
        let signature = compute_signature(kind.as_str(), &frames, &message);

        let is_duplicate = self.store.record(&signature, || BehaviorRecord {
            signature: signature.clone(),
            behavior_kind: kind,
            severity,
            message: message.clone(),
            stack_frames: frames.clone(),
            first_seen_test_case_id: result.test_case.id().to_string(),
            input: result.test_case.content().to_string(),
            execution_time_ms: result.execution_time.as_millis() as u64,
            occurrences: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        if !is_duplicate {
            tracing::info!("New {} behavior: {}", kind, message);
        }

        BehaviorOutcome {
            is_interesting: true,
            signature: Some(signature),
            is_duplicate,
            behavior_kind: Some(kind),
            severity,
        }
    }

    fn classify(&self, result: &TestResult) -> Option<(BehaviorKind, String)> {
        if result.timed_out {
            return Some((BehaviorKind::Hang, "Execution timed out".to_string()));
        }

        for (regex, kind) in &self.warnings {
            if let Some(line) = result.stderr.lines().find(|l| regex.is_match(l)) {
                return Some((*kind, line.trim().to_string()));
            }
        }

        if let Some(found) = self.stdout_anomaly(result) {
            return Some(found);
        }

        if result.execution_time > self.slow_threshold {
            return Some((
                BehaviorKind::SlowExecution,
                format!(
                    "Execution exceeded slow threshold of {:.1}s",
                    self.slow_threshold.as_secs_f64()
                ),
            ));
        }

        if result.succeeded {
            if let Some(code) = result.exit_code.filter(|c| *c != 0) {
                return Some((
                    BehaviorKind::UnexpectedExitCode,
                    format!("Completed with non-zero exit code {}", code),
                ));
            }
        }

        None
    }

    fn stdout_anomaly(&self, result: &TestResult) -> Option<(BehaviorKind, String)> {
        let stdout = &result.stdout;

        if let Some(token) = self
            .unusual_tokens
            .as_ref()
            .and_then(|re| re.find(stdout))
        {
            return Some((
                BehaviorKind::UnusualOutput,
                format!("Output contains unusual value '{}'", token.as_str()),
            ));
        }

        if stdout.chars().count() > EXCESSIVE_OUTPUT_CHARS {
            return Some((
                BehaviorKind::ExcessiveOutput,
                format!("Output exceeds {} characters", EXCESSIVE_OUTPUT_CHARS),
            ));
        }

        if stdout.trim().is_empty() && !result.test_case.content().trim().is_empty() {
            return Some((
                BehaviorKind::EmptyOutput,
                "Program produced no output".to_string(),
            ));
        }

        if stdout
            .chars()
            .any(|c| c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t')))
        {
            return Some((
                BehaviorKind::BinaryOutput,
                "Output contains non-printable bytes".to_string(),
            ));
        }

        None
    }

    /// Number of distinct behavior signatures seen
    pub fn unique_count(&self) -> usize {
        self.store.unique_count()
    }

    /// Total interesting results analyzed
    pub fn total_count(&self) -> u64 {
        self.store.total_occurrences()
    }

    pub fn occurrences(&self, signature: &str) -> u64 {
        self.store.occurrences(signature)
    }

    pub fn record(&self, signature: &str) -> Option<&BehaviorRecord> {
        self.store.get(signature)
    }

    /// Retained unique behaviors, oldest first
    pub fn records(&self) -> Vec<BehaviorRecord> {
        self.store.retained().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzer::input::{GeneratorKind, TestCase};

    fn result(stdout: &str, stderr: &str, exit_code: i32, millis: u64) -> TestResult {
        let case = TestCase::new(GeneratorKind::Random, "print(big)");
        TestResult::exited(case, exit_code, stdout, stderr, Duration::from_millis(millis))
    }

    #[test]
    fn precision_warning_deduplicated() {
        let mut analyzer = BehaviorAnalyzer::new();
        let stderr = "Warning: Large number might cause precision loss";

        let first = analyzer.analyze(&result("1e308", stderr, 0, 5));
        let second = analyzer.analyze(&result("1e308", stderr, 0, 5));

        assert!(first.is_interesting);
        assert!(!first.is_duplicate);
        assert!(second.is_interesting);
        assert!(second.is_duplicate);
        assert_eq!(first.signature, second.signature);
        assert_eq!(analyzer.unique_count(), 1);
    }

    #[test]
    fn crashed_result_short_circuits() {
        let mut analyzer = BehaviorAnalyzer::new();
        let crashed = result("", "Warning: x", 1, 5).with_crashed(true);
        assert_eq!(analyzer.analyze(&crashed), BehaviorOutcome::none());
    }

    #[test]
    fn stderr_categories_in_order() {
        let analyzer = BehaviorAnalyzer::new();
        let cases = [
            ("Performance warning: slow path taken", BehaviorKind::PerformanceWarning),
            ("warning: `foo` is deprecated", BehaviorKind::DeprecationWarning),
            ("memory usage above 1GB", BehaviorKind::MemoryWarning),
            ("file handle leaked", BehaviorKind::ResourceLeak),
            ("potential bug: comparison always true", BehaviorKind::PotentialBug),
            ("integer overflow detected", BehaviorKind::Overflow),
            ("Warning: something odd", BehaviorKind::GenericWarning),
        ];

        for (stderr, expected) in cases {
            let (kind, _) = analyzer.classify(&result("ok", stderr, 0, 1)).unwrap();
            assert_eq!(kind, expected, "stderr: {}", stderr);
        }
    }

    #[test]
    fn stdout_anomalies() {
        let analyzer = BehaviorAnalyzer::new();

        let (kind, msg) = analyzer.classify(&result("result: NaN", "", 0, 1)).unwrap();
        assert_eq!(kind, BehaviorKind::UnusualOutput);
        assert!(msg.contains("NaN"));

        let long = "a".repeat(1001);
        let (kind, _) = analyzer.classify(&result(&long, "", 0, 1)).unwrap();
        assert_eq!(kind, BehaviorKind::ExcessiveOutput);

        let (kind, _) = analyzer.classify(&result("", "", 0, 1)).unwrap();
        assert_eq!(kind, BehaviorKind::EmptyOutput);

        let (kind, _) = analyzer.classify(&result("ok\u{1}", "", 0, 1)).unwrap();
        assert_eq!(kind, BehaviorKind::BinaryOutput);
    }

    #[test]
    fn exactly_limit_length_is_not_excessive() {
        let analyzer = BehaviorAnalyzer::new();
        let output = "a".repeat(EXCESSIVE_OUTPUT_CHARS);
        assert!(analyzer.classify(&result(&output, "", 0, 1)).is_none());
    }

    #[test]
    fn slow_execution_flagged() {
        let analyzer = BehaviorAnalyzer::new().with_slow_threshold(Duration::from_millis(100));
        let (kind, _) = analyzer.classify(&result("ok", "", 0, 250)).unwrap();
        assert_eq!(kind, BehaviorKind::SlowExecution);
        assert!(analyzer.classify(&result("ok", "", 0, 50)).is_none());
    }

    #[test]
    fn non_zero_exit_is_last_resort() {
        let analyzer = BehaviorAnalyzer::new();
        let (kind, msg) = analyzer.classify(&result("ok", "", 3, 1)).unwrap();
        assert_eq!(kind, BehaviorKind::UnexpectedExitCode);
        assert!(msg.contains('3'));
    }

    #[test]
    fn clean_run_not_interesting() {
        let mut analyzer = BehaviorAnalyzer::new();
        let outcome = analyzer.analyze(&result("42\n", "", 0, 3));
        assert!(!outcome.is_interesting);
        assert_eq!(analyzer.unique_count(), 0);
    }

    #[test]
    fn timeout_reported_as_hang() {
        let mut analyzer = BehaviorAnalyzer::new();
        let case = TestCase::new(GeneratorKind::Random, "while true {}");
        let outcome = analyzer.analyze(&TestResult::timed_out(case, Duration::from_secs(5)));

        assert_eq!(outcome.behavior_kind, Some(BehaviorKind::Hang));
        assert_eq!(outcome.severity, Severity::High);
    }

    #[test]
    fn records_keep_first_test_case() {
        let mut analyzer = BehaviorAnalyzer::new();
        let first = result("NaN", "", 0, 1);
        let first_id = first.test_case.id().to_string();
        analyzer.analyze(&first);
        analyzer.analyze(&result("NaN", "", 0, 1));

        let records = analyzer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].first_seen_test_case_id, first_id);
        assert_eq!(records[0].occurrences, 2);
    }
}
