//! Crash Analyzer - Classify and deduplicate target crashes
//!
//! Classification matches stderr against an ordered pattern table where the
//! first match wins, falling back to the terminating signal when no pattern
//! matches.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::stack::{StackExtractor, StackFrame};
use super::{compute_signature, Catalogued, Severity, SignatureStore, DEFAULT_RING_CAPACITY};
use crate::fuzzer::input::TestResult;

/// Kind of crash, as classified from stderr or the exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Type,
    Reference,
    Runtime,
    AssertionFailure,
    SegFault,
    Abort,
    Terminated,
    Killed,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Type => "type",
            ErrorKind::Reference => "reference",
            ErrorKind::Runtime => "runtime",
            ErrorKind::AssertionFailure => "assertion",
            ErrorKind::SegFault => "segfault",
            ErrorKind::Abort => "abort",
            ErrorKind::Terminated => "terminated",
            ErrorKind::Killed => "killed",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Fixed severity mapping
    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::SegFault | ErrorKind::AssertionFailure => Severity::Critical,
            ErrorKind::Runtime | ErrorKind::Abort | ErrorKind::Killed => Severity::High,
            ErrorKind::Type | ErrorKind::Reference => Severity::Medium,
            ErrorKind::Syntax => Severity::Low,
            ErrorKind::Terminated | ErrorKind::Unknown => Severity::Unknown,
        }
    }

    /// Classify a terminating signal number
    pub fn from_signal(signal: i32) -> Self {
        match signal {
            11 | 7 => ErrorKind::SegFault, // SIGSEGV, SIGBUS
            6 => ErrorKind::Abort,         // SIGABRT
            9 => ErrorKind::Killed,        // SIGKILL
            15 => ErrorKind::Terminated,   // SIGTERM
            _ => ErrorKind::Unknown,
        }
    }

    /// Classify a shell-style exit code (128 + signal)
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            139 | 135 => ErrorKind::SegFault,
            134 => ErrorKind::Abort,
            137 => ErrorKind::Killed,
            143 => ErrorKind::Terminated,
            _ => ErrorKind::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered from most to least specific
const CRASH_PATTERN_TABLE: &[(&str, &str, ErrorKind)] = &[
    (
        "assertion_failed",
        r"(?i)assertion\s+(failed|error)|AssertionError",
        ErrorKind::AssertionFailure,
    ),
    (
        "segfault",
        r"(?i)segmentation fault|SIGSEGV|SIGBUS|access violation",
        ErrorKind::SegFault,
    ),
    ("abort", r"(?i)\baborted\b|\babort\(\)|SIGABRT", ErrorKind::Abort),
    ("killed", r"(?i)^killed\b|SIGKILL|out of memory", ErrorKind::Killed),
    ("terminated", r"(?i)^terminated\b|SIGTERM", ErrorKind::Terminated),
    (
        "unterminated_string",
        r"(?i)unterminated string",
        ErrorKind::Syntax,
    ),
    (
        "unexpected_token",
        r"(?i)unexpected (token|character|end of (input|file))",
        ErrorKind::Syntax,
    ),
    ("syntax_error", r"(?i)syntax\s*error|parse error", ErrorKind::Syntax),
    (
        "type_error",
        r"(?i)type\s*error|type mismatch",
        ErrorKind::Type,
    ),
    (
        "reference_error",
        r"(?i)reference\s*error|name\s*error|is not defined|undefined (variable|name|symbol)",
        ErrorKind::Reference,
    ),
    (
        "stack_overflow",
        r"(?i)stack overflow|maximum recursion depth",
        ErrorKind::Runtime,
    ),
    (
        "division_by_zero",
        r"(?i)division by zero|divide by zero",
        ErrorKind::Runtime,
    ),
    (
        "runtime_error",
        r"(?i)runtime\s*error|uncaught exception|panicked at|\bpanic\b",
        ErrorKind::Runtime,
    ),
];

struct CrashPattern {
    name: &'static str,
    regex: Regex,
    kind: ErrorKind,
}

/// A stderr line matched by the crash pattern table
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub pattern: &'static str,
    pub kind: ErrorKind,
    pub line: String,
}

/// Compiled crash pattern table
pub struct CrashPatterns {
    patterns: Vec<CrashPattern>,
}

impl Default for CrashPatterns {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashPatterns {
    pub fn new() -> Self {
        let mut patterns = Vec::with_capacity(CRASH_PATTERN_TABLE.len());
        for (name, pattern, kind) in CRASH_PATTERN_TABLE {
            Self::add_pattern(&mut patterns, name, pattern, *kind);
        }
        Self { patterns }
    }

    fn add_pattern(
        patterns: &mut Vec<CrashPattern>,
        name: &'static str,
        pattern: &str,
        kind: ErrorKind,
    ) {
        match Regex::new(pattern) {
            Ok(regex) => patterns.push(CrashPattern { name, regex, kind }),
            Err(e) => tracing::warn!("Skipping invalid crash pattern {}: {}", name, e),
        }
    }

    /// First pattern (in table order) matching any line of `text`
    pub fn classify(&self, text: &str) -> Option<PatternMatch> {
        for pattern in &self.patterns {
            if let Some(line) = text.lines().find(|l| pattern.regex.is_match(l)) {
                return Some(PatternMatch {
                    pattern: pattern.name,
                    kind: pattern.kind,
                    line: line.trim().to_string(),
                });
            }
        }
        None
    }

    /// Whether `text` contains any recognized crash pattern
    pub fn is_match(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }
}

/// A unique crash retained in the catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRecord {
    pub signature: String,
    pub error_kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub stack_frames: Vec<StackFrame>,
    pub first_seen_test_case_id: String,
    /// Content of the first test case that produced this crash
    pub input: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub occurrences: u64,
    pub timestamp: String,
}

impl Catalogued for CrashRecord {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn set_occurrences(&mut self, occurrences: u64) {
        self.occurrences = occurrences;
    }
}

/// Outcome of crash analysis for one result
#[derive(Debug, Clone, PartialEq)]
pub struct CrashOutcome {
    pub is_crash: bool,
    pub signature: Option<String>,
    pub is_duplicate: bool,
    pub error_kind: Option<ErrorKind>,
    pub severity: Severity,
}

impl CrashOutcome {
    pub fn none() -> Self {
        Self {
            is_crash: false,
            signature: None,
            is_duplicate: false,
            error_kind: None,
            severity: Severity::Unknown,
        }
    }

    /// A crash never seen before in this run
    pub fn is_new(&self) -> bool {
        self.is_crash && !self.is_duplicate
    }
}

/// Classifies crashed results and keeps the unique crash catalogue
pub struct CrashAnalyzer {
    patterns: CrashPatterns,
    stacks: StackExtractor,
    store: SignatureStore<CrashRecord>,
}

impl Default for CrashAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashAnalyzer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Create an analyzer retaining at most `capacity` unique crashes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            patterns: CrashPatterns::new(),
            stacks: StackExtractor::new(),
            store: SignatureStore::new(capacity),
        }
    }

    /// Analyze one result
    pub fn analyze(&mut self, result: &TestResult) -> CrashOutcome {
        if !result.crashed {
            return CrashOutcome::none();
        }

        let matched = self.patterns.classify(&result.stderr);
        let error_kind = match &matched {
            Some(m) => m.kind,
            None => result
                .signal
                .map(ErrorKind::from_signal)
                .or(result.exit_code.map(ErrorKind::from_exit_code))
                .unwrap_or(ErrorKind::Unknown),
        };
        let message = matched
            .map(|m| m.line)
            .unwrap_or_else(|| Self::fallback_message(result));
        let frames = self.stacks.extract(&result.stderr);
        let severity = error_kind.severity();
        let signature = compute_signature(error_kind.as_str(), &frames, &message);

        let is_duplicate = self.store.record(&signature, || CrashRecord {
            signature: signature.clone(),
            error_kind,
            severity,
            message: message.clone(),
            stack_frames: frames.clone(),
            first_seen_test_case_id: result.test_case.id().to_string(),
            input: result.test_case.content().to_string(),
            exit_code: result.exit_code,
            signal: result.signal,
            occurrences: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        if is_duplicate {
            tracing::debug!("Duplicate crash {} ({})", signature, error_kind);
        } else {
            tracing::info!("New {} crash [{}]: {}", error_kind, severity, message);
        }

        CrashOutcome {
            is_crash: true,
            signature: Some(signature),
            is_duplicate,
            error_kind: Some(error_kind),
            severity,
        }
    }

    fn fallback_message(result: &TestResult) -> String {
        if let Some(line) = result.stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
            return line.to_string();
        }
        match (result.signal, result.exit_code) {
            (Some(signal), _) => format!("Process terminated by signal {}", signal),
            (None, Some(code)) => format!("Process exited with code {}", code),
            (None, None) => "Process crashed without diagnostics".to_string(),
        }
    }

    /// Number of distinct crash signatures seen
    pub fn unique_count(&self) -> usize {
        self.store.unique_count()
    }

    /// Total crashed results analyzed
    pub fn total_count(&self) -> u64 {
        self.store.total_occurrences()
    }

    /// Occurrence count for a signature
    pub fn occurrences(&self, signature: &str) -> u64 {
        self.store.occurrences(signature)
    }

    /// Retained record for a signature
    pub fn record(&self, signature: &str) -> Option<&CrashRecord> {
        self.store.get(signature)
    }

    /// Retained unique crashes, oldest first
    pub fn records(&self) -> Vec<CrashRecord> {
        self.store.retained().cloned().collect()
    }
}
