//! Test Case Model - Generated programs and their observed outcomes
//!
//! A [`TestCase`] is immutable once built: generators assemble it through
//! consuming builder methods and every downstream stage only borrows it.
//! A [`TestResult`] is produced exactly once per harness invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::coverage::CoverageReport;

/// How a test case came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Drawn from scratch by the random generator
    Random,
    /// Derived from a parent by the mutation generator
    Mutation,
    /// Filled-in program template (also used for on-disk seeds)
    Template,
    /// Produced by a grammar-driven generator
    Grammar,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorKind::Random => "random",
            GeneratorKind::Mutation => "mutation",
            GeneratorKind::Template => "template",
            GeneratorKind::Grammar => "grammar",
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate program for the target runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    id: String,
    content: String,
    generator_kind: GeneratorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl TestCase {
    /// Create a new test case with a fresh id
    pub fn new(generator_kind: GeneratorKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            generator_kind,
            parent_id: None,
            metadata: Map::new(),
        }
    }

    /// Create a seed test case whose identity is given by the caller
    pub fn seed(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            generator_kind: GeneratorKind::Template,
            parent_id: None,
            metadata: Map::new(),
        }
        .with_metadata("origin", Value::from("seed"))
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the parent test case id
    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn generator_kind(&self) -> GeneratorKind {
        self.generator_kind
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Whether this case came from the on-disk or built-in seed corpus
    pub fn is_seed(&self) -> bool {
        self.metadata.get("origin").and_then(|v| v.as_str()) == Some("seed")
    }

    /// Short preview of the content for logs and text reports
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self
            .content
            .chars()
            .take(max_chars)
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        if self.content.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

/// Observed outcome of running one test case against the target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// The test case that was executed
    pub test_case: TestCase,
    /// Process exit code (None when killed by a signal or timed out)
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock execution time
    pub execution_time: Duration,
    /// The process crashed per the configured crash convention
    pub crashed: bool,
    /// The process exceeded its deadline and was killed
    pub timed_out: bool,
    /// The process ran to completion without crashing
    pub succeeded: bool,
    /// Coverage report emitted by the target, if collected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageReport>,
}

impl TestResult {
    /// Result of a process that exited on its own
    pub fn exited(
        test_case: TestCase,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            test_case,
            exit_code: Some(exit_code),
            signal: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
            execution_time,
            crashed: false,
            timed_out: false,
            succeeded: true,
            coverage: None,
        }
    }

    /// Result of a process terminated by a signal
    pub fn signaled(
        test_case: TestCase,
        signal: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        execution_time: Duration,
    ) -> Self {
        Self {
            test_case,
            exit_code: None,
            signal: Some(signal),
            stdout: stdout.into(),
            stderr: stderr.into(),
            execution_time,
            crashed: true,
            timed_out: false,
            succeeded: false,
            coverage: None,
        }
    }

    /// Result of a process killed at its deadline
    pub fn timed_out(test_case: TestCase, execution_time: Duration) -> Self {
        Self {
            test_case,
            exit_code: None,
            signal: None,
            stdout: String::new(),
            stderr: String::new(),
            execution_time,
            crashed: false,
            timed_out: true,
            succeeded: false,
            coverage: None,
        }
    }

    /// Mark the result as crashed (or not); `succeeded` follows
    pub fn with_crashed(mut self, crashed: bool) -> Self {
        self.crashed = crashed;
        self.succeeded = !crashed && !self.timed_out;
        self
    }

    /// Attach a coverage report
    pub fn with_coverage(mut self, coverage: CoverageReport) -> Self {
        self.coverage = Some(coverage);
        self
    }
}
