//! Execution Harness - Run one test case against the target
//!
//! Each invocation gets its own temporary directory holding the input file
//! (and the coverage report, when collection is on). The directory is owned
//! by the invocation, so it is removed on every exit path including task
//! abort. On Unix each child leads its own process group, and the whole group
//! is killed on timeout or abort, so processes the target forks die with it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::analysis::CrashPatterns;
use super::coverage::CoverageReport;
use super::input::{TestCase, TestResult};
use crate::errors::LangFuzzError;

/// Environment variable naming the file the target may write coverage to
pub const COVERAGE_ENV_VAR: &str = "LANGFUZZ_COVERAGE_FILE";

/// Default cap on captured stdout/stderr, per stream
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// Harness infrastructure failures
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to spawn {}: {source}", target.display())]
    Spawn {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write temporary input: {0}")]
    TempInput(#[source] std::io::Error),

    #[error("failed waiting for target: {0}")]
    Wait(#[source] std::io::Error),
}

/// Executes test cases against a target
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, test_case: &TestCase, timeout: Duration)
        -> Result<TestResult, HarnessError>;
}

/// When a finished process counts as crashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrashConvention {
    /// Signal termination, a shell-style signal exit code, or a non-zero
    /// exit with a recognized crash pattern in stderr
    #[default]
    SignalOrPattern,
    /// Any non-zero exit or signal
    AnyNonZero,
    /// Only signal termination
    SignalOnly,
}

impl CrashConvention {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "default" | "signal-or-pattern" | "signal_or_pattern" => Some(Self::SignalOrPattern),
            "any-non-zero" | "any_non_zero" | "nonzero" => Some(Self::AnyNonZero),
            "signal-only" | "signal_only" | "signal" => Some(Self::SignalOnly),
            _ => None,
        }
    }
}

/// Resolve a target to an executable path, searching PATH for bare names
pub fn resolve_target(target: &str) -> Result<PathBuf, LangFuzzError> {
    let candidate = Path::new(target);
    let is_bare = candidate.components().count() == 1 && !target.contains('/');

    if is_bare {
        if let Some(paths) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&paths) {
                let full = dir.join(target);
                if full.is_file() {
                    return Ok(full);
                }
            }
        }
    }

    if !candidate.exists() {
        return Err(LangFuzzError::target_not_found(target));
    }
    if !candidate.is_file() {
        return Err(LangFuzzError::TargetNotAFile {
            path: candidate.to_path_buf(),
        });
    }
    Ok(candidate.to_path_buf())
}

/// Runs the target as an external process, one per test case
pub struct ProcessHarness {
    target: PathBuf,
    args: Vec<String>,
    extension: String,
    convention: CrashConvention,
    patterns: CrashPatterns,
    output_limit: usize,
    collect_coverage: bool,
}

impl ProcessHarness {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
            extension: "txt".to_string(),
            convention: CrashConvention::default(),
            patterns: CrashPatterns::new(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
            collect_coverage: false,
        }
    }

    /// Extra arguments placed before the input file
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Extension of the temporary input file
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_convention(mut self, convention: CrashConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    pub fn with_coverage(mut self, enabled: bool) -> Self {
        self.collect_coverage = enabled;
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Decide whether a finished process crashed
    pub fn is_crash(&self, exit_code: Option<i32>, signal: Option<i32>, stderr: &str) -> bool {
        if signal.is_some() {
            return true;
        }
        let Some(code) = exit_code else {
            return false;
        };
        if code == 0 {
            return false;
        }

        match self.convention {
            CrashConvention::AnyNonZero => true,
            CrashConvention::SignalOnly => false,
            CrashConvention::SignalOrPattern => {
                matches!(code, 134 | 135 | 137 | 139) || self.patterns.is_match(stderr)
            }
        }
    }

    fn read_coverage(path: &Path) -> Option<CoverageReport> {
        if !path.exists() {
            return None;
        }
        match CoverageReport::from_file(path) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::debug!("Ignoring malformed coverage report: {}", e);
                None
            }
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Kills the child's process group when dropped, unless disarmed
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group is the one we spawned
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        tracing::debug!(
            "Failed to kill process group {}: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Read a stream to the end, keeping at most `limit` bytes.
///
/// The rest is drained so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> Vec<u8> {
    let Some(mut reader) = reader else {
        return Vec::new();
    };

    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    kept
}

#[async_trait]
impl Executor for ProcessHarness {
    async fn execute(
        &self,
        test_case: &TestCase,
        timeout: Duration,
    ) -> Result<TestResult, HarnessError> {
        let dir = tempfile::Builder::new()
            .prefix("langfuzz-")
            .tempdir()
            .map_err(HarnessError::TempInput)?;
        let input_path = dir.path().join(format!("input.{}", self.extension));
        tokio::fs::write(&input_path, test_case.content())
            .await
            .map_err(HarnessError::TempInput)?;
        let coverage_path = dir.path().join("coverage.json");

        let mut command = Command::new(&self.target);
        command
            .args(&self.args)
            .arg(&input_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if self.collect_coverage {
            command.env(COVERAGE_ENV_VAR, &coverage_path);
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            target: self.target.clone(),
            source,
        })?;
        let mut group = ProcessGroupGuard::new(child.id());

        let stdout = read_capped(child.stdout.take(), self.output_limit);
        let stderr = read_capped(child.stderr.take(), self.output_limit);
        let run = async { tokio::join!(child.wait(), stdout, stderr) };

        let (status, stdout, stderr) = match tokio::time::timeout(timeout, run).await {
            Ok(finished) => finished,
            Err(_) => {
                group.kill();
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Failed to kill timed out target: {}", e);
                }
                let _ = child.wait().await;
                tracing::debug!("Test case {} timed out after {:?}", test_case.id(), timeout);
                return Ok(TestResult::timed_out(test_case.clone(), start.elapsed()));
            }
        };
        let execution_time = start.elapsed();
        group.disarm();
        let status = status.map_err(HarnessError::Wait)?;

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        let mut result = match (status.code(), exit_signal(&status)) {
            (_, Some(signal)) => {
                TestResult::signaled(test_case.clone(), signal, stdout, stderr, execution_time)
            }
            (code, None) => TestResult::exited(
                test_case.clone(),
                code.unwrap_or(-1),
                stdout,
                stderr,
                execution_time,
            ),
        };

        let crashed = self.is_crash(result.exit_code, result.signal, &result.stderr);
        result = result.with_crashed(crashed);

        if self.collect_coverage {
            if let Some(report) = Self::read_coverage(&coverage_path) {
                result = result.with_coverage(report);
            }
        }

        Ok(result)
    }
}
