//! Fuzz Session - Orchestrates a fuzzing run
//!
//! The session is the single writer of the analyzers and the corpus. Workers
//! in a [`JoinSet`] only execute test cases and hand back results; every
//! result is triaged here, on the coordinator.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use super::analysis::{BehaviorAnalyzer, CrashAnalyzer};
use super::config::FuzzConfig;
use super::corpus::{Corpus, InterestingReason};
use super::coverage::CoverageAnalyzer;
use super::generator::GeneratorSuite;
use super::harness::{Executor, HarnessError};
use super::input::{TestCase, TestResult};
use super::limits::{LimitExceeded, LimitStats, ResourceMonitor};
use super::FuzzResults;
use crate::errors::LangFuzzError;
use crate::ui::{OutputMode, ProgressStyle, RunProgress};

/// How often the coordinator wakes to check stop conditions
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive generation attempts before giving up on an iteration
const MAX_GENERATION_ATTEMPTS: usize = 8;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    TimeBudgetExhausted,
    Cancelled,
    LimitReached,
    Terminal,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::TimeBudgetExhausted => "time_budget_exhausted",
            RunState::Cancelled => "cancelled",
            RunState::LimitReached => "limit_reached",
            RunState::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters kept by the coordinator
#[derive(Debug, Clone, Default)]
struct SessionStats {
    dispatched: u64,
    executions: u64,
    timeouts: u64,
    infrastructure_failures: u64,
    generation_failures: u64,
}

type TaskOutput = (String, Result<TestResult, HarnessError>);

/// A fuzzing session against one target
pub struct FuzzSession {
    /// Target label used in reports
    target: String,
    config: FuzzConfig,
    executor: Arc<dyn Executor>,
    generators: GeneratorSuite,
    corpus: Corpus,
    crashes: CrashAnalyzer,
    behaviors: BehaviorAnalyzer,
    coverage: CoverageAnalyzer,
    /// Seeds waiting for their first execution
    pending: VecDeque<TestCase>,
    stop: Arc<AtomicBool>,
    state: RunState,
    /// Set when the run ended on a resource limit
    stop_reason: Option<LimitExceeded>,
    output_mode: OutputMode,
    stats: SessionStats,
}

impl FuzzSession {
    /// Create a session; fails on an invalid configuration
    pub fn new(
        target: impl Into<String>,
        config: FuzzConfig,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, LangFuzzError> {
        config.validate()?;

        let generators = GeneratorSuite::new(&config.strategies, config.generator, config.seed)
            .map_err(|e| LangFuzzError::invalid_config(e.to_string()))?;
        let corpus = Corpus::new()
            .with_output_dir(config.output_dir.clone())
            .with_max_size(config.resource_limits.max_corpus_size);
        let coverage = CoverageAnalyzer::new().with_snapshot_dir(config.output_dir.join("coverage"));

        Ok(Self {
            target: target.into(),
            crashes: CrashAnalyzer::with_capacity(config.ring_capacity),
            behaviors: BehaviorAnalyzer::with_capacity(config.ring_capacity)
                .with_slow_threshold(config.slow_threshold),
            config,
            executor,
            generators,
            corpus,
            coverage,
            pending: VecDeque::new(),
            stop: Arc::new(AtomicBool::new(false)),
            state: RunState::Idle,
            stop_reason: None,
            output_mode: OutputMode::Plain,
            stats: SessionStats::default(),
        })
    }

    /// Share a cancellation flag with the caller
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Load seeds and create the output layout
    pub fn initialize(&mut self) -> Result<(), LangFuzzError> {
        self.corpus.prepare_output()?;
        let seed_dir = self.config.seed_dir.clone();
        self.corpus.initialize(seed_dir.as_deref())?;
        self.pending = self.corpus.seeds().iter().cloned().collect();
        Ok(())
    }

    /// Run the session to completion.
    ///
    /// Only setup failures are returned as errors; a report is produced for
    /// every run that got past setup, cancelled or not.
    pub async fn run(&mut self) -> Result<FuzzResults, LangFuzzError> {
        self.initialize()?;

        let budget = self.config.effective_time_limit();
        let monitor =
            ResourceMonitor::new(self.config.resource_limits.clone().with_max_time(budget));
        let progress = RunProgress::start(self.output_mode, ProgressStyle::Fuzz, budget);
        let started = Instant::now();
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

        self.state = RunState::Running;
        tracing::info!(
            "Fuzzing {} with suite {} for {:?} ({} workers, {} seeds)",
            self.target,
            self.config.suite,
            budget,
            self.config.workers,
            self.corpus.seed_count()
        );

        while self.state == RunState::Running {
            if self.check_stop(&monitor) {
                break;
            }

            while tasks.len() < self.config.workers && self.may_dispatch() {
                match self.next_test_case() {
                    Some(test_case) => self.dispatch(&mut tasks, test_case),
                    None => break,
                }
            }

            if tasks.is_empty() {
                if let (false, Some(max)) =
                    (self.may_dispatch(), self.config.resource_limits.max_executions)
                {
                    self.stop_reason = Some(LimitExceeded::Executions(max));
                    self.state = RunState::LimitReached;
                } else {
                    tracing::warn!("No test cases could be generated, ending run");
                    self.state = RunState::Terminal;
                }
                break;
            }

            if let Ok(Some(joined)) = tokio::time::timeout(POLL_INTERVAL, tasks.join_next()).await {
                self.handle_joined(joined);
            }

            progress.set_elapsed(monitor.elapsed());
            progress.set_message(format!(
                "tests: {}, crashes: {}, behaviors: {}, coverage: {:.1}%",
                self.stats.executions,
                self.crashes.unique_count(),
                self.behaviors.unique_count(),
                self.coverage.metrics().overall_coverage
            ));
        }

        // In-flight executions are abandoned; kill_on_drop reaps their children
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if !matches!(&joined, Err(e) if e.is_cancelled()) {
                self.handle_joined(joined);
            }
        }

        progress.finish_with_message(&format!("Fuzzing finished ({})", self.state));
        let results = self.results(started.elapsed());
        self.state = RunState::Terminal;
        Ok(results)
    }

    /// Update the run state from the stop flag and the limits
    fn check_stop(&mut self, monitor: &ResourceMonitor) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            tracing::info!("Fuzzing cancelled");
            self.state = RunState::Cancelled;
            return true;
        }

        let stats = LimitStats {
            executions: self.stats.executions,
            corpus_size: self.corpus.corpus_size(),
            infrastructure_failures: self.stats.infrastructure_failures,
        };
        if let Some(exceeded) = monitor.check(&stats) {
            tracing::info!("Resource limit exceeded: {}", exceeded);
            self.state = match exceeded {
                LimitExceeded::Time(_) => RunState::TimeBudgetExhausted,
                _ => RunState::LimitReached,
            };
            self.stop_reason = Some(exceeded);
            return true;
        }
        false
    }

    /// Whether another execution fits under the execution limit
    fn may_dispatch(&self) -> bool {
        self.config
            .resource_limits
            .max_executions
            .map_or(true, |max| self.stats.dispatched < max)
    }

    /// Pending seeds first, then generated cases
    fn next_test_case(&mut self) -> Option<TestCase> {
        if let Some(seed) = self.pending.pop_front() {
            return Some(seed);
        }

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let strategy = self.generators.select()?;
            let parent = if self.generators.requires_parent(strategy) {
                self.corpus.next_input().cloned()
            } else {
                None
            };

            match self.generators.generate(strategy, parent.as_ref())? {
                Ok(test_case) => return Some(test_case),
                Err(e) => {
                    self.stats.generation_failures += 1;
                    tracing::debug!("Generation with {} failed: {}", strategy, e);
                }
            }
        }
        None
    }

    fn dispatch(&mut self, tasks: &mut JoinSet<TaskOutput>, test_case: TestCase) {
        self.stats.dispatched += 1;
        tracing::debug!(
            "Dispatching {} [{}]: {}",
            test_case.id(),
            test_case.generator_kind(),
            test_case.preview(60)
        );

        let executor = Arc::clone(&self.executor);
        let timeout = self.config.test_timeout;
        tasks.spawn(async move {
            let id = test_case.id().to_string();
            let result = executor.execute(&test_case, timeout).await;
            (id, result)
        });
    }

    fn handle_joined(&mut self, joined: Result<TaskOutput, tokio::task::JoinError>) {
        match joined {
            Ok((_, Ok(result))) => self.process_result(result),
            Ok((id, Err(e))) => {
                self.stats.infrastructure_failures += 1;
                tracing::warn!("Harness failure on test case {}: {}", id, e);
            }
            Err(e) => {
                self.stats.infrastructure_failures += 1;
                tracing::warn!("Worker task failed: {}", e);
            }
        }
    }

    /// Triage one result and retain it when anything was new
    fn process_result(&mut self, result: TestResult) {
        self.stats.executions += 1;
        if result.timed_out {
            self.stats.timeouts += 1;
        }

        let mut reasons = Vec::new();

        let crash = self.crashes.analyze(&result);
        if crash.is_new() {
            reasons.push(InterestingReason::NewCrash);
            if let Some(record) = crash.signature.as_deref().and_then(|s| self.crashes.record(s)) {
                if let Err(e) = self.corpus.persist_crash(record) {
                    tracing::warn!("Failed to persist crash {}: {}", record.signature, e);
                }
            }
        }

        let behavior = self.behaviors.analyze(&result);
        if behavior.is_new() {
            reasons.push(InterestingReason::NewBehavior);
            if let Some(record) = behavior
                .signature
                .as_deref()
                .and_then(|s| self.behaviors.record(s))
            {
                if let Err(e) = self.corpus.persist_behavior(record) {
                    tracing::warn!("Failed to persist behavior {}: {}", record.signature, e);
                }
            }
        }

        if self.config.coverage_guided {
            if let Some(report) = &result.coverage {
                let outcome = self.coverage.analyze(report);
                if outcome.is_interesting {
                    tracing::debug!(
                        "New coverage from {}: +{} elements",
                        result.test_case.id(),
                        outcome.delta.total()
                    );
                    reasons.push(InterestingReason::NewCoverage);
                }
            }
        }

        if !reasons.is_empty() {
            match self.corpus.retain(result.test_case, reasons) {
                Ok(true) => {}
                Ok(false) => tracing::debug!("Interesting input not retained (duplicate or full)"),
                Err(e) => tracing::warn!("Failed to persist interesting input: {}", e),
            }
        }
    }

    fn results(&self, elapsed: Duration) -> FuzzResults {
        let duration_secs = elapsed.as_secs_f64();
        let metrics = self.coverage.metrics();
        let cancelled = self.state == RunState::Cancelled;

        FuzzResults {
            target: self.target.clone(),
            suite: self.config.suite,
            state: self.state,
            stop_reason: self.stop_reason.as_ref().map(|r| r.to_string()),
            partial: cancelled || self.stats.infrastructure_failures > 0,
            total_tests: self.stats.executions,
            unique_crashes: self.crashes.unique_count(),
            total_crashes: self.crashes.total_count(),
            unique_behaviors: self.behaviors.unique_count(),
            total_behaviors: self.behaviors.total_count(),
            interesting_inputs: self.corpus.interesting_count(),
            timeouts: self.stats.timeouts,
            infrastructure_failures: self.stats.infrastructure_failures,
            generation_failures: self.stats.generation_failures,
            coverage_percent: metrics.overall_coverage,
            coverage: metrics,
            duration_secs,
            tests_per_second: if duration_secs > 0.0 {
                self.stats.executions as f64 / duration_secs
            } else {
                0.0
            },
            crashes: self.crashes.records(),
            behaviors: self.behaviors.records(),
        }
    }
}
