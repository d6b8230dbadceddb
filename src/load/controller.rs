//! Load Test Controller - Scales a worker pool to follow a load pattern
//!
//! Once per tick the controller samples the shared counters, feeds the sample
//! to the [`BreakingPointDetector`], then resizes the pool to the load the
//! generator requests for the new elapsed time. Surplus workers are told to
//! stop after their current execution. On cancellation in-flight executions
//! are aborted, which kills their child processes.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::generator::LoadGenerator;
use super::{BreakingPointSignal, LoadSample, LoadTestConfig, LoadTestResult};
use crate::fuzzer::harness::Executor;
use crate::fuzzer::input::TestCase;

/// Latches the first requested load the target could not sustain.
///
/// Fires at most once per test and never resets.
#[derive(Debug, Clone)]
pub struct BreakingPointDetector {
    signal: BreakingPointSignal,
    breaking_point: Option<u32>,
    best_per_worker: f64,
    ticks_below: u32,
}

impl BreakingPointDetector {
    pub fn new(signal: BreakingPointSignal) -> Self {
        Self {
            signal,
            breaking_point: None,
            best_per_worker: 0.0,
            ticks_below: 0,
        }
    }

    /// Feed one tick's sample. Returns the breaking point only on the tick it latches.
    pub fn observe(&mut self, sample: &LoadSample) -> Option<u32> {
        if self.breaking_point.is_some() || sample.requested_load == 0 {
            return None;
        }

        let broken = match self.signal {
            BreakingPointSignal::WorkerCount => sample.active_workers < sample.requested_load,
            BreakingPointSignal::Throughput {
                threshold_ratio,
                sustain_ticks,
            } => {
                let expected = self.best_per_worker * sample.requested_load as f64 * threshold_ratio;
                if self.best_per_worker > 0.0 && sample.ops_per_sec < expected {
                    self.ticks_below += 1;
                } else {
                    self.ticks_below = 0;
                }
                if sample.active_workers > 0 {
                    let per_worker = sample.ops_per_sec / sample.active_workers as f64;
                    if per_worker.is_finite() {
                        self.best_per_worker = self.best_per_worker.max(per_worker);
                    }
                }
                self.ticks_below >= sustain_ticks
            }
        };

        if broken {
            self.breaking_point = Some(sample.requested_load);
        }
        self.breaking_point
    }

    pub fn breaking_point(&self) -> Option<u32> {
        self.breaking_point
    }
}

/// Counters shared between the controller and its workers
#[derive(Debug, Default)]
struct LoadCounters {
    running: AtomicU32,
    attempted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    next_case: AtomicUsize,
}

/// Decrements the running count when a worker exits, however it exits
struct RunningGuard(Arc<LoadCounters>);

impl RunningGuard {
    fn enter(counters: Arc<LoadCounters>) -> Self {
        counters.running.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Drives one load test against an executor
pub struct LoadTestController {
    config: LoadTestConfig,
    generator: LoadGenerator,
    executor: Arc<dyn Executor>,
    cases: Arc<Vec<TestCase>>,
    stop: Arc<AtomicBool>,
    counters: Arc<LoadCounters>,
}

impl LoadTestController {
    pub fn new(config: LoadTestConfig, executor: Arc<dyn Executor>, cases: Vec<TestCase>) -> Self {
        Self {
            generator: LoadGenerator::new(config.clone()),
            config,
            executor,
            cases: Arc::new(cases),
            stop: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(LoadCounters::default()),
        }
    }

    /// Share a cancellation flag with the caller
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Workers currently executing or draining
    pub fn running_workers(&self) -> u32 {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Run the test to its configured duration or until cancelled
    pub async fn run(&self) -> LoadTestResult {
        let pattern = self.config.pattern;
        let start = Instant::now();

        if self.cases.is_empty() {
            tracing::warn!("Load test has no test cases to execute");
            return LoadTestResult {
                pattern,
                throughput_series: Vec::new(),
                breaking_point: None,
                success: false,
                cancelled: false,
                samples: Vec::new(),
                total_executions: 0,
                failed_executions: 0,
                duration_secs: 0.0,
            };
        }

        let mut detector = BreakingPointDetector::new(self.config.breaking_point);
        let mut active: Vec<Worker> = Vec::new();
        let mut draining: Vec<Worker> = Vec::new();
        let mut samples = Vec::new();
        let mut cancelled = false;

        let tick = self.config.tick_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut requested = self.generator.current_load(0.0);
        self.scale_to(requested, &mut active, &mut draining);
        tracing::info!(
            "Load test started: pattern={}, initial load={}, duration={:?}",
            pattern,
            requested,
            self.config.duration
        );

        let mut last_tick = start;
        let mut last_attempted = 0u64;
        let mut last_completed = 0u64;
        let mut last_failed = 0u64;

        loop {
            interval.tick().await;

            let now = Instant::now();
            let elapsed = now.duration_since(start);
            let tick_secs = now.duration_since(last_tick).as_secs_f64().max(f64::EPSILON);
            last_tick = now;

            active.retain(|w| !w.handle.is_finished());
            draining.retain(|w| !w.handle.is_finished());

            let attempted = self.counters.attempted.load(Ordering::SeqCst);
            let completed = self.counters.completed.load(Ordering::SeqCst);
            let failed = self.counters.failed.load(Ordering::SeqCst);
            let tick_attempted = attempted - last_attempted;
            let tick_completed = completed - last_completed;
            let tick_failed = failed - last_failed;
            last_attempted = attempted;
            last_completed = completed;
            last_failed = failed;

            let sample = LoadSample {
                elapsed_secs: elapsed.as_secs_f64(),
                requested_load: requested,
                active_workers: active.len() as u32,
                completed: tick_completed,
                failed: tick_failed,
                ops_per_sec: tick_completed as f64 / tick_secs,
                error_rate: if tick_attempted == 0 {
                    0.0
                } else {
                    (tick_failed as f64 / tick_attempted as f64).min(1.0)
                },
            };
            tracing::debug!(
                "t={:.1}s requested={} active={} ops/s={:.1}",
                sample.elapsed_secs,
                sample.requested_load,
                sample.active_workers,
                sample.ops_per_sec
            );
            if let Some(load) = detector.observe(&sample) {
                tracing::info!("Breaking point reached at requested load {}", load);
            }
            samples.push(sample);

            if self.stop.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }
            if elapsed >= self.config.duration {
                break;
            }

            requested = self.generator.current_load(elapsed.as_secs_f64());
            self.scale_to(requested, &mut active, &mut draining);
        }

        self.shutdown(active.into_iter().chain(draining), cancelled).await;

        let total_executions = self.counters.completed.load(Ordering::SeqCst);
        let failed_executions = self.counters.failed.load(Ordering::SeqCst);
        let throughput_series = samples
            .iter()
            .map(|s| (s.elapsed_secs, s.ops_per_sec))
            .collect();

        tracing::info!(
            "Load test finished: {} executions, {} failed, breaking point {:?}",
            total_executions,
            failed_executions,
            detector.breaking_point()
        );

        LoadTestResult {
            pattern,
            throughput_series,
            breaking_point: detector.breaking_point(),
            success: !cancelled && total_executions > 0,
            cancelled,
            samples,
            total_executions,
            failed_executions,
            duration_secs: start.elapsed().as_secs_f64(),
        }
    }

    /// Grow or shrink the active pool to `target` workers
    fn scale_to(&self, target: u32, active: &mut Vec<Worker>, draining: &mut Vec<Worker>) {
        let target = target as usize;
        while active.len() < target {
            active.push(self.spawn_worker());
        }
        while active.len() > target {
            if let Some(worker) = active.pop() {
                worker.stop.store(true, Ordering::SeqCst);
                draining.push(worker);
            }
        }
    }

    fn spawn_worker(&self) -> Worker {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(worker_loop(
            Arc::clone(&self.executor),
            Arc::clone(&self.cases),
            Arc::clone(&self.counters),
            Arc::clone(&stop),
            Arc::clone(&self.stop),
            self.config.test_timeout,
        ));
        Worker { stop, handle }
    }

    /// Stop every worker. A finished run waits out in-flight executions and
    /// aborts stragglers; a cancelled run aborts at once.
    async fn shutdown(&self, workers: impl Iterator<Item = Worker>, cancelled: bool) {
        let workers: Vec<Worker> = workers.collect();
        for worker in &workers {
            worker.stop.store(true, Ordering::SeqCst);
        }

        if cancelled {
            for worker in &workers {
                worker.handle.abort();
            }
            for worker in workers {
                // Aborted tasks resolve to a cancellation error
                let _ = worker.handle.await;
            }
            return;
        }

        let deadline =
            tokio::time::Instant::now() + self.config.test_timeout + Duration::from_secs(1);
        for mut worker in workers {
            if tokio::time::timeout_at(deadline, &mut worker.handle)
                .await
                .is_err()
            {
                tracing::warn!("Load worker did not stop in time, aborting");
                worker.handle.abort();
            }
        }
    }
}

async fn worker_loop(
    executor: Arc<dyn Executor>,
    cases: Arc<Vec<TestCase>>,
    counters: Arc<LoadCounters>,
    stop: Arc<AtomicBool>,
    global_stop: Arc<AtomicBool>,
    timeout: Duration,
) {
    let _guard = RunningGuard::enter(Arc::clone(&counters));

    while !stop.load(Ordering::SeqCst) && !global_stop.load(Ordering::SeqCst) {
        let index = counters.next_case.fetch_add(1, Ordering::Relaxed) % cases.len();
        counters.attempted.fetch_add(1, Ordering::SeqCst);
        match executor.execute(&cases[index], timeout).await {
            Ok(result) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
                if result.crashed || result.timed_out {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("Load worker stopping after harness failure: {}", e);
                break;
            }
        }
        tokio::task::yield_now().await;
    }
}
