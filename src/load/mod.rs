//! Load Testing - Time-varying concurrency against the target
//!
//! The [`generator::LoadGenerator`] turns elapsed time into a requested
//! concurrency level; the [`controller::LoadTestController`] scales a pool of
//! workers to follow it and latches the breaking point.

pub mod controller;
pub mod generator;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::LangFuzzError;

pub use self::controller::{BreakingPointDetector, LoadTestController};
pub use self::generator::LoadGenerator;

/// Shape of the requested load over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadPattern {
    Constant,
    Step,
    Ramp,
    Spike,
    Wave,
    Random,
}

impl LoadPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPattern::Constant => "constant",
            LoadPattern::Step => "step",
            LoadPattern::Ramp => "ramp",
            LoadPattern::Spike => "spike",
            LoadPattern::Wave => "wave",
            LoadPattern::Random => "random",
        }
    }
}

impl std::fmt::Display for LoadPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signal used to decide the breaking point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum BreakingPointSignal {
    /// Fewer live workers than requested at a control tick
    #[default]
    WorkerCount,
    /// Per-worker throughput below `threshold_ratio` of the best seen, for
    /// `sustain_ticks` consecutive ticks
    Throughput {
        threshold_ratio: f64,
        sustain_ticks: u32,
    },
}

/// Load test configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestConfig {
    pub pattern: LoadPattern,
    pub initial_load: u32,
    pub max_load: u32,
    pub duration: Duration,
    /// Step: workers added per step
    pub step_size: u32,
    /// Step: seconds between steps
    pub step_duration_secs: f64,
    /// Ramp: workers added per second
    pub ramp_rate: f64,
    /// Wave: period in seconds
    pub wave_period_secs: f64,
    /// Spike: centers of the spike windows, in seconds
    pub spike_times_secs: Vec<f64>,
    /// Spike: load inside a spike window
    pub spike_height: u32,
    /// Random: seed mixed with the elapsed second
    pub random_seed: u64,
    /// Control loop tick
    pub tick_interval: Duration,
    /// Per-execution timeout
    pub test_timeout: Duration,
    pub breaking_point: BreakingPointSignal,
}

/// Half-width of a spike window, in seconds
pub const SPIKE_WINDOW_SECS: f64 = 5.0;

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            pattern: LoadPattern::Constant,
            initial_load: 1,
            max_load: 10,
            duration: Duration::from_secs(60),
            step_size: 1,
            step_duration_secs: 10.0,
            ramp_rate: 0.5,
            wave_period_secs: 60.0,
            spike_times_secs: vec![30.0],
            spike_height: 10,
            random_seed: 0,
            tick_interval: Duration::from_secs(1),
            test_timeout: Duration::from_secs(5),
            breaking_point: BreakingPointSignal::default(),
        }
    }
}

impl LoadTestConfig {
    pub fn new(pattern: LoadPattern) -> Self {
        Self {
            pattern,
            ..Default::default()
        }
    }

    /// Set initial and maximum load
    pub fn with_loads(mut self, initial: u32, max: u32) -> Self {
        self.initial_load = initial;
        self.max_load = max;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_duration_secs(self, secs: u64) -> Self {
        self.with_duration(Duration::from_secs(secs))
    }

    pub fn with_step(mut self, step_size: u32, step_duration_secs: f64) -> Self {
        self.step_size = step_size;
        self.step_duration_secs = step_duration_secs;
        self
    }

    pub fn with_ramp_rate(mut self, per_second: f64) -> Self {
        self.ramp_rate = per_second;
        self
    }

    pub fn with_wave_period(mut self, secs: f64) -> Self {
        self.wave_period_secs = secs;
        self
    }

    pub fn with_spikes(mut self, times_secs: Vec<f64>, height: u32) -> Self {
        self.spike_times_secs = times_secs;
        self.spike_height = height;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn with_breaking_point(mut self, signal: BreakingPointSignal) -> Self {
        self.breaking_point = signal;
        self
    }

    /// Scale the run duration
    pub fn scaled(mut self, multiplier: f64) -> Self {
        self.duration = self.duration.mul_f64(multiplier.max(0.0));
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), LangFuzzError> {
        if self.initial_load > self.max_load {
            return Err(LangFuzzError::invalid_config(format!(
                "initial load {} is greater than max load {}",
                self.initial_load, self.max_load
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(LangFuzzError::invalid_config("tick interval must be positive"));
        }
        if self.pattern == LoadPattern::Step
            && !(self.step_duration_secs.is_finite() && self.step_duration_secs > 0.0)
        {
            return Err(LangFuzzError::invalid_config("step duration must be positive"));
        }
        if self.pattern == LoadPattern::Wave
            && !(self.wave_period_secs.is_finite() && self.wave_period_secs > 0.0)
        {
            return Err(LangFuzzError::invalid_config("wave period must be positive"));
        }
        if self.pattern == LoadPattern::Ramp && !(self.ramp_rate.is_finite() && self.ramp_rate >= 0.0)
        {
            return Err(LangFuzzError::invalid_config("ramp rate must be non-negative"));
        }
        if let BreakingPointSignal::Throughput {
            threshold_ratio,
            sustain_ticks,
        } = self.breaking_point
        {
            if !(0.0..=1.0).contains(&threshold_ratio) || sustain_ticks == 0 {
                return Err(LangFuzzError::invalid_config(
                    "throughput signal needs a ratio in [0, 1] and at least one tick",
                ));
            }
        }
        Ok(())
    }
}

/// Measurements for one control tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSample {
    /// Seconds since the test started
    pub elapsed_secs: f64,
    /// Load that was in effect during the tick
    pub requested_load: u32,
    /// Workers alive at the end of the tick
    pub active_workers: u32,
    /// Executions completed during the tick
    pub completed: u64,
    /// Executions that crashed, timed out or failed to run
    pub failed: u64,
    pub ops_per_sec: f64,
    pub error_rate: f64,
}

/// Outcome of a load test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestResult {
    pub pattern: LoadPattern,
    /// `(elapsed seconds, achieved ops/s)` per tick
    pub throughput_series: Vec<(f64, f64)>,
    /// Requested load at which the target first fell behind
    pub breaking_point: Option<u32>,
    /// The test ran to completion and executed at least once
    pub success: bool,
    pub cancelled: bool,
    pub samples: Vec<LoadSample>,
    pub total_executions: u64,
    pub failed_executions: u64,
    pub duration_secs: f64,
}

impl LoadTestResult {
    /// Mean achieved throughput across ticks
    pub fn mean_throughput(&self) -> f64 {
        if self.throughput_series.is_empty() {
            return 0.0;
        }
        self.throughput_series.iter().map(|(_, ops)| ops).sum::<f64>()
            / self.throughput_series.len() as f64
    }

    /// Highest achieved throughput across ticks
    pub fn peak_throughput(&self) -> f64 {
        self.throughput_series
            .iter()
            .map(|(_, ops)| *ops)
            .fold(0.0, f64::max)
    }

    pub fn print_text(&self) {
        use colored::Colorize;

        println!("{}", "Load Test Results".cyan().bold());
        println!("{}", "=".repeat(50));
        println!();

        println!("Pattern: {}", self.pattern);
        println!("Duration: {:.1}s", self.duration_secs);
        println!(
            "Executions: {} ({} failed)",
            self.total_executions, self.failed_executions
        );
        println!(
            "Throughput: mean {:.1} ops/s, peak {:.1} ops/s",
            self.mean_throughput(),
            self.peak_throughput()
        );
        println!();

        match self.breaking_point {
            Some(point) => println!(
                "{}",
                format!("Breaking point: {} workers", point).red().bold()
            ),
            None => println!("{}", "No breaking point reached ✓".green()),
        }
        if self.cancelled {
            println!("{}", "Load test was cancelled".yellow());
        } else if !self.success {
            println!("{}", "Load test did not complete any executions".yellow());
        }
    }

    pub fn print_json(&self) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}
