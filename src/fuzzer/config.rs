//! Fuzzer Configuration - Suite profiles and run settings
//!
//! A [`SuiteProfile`] binds a time budget, the enabled generation strategies
//! and an optional load test. [`FuzzConfig`] starts from a profile and is
//! refined with `with_*` builders before the session validates it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::analysis::DEFAULT_RING_CAPACITY;
use super::analysis::behavior::DEFAULT_SLOW_THRESHOLD;
use super::generator::{GeneratorSettings, Strategy};
use super::limits::ResourceLimits;
use crate::errors::LangFuzzError;
use crate::load::{LoadPattern, LoadTestConfig};

/// Parts of a run that can be included or excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Coverage-guided fuzzing
    Fuzz,
    /// Load test against the same target
    Load,
}

impl Component {
    pub const NAMES: [&'static str; 2] = ["fuzz", "load"];
    pub const ALL: [Component; 2] = [Component::Fuzz, Component::Load];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Fuzz => "fuzz",
            Component::Load => "load",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LangFuzzError> {
        match s.trim().to_lowercase().as_str() {
            "fuzz" => Ok(Component::Fuzz),
            "load" => Ok(Component::Load),
            _ => Err(LangFuzzError::unknown_component(s.trim(), &Self::NAMES)),
        }
    }

    /// Components left after applying include and exclude lists.
    ///
    /// An empty include list means every component.
    pub fn resolve(include: &[String], exclude: &[String]) -> Result<Vec<Component>, LangFuzzError> {
        let mut selected = if include.is_empty() {
            Self::ALL.to_vec()
        } else {
            let mut selected = Vec::new();
            for name in include {
                let component = Self::parse(name)?;
                if !selected.contains(&component) {
                    selected.push(component);
                }
            }
            selected
        };

        for name in exclude {
            let component = Self::parse(name)?;
            selected.retain(|c| *c != component);
        }

        Ok(selected)
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Suite profiles with different intensity levels
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SuiteProfile {
    /// Smoke run (30 s, random and mutation)
    Quick,
    /// Default run (2 min, with a step load test)
    #[default]
    Standard,
    /// Adds templates and a ramp load test (10 min)
    Comprehensive,
    /// Long run with a wave load test (1 h)
    Nightly,
    /// Pre-release gate with a spike load test (30 min)
    Release,
}

impl SuiteProfile {
    /// Fuzzing time budget before the duration multiplier
    pub fn time_budget_secs(&self) -> u64 {
        match self {
            SuiteProfile::Quick => 30,
            SuiteProfile::Standard => 120,
            SuiteProfile::Comprehensive => 600,
            SuiteProfile::Nightly => 3600,
            SuiteProfile::Release => 1800,
        }
    }

    /// Generation strategies enabled by this suite
    pub fn strategies(&self) -> Vec<Strategy> {
        match self {
            SuiteProfile::Quick | SuiteProfile::Standard => {
                vec![Strategy::Random, Strategy::Mutation]
            }
            SuiteProfile::Comprehensive | SuiteProfile::Nightly | SuiteProfile::Release => {
                vec![Strategy::Random, Strategy::Mutation, Strategy::Template]
            }
        }
    }

    /// Load test bundled with this suite, if any
    pub fn load_test(&self) -> Option<LoadTestConfig> {
        match self {
            SuiteProfile::Quick => None,
            SuiteProfile::Standard => Some(
                LoadTestConfig::new(LoadPattern::Step)
                    .with_loads(1, 20)
                    .with_step(2, 5.0)
                    .with_duration_secs(30),
            ),
            SuiteProfile::Comprehensive => Some(
                LoadTestConfig::new(LoadPattern::Ramp)
                    .with_loads(1, 50)
                    .with_ramp_rate(0.5)
                    .with_duration_secs(120),
            ),
            SuiteProfile::Nightly => Some(
                LoadTestConfig::new(LoadPattern::Wave)
                    .with_loads(1, 50)
                    .with_wave_period(120.0)
                    .with_duration_secs(600),
            ),
            SuiteProfile::Release => Some(
                LoadTestConfig::new(LoadPattern::Spike)
                    .with_loads(5, 50)
                    .with_spikes(vec![60.0, 150.0, 240.0], 50)
                    .with_duration_secs(300),
            ),
        }
    }

    /// Get default configuration for this suite
    pub fn default_config(&self) -> FuzzConfig {
        let base = FuzzConfig {
            suite: *self,
            time_limit_secs: self.time_budget_secs(),
            strategies: self.strategies(),
            load: self.load_test(),
            ..FuzzConfig::default()
        };

        match self {
            // Quick: keep the corpus small
            SuiteProfile::Quick => FuzzConfig {
                resource_limits: ResourceLimits::default().with_max_corpus_size(1_000),
                ..base
            },
            SuiteProfile::Standard | SuiteProfile::Comprehensive => base,
            SuiteProfile::Nightly | SuiteProfile::Release => FuzzConfig {
                generator: GeneratorSettings {
                    max_length: 1024,
                    max_mutations: 10,
                    ..GeneratorSettings::default()
                },
                resource_limits: ResourceLimits::default().with_max_corpus_size(100_000),
                ..base
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuiteProfile::Quick => "quick",
            SuiteProfile::Standard => "standard",
            SuiteProfile::Comprehensive => "comprehensive",
            SuiteProfile::Nightly => "nightly",
            SuiteProfile::Release => "release",
        }
    }
}

impl std::fmt::Display for SuiteProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fuzzing configuration
#[derive(Debug, Clone)]
pub struct FuzzConfig {
    /// Suite the defaults came from
    pub suite: SuiteProfile,
    /// Time budget in seconds before scaling
    pub time_limit_secs: u64,
    /// Scales both the fuzzing budget and the load test duration
    pub duration_multiplier: f64,
    /// Deadline for a single execution
    pub test_timeout: Duration,
    /// Number of parallel workers
    pub workers: usize,
    /// Random seed for reproducibility (None = random)
    pub seed: Option<u64>,
    /// Collect coverage from the target and retain inputs that grow it
    pub coverage_guided: bool,
    pub strategies: Vec<Strategy>,
    pub generator: GeneratorSettings,
    /// Seed corpus directory (None = built-in seeds)
    pub seed_dir: Option<PathBuf>,
    /// Where crash, behavior, corpus and coverage artifacts go
    pub output_dir: PathBuf,
    /// Where summary reports go (None = output directory)
    pub reports_dir: Option<PathBuf>,
    /// Retained unique records per analyzer
    pub ring_capacity: usize,
    pub slow_threshold: Duration,
    pub components: Vec<Component>,
    /// Exit non-zero when a unique crash is found
    pub ci_strict: bool,
    pub resource_limits: ResourceLimits,
    pub load: Option<LoadTestConfig>,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            suite: SuiteProfile::Standard,
            time_limit_secs: SuiteProfile::Standard.time_budget_secs(),
            duration_multiplier: 1.0,
            test_timeout: Duration::from_secs(5),
            workers: 1,
            seed: None,
            coverage_guided: false,
            strategies: SuiteProfile::Standard.strategies(),
            generator: GeneratorSettings::default(),
            seed_dir: None,
            output_dir: PathBuf::from("langfuzz-output"),
            reports_dir: None,
            ring_capacity: DEFAULT_RING_CAPACITY,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            components: Component::ALL.to_vec(),
            ci_strict: false,
            resource_limits: ResourceLimits::default(),
            load: None,
        }
    }
}

impl FuzzConfig {
    /// Create config with specific suite
    pub fn with_suite(suite: SuiteProfile) -> Self {
        suite.default_config()
    }

    /// Set number of workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set time budget in seconds
    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn with_duration_multiplier(mut self, multiplier: f64) -> Self {
        self.duration_multiplier = multiplier;
        self
    }

    /// Set per-execution timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Set random seed for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_coverage(mut self, enabled: bool) -> Self {
        self.coverage_guided = enabled;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_generator_settings(mut self, settings: GeneratorSettings) -> Self {
        self.generator = settings;
        self
    }

    /// Set seed corpus directory
    pub fn with_seed_dir(mut self, path: Option<PathBuf>) -> Self {
        self.seed_dir = path;
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_reports_dir(mut self, path: Option<PathBuf>) -> Self {
        self.reports_dir = path;
        self
    }

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity.max(1);
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn with_components(mut self, components: Vec<Component>) -> Self {
        self.components = components;
        self
    }

    pub fn with_ci_strict(mut self, strict: bool) -> Self {
        self.ci_strict = strict;
        self
    }

    /// Set resource limits
    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    /// Set maximum executions
    pub fn with_max_executions(mut self, count: u64) -> Self {
        self.resource_limits = self.resource_limits.with_max_executions(count);
        self
    }

    /// Set maximum corpus size
    pub fn with_max_corpus_size(mut self, count: usize) -> Self {
        self.resource_limits = self.resource_limits.with_max_corpus_size(count);
        self
    }

    pub fn with_load_test(mut self, load: Option<LoadTestConfig>) -> Self {
        self.load = load;
        self
    }

    /// Fuzzing budget after the duration multiplier
    pub fn effective_time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs).mul_f64(self.duration_multiplier.max(0.0))
    }

    /// Where summary reports are written
    pub fn reports_dir(&self) -> PathBuf {
        self.reports_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.clone())
    }

    pub fn is_enabled(&self, component: Component) -> bool {
        self.components.contains(&component)
    }

    /// Load test to run, scaled and seeded for this run
    pub fn effective_load_test(&self) -> Option<LoadTestConfig> {
        if !self.is_enabled(Component::Load) {
            return None;
        }
        self.load.clone().map(|load| {
            let seed = self.seed.unwrap_or(load.random_seed);
            load.scaled(self.duration_multiplier)
                .with_test_timeout(self.test_timeout)
                .with_random_seed(seed)
        })
    }

    /// Check the configuration before any work starts
    pub fn validate(&self) -> Result<(), LangFuzzError> {
        if !(self.duration_multiplier.is_finite() && self.duration_multiplier > 0.0) {
            return Err(LangFuzzError::invalid_config(format!(
                "duration multiplier must be positive, got {}",
                self.duration_multiplier
            )));
        }
        if self.test_timeout.is_zero() {
            return Err(LangFuzzError::invalid_config("test timeout must be positive"));
        }
        if self.workers == 0 {
            return Err(LangFuzzError::invalid_config("at least one worker is required"));
        }
        if self.is_enabled(Component::Fuzz) && self.strategies.is_empty() {
            return Err(LangFuzzError::invalid_config(
                "no generation strategies enabled",
            ));
        }
        self.generator
            .validate()
            .map_err(|e| LangFuzzError::invalid_config(e.to_string()))?;
        if let Some(load) = &self.load {
            load.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_budgets_and_strategies() {
        assert_eq!(SuiteProfile::Quick.time_budget_secs(), 30);
        assert_eq!(SuiteProfile::Nightly.time_budget_secs(), 3600);
        assert_eq!(
            SuiteProfile::Quick.strategies(),
            vec![Strategy::Random, Strategy::Mutation]
        );
        assert!(SuiteProfile::Release.strategies().contains(&Strategy::Template));
    }

    #[test]
    fn suite_load_tests() {
        assert!(SuiteProfile::Quick.load_test().is_none());

        let standard = SuiteProfile::Standard.load_test().unwrap();
        assert_eq!(standard.pattern, LoadPattern::Step);
        assert_eq!(standard.duration, Duration::from_secs(30));

        let release = SuiteProfile::Release.load_test().unwrap();
        assert_eq!(release.pattern, LoadPattern::Spike);
        assert_eq!(release.spike_times_secs.len(), 3);

        for suite in [
            SuiteProfile::Standard,
            SuiteProfile::Comprehensive,
            SuiteProfile::Nightly,
            SuiteProfile::Release,
        ] {
            assert!(suite.load_test().unwrap().validate().is_ok());
        }
    }

    #[test]
    fn default_config_follows_suite() {
        let config = FuzzConfig::with_suite(SuiteProfile::Comprehensive);
        assert_eq!(config.suite, SuiteProfile::Comprehensive);
        assert_eq!(config.time_limit_secs, 600);
        assert_eq!(config.strategies.len(), 3);
        assert!(config.load.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn component_resolution() {
        let all = Component::resolve(&[], &[]).unwrap();
        assert_eq!(all, vec![Component::Fuzz, Component::Load]);

        let fuzz_only = Component::resolve(&[], &["load".to_string()]).unwrap();
        assert_eq!(fuzz_only, vec![Component::Fuzz]);

        let load_only = Component::resolve(&["LOAD".to_string()], &[]).unwrap();
        assert_eq!(load_only, vec![Component::Load]);

        let none = Component::resolve(&["fuzz".to_string()], &["fuzz".to_string()]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_component_is_error() {
        let err = Component::resolve(&["fuz".to_string()], &[]).unwrap_err();
        match err {
            LangFuzzError::UnknownComponent { name, suggestion } => {
                assert_eq!(name, "fuz");
                assert!(suggestion.contains("'fuzz'"));
            }
            other => panic!("Expected UnknownComponent, got {:?}", other),
        }
    }

    #[test]
    fn effective_time_limit_scales() {
        let config = FuzzConfig::with_suite(SuiteProfile::Quick).with_duration_multiplier(0.1);
        assert_eq!(config.effective_time_limit(), Duration::from_secs(3));
    }

    #[test]
    fn effective_load_test_is_scaled_and_gated() {
        let config = FuzzConfig::with_suite(SuiteProfile::Standard)
            .with_duration_multiplier(0.5)
            .with_timeout(Duration::from_secs(2))
            .with_seed(7);
        let load = config.effective_load_test().unwrap();
        assert_eq!(load.duration, Duration::from_secs(15));
        assert_eq!(load.test_timeout, Duration::from_secs(2));
        assert_eq!(load.random_seed, 7);

        let excluded = config.with_components(vec![Component::Fuzz]);
        assert!(excluded.effective_load_test().is_none());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(FuzzConfig::default()
            .with_duration_multiplier(0.0)
            .validate()
            .is_err());
        assert!(FuzzConfig::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(FuzzConfig::default()
            .with_strategies(Vec::new())
            .validate()
            .is_err());
        assert!(FuzzConfig::default()
            .with_generator_settings(GeneratorSettings {
                min_length: 10,
                max_length: 5,
                ..GeneratorSettings::default()
            })
            .validate()
            .is_err());
    }

    #[test]
    fn with_workers_minimum_one() {
        let config = FuzzConfig::default().with_workers(0);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn reports_dir_defaults_to_output() {
        let config = FuzzConfig::default().with_output_dir("/tmp/out");
        assert_eq!(config.reports_dir(), PathBuf::from("/tmp/out"));

        let config = config.with_reports_dir(Some(PathBuf::from("/tmp/reports")));
        assert_eq!(config.reports_dir(), PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn builder_chain() {
        let config = FuzzConfig::default()
            .with_workers(4)
            .with_time_limit(10)
            .with_seed(99)
            .with_coverage(true)
            .with_ci_strict(true)
            .with_max_executions(500);

        assert_eq!(config.workers, 4);
        assert_eq!(config.time_limit_secs, 10);
        assert_eq!(config.seed, Some(99));
        assert!(config.coverage_guided);
        assert!(config.ci_strict);
        assert_eq!(config.resource_limits.max_executions, Some(500));
    }
}
