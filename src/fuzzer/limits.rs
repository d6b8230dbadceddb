//! Resource Limits - Budgets that end a fuzzing run
//!
//! # Supported Limits
//!
//! - **Time**: wall-clock budget for the whole run
//! - **Executions**: maximum number of test cases executed
//! - **Corpus Size**: maximum retained corpus entries
//! - **Infrastructure failures**: harness failures tolerated before giving up
//!
//! # Example
//!
//! ```ignore
//! use langfuzz::fuzzer::limits::{LimitStats, ResourceLimits, ResourceMonitor};
//!
//! let limits = ResourceLimits::default().with_max_time(Duration::from_secs(30));
//! let monitor = ResourceMonitor::new(limits);
//!
//! loop {
//!     // ... dispatch a test case ...
//!     if let Some(exceeded) = monitor.check(&stats) {
//!         println!("{}", exceeded);
//!         break;
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

/// Resource limits for fuzzing runs
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    /// Maximum run time (None = unlimited)
    pub max_time: Option<Duration>,
    /// Maximum number of executions (None = unlimited)
    pub max_executions: Option<u64>,
    /// Maximum corpus size in entries (None = unlimited)
    pub max_corpus_size: Option<usize>,
    /// Maximum harness infrastructure failures (None = unlimited)
    pub max_infrastructure_failures: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_time: Some(Duration::from_secs(120)),
            max_executions: None,
            max_corpus_size: Some(10_000),
            max_infrastructure_failures: Some(1_000),
        }
    }
}

impl ResourceLimits {
    /// Create unlimited resource limits
    pub fn unlimited() -> Self {
        Self {
            max_time: None,
            max_executions: None,
            max_corpus_size: None,
            max_infrastructure_failures: None,
        }
    }

    /// Set maximum run time
    pub fn with_max_time(mut self, duration: Duration) -> Self {
        self.max_time = Some(duration);
        self
    }

    /// Set maximum executions
    pub fn with_max_executions(mut self, count: u64) -> Self {
        self.max_executions = Some(count);
        self
    }

    /// Set maximum corpus size
    pub fn with_max_corpus_size(mut self, count: usize) -> Self {
        self.max_corpus_size = Some(count);
        self
    }

    /// Set maximum infrastructure failures
    pub fn with_max_infrastructure_failures(mut self, count: u64) -> Self {
        self.max_infrastructure_failures = Some(count);
        self
    }

    /// Parse duration from human-readable string (e.g., "5m", "1h", "30s")
    pub fn parse_duration(s: &str) -> Result<Duration, ParseError> {
        let s = s.trim().to_lowercase();

        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let (num_str, multiplier) = if let Some(n) = s.strip_suffix("ms") {
            (n, 1u64)
        } else if let Some(n) = s.strip_suffix('s') {
            (n, 1000u64)
        } else if let Some(n) = s.strip_suffix('m') {
            (n, 60 * 1000u64)
        } else if let Some(n) = s.strip_suffix('h') {
            (n, 60 * 60 * 1000u64)
        } else if let Some(n) = s.strip_suffix('d') {
            (n, 24 * 60 * 60 * 1000u64)
        } else if s.chars().all(|c| c.is_ascii_digit()) {
            // Bare numbers are seconds
            (s.as_str(), 1000u64)
        } else {
            let unit: String = s.chars().skip_while(|c| c.is_ascii_digit()).collect();
            return Err(ParseError::UnknownUnit(unit));
        };

        let num: u64 = num_str
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidNumber(num_str.to_string()))?;

        num.checked_mul(multiplier)
            .map(Duration::from_millis)
            .ok_or_else(|| ParseError::InvalidNumber(num_str.to_string()))
    }
}

/// Error parsing limit values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty value")]
    Empty,
    #[error("invalid number: '{0}'")]
    InvalidNumber(String),
    #[error("unknown unit: '{0}'")]
    UnknownUnit(String),
}

/// Counters checked against the limits
#[derive(Debug, Clone, Default)]
pub struct LimitStats {
    /// Test cases executed
    pub executions: u64,
    /// Current corpus size
    pub corpus_size: usize,
    /// Harness infrastructure failures so far
    pub infrastructure_failures: u64,
}

/// Tracks elapsed time and checks limits
pub struct ResourceMonitor {
    limits: ResourceLimits,
    start_time: Instant,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
        }
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if any limits have been exceeded
    pub fn check(&self, stats: &LimitStats) -> Option<LimitExceeded> {
        if let Some(max_time) = self.limits.max_time {
            if self.start_time.elapsed() >= max_time {
                return Some(LimitExceeded::Time(max_time));
            }
        }

        if let Some(max_execs) = self.limits.max_executions {
            if stats.executions >= max_execs {
                return Some(LimitExceeded::Executions(max_execs));
            }
        }

        if let Some(max_corpus) = self.limits.max_corpus_size {
            if stats.corpus_size >= max_corpus {
                return Some(LimitExceeded::CorpusSize(max_corpus));
            }
        }

        if let Some(max_failures) = self.limits.max_infrastructure_failures {
            if stats.infrastructure_failures >= max_failures {
                return Some(LimitExceeded::InfrastructureFailures(max_failures));
            }
        }

        None
    }
}

/// Information about which limit was exceeded
#[derive(Debug, Clone, PartialEq)]
pub enum LimitExceeded {
    Time(Duration),
    Executions(u64),
    CorpusSize(usize),
    InfrastructureFailures(u64),
}

impl std::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitExceeded::Time(d) => write!(f, "Time budget exhausted: {}", format_duration(*d)),
            LimitExceeded::Executions(n) => write!(f, "Execution limit reached: {} executions", n),
            LimitExceeded::CorpusSize(n) => write!(f, "Corpus size limit reached: {} entries", n),
            LimitExceeded::InfrastructureFailures(n) => {
                write!(f, "Too many harness failures: {}", n)
            }
        }
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_time, Some(Duration::from_secs(120)));
        assert!(limits.max_executions.is_none());
        assert_eq!(limits.max_corpus_size, Some(10_000));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(
            ResourceLimits::parse_duration("30s").unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            ResourceLimits::parse_duration("5m").unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            ResourceLimits::parse_duration("2h").unwrap(),
            Duration::from_secs(7200)
        );
        assert_eq!(
            ResourceLimits::parse_duration("1d").unwrap(),
            Duration::from_secs(86400)
        );
        assert_eq!(
            ResourceLimits::parse_duration("250ms").unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(
            ResourceLimits::parse_duration(" 45 ").unwrap(),
            Duration::from_secs(45)
        );
    }

    #[test]
    fn parse_duration_errors() {
        assert_eq!(ResourceLimits::parse_duration(""), Err(ParseError::Empty));
        assert_eq!(ResourceLimits::parse_duration("   "), Err(ParseError::Empty));
        assert!(matches!(
            ResourceLimits::parse_duration("abcs"),
            Err(ParseError::InvalidNumber(_))
        ));
        assert_eq!(
            ResourceLimits::parse_duration("10y"),
            Err(ParseError::UnknownUnit("y".to_string()))
        );
        assert!(ResourceLimits::parse_duration("-5s").is_err());
    }

    #[test]
    fn monitor_time_limit() {
        let monitor = ResourceMonitor::new(ResourceLimits::unlimited().with_max_time(Duration::ZERO));
        assert_eq!(
            monitor.check(&LimitStats::default()),
            Some(LimitExceeded::Time(Duration::ZERO))
        );
    }

    #[test]
    fn monitor_execution_limit() {
        let monitor = ResourceMonitor::new(ResourceLimits::unlimited().with_max_executions(10));
        let mut stats = LimitStats {
            executions: 9,
            ..Default::default()
        };
        assert!(monitor.check(&stats).is_none());

        stats.executions = 10;
        assert_eq!(monitor.check(&stats), Some(LimitExceeded::Executions(10)));
    }

    #[test]
    fn monitor_corpus_limit() {
        let monitor = ResourceMonitor::new(ResourceLimits::unlimited().with_max_corpus_size(3));
        let stats = LimitStats {
            corpus_size: 3,
            ..Default::default()
        };
        assert_eq!(monitor.check(&stats), Some(LimitExceeded::CorpusSize(3)));
    }

    #[test]
    fn monitor_infrastructure_limit() {
        let monitor =
            ResourceMonitor::new(ResourceLimits::unlimited().with_max_infrastructure_failures(2));
        let stats = LimitStats {
            infrastructure_failures: 2,
            ..Default::default()
        };
        assert_eq!(
            monitor.check(&stats),
            Some(LimitExceeded::InfrastructureFailures(2))
        );
    }

    #[test]
    fn unlimited_never_trips() {
        let monitor = ResourceMonitor::new(ResourceLimits::unlimited());
        let stats = LimitStats {
            executions: u64::MAX,
            corpus_size: usize::MAX,
            infrastructure_failures: u64::MAX,
        };
        assert!(monitor.check(&stats).is_none());
    }

    #[test]
    fn format_duration_display() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h2m");
    }
}
