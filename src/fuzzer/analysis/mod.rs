//! Result Analysis - Crash and behavior triage with signature deduplication
//!
//! Both analyzers classify a [`TestResult`](super::input::TestResult) with an
//! ordered pattern table, compute a deterministic signature, and keep a
//! bounded ring of unique records alongside a signature set that is never
//! evicted, so occurrence counts stay correct for the whole run.

pub mod behavior;
pub mod crash;
pub mod stack;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

pub use self::behavior::{BehaviorAnalyzer, BehaviorKind, BehaviorOutcome, BehaviorRecord};
pub use self::crash::{CrashAnalyzer, CrashOutcome, CrashPatterns, CrashRecord, ErrorKind};
pub use self::stack::StackFrame;

/// Default number of unique records retained in memory
pub const DEFAULT_RING_CAPACITY: usize = 100;

/// Severity of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute a deduplication signature.
///
/// The signature depends only on the kind and the top three stack frames,
/// or on a hash of the message when no frames were extracted.
pub fn compute_signature(kind: &str, frames: &[StackFrame], message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());

    if frames.is_empty() {
        hasher.update(b"|msg|");
        hasher.update(hash_message(message).as_bytes());
    } else {
        for frame in frames.iter().take(3) {
            hasher.update(b"|frame|");
            hasher.update(frame.key().as_bytes());
        }
    }

    format!("{}-{}", kind, &format!("{:x}", hasher.finalize())[..16])
}

fn hash_message(message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Records kept in a [`SignatureStore`]
pub trait Catalogued {
    fn signature(&self) -> &str;
    fn set_occurrences(&mut self, occurrences: u64);
}

/// Bounded ring of unique records plus a permanent signature set
#[derive(Debug)]
pub struct SignatureStore<R> {
    capacity: usize,
    retained: VecDeque<R>,
    occurrences: HashMap<String, u64>,
    evicted: u64,
}

impl<R: Catalogued + Clone> SignatureStore<R> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            retained: VecDeque::new(),
            occurrences: HashMap::new(),
            evicted: 0,
        }
    }

    /// Record one occurrence of `signature`.
    ///
    /// Returns `true` when the signature was already known. `make` is only
    /// called for a first occurrence.
    pub fn record(&mut self, signature: &str, make: impl FnOnce() -> R) -> bool {
        if let Some(count) = self.occurrences.get_mut(signature) {
            *count += 1;
            let count = *count;
            if let Some(existing) = self
                .retained
                .iter_mut()
                .find(|r| r.signature() == signature)
            {
                existing.set_occurrences(count);
            }
            return true;
        }

        self.occurrences.insert(signature.to_string(), 1);
        let mut record = make();
        record.set_occurrences(1);

        if self.retained.len() >= self.capacity {
            self.retained.pop_front();
            self.evicted += 1;
        }
        self.retained.push_back(record);
        false
    }

    /// Whether a signature has been seen during this run
    pub fn contains(&self, signature: &str) -> bool {
        self.occurrences.contains_key(signature)
    }

    /// Occurrence count for a signature
    pub fn occurrences(&self, signature: &str) -> u64 {
        self.occurrences.get(signature).copied().unwrap_or(0)
    }

    /// Number of distinct signatures seen (including evicted records)
    pub fn unique_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Total occurrences across all signatures
    pub fn total_occurrences(&self) -> u64 {
        self.occurrences.values().sum()
    }

    /// Retained record for a signature, if not evicted
    pub fn get(&self, signature: &str) -> Option<&R> {
        self.retained.iter().find(|r| r.signature() == signature)
    }

    /// Records still retained in the ring, oldest first
    pub fn retained(&self) -> impl Iterator<Item = &R> {
        self.retained.iter()
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Records evicted from the ring so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
