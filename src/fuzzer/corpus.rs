//! Corpus Management - Seed corpus, retained inputs and persisted findings
//!
//! Seeds come from a directory (one program per file, file stem = id) or
//! from the built-in set. Interesting test cases are retained and join the
//! round-robin rotation parents are drawn from. Crash and behavior records
//! are written as pretty JSON under the output directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::analysis::{BehaviorRecord, CrashRecord};
use super::input::TestCase;
use crate::errors::LangFuzzError;

/// Subdirectories created under the output directory
pub const OUTPUT_SUBDIRS: [&str; 5] = ["crashes", "behaviors", "interesting", "coverage", "load"];

/// Built-in seed programs used when no seed directory is configured
const BUILTIN_SEEDS: &[(&str, &str)] = &[
    ("division_by_zero", "x ← 1 / 0"),
    ("assignment", "x = 1\nprint(x)"),
    ("arithmetic", "print(2 + 3 * 4 - 10 / 5)"),
    ("function", "fn add(a, b) { return a + b }\nprint(add(1, 2))"),
    ("loop", "for i in 0..10 { print(i) }"),
    ("conditional", "x = 5\nif x > 0 { print(\"pos\") } else { print(\"neg\") }"),
    ("string", "s = \"hello\"\nprint(s + \" world\")"),
    ("list", "xs = [1, 2, 3]\nprint(xs[0])"),
    ("map", "m = {\"k\": 1}\nprint(m[\"k\"])"),
    ("recursion", "fn f(n) { if n < 2 { return n } return f(n - 1) + f(n - 2) }\nprint(f(10))"),
];

/// Built-in seeds as test cases
pub fn builtin_seeds() -> Vec<TestCase> {
    BUILTIN_SEEDS
        .iter()
        .map(|(id, content)| TestCase::seed(*id, *content))
        .collect()
}

/// Why a test case was retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestingReason {
    NewCrash,
    NewBehavior,
    NewCoverage,
}

/// A retained test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestingInput {
    pub test_case: TestCase,
    pub reasons: Vec<InterestingReason>,
    /// SHA-256 of the content
    pub content_hash: String,
    pub timestamp: String,
}

/// Seeds plus retained interesting inputs
pub struct Corpus {
    /// Base path for persisted artifacts
    output_dir: Option<PathBuf>,
    seeds: Vec<TestCase>,
    interesting: Vec<InterestingInput>,
    /// Maximum seeds + interesting entries (None = unbounded)
    max_size: Option<usize>,
    /// Current index for round-robin parent selection
    current_index: usize,
    seen_hashes: HashSet<String>,
}

impl Default for Corpus {
    fn default() -> Self {
        Self::new()
    }
}

impl Corpus {
    /// Create an in-memory corpus
    pub fn new() -> Self {
        Self {
            output_dir: None,
            seeds: Vec::new(),
            interesting: Vec::new(),
            max_size: None,
            current_index: 0,
            seen_hashes: HashSet::new(),
        }
    }

    /// Persist findings under `dir`
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    pub fn with_max_size(mut self, max_size: Option<usize>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Load seeds from `seed_dir`, or the built-in seeds when none is given.
    ///
    /// An empty seed directory also falls back to the built-in seeds.
    pub fn initialize(&mut self, seed_dir: Option<&Path>) -> Result<(), LangFuzzError> {
        if let Some(dir) = seed_dir {
            let loaded = self.load_seeds(dir)?;
            if loaded > 0 {
                tracing::info!("Loaded {} seeds from {}", loaded, dir.display());
                return Ok(());
            }
            tracing::warn!(
                "Seed directory {} is empty, using built-in seeds",
                dir.display()
            );
        }

        for seed in builtin_seeds() {
            self.add_seed(seed);
        }
        Ok(())
    }

    /// Load every regular file in `dir` as a seed; returns how many were added
    pub fn load_seeds(&mut self, dir: &Path) -> Result<usize, LangFuzzError> {
        if !dir.exists() {
            return Err(LangFuzzError::SeedDirMissing {
                path: dir.to_path_buf(),
            });
        }
        let unreadable = |message: String| LangFuzzError::SeedDirUnreadable {
            path: dir.to_path_buf(),
            message,
        };
        if !dir.is_dir() {
            return Err(unreadable("not a directory".to_string()));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| unreadable(e.to_string()))? {
            let path = entry.map_err(|e| unreadable(e.to_string()))?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if path.is_file() && !hidden {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Skipping unreadable seed {}: {}", path.display(), e);
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&bytes).into_owned();
            self.add_seed(TestCase::seed(id, content));
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Create the output directory layout
    pub fn prepare_output(&self) -> Result<(), LangFuzzError> {
        let Some(base) = &self.output_dir else {
            return Ok(());
        };
        for sub in OUTPUT_SUBDIRS {
            let dir = base.join(sub);
            fs::create_dir_all(&dir).map_err(|e| LangFuzzError::output_unwritable(base, e))?;
        }

        let probe = base.join(".langfuzz-write-test");
        fs::write(&probe, b"").map_err(|e| LangFuzzError::output_unwritable(base, e))?;
        let _ = fs::remove_file(&probe);
        Ok(())
    }

    /// Add a seed input
    pub fn add_seed(&mut self, seed: TestCase) {
        self.seen_hashes.insert(content_hash(seed.content()));
        self.seeds.push(seed);
    }

    /// Next parent candidate, round-robin over seeds then retained inputs
    pub fn next_input(&mut self) -> Option<&TestCase> {
        let total = self.seeds.len() + self.interesting.len();
        if total == 0 {
            return None;
        }

        let idx = self.current_index % total;
        self.current_index = self.current_index.wrapping_add(1);

        if idx < self.seeds.len() {
            Some(&self.seeds[idx])
        } else {
            Some(&self.interesting[idx - self.seeds.len()].test_case)
        }
    }

    /// Retain an interesting test case.
    ///
    /// Returns `false` when the same content is already in the corpus or the
    /// corpus is full.
    pub fn retain(&mut self, test_case: TestCase, reasons: Vec<InterestingReason>) -> Result<bool> {
        let hash = content_hash(test_case.content());
        if self.seen_hashes.contains(&hash) || self.is_full() {
            return Ok(false);
        }
        self.seen_hashes.insert(hash.clone());

        let record = InterestingInput {
            test_case,
            reasons,
            content_hash: hash,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        if let Some(base) = &self.output_dir {
            let dir = base.join("interesting");
            fs::create_dir_all(&dir)?;
            let path = dir.join(format!("interesting_{}.json", record.test_case.id()));
            let json = serde_json::to_string_pretty(&record)?;
            fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        self.interesting.push(record);
        Ok(true)
    }

    /// Write a new unique crash; returns the file written, if any
    pub fn persist_crash(&self, record: &CrashRecord) -> Result<Option<PathBuf>> {
        let filename = format!("crash_{}_{}.json", record.signature, file_timestamp());
        self.write_record("crashes", &filename, record)
    }

    /// Write a new unique behavior; returns the file written, if any
    pub fn persist_behavior(&self, record: &BehaviorRecord) -> Result<Option<PathBuf>> {
        let filename = format!("behavior_{}_{}.json", record.signature, file_timestamp());
        self.write_record("behaviors", &filename, record)
    }

    fn write_record<T: Serialize>(&self, sub: &str, filename: &str, record: &T) -> Result<Option<PathBuf>> {
        let Some(base) = &self.output_dir else {
            return Ok(None);
        };
        let dir = base.join(sub);
        fs::create_dir_all(&dir)?;

        let path = dir.join(filename);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Some(path))
    }

    pub fn seeds(&self) -> &[TestCase] {
        &self.seeds
    }

    pub fn interesting(&self) -> &[InterestingInput] {
        &self.interesting
    }

    pub fn seed_count(&self) -> usize {
        self.seeds.len()
    }

    pub fn interesting_count(&self) -> usize {
        self.interesting.len()
    }

    /// Get total corpus size (seeds + interesting inputs)
    pub fn corpus_size(&self) -> usize {
        self.seeds.len() + self.interesting.len()
    }

    pub fn is_full(&self) -> bool {
        self.max_size.is_some_and(|max| self.corpus_size() >= max)
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }
}

fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// UTC timestamp for catalogue file names
fn file_timestamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzer::analysis::{ErrorKind, Severity};
    use crate::fuzzer::input::GeneratorKind;

    fn crash_record() -> CrashRecord {
        CrashRecord {
            signature: "runtime-0123456789abcdef".to_string(),
            error_kind: ErrorKind::Runtime,
            severity: Severity::High,
            message: "Runtime error: division by zero".to_string(),
            stack_frames: Vec::new(),
            first_seen_test_case_id: "division_by_zero".to_string(),
            input: "x ← 1 / 0".to_string(),
            exit_code: Some(1),
            signal: None,
            occurrences: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn builtin_seeds_include_division() {
        let seeds = builtin_seeds();
        assert!(seeds.len() >= 5);
        assert!(seeds.iter().all(|s| s.is_seed()));
        assert!(seeds.iter().any(|s| s.content() == "x ← 1 / 0"));
    }

    #[test]
    fn initialize_without_dir_uses_builtins() {
        let mut corpus = Corpus::new();
        corpus.initialize(None).unwrap();
        assert_eq!(corpus.seed_count(), builtin_seeds().len());
    }

    #[test]
    fn loads_seed_files_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.lang"), "print(1)").unwrap();
        fs::write(dir.path().join("beta.lang"), "x ← 1 / 0").unwrap();
        fs::write(dir.path().join(".hidden"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let mut corpus = Corpus::new();
        corpus.initialize(Some(dir.path())).unwrap();

        assert_eq!(corpus.seed_count(), 2);
        assert_eq!(corpus.seeds()[0].id(), "alpha");
        assert_eq!(corpus.seeds()[1].id(), "beta");
        assert_eq!(corpus.seeds()[1].generator_kind(), GeneratorKind::Template);
    }

    #[test]
    fn missing_seed_dir_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let mut corpus = Corpus::new();
        match corpus.initialize(Some(&missing)) {
            Err(LangFuzzError::SeedDirMissing { path }) => assert_eq!(path, missing),
            other => panic!("Expected SeedDirMissing, got {:?}", other),
        }
    }

    #[test]
    fn empty_seed_dir_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut corpus = Corpus::new();
        corpus.initialize(Some(dir.path())).unwrap();
        assert_eq!(corpus.seed_count(), builtin_seeds().len());
    }

    #[test]
    fn round_robin_includes_retained() {
        let mut corpus = Corpus::new();
        corpus.add_seed(TestCase::seed("a", "1"));
        corpus.add_seed(TestCase::seed("b", "2"));
        let retained = TestCase::new(GeneratorKind::Mutation, "3");
        assert!(corpus
            .retain(retained, vec![InterestingReason::NewCoverage])
            .unwrap());

        let order: Vec<String> = (0..4)
            .map(|_| corpus.next_input().unwrap().content().to_string())
            .collect();
        assert_eq!(order, vec!["1", "2", "3", "1"]);
    }

    #[test]
    fn empty_corpus_has_no_input() {
        let mut corpus = Corpus::new();
        assert!(corpus.next_input().is_none());
    }

    #[test]
    fn retain_deduplicates_content_and_respects_max() {
        let mut corpus = Corpus::new().with_max_size(Some(2));
        corpus.add_seed(TestCase::seed("a", "same"));

        let dup = TestCase::new(GeneratorKind::Random, "same");
        assert!(!corpus.retain(dup, vec![InterestingReason::NewBehavior]).unwrap());

        let fresh = TestCase::new(GeneratorKind::Random, "fresh");
        assert!(corpus.retain(fresh, vec![InterestingReason::NewBehavior]).unwrap());
        assert!(corpus.is_full());

        let late = TestCase::new(GeneratorKind::Random, "late");
        assert!(!corpus.retain(late, vec![InterestingReason::NewCrash]).unwrap());
        assert_eq!(corpus.interesting_count(), 1);
    }

    #[test]
    fn persists_findings_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::new().with_output_dir(dir.path().to_path_buf());
        corpus.prepare_output().unwrap();
        for sub in OUTPUT_SUBDIRS {
            assert!(dir.path().join(sub).is_dir());
        }

        let path = corpus.persist_crash(&crash_record()).unwrap().unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["error_kind"], "runtime");
        assert_eq!(json["severity"], "high");
        assert!(path.starts_with(dir.path().join("crashes")));
    }

    #[test]
    fn repeated_runs_keep_earlier_records() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::new().with_output_dir(dir.path().to_path_buf());

        let first = corpus.persist_crash(&crash_record()).unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = corpus.persist_crash(&crash_record()).unwrap().unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert_eq!(fs::read_dir(dir.path().join("crashes")).unwrap().count(), 2);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("crash_{}_", crash_record().signature)));
    }

    #[test]
    fn retained_input_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut corpus = Corpus::new().with_output_dir(dir.path().to_path_buf());
        let case = TestCase::new(GeneratorKind::Random, "print(NaN)").with_id("case-1");
        corpus
            .retain(case, vec![InterestingReason::NewBehavior])
            .unwrap();

        let path = dir.path().join("interesting").join("interesting_case-1.json");
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["reasons"][0], "new_behavior");
    }

    #[test]
    fn in_memory_corpus_writes_nothing() {
        let corpus = Corpus::new();
        assert!(corpus.persist_crash(&crash_record()).unwrap().is_none());
        assert!(corpus.prepare_output().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_output_is_setup_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

        // Root ignores permission bits
        if fs::write(locked.join("probe"), b"").is_ok() {
            return;
        }

        let corpus = Corpus::new().with_output_dir(locked.join("out"));
        assert!(matches!(
            corpus.prepare_output(),
            Err(LangFuzzError::OutputDirUnwritable { .. })
        ));
    }
}
