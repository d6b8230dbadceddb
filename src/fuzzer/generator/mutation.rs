//! Mutation Generator - Derive test cases from a parent
//!
//! Content is mutated one Unicode scalar at a time so the result is always
//! valid UTF-8. "Byte" operators act on the low byte of the scalar.
//! Every applied operator is logged in the output's `mutations` metadata.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dictionary::Dictionary;
use super::random::ALPHABET;
use super::{GenerateError, Generator};
use crate::fuzzer::input::{GeneratorKind, TestCase};

/// Largest block touched by the block operators
pub const MAX_BLOCK_SIZE: usize = 8;

/// Mutation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperator {
    BitFlip,
    ByteFlip,
    ByteIncrement,
    ByteDecrement,
    InsertRandom,
    DeleteRandom,
    ReplaceRandom,
    SwapAdjacent,
    DuplicateBlock,
    DeleteBlock,
    ReplaceBlock,
    InsertKnownValue,
    ReplaceKnownValue,
}

impl MutationOperator {
    pub const ALL: [MutationOperator; 13] = [
        Self::BitFlip,
        Self::ByteFlip,
        Self::ByteIncrement,
        Self::ByteDecrement,
        Self::InsertRandom,
        Self::DeleteRandom,
        Self::ReplaceRandom,
        Self::SwapAdjacent,
        Self::DuplicateBlock,
        Self::DeleteBlock,
        Self::ReplaceBlock,
        Self::InsertKnownValue,
        Self::ReplaceKnownValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BitFlip => "bit_flip",
            Self::ByteFlip => "byte_flip",
            Self::ByteIncrement => "byte_increment",
            Self::ByteDecrement => "byte_decrement",
            Self::InsertRandom => "insert_random",
            Self::DeleteRandom => "delete_random",
            Self::ReplaceRandom => "replace_random",
            Self::SwapAdjacent => "swap_adjacent",
            Self::DuplicateBlock => "duplicate_block",
            Self::DeleteBlock => "delete_block",
            Self::ReplaceBlock => "replace_block",
            Self::InsertKnownValue => "insert_known_value",
            Self::ReplaceKnownValue => "replace_known_value",
        }
    }

    /// Minimum content length (in units) the operator needs
    pub fn min_len(&self) -> usize {
        match self {
            Self::InsertRandom | Self::InsertKnownValue => 0,
            Self::SwapAdjacent => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for MutationOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One applied mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationLogEntry {
    #[serde(rename = "type")]
    pub operator: MutationOperator,
    pub position: usize,
    pub before: String,
    pub after: String,
}

/// Applies `k` mutations to a parent, `k` uniform in `[min, max]`
pub struct MutationGenerator {
    min_mutations: usize,
    max_mutations: usize,
    operators: Vec<MutationOperator>,
    dictionary: Dictionary,
    rng: SmallRng,
}

impl MutationGenerator {
    pub fn new(min_mutations: usize, max_mutations: usize) -> Self {
        Self {
            min_mutations: min_mutations.min(max_mutations),
            max_mutations,
            operators: MutationOperator::ALL.to_vec(),
            dictionary: Dictionary::builtin(),
            rng: SmallRng::from_entropy(),
        }
    }

    /// Restrict the operator set
    pub fn with_operators(mut self, operators: Vec<MutationOperator>) -> Self {
        if !operators.is_empty() {
            self.operators = operators;
        }
        self
    }

    /// Set random seed for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub(crate) fn seeded(self, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => self.with_seed(seed),
            None => self,
        }
    }

    /// Mutate content, returning the new content and the applied log
    pub fn mutate(&mut self, content: &str) -> (String, Vec<MutationLogEntry>) {
        let mut units: Vec<char> = content.chars().collect();
        let count = self.rng.gen_range(self.min_mutations..=self.max_mutations);
        let mut log = Vec::with_capacity(count);

        for _ in 0..count {
            let op = self.operators[self.rng.gen_range(0..self.operators.len())];
            if let Some(entry) = self.apply(op, &mut units) {
                log.push(entry);
            }
        }

        (units.into_iter().collect(), log)
    }

    /// Apply one operator; `None` when its preconditions do not hold
    pub fn apply(&mut self, op: MutationOperator, units: &mut Vec<char>) -> Option<MutationLogEntry> {
        if units.len() < op.min_len() {
            return None;
        }

        let len = units.len();
        let entry = |position: usize, before: &[char], after: &[char]| MutationLogEntry {
            operator: op,
            position,
            before: before.iter().collect(),
            after: after.iter().collect(),
        };

        match op {
            MutationOperator::BitFlip => {
                let pos = self.rng.gen_range(0..len);
                let bit = self.rng.gen_range(0..8);
                let flipped = char::from_u32(units[pos] as u32 ^ (1 << bit))?;
                let before = units[pos];
                units[pos] = flipped;
                Some(entry(pos, &[before], &[flipped]))
            }
            MutationOperator::ByteFlip => {
                let pos = self.rng.gen_range(0..len);
                let flipped = char::from_u32(units[pos] as u32 ^ 0xFF)?;
                let before = units[pos];
                units[pos] = flipped;
                Some(entry(pos, &[before], &[flipped]))
            }
            MutationOperator::ByteIncrement | MutationOperator::ByteDecrement => {
                let pos = self.rng.gen_range(0..len);
                let code = units[pos] as u32;
                let next = if op == MutationOperator::ByteIncrement {
                    code.checked_add(1)
                } else {
                    code.checked_sub(1)
                };
                let changed = next.and_then(char::from_u32)?;
                let before = units[pos];
                units[pos] = changed;
                Some(entry(pos, &[before], &[changed]))
            }
            MutationOperator::InsertRandom => {
                let pos = self.rng.gen_range(0..=len);
                let c = self.random_unit();
                units.insert(pos, c);
                Some(entry(pos, &[], &[c]))
            }
            MutationOperator::DeleteRandom => {
                let pos = self.rng.gen_range(0..len);
                let removed = units.remove(pos);
                Some(entry(pos, &[removed], &[]))
            }
            MutationOperator::ReplaceRandom => {
                let pos = self.rng.gen_range(0..len);
                let before = units[pos];
                let replacement = self.different_unit(before);
                units[pos] = replacement;
                Some(entry(pos, &[before], &[replacement]))
            }
            MutationOperator::SwapAdjacent => {
                let pos = self.rng.gen_range(0..len - 1);
                let before = [units[pos], units[pos + 1]];
                units.swap(pos, pos + 1);
                Some(entry(pos, &before, &[before[1], before[0]]))
            }
            MutationOperator::DuplicateBlock => {
                let (start, size) = self.block(len);
                let block: Vec<char> = units[start..start + size].to_vec();
                units.splice(start + size..start + size, block.iter().copied());
                Some(entry(start + size, &[], &block))
            }
            MutationOperator::DeleteBlock => {
                let (start, size) = self.block(len);
                let removed: Vec<char> = units.drain(start..start + size).collect();
                Some(entry(start, &removed, &[]))
            }
            MutationOperator::ReplaceBlock => {
                let (start, size) = self.block(len);
                let replacement: Vec<char> = (0..size).map(|_| self.random_unit()).collect();
                let removed: Vec<char> = units
                    .splice(start..start + size, replacement.iter().copied())
                    .collect();
                Some(entry(start, &removed, &replacement))
            }
            MutationOperator::InsertKnownValue => {
                let value: Vec<char> = self.dictionary.known_value(&mut self.rng)?.chars().collect();
                let pos = self.rng.gen_range(0..=len);
                units.splice(pos..pos, value.iter().copied());
                Some(entry(pos, &[], &value))
            }
            MutationOperator::ReplaceKnownValue => {
                let value: Vec<char> = self.dictionary.known_value(&mut self.rng)?.chars().collect();
                let (start, size) = self.block(len);
                let removed: Vec<char> = units
                    .splice(start..start + size, value.iter().copied())
                    .collect();
                Some(entry(start, &removed, &value))
            }
        }
    }

    fn random_unit(&mut self) -> char {
        ALPHABET[self.rng.gen_range(0..ALPHABET.len())]
    }

    /// A unit from the alphabet guaranteed to differ from `current`
    fn different_unit(&mut self, current: char) -> char {
        let idx = self.rng.gen_range(0..ALPHABET.len());
        if ALPHABET[idx] != current {
            return ALPHABET[idx];
        }
        ALPHABET[(idx + 1) % ALPHABET.len()]
    }

    /// Random block of size 1..=8 inside `len` units (len >= 1)
    fn block(&mut self, len: usize) -> (usize, usize) {
        let size = self.rng.gen_range(1..=MAX_BLOCK_SIZE.min(len));
        let start = self.rng.gen_range(0..=len - size);
        (start, size)
    }
}

impl Generator for MutationGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Mutation
    }

    fn requires_parent(&self) -> bool {
        true
    }

    fn generate(&mut self, parent: Option<&TestCase>) -> Result<TestCase, GenerateError> {
        let parent = parent.ok_or(GenerateError::MissingParent(GeneratorKind::Mutation))?;
        let (content, log) = self.mutate(parent.content());

        tracing::trace!(
            "Applied {} mutations to {}",
            log.len(),
            parent.id()
        );

        let log = serde_json::to_value(&log).unwrap_or(Value::Array(Vec::new()));
        Ok(TestCase::new(GeneratorKind::Mutation, content)
            .with_parent(parent.id())
            .with_metadata("mutations", log))
    }
}
