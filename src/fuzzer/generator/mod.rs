//! Generators - Strategies that produce new test cases
//!
//! A [`Generator`] either builds a program from scratch or derives one from a
//! parent. The [`GeneratorSuite`] holds the strategies a suite profile
//! enables and picks one per iteration by weight.

pub mod dictionary;
pub mod mutation;
pub mod random;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::mutation::MutationGenerator;
use self::random::RandomGenerator;
use super::input::{GeneratorKind, TestCase};

pub use self::dictionary::{Dictionary, TokenCategory};
pub use self::mutation::{MutationLogEntry, MutationOperator};
pub use self::random::RandomStrategy;

/// Errors raised while generating a test case
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("{0} generator requires a parent test case")]
    MissingParent(GeneratorKind),

    #[error("invalid range for {what}: min {min} is greater than max {max}")]
    InvalidRange {
        what: &'static str,
        min: usize,
        max: usize,
    },
}

/// A source of new test cases
pub trait Generator: Send {
    /// Kind recorded on produced test cases
    fn kind(&self) -> GeneratorKind;

    /// Whether `generate` needs a parent
    fn requires_parent(&self) -> bool {
        false
    }

    /// Produce one test case
    fn generate(&mut self, parent: Option<&TestCase>) -> Result<TestCase, GenerateError>;
}

/// Generation strategies a suite can enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Random programs from any sub-strategy
    Random,
    /// Mutations of corpus entries
    Mutation,
    /// Filled-in program templates only
    Template,
}

impl Strategy {
    /// Weight for random selection (higher = more likely)
    pub fn weight(&self) -> u32 {
        match self {
            Self::Mutation => 5,
            Self::Random => 3,
            Self::Template => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Mutation => "mutation",
            Self::Template => "template",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounds shared by the generators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub min_length: usize,
    pub max_length: usize,
    pub min_mutations: usize,
    pub max_mutations: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 256,
            min_mutations: 1,
            max_mutations: 5,
        }
    }
}

impl GeneratorSettings {
    pub fn validate(&self) -> Result<(), GenerateError> {
        if self.min_length > self.max_length {
            return Err(GenerateError::InvalidRange {
                what: "length",
                min: self.min_length,
                max: self.max_length,
            });
        }
        if self.min_mutations > self.max_mutations {
            return Err(GenerateError::InvalidRange {
                what: "mutation count",
                min: self.min_mutations,
                max: self.max_mutations,
            });
        }
        Ok(())
    }
}

/// The enabled strategies with their generators
pub struct GeneratorSuite {
    entries: Vec<(Strategy, Box<dyn Generator>)>,
    total_weight: u32,
    rng: SmallRng,
}

impl GeneratorSuite {
    /// Build a suite for the given strategies.
    ///
    /// With `seed` set, every generator gets a derived seed so the whole
    /// sequence of test cases is reproducible.
    pub fn new(
        strategies: &[Strategy],
        settings: GeneratorSettings,
        seed: Option<u64>,
    ) -> Result<Self, GenerateError> {
        settings.validate()?;

        let mut entries: Vec<(Strategy, Box<dyn Generator>)> = Vec::new();
        for (i, strategy) in strategies.iter().enumerate() {
            if entries.iter().any(|(s, _)| s == strategy) {
                continue;
            }
            let derived = seed.map(|s| s.wrapping_add(i as u64 + 1));
            let generator: Box<dyn Generator> = match strategy {
                Strategy::Random => Box::new(
                    RandomGenerator::new(settings.min_length, settings.max_length)
                        .seeded(derived),
                ),
                Strategy::Template => Box::new(
                    RandomGenerator::new(settings.min_length, settings.max_length)
                        .with_strategies(vec![RandomStrategy::Template])
                        .seeded(derived),
                ),
                Strategy::Mutation => Box::new(
                    MutationGenerator::new(settings.min_mutations, settings.max_mutations)
                        .seeded(derived),
                ),
            };
            entries.push((*strategy, generator));
        }

        let total_weight = entries.iter().map(|(s, _)| s.weight()).sum();
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        Ok(Self {
            entries,
            total_weight,
            rng,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn strategies(&self) -> Vec<Strategy> {
        self.entries.iter().map(|(s, _)| *s).collect()
    }

    /// Pick the next strategy by weight
    pub fn select(&mut self) -> Option<Strategy> {
        if self.entries.is_empty() {
            return None;
        }

        let mut target = self.rng.gen_range(0..self.total_weight.max(1));
        for (strategy, _) in &self.entries {
            let weight = strategy.weight();
            if target < weight {
                return Some(*strategy);
            }
            target -= weight;
        }

        Some(self.entries[0].0)
    }

    /// Whether the strategy needs a parent from the corpus
    pub fn requires_parent(&self, strategy: Strategy) -> bool {
        self.entries
            .iter()
            .find(|(s, _)| *s == strategy)
            .is_some_and(|(_, g)| g.requires_parent())
    }

    /// Generate with a specific strategy
    pub fn generate(
        &mut self,
        strategy: Strategy,
        parent: Option<&TestCase>,
    ) -> Option<Result<TestCase, GenerateError>> {
        let (_, generator) = self.entries.iter_mut().find(|(s, _)| *s == strategy)?;
        Some(generator.generate(parent))
    }
}
