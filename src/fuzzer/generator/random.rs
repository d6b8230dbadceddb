//! Random Generator - Programs from scratch
//!
//! Draws a target length, then one of five sub-strategies. Output never has a
//! parent.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use super::dictionary::{Dictionary, TokenCategory};
use super::{GenerateError, Generator};
use crate::fuzzer::input::{GeneratorKind, TestCase};

/// Extended alphabet: letters, digits, whitespace and punctuation
pub(crate) const ALPHABET: &[char] = &[
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B', 'C', 'X', 'Y', 'Z', '0', '1', '2', '3', '4', '5',
    '6', '7', '8', '9', ' ', ' ', '\t', '\n', '\r', '!', '"', '#', '$', '%', '&', '\'', '(', ')',
    '*', '+', ',', '-', '.', '/', ':', ';', '<', '=', '>', '?', '@', '[', '\\', ']', '^', '_', '`',
    '{', '|', '}', '~', '←', 'λ', 'é',
];

/// Program skeletons; every `{}` hole is filled with a value or identifier
const TEMPLATES: &[&str] = &[
    "x ← {}\nprint(x)",
    "x = {}\ny = {}\nprint(x / y)",
    "print({} + {})",
    "print({} * {})",
    "a = [{}, {}, {}]\nprint(a[{}])",
    "s = \"{}\"\nprint(s)",
    "fn f(n) {\n  return f(n - {})\n}\nprint(f({}))",
    "if ({} > {}) {\n  print({})\n} else {\n  print({})\n}",
    "i = {}\nwhile (i < {}) {\n  i = i + 1\n}\nprint(i)",
    "m = {\"k\": {}}\nprint(m[\"{}\"])",
    "assert({} == {})",
    "print(int({}))",
    "print(float({}))",
    "print(len({}))",
];

/// Sub-strategy of the random generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RandomStrategy {
    PureRandom,
    StructuredStatements,
    Template,
    KeywordHeavy,
    SymbolHeavy,
}

impl RandomStrategy {
    pub const ALL: [RandomStrategy; 5] = [
        RandomStrategy::PureRandom,
        RandomStrategy::StructuredStatements,
        RandomStrategy::Template,
        RandomStrategy::KeywordHeavy,
        RandomStrategy::SymbolHeavy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PureRandom => "pure_random",
            Self::StructuredStatements => "structured_statements",
            Self::Template => "template",
            Self::KeywordHeavy => "keyword_heavy",
            Self::SymbolHeavy => "symbol_heavy",
        }
    }
}

/// Generates programs without a parent
pub struct RandomGenerator {
    min_length: usize,
    max_length: usize,
    strategies: Vec<RandomStrategy>,
    dictionary: Dictionary,
    rng: SmallRng,
}

impl RandomGenerator {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length: min_length.min(max_length),
            max_length,
            strategies: RandomStrategy::ALL.to_vec(),
            dictionary: Dictionary::builtin(),
            rng: SmallRng::from_entropy(),
        }
    }

    /// Restrict the sub-strategies drawn from
    pub fn with_strategies(mut self, strategies: Vec<RandomStrategy>) -> Self {
        if !strategies.is_empty() {
            self.strategies = strategies;
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

    /// Generate content for one sub-strategy
    pub fn generate_with(&mut self, strategy: RandomStrategy, length: usize) -> String {
        match strategy {
            RandomStrategy::PureRandom => self.pure_random(length),
            RandomStrategy::StructuredStatements => self.structured(length),
            RandomStrategy::Template => self.template(),
            RandomStrategy::KeywordHeavy => self.token_soup(TokenCategory::Keyword, length),
            RandomStrategy::SymbolHeavy => self.token_soup(TokenCategory::Symbol, length),
        }
    }

    fn random_char(&mut self) -> char {
        ALPHABET[self.rng.gen_range(0..ALPHABET.len())]
    }

    fn identifier(&mut self) -> String {
        let names = ["x", "y", "z", "n", "s", "acc", "tmp", "value", "_"];
        let name = names[self.rng.gen_range(0..names.len())];
        if self.rng.gen_bool(0.3) {
            format!("{}{}", name, self.rng.gen_range(0..10))
        } else {
            name.to_string()
        }
    }

    fn value(&mut self) -> String {
        match self.rng.gen_range(0..4) {
            0 => self.rng.gen_range(-1000i64..1000).to_string(),
            1 => format!("{:.3}", self.rng.gen_range(-1000.0f64..1000.0)),
            2 => self.identifier(),
            _ => self
                .dictionary
                .known_value(&mut self.rng)
                .map(str::to_string)
                .unwrap_or_else(|| "0".to_string()),
        }
    }

    fn pure_random(&mut self, length: usize) -> String {
        let mut out = String::new();
        while out.chars().count() < length {
            if self.rng.gen_bool(0.05) {
                if let Some(token) = self.dictionary.known_value(&mut self.rng) {
                    out.push_str(token);
                    continue;
                }
            }
            out.push(self.random_char());
        }
        truncate_chars(out, length)
    }

    fn structured(&mut self, length: usize) -> String {
        let ops = ["+", "-", "*", "/", "%", "==", "<", "&&"];
        let mut out = String::new();

        while out.chars().count() < length {
            let statement = match self.rng.gen_range(0..5) {
                0 => format!("{} = {}", self.identifier(), self.value()),
                1 => {
                    let op = ops[self.rng.gen_range(0..ops.len())];
                    format!("print({} {} {})", self.value(), op, self.value())
                }
                2 => format!(
                    "if ({} {} {}) {{ print({}) }}",
                    self.identifier(),
                    ops[self.rng.gen_range(0..ops.len())],
                    self.value(),
                    self.value()
                ),
                3 => format!(
                    "while ({} < {}) {{ {} = {} + 1 }}",
                    self.identifier(),
                    self.value(),
                    self.identifier(),
                    self.identifier()
                ),
                _ => format!("{}({})", self.identifier(), self.value()),
            };
            out.push_str(&statement);
            out.push('\n');
        }
        truncate_chars(out, length)
    }

    fn template(&mut self) -> String {
        let template = TEMPLATES[self.rng.gen_range(0..TEMPLATES.len())];
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(idx) = rest.find("{}") {
            out.push_str(&rest[..idx]);
            let filler = self.value();
            out.push_str(&filler);
            rest = &rest[idx + 2..];
        }
        out.push_str(rest);
        out
    }

    fn token_soup(&mut self, category: TokenCategory, length: usize) -> String {
        let mut out = String::new();
        while out.chars().count() < length {
            let piece = if self.rng.gen_bool(0.7) {
                self.dictionary
                    .random_from(category, &mut self.rng)
                    .map(str::to_string)
                    .unwrap_or_else(|| self.random_char().to_string())
            } else {
                self.value()
            };
            out.push_str(&piece);
            out.push(if self.rng.gen_bool(0.1) { '\n' } else { ' ' });
        }
        truncate_chars(out, length)
    }
}

fn truncate_chars(mut s: String, max_chars: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
    s
}

impl Generator for RandomGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Random
    }

    fn generate(&mut self, _parent: Option<&TestCase>) -> Result<TestCase, GenerateError> {
        let length = self.rng.gen_range(self.min_length..=self.max_length);
        let strategy = self.strategies[self.rng.gen_range(0..self.strategies.len())];
        let content = self.generate_with(strategy, length);

        let kind = match strategy {
            RandomStrategy::Template => GeneratorKind::Template,
            _ => GeneratorKind::Random,
        };

        tracing::trace!("Generated {} input ({} chars)", strategy.as_str(), content.len());

        Ok(TestCase::new(kind, content)
            .with_metadata("strategy", Value::from(strategy.as_str()))
            .with_metadata("length", Value::from(length)))
    }
}
