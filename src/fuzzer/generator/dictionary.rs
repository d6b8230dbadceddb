//! Dictionary - Known values for generation and mutation
//!
//! Curated tokens that tend to exercise edge cases in language runtimes:
//! integer and float boundaries, injection strings, long repeated runs,
//! plus generic keywords and symbols used by the random generator.

use rand::Rng;
use std::collections::HashMap;

/// Known-value dictionary
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    tokens: Vec<String>,
    categories: HashMap<TokenCategory, Vec<String>>,
}

/// Category of dictionary tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    /// Integer boundary values
    IntegerBoundary,
    /// NaN, infinities, denormals and friends
    FloatSpecial,
    /// Injection and escape payloads
    Injection,
    /// Long runs of a repeated unit
    LongRun,
    /// Language keywords
    Keyword,
    /// Operators and punctuation
    Symbol,
}

impl TokenCategory {
    /// Categories that make up the "known value" set used by mutations
    pub const KNOWN_VALUES: [TokenCategory; 4] = [
        TokenCategory::IntegerBoundary,
        TokenCategory::FloatSpecial,
        TokenCategory::Injection,
        TokenCategory::LongRun,
    ];
}

impl Dictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the default dictionary
    pub fn builtin() -> Self {
        let mut dict = Self::new();

        dict.add_tokens(
            TokenCategory::IntegerBoundary,
            [
                "0",
                "-0",
                "1",
                "-1",
                "127",
                "128",
                "-129",
                "255",
                "256",
                "32767",
                "-32768",
                "65535",
                "65536",
                "2147483647",
                "-2147483648",
                "4294967295",
                "4294967296",
                "9007199254740991",
                "9007199254740992",
                "-9007199254740993",
                "9223372036854775807",
                "-9223372036854775808",
                "18446744073709551615",
                "18446744073709551616",
                "0x7fffffff",
                "0xffffffffffffffff",
                "1e308",
                "99999999999999999999999999999999",
            ],
        );

        dict.add_tokens(
            TokenCategory::FloatSpecial,
            [
                "NaN",
                "Infinity",
                "-Infinity",
                "0.0",
                "-0.0",
                "1.7976931348623157e308",
                "-1.7976931348623157e308",
                "2.2250738585072014e-308",
                "5e-324",
                "1e309",
                "0.1 + 0.2",
                "1/0",
                "0/0",
                "1.0e-400",
            ],
        );

        dict.add_tokens(
            TokenCategory::Injection,
            [
                "\"",
                "'",
                "`",
                "\\",
                "\"\"\"",
                "\\x00",
                "\u{0000}",
                "\u{FEFF}",
                "\u{202E}",
                "\u{1F4A9}",
                "%s%s%s%n",
                "${7*7}",
                "{{7*7}}",
                "$(whoami)",
                "; rm -rf /",
                "' OR '1'='1",
                "../../../etc/passwd",
                "<script>alert(1)</script>",
                "__proto__",
                "\r\n",
            ],
        );

        let runs: Vec<String> = vec![
            "A".repeat(256),
            "A".repeat(4096),
            "(".repeat(512),
            "[".repeat(512),
            "{".repeat(512),
            "-".repeat(1024),
            "9".repeat(400),
            "\\".repeat(257),
            " ".repeat(2048),
            "\n".repeat(1000),
        ];
        dict.add_tokens(TokenCategory::LongRun, runs);

        dict.add_tokens(
            TokenCategory::Keyword,
            [
                "if", "else", "while", "for", "in", "return", "break", "continue", "fn",
                "function", "let", "var", "const", "true", "false", "null", "nil", "and", "or",
                "not", "print", "import", "class", "new", "try", "catch", "throw", "match",
            ],
        );

        dict.add_tokens(
            TokenCategory::Symbol,
            [
                "+", "-", "*", "/", "%", "**", "=", "==", "!=", "<", ">", "<=", ">=", "&&", "||",
                "!", "&", "|", "^", "~", "<<", ">>", "(", ")", "[", "]", "{", "}", ",", ";", ":",
                ".", "..", "->", "=>", "?", "←", "@", "#",
            ],
        );

        dict
    }

    /// Add tokens to a category
    pub fn add_tokens<I, S>(&mut self, category: TokenCategory, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.categories.entry(category).or_default();
        for token in tokens {
            let owned = token.into();
            entry.push(owned.clone());
            self.tokens.push(owned);
        }
    }

    /// Get random token from any category
    pub fn random_token(&self, rng: &mut impl Rng) -> Option<&str> {
        if self.tokens.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.tokens.len());
        Some(&self.tokens[idx])
    }

    /// Get random token from a specific category
    pub fn random_from(&self, category: TokenCategory, rng: &mut impl Rng) -> Option<&str> {
        let tokens = self.categories.get(&category)?;
        if tokens.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..tokens.len());
        Some(&tokens[idx])
    }

    /// Get random known value (boundaries, specials, injections, runs)
    pub fn known_value(&self, rng: &mut impl Rng) -> Option<&str> {
        let category = TokenCategory::KNOWN_VALUES[rng.gen_range(0..TokenCategory::KNOWN_VALUES.len())];
        self.random_from(category, rng)
            .or_else(|| self.random_token(rng))
    }

    /// Get all tokens in a category
    pub fn tokens_in(&self, category: TokenCategory) -> Option<&[String]> {
        self.categories.get(&category).map(|v| v.as_slice())
    }

    /// Get total token count
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn builtin_dictionary() {
        let dict = Dictionary::builtin();
        assert!(!dict.is_empty());
        assert!(dict.len() > 100);
    }

    #[test]
    fn category_access() {
        let dict = Dictionary::builtin();

        let ints = dict.tokens_in(TokenCategory::IntegerBoundary).unwrap();
        assert!(ints.contains(&"2147483647".to_string()));

        let runs = dict.tokens_in(TokenCategory::LongRun).unwrap();
        assert!(runs.iter().all(|r| r.chars().count() >= 256));
    }

    #[test]
    fn known_values_come_from_known_categories() {
        let dict = Dictionary::builtin();
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..50 {
            let value = dict.known_value(&mut rng).unwrap();
            let known = TokenCategory::KNOWN_VALUES.iter().any(|c| {
                dict.tokens_in(*c)
                    .is_some_and(|tokens| tokens.iter().any(|t| t == value))
            });
            assert!(known, "unexpected known value {:?}", value);
        }
    }

    #[test]
    fn empty_dictionary_yields_nothing() {
        let dict = Dictionary::new();
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(dict.random_token(&mut rng).is_none());
        assert!(dict.known_value(&mut rng).is_none());
    }
}
