//! Best-effort stack trace extraction from target stderr

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One frame of an extracted stack trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            function: function.into(),
            file: file.into(),
            line,
            column,
        }
    }

    /// Stable key used when hashing signatures
    pub fn key(&self) -> String {
        format!("{}@{}:{}:{}", self.function, self.file, self.line, self.column)
    }
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{}:{})", self.function, self.file, self.line, self.column)
    }
}

/// Extracts frames shaped like `function (file:line:col)`
pub struct StackExtractor {
    frame: Option<Regex>,
}

impl Default for StackExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl StackExtractor {
    pub fn new() -> Self {
        Self {
            frame: Regex::new(
                r"^\s*(?:at\s+)?([A-Za-z_$<][\w$.<>:\[\]]*)\s*\(([^()\s]+):(\d+):(\d+)\)\s*$",
            )
            .ok(),
        }
    }

    /// Extract frames in order of appearance
    pub fn extract(&self, stderr: &str) -> Vec<StackFrame> {
        let Some(frame) = &self.frame else {
            return Vec::new();
        };

        stderr
            .lines()
            .filter_map(|line| {
                let caps = frame.captures(line)?;
                Some(StackFrame {
                    function: caps.get(1)?.as_str().to_string(),
                    file: caps.get(2)?.as_str().to_string(),
                    line: caps.get(3)?.as_str().parse().ok()?,
                    column: caps.get(4)?.as_str().parse().ok()?,
                })
            })
            .collect()
    }
}
