//! Output mode detection and a mode-aware printer
//!
//! Interactive terminals get colors, unicode and progress bars; CI and piped
//! output get plain ASCII text.

use colored::Colorize;
use std::io::{self, IsTerminal};

/// Output mode for the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Interactive terminal with colors and unicode
    Interactive,
    /// CI environment - plain text, no colors
    CI,
    /// Piped output - plain text, no colors
    Plain,
}

impl OutputMode {
    /// Detect the appropriate output mode based on environment
    pub fn detect() -> Self {
        Self::from_env(is_ci::cached(), io::stdout().is_terminal())
    }

    fn from_env(ci: bool, terminal: bool) -> Self {
        if ci {
            OutputMode::CI
        } else if terminal {
            OutputMode::Interactive
        } else {
            OutputMode::Plain
        }
    }

    pub fn colors_enabled(&self) -> bool {
        matches!(self, OutputMode::Interactive)
    }

    pub fn unicode_enabled(&self) -> bool {
        matches!(self, OutputMode::Interactive)
    }

    pub fn progress_enabled(&self) -> bool {
        matches!(self, OutputMode::Interactive)
    }

    /// Turn off `colored` globally when this mode has no colors
    pub fn apply_color_override(&self) {
        if !self.colors_enabled() {
            colored::control::set_override(false);
        }
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::detect()
    }
}

/// Centralized printer that respects output mode
#[derive(Debug, Clone)]
pub struct Printer {
    mode: OutputMode,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer {
    /// Create a new printer with auto-detected mode
    pub fn new() -> Self {
        Self::with_mode(OutputMode::detect())
    }

    pub fn with_mode(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn newline(&self) {
        println!();
    }

    pub fn header(&self, text: &str) {
        if self.mode.colors_enabled() {
            println!("{}", text.cyan().bold());
        } else {
            println!("{}", text);
        }
    }

    pub fn success(&self, message: &str) {
        let symbol = self.symbol("✓", "[OK]");
        if self.mode.colors_enabled() {
            println!("{} {}", symbol.green(), message.green());
        } else {
            println!("{} {}", symbol, message);
        }
    }

    pub fn warning(&self, message: &str) {
        let symbol = self.symbol("⚠", "[WARN]");
        if self.mode.colors_enabled() {
            println!("{} {}", symbol.yellow(), message.yellow());
        } else {
            println!("{} {}", symbol, message);
        }
    }

    /// Errors go to stderr
    pub fn error(&self, message: &str) {
        let symbol = self.symbol("✗", "[ERROR]");
        if self.mode.colors_enabled() {
            eprintln!("{} {}", symbol.red(), message.red());
        } else {
            eprintln!("{} {}", symbol, message);
        }
    }

    /// Print an indented key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.mode.colors_enabled() {
            println!("  {}: {}", key.cyan(), value);
        } else {
            println!("  {}: {}", key, value);
        }
    }

    fn symbol(&self, unicode: &'static str, ascii: &'static str) -> &'static str {
        if self.mode.unicode_enabled() {
            unicode
        } else {
            ascii
        }
    }
}
