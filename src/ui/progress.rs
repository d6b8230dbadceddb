//! Progress indicators for fuzzing and load runs
//!
//! Bars are only drawn in interactive mode; in CI or piped output every call
//! is a no-op.

use super::OutputMode;
use indicatif::{ProgressBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Style presets for progress indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStyle {
    /// Time-budgeted fuzzing run
    Fuzz,
    /// Load test with a fixed duration
    Load,
}

impl ProgressStyle {
    /// Get the indicatif template for this style
    fn template(&self, unicode: bool) -> &'static str {
        match (self, unicode) {
            (ProgressStyle::Fuzz, true) => {
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s ({msg})"
            }
            (ProgressStyle::Fuzz, false) => "[{elapsed_precise}] [{bar:40}] {pos}/{len}s ({msg})",
            (ProgressStyle::Load, true) => {
                "{spinner:.yellow} [{elapsed_precise}] {bar:40.yellow/dim} {pos}/{len}s {msg}"
            }
            (ProgressStyle::Load, false) => "[{elapsed_precise}] [{bar:40}] {pos}/{len}s {msg}",
        }
    }

    fn tick_chars(&self, unicode: bool) -> &'static str {
        if unicode {
            "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"
        } else {
            "-\\|/"
        }
    }
}

/// Progress bar measured in elapsed seconds of a budget
pub struct RunProgress {
    bar: Option<ProgressBar>,
}

impl RunProgress {
    /// Start a bar for a run lasting `budget`, if the mode allows it
    pub fn start(mode: OutputMode, style: ProgressStyle, budget: Duration) -> Self {
        if !mode.progress_enabled() {
            return Self { bar: None };
        }

        let unicode = mode.unicode_enabled();
        let bar = ProgressBar::new(budget.as_secs().max(1));
        let indicatif_style = IndicatifStyle::default_bar()
            .template(style.template(unicode))
            .unwrap_or_else(|_| IndicatifStyle::default_bar())
            .tick_chars(style.tick_chars(unicode))
            .progress_chars(if unicode { "━━─" } else { "#>-" });
        bar.set_style(indicatif_style);
        bar.set_message("starting...");
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar: Some(bar) }
    }

    /// A progress indicator that never draws
    pub fn hidden() -> Self {
        Self { bar: None }
    }

    /// Move the bar to `elapsed`, capped at its length
    pub fn set_elapsed(&self, elapsed: Duration) {
        if let Some(bar) = &self.bar {
            let len = bar.length().unwrap_or(u64::MAX);
            bar.set_position(elapsed.as_secs().min(len));
        }
    }

    pub fn set_message(&self, msg: String) {
        if let Some(bar) = &self.bar {
            bar.set_message(msg);
        }
    }

    pub fn finish_with_message(&self, msg: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(msg.to_string());
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }
}

impl Drop for RunProgress {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
    }
}
