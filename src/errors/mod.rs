//! Setup errors with miette diagnostics
//!
//! Everything here is fatal and raised before any work is dispatched.
//! Target failures never surface as errors; they flow through the analyzers.

pub mod suggestions;

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration and setup failures
#[derive(Error, Debug, Diagnostic)]
pub enum LangFuzzError {
    /// Target executable could not be located
    #[error("Target executable not found: {target}")]
    #[diagnostic(code(langfuzz::target::not_found), help("{suggestion}"))]
    TargetNotFound { target: String, suggestion: String },

    /// Target exists but is not a regular file
    #[error("Target is not a file: {}", path.display())]
    #[diagnostic(
        code(langfuzz::target::not_a_file),
        help("Pass the runtime executable itself, not a directory")
    )]
    TargetNotAFile { path: PathBuf },

    /// Seed corpus directory missing
    #[error("Seed corpus directory not found: {}", path.display())]
    #[diagnostic(
        code(langfuzz::seeds::missing),
        help("Create the directory with one program per file, or omit --seeds to use the built-in seeds")
    )]
    SeedDirMissing { path: PathBuf },

    /// Seed corpus could not be read
    #[error("Failed to read seed corpus {}: {message}", path.display())]
    #[diagnostic(code(langfuzz::seeds::unreadable))]
    SeedDirUnreadable { path: PathBuf, message: String },

    /// Output directory could not be created or written
    #[error("Output directory is not writable: {}", path.display())]
    #[diagnostic(
        code(langfuzz::output::unwritable),
        help("Check permissions on the output directory or pick another with --output\n\n{message}")
    )]
    OutputDirUnwritable { path: PathBuf, message: String },

    /// Unknown include/exclude component
    #[error("Unknown component: '{name}'")]
    #[diagnostic(code(langfuzz::component::unknown), help("{suggestion}"))]
    UnknownComponent { name: String, suggestion: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(langfuzz::config::invalid))]
    InvalidConfig { message: String },
}

impl LangFuzzError {
    pub fn target_not_found(target: impl Into<String>) -> Self {
        let target = target.into();
        let suggestion = suggestions::suggest_target(&target);
        Self::TargetNotFound { target, suggestion }
    }

    pub fn unknown_component(name: impl Into<String>, known: &[&str]) -> Self {
        let name = name.into();
        let suggestion = suggestions::suggest_component(&name, known);
        Self::UnknownComponent { name, suggestion }
    }

    pub fn output_unwritable(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::OutputDirUnwritable {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Add a contextual hint to an error for plain-text display
pub fn format_error(err: &anyhow::Error) -> String {
    let err_string = err.to_string();
    let err_lower = err_string.to_lowercase();

    if err_lower.contains("permission denied") {
        format!("{}\n\nHint: check that the target is executable (chmod +x)", err)
    } else if err_lower.contains("timed out") || err_lower.contains("timeout") {
        format!("{}\n\nHint: try increasing the per-test timeout with --timeout", err)
    } else if err_lower.contains("not found") {
        format!("{}\n\nHint: pass an absolute path to the target runtime", err)
    } else {
        err_string
    }
}
