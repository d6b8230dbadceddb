//! langfuzz - Coverage-guided fuzzing and load testing for language runtimes
//!
//! Drives an external runtime (any executable that takes a source file and
//! reports through its exit status, stdout and stderr) with generated
//! programs, and triages what comes back.
//!
//! # Modules
//!
//! - `fuzzer` - Generators, execution harness, analyzers, corpus and session
//! - `load` - Load patterns and the breaking-point controller
//! - `reporter` - Run summaries and load artifacts
//! - `errors` - Setup errors with diagnostics
//! - `ui` - Output mode detection and progress bars
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use langfuzz::fuzzer::{FuzzConfig, FuzzSession, ProcessHarness, SuiteProfile};
//!
//! let harness = ProcessHarness::new("/usr/local/bin/mylang");
//! let config = FuzzConfig::with_suite(SuiteProfile::Quick).with_seed(42);
//! let mut session = FuzzSession::new("mylang", config, Arc::new(harness))?;
//!
//! let results = session.run().await?;
//! println!("{} unique crashes", results.unique_crashes);
//! ```

pub mod errors;
pub mod fuzzer;
pub mod load;
pub mod reporter;
pub mod ui;

// Re-export commonly used types
pub use errors::LangFuzzError;
pub use fuzzer::{FuzzConfig, FuzzResults, FuzzSession, ProcessHarness, SuiteProfile};
pub use load::{LoadGenerator, LoadPattern, LoadTestConfig, LoadTestController, LoadTestResult};
