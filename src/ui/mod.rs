//! Terminal output for the langfuzz CLI
//!
//! [`OutputMode`] decides between interactive, CI and plain output;
//! [`RunProgress`] draws a progress bar only when the mode allows it.

pub mod output;
pub mod progress;

pub use output::{OutputMode, Printer};
pub use progress::{ProgressStyle, RunProgress};
