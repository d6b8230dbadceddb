//! Command implementations

pub mod load;
pub mod run;
