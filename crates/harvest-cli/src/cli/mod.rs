//! Command-line interface for harvest.

mod commands;
pub mod progress;

pub use commands::{is_verbose, run};
