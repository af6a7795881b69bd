//! CLI module
//!
//! Command-line interface for running one bulk stream.
//!
//! # Commands
//!
//! - `read` - Run the bulk export and print its records
//! - `validate` - Parse the definition and build its components

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
