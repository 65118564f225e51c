//! Command-line interface for dedup-forge.
//!
//! Provides the `dedup` command and cache inspection.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
