//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod clean;
pub mod config;
pub mod extract;
pub mod materialize;
pub mod status;
