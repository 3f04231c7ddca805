//! Nearby CLI Library
//!
//! Argument parsing, configuration loading and the simulated demo behind the
//! `nearby` binary.

pub mod cli;
pub mod config;
pub mod demo;
pub mod error;

pub use cli::{Cli, Commands};
pub use error::{CliError, Result};
