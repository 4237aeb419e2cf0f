//! Command-line interface for kcovscope
//!
//! This module contains CLI argument parsing

pub mod args;

pub use args::{Args, Command, ReportArgs};
