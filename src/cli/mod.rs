//! CLI module for evalloop - command-line interface and report rendering.

pub mod commands;
pub mod report;

pub use commands::Cli;
