//! CLI Broker - compatibility resolution and single-flight execution for an external CLI.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod display;
pub mod host;
