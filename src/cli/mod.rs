//! CLI module for process spawning, lifecycle events and the single-flight runner.

mod events;
mod process;
mod runner;

pub use events::*;
pub use process::*;
pub use runner::*;
