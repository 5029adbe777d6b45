//! Collaborator interfaces the broker depends on, with default implementations.

mod notifier;
mod settings;
mod telemetry;
mod workspace;

pub use notifier::*;
pub use settings::*;
pub use telemetry::*;
pub use workspace::*;
