//! Host workspace seam: roots, interpreter selection, setup actions.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::WorkspaceConfig;
use crate::display;

/// What discovery needs to know about the host environment.
#[async_trait]
pub trait WorkspaceHost: Send + Sync {
    /// Whether any workspace roots are open. Warnings are only shown if so.
    fn has_roots(&self) -> bool;

    /// Whether the CLI should be run through an interpreter environment.
    async fn is_interpreter_used(&self) -> bool;

    /// Whether interpreter tooling is installed, so "select interpreter"
    /// can be offered as a choice.
    fn has_interpreter_tooling(&self) -> bool;

    /// Path of the currently active interpreter.
    async fn active_interpreter(&self) -> Option<PathBuf>;

    /// Let the user pick a different interpreter.
    async fn select_interpreter(&self);

    /// Start the workspace setup flow.
    async fn setup_workspace(&self);
}

/// Host backed by static configuration, used by the binary.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredHost {
    config: WorkspaceConfig,
}

impl ConfiguredHost {
    #[must_use]
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkspaceHost for ConfiguredHost {
    fn has_roots(&self) -> bool {
        !self.config.roots.is_empty()
    }

    async fn is_interpreter_used(&self) -> bool {
        self.config.use_interpreter
    }

    fn has_interpreter_tooling(&self) -> bool {
        self.config.interpreter_tooling
    }

    async fn active_interpreter(&self) -> Option<PathBuf> {
        self.config.interpreter.clone()
    }

    async fn select_interpreter(&self) {
        display::print_hint("Set `workspace.interpreter` in .cli-broker.toml to choose an interpreter.");
    }

    async fn setup_workspace(&self) {
        display::print_hint(
            "Install the CLI globally or into the configured interpreter, then run `cli-broker check` again.",
        );
    }
}
