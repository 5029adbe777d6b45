//! Decides whether the CLI can be run for a working directory.
//!
//! The resolver probes the CLI through an ordered list of strategies
//! (interpreter-scoped first when an interpreter is in use, then global),
//! classifies what it finds, and warns the user about anything that blocks
//! or degrades CLI use. It never returns an error: every failure is folded
//! into the returned [`CanRunCli`] plus a warning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::host::{Notifier, Response, SettingsStore, WorkspaceHost};

use super::warning::{self, Warning, WarningKind};
use super::{CompatibilityClass, ProbeMode, ProbeOutcome, VersionProbe, VersionRange};

/// Whether the CLI may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanRunCli {
    pub is_available: bool,
    /// `None` when no CLI was found, so compatibility could not be judged.
    pub is_compatible: Option<bool>,
}

impl From<CompatibilityClass> for CanRunCli {
    fn from(class: CompatibilityClass) -> Self {
        Self {
            is_available: class.is_available(),
            is_compatible: class.is_compatible(),
        }
    }
}

/// One way of reaching the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// Through the active interpreter; `None` when no interpreter path is known.
    Interpreter(Option<PathBuf>),
    Global,
}

/// Verdict plus the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub verdict: CanRunCli,
    pub strategy: ProbeStrategy,
}

impl Resolution {
    /// Interpreter the CLI should be run through, `None` for the global binary.
    #[must_use]
    pub fn interpreter(&self) -> Option<PathBuf> {
        match &self.strategy {
            ProbeStrategy::Interpreter(path) => path.clone(),
            ProbeStrategy::Global => None,
        }
    }
}

/// Result of probing with a single strategy.
#[derive(Debug, Clone)]
struct Attempt {
    class: CompatibilityClass,
    reported: Option<String>,
}

/// Orchestrates probing, classification and warnings.
pub struct Resolver {
    probe: Arc<dyn VersionProbe>,
    range: VersionRange,
    host: Arc<dyn WorkspaceHost>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsStore>,
}

impl Resolver {
    #[must_use]
    pub fn new(
        probe: Arc<dyn VersionProbe>,
        range: VersionRange,
        host: Arc<dyn WorkspaceHost>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            probe,
            range,
            host,
            notifier,
            settings,
        }
    }

    /// The configured version range.
    #[must_use]
    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    /// Strategies to try, in order.
    pub async fn strategies(&self) -> Vec<ProbeStrategy> {
        if !self.host.is_interpreter_used().await {
            return vec![ProbeStrategy::Global];
        }

        let interpreter = match self.settings.interpreter_bin_path() {
            Some(path) => Some(path),
            None => self.host.active_interpreter().await,
        };
        vec![ProbeStrategy::Interpreter(interpreter), ProbeStrategy::Global]
    }

    /// Decide whether the CLI can be run in `cwd`, warning the user as needed.
    pub async fn resolve(&self, cwd: &Path) -> CanRunCli {
        self.resolve_with_strategy(cwd).await.verdict
    }

    /// Like [`resolve`](Self::resolve), also reporting which strategy decided.
    ///
    /// The first strategy is authoritative unless it finds nothing at all; only
    /// then are the remaining strategies tried, one after another, stopping at
    /// the first compatible result.
    pub async fn resolve_with_strategy(&self, cwd: &Path) -> Resolution {
        let strategies = self.strategies().await;
        let Some((primary, fallbacks)) = strategies.split_first() else {
            return Resolution {
                verdict: CanRunCli::from(CompatibilityClass::NotFound),
                strategy: ProbeStrategy::Global,
            };
        };

        let attempt = self.attempt(cwd, primary).await;
        if attempt.class != CompatibilityClass::NotFound || fallbacks.is_empty() {
            tracing::info!(cwd = %cwd.display(), strategy = ?primary, class = ?attempt.class, "CLI resolved");
            self.warn_direct(&attempt).await;
            return Resolution {
                verdict: CanRunCli::from(attempt.class),
                strategy: primary.clone(),
            };
        }

        let interpreter = match primary {
            ProbeStrategy::Interpreter(path) => path.clone(),
            ProbeStrategy::Global => None,
        };

        let mut last = attempt;
        let mut decided = primary;
        for (index, strategy) in fallbacks.iter().enumerate() {
            tracing::debug!(strategy = ?strategy, "Falling back to next probe strategy");
            last = self.attempt(cwd, strategy).await;
            decided = strategy;
            let is_last = index + 1 == fallbacks.len();
            if last.class.is_available() || is_last {
                tracing::info!(cwd = %cwd.display(), strategy = ?strategy, class = ?last.class, "CLI resolved by fallback");
                break;
            }
        }

        self.warn_fallback(&last, interpreter.as_deref()).await;
        if last.class.is_available() {
            if let Err(e) = self.settings.clear_interpreter_bin_path() {
                tracing::error!(error = %e, "Failed to clear interpreter override");
            }
        }
        Resolution {
            verdict: CanRunCli::from(last.class),
            strategy: decided.clone(),
        }
    }

    /// Interpreter the first strategy would use, without probing or warning.
    pub async fn preferred_interpreter(&self) -> Option<PathBuf> {
        let strategies = self.strategies().await;
        match strategies.into_iter().next() {
            Some(ProbeStrategy::Interpreter(path)) => path,
            Some(ProbeStrategy::Global) | None => None,
        }
    }

    async fn attempt(&self, cwd: &Path, strategy: &ProbeStrategy) -> Attempt {
        let outcome = match strategy {
            ProbeStrategy::Interpreter(Some(path)) => {
                self.probe
                    .probe(cwd, &ProbeMode::Interpreter(path.clone()))
                    .await
            }
            ProbeStrategy::Interpreter(None) => {
                tracing::debug!("No interpreter path available, skipping interpreter probe");
                ProbeOutcome::Failed
            }
            ProbeStrategy::Global => self.probe.probe(cwd, &ProbeMode::Global).await,
        };

        Attempt {
            class: self.range.classify_outcome(&outcome),
            reported: outcome.reported().map(str::to_string),
        }
    }

    async fn warn_direct(&self, attempt: &Attempt) {
        if !self.host.has_roots() {
            return;
        }
        let warning = warning::warning_for(
            attempt.class,
            attempt.reported.as_deref(),
            &self.range,
            self.host.has_interpreter_tooling(),
        );
        if let Some(warning) = warning {
            self.present(warning).await;
        }
    }

    async fn warn_fallback(&self, attempt: &Attempt, interpreter: Option<&Path>) {
        if !self.host.has_roots() {
            return;
        }
        if attempt.class.is_compatible() != Some(true) {
            self.present(warning::inaccessible_anywhere(
                interpreter,
                attempt.reported.as_deref(),
            ))
            .await;
        }
        if attempt.class == CompatibilityClass::CompatibleAheadOfTested {
            self.present(warning::ahead_of_tested(&self.range)).await;
        }
    }

    async fn present(&self, warning: Warning) {
        match warning.kind {
            WarningKind::Advisory => self.notifier.warn(&warning.message),
            WarningKind::Dismissible => {
                if self.settings.do_not_show_cli_unavailable() {
                    tracing::debug!("CLI unavailable warning muted");
                    return;
                }
                let response = self
                    .notifier
                    .prompt(&warning.message, &warning.choices)
                    .await;
                self.handle_response(response).await;
            }
        }
    }

    async fn handle_response(&self, response: Option<Response>) {
        tracing::debug!(response = ?response, "Warning response");
        match response {
            Some(Response::SelectInterpreter) => self.host.select_interpreter().await,
            Some(Response::SetupWorkspace) => self.host.setup_workspace().await,
            Some(Response::Never) => {
                if let Err(e) = self.settings.set_do_not_show_cli_unavailable(true) {
                    tracing::error!(error = %e, "Failed to mute CLI unavailable warning");
                }
            }
            Some(Response::Yes | Response::No) | None => {}
        }
    }
}
