//! Version probing: ask the CLI which version it is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::cli::{CliProcess, CliProcessBuilder};
use crate::config::CliConfig;

use super::ProbeOutcome;

/// How the CLI is reached during a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMode {
    /// Through an interpreter environment (`<interpreter> -m <module>`).
    Interpreter(PathBuf),
    /// Through the globally installed binary.
    Global,
}

/// Obtains the version string reported by the CLI.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    /// Run the CLI's version command in `cwd`.
    ///
    /// Never errors: a CLI that cannot be executed yields [`ProbeOutcome::Failed`].
    async fn probe(&self, cwd: &Path, mode: &ProbeMode) -> ProbeOutcome;
}

/// Probe that spawns the CLI's version command.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    binary: String,
    module: String,
    version_args: Vec<String>,
    timeout: Duration,
}

impl CommandProbe {
    #[must_use]
    pub fn new(config: &CliConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            module: config.module.clone(),
            version_args: config.version_args.clone(),
            timeout: config.probe_timeout(),
        }
    }

    fn builder(&self, cwd: &Path, mode: &ProbeMode) -> CliProcessBuilder {
        let interpreter = match mode {
            ProbeMode::Interpreter(path) => Some(path.clone()),
            ProbeMode::Global => None,
        };
        CliProcessBuilder::new(&self.binary)
            .interpreter(interpreter)
            .module(&self.module)
            .args(&self.version_args)
            .working_dir(cwd)
    }
}

#[async_trait]
impl VersionProbe for CommandProbe {
    async fn probe(&self, cwd: &Path, mode: &ProbeMode) -> ProbeOutcome {
        let builder = self.builder(cwd, mode);

        let process = match CliProcess::spawn(&builder) {
            Ok(process) => process,
            Err(e) => {
                tracing::debug!(command = %builder, error = %e, "Version probe failed to spawn");
                return ProbeOutcome::Failed;
            }
        };

        let output = match tokio::time::timeout(self.timeout, process.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!(command = %builder, error = %e, "Version probe failed");
                return ProbeOutcome::Failed;
            }
            Err(_) => {
                tracing::warn!(command = %builder, timeout = ?self.timeout, "Version probe timed out");
                return ProbeOutcome::Failed;
            }
        };

        if !output.status.success() {
            tracing::debug!(
                command = %builder,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Version probe exited with failure"
            );
            return ProbeOutcome::Failed;
        }

        let reported = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(command = %builder, version = %reported, "Version probe succeeded");
        ProbeOutcome::Reported(reported)
    }
}
