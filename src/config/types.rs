//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::{Version, VersionRange};

/// How to invoke the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Global binary name or path.
    pub binary: String,
    /// Module passed as `-m <module>` when running through an interpreter.
    pub module: String,
    /// Arguments that make the CLI print its version.
    pub version_args: Vec<String>,
    /// Upper bound on a version probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL when stopping, in seconds.
    pub terminate_timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: "dvc".to_string(),
            module: "dvc".to_string(),
            version_args: vec!["--version".to_string()],
            probe_timeout_secs: 10,
            terminate_timeout_secs: 5,
        }
    }
}

impl CliConfig {
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

/// Supported CLI version range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsConfig {
    /// Minimum supported version (inclusive).
    pub min: Version,
    /// Maximum supported version (exclusive).
    pub max: Version,
    /// Latest version the broker was tested against.
    pub latest_tested: Version,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            min: Version::new(3, 0, 0),
            max: Version::new(4, 0, 0),
            latest_tested: Version::new(3, 48, 0),
        }
    }
}

impl VersionsConfig {
    #[must_use]
    pub fn range(&self) -> VersionRange {
        VersionRange::new(self.min, self.max, self.latest_tested)
    }
}

/// Static description of the host workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Open workspace roots. Warnings are suppressed when empty.
    pub roots: Vec<PathBuf>,
    /// Active interpreter used for interpreter-scoped execution.
    pub interpreter: Option<PathBuf>,
    /// Run the CLI through the interpreter first.
    pub use_interpreter: bool,
    /// Whether interpreter selection can be offered to the user.
    pub interpreter_tooling: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            interpreter: None,
            use_interpreter: false,
            interpreter_tooling: false,
        }
    }
}

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub cli: CliConfig,
    pub versions: VersionsConfig,
    pub workspace: WorkspaceConfig,
}
