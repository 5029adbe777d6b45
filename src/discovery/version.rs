//! Version parsing and compatibility classification.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Error returned when a configured version string is not a `major.minor.patch` triple.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid version '{0}': expected major.minor.patch")]
pub struct VersionParseError(pub String);

/// A `major.minor.patch` version.
///
/// Ordering compares major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

fn semver_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("version pattern is valid"))
}

impl Version {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the first `x.y.z` triple from free-form CLI output.
    ///
    /// Returns `None` if the output contains no such triple.
    #[must_use]
    pub fn extract(output: &str) -> Option<Self> {
        let caps = semver_pattern().captures(output)?;
        let part = |i: usize| caps.get(i)?.as_str().parse::<u64>().ok();
        Some(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u64>().ok())
                .ok_or_else(|| VersionParseError(s.to_string()))
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(VersionParseError(s.to_string()));
        }
        Ok(version)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Compatibility of a probed CLI against the supported range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityClass {
    Compatible,
    /// Minor version is newer than the latest tested, but still below the maximum.
    CompatibleAheadOfTested,
    IncompatibleBelowMin,
    IncompatibleMajorAhead,
    /// The CLI ran but its version could not be parsed.
    IncompatibleUnverifiable,
    /// The CLI could not be executed.
    NotFound,
}

impl CompatibilityClass {
    /// Compatibility verdict; `None` when nothing was found to judge.
    #[must_use]
    pub fn is_compatible(self) -> Option<bool> {
        match self {
            Self::NotFound => None,
            Self::Compatible | Self::CompatibleAheadOfTested => Some(true),
            Self::IncompatibleBelowMin
            | Self::IncompatibleMajorAhead
            | Self::IncompatibleUnverifiable => Some(false),
        }
    }

    /// Whether the CLI may be used.
    #[must_use]
    pub fn is_available(self) -> bool {
        self.is_compatible() == Some(true)
    }
}

/// What a version probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The CLI could not be executed at all.
    Failed,
    /// The CLI ran and printed this (possibly unparseable) output.
    Reported(String),
}

impl ProbeOutcome {
    /// The reported version string, if the CLI ran.
    #[must_use]
    pub fn reported(&self) -> Option<&str> {
        match self {
            Self::Failed => None,
            Self::Reported(output) => Some(output.as_str()),
        }
    }
}

/// Supported range `[min, max)` plus the latest tested version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    pub min: Version,
    pub max: Version,
    pub latest_tested: Version,
}

impl VersionRange {
    #[must_use]
    pub const fn new(min: Version, max: Version, latest_tested: Version) -> Self {
        Self {
            min,
            max,
            latest_tested,
        }
    }

    /// Classify a parsed version. `None` means the CLI ran but the version
    /// could not be parsed.
    #[must_use]
    pub fn classify(&self, version: Option<Version>) -> CompatibilityClass {
        let Some(version) = version else {
            return CompatibilityClass::IncompatibleUnverifiable;
        };

        if version < self.min {
            return CompatibilityClass::IncompatibleBelowMin;
        }
        if version >= self.max {
            return CompatibilityClass::IncompatibleMajorAhead;
        }
        if version.major == self.latest_tested.major && version.minor > self.latest_tested.minor {
            return CompatibilityClass::CompatibleAheadOfTested;
        }
        CompatibilityClass::Compatible
    }

    /// Classify the outcome of a probe.
    #[must_use]
    pub fn classify_outcome(&self, outcome: &ProbeOutcome) -> CompatibilityClass {
        match outcome {
            ProbeOutcome::Failed => CompatibilityClass::NotFound,
            ProbeOutcome::Reported(output) => self.classify(Version::extract(output)),
        }
    }
}
