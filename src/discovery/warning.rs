//! Warning descriptors produced by discovery.
//!
//! Deciding *what* to tell the user is kept separate from presenting it: the
//! functions here are pure, and the [`Resolver`](super::Resolver) hands their
//! output to a [`Notifier`](crate::host::Notifier).

use std::path::Path;

use crate::host::Response;

use super::{CompatibilityClass, VersionRange};

/// How a warning is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Shown without waiting for a response.
    Advisory,
    /// Shown with choices; suppressed while the unavailable warning is muted.
    Dismissible,
}

/// A warning ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub choices: Vec<Response>,
}

impl Warning {
    fn advisory(message: String) -> Self {
        Self {
            kind: WarningKind::Advisory,
            message,
            choices: Vec::new(),
        }
    }

    fn dismissible(message: String, choices: Vec<Response>) -> Self {
        Self {
            kind: WarningKind::Dismissible,
            message,
            choices,
        }
    }
}

/// Which side needs upgrading to resolve a version mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upgrade {
    Cli,
    Host,
}

/// Choices offered when the CLI could not be accessed.
#[must_use]
pub fn unavailable_choices(interpreter_tooling: bool) -> Vec<Response> {
    if interpreter_tooling {
        vec![
            Response::SetupWorkspace,
            Response::SelectInterpreter,
            Response::Never,
        ]
    } else {
        vec![Response::SetupWorkspace, Response::Never]
    }
}

fn version_incompatible(version: Option<&str>, range: &VersionRange, upgrade: Upgrade) -> Warning {
    let target = match upgrade {
        Upgrade::Cli => "CLI",
        Upgrade::Host => "extension",
    };
    Warning::advisory(format!(
        "The extension cannot initialize because you are using version {} of the CLI. \
         The expected version is {} <= CLI < {}. \
         Please upgrade to the most recent version of the {target} and reload this window.",
        version.unwrap_or("unknown"),
        range.min,
        range.max,
    ))
}

/// Warning for the latest-tested advisory.
#[must_use]
pub fn ahead_of_tested(range: &VersionRange) -> Warning {
    Warning::advisory(format!(
        "The located CLI is at least a minor version ahead of the latest version \
         the extension was tested with ({}). This could lead to unexpected behaviour. \
         Please upgrade to the most recent version of the extension and reload this window.",
        range.latest_tested
    ))
}

/// Warning for a classification from a direct (non-fallback) probe.
///
/// Returns `None` for [`CompatibilityClass::Compatible`].
#[must_use]
pub fn warning_for(
    class: CompatibilityClass,
    version: Option<&str>,
    range: &VersionRange,
    interpreter_tooling: bool,
) -> Option<Warning> {
    match class {
        CompatibilityClass::Compatible => None,
        CompatibilityClass::CompatibleAheadOfTested => Some(ahead_of_tested(range)),
        CompatibilityClass::IncompatibleBelowMin => {
            Some(version_incompatible(version, range, Upgrade::Cli))
        }
        CompatibilityClass::IncompatibleMajorAhead => {
            Some(version_incompatible(version, range, Upgrade::Host))
        }
        CompatibilityClass::IncompatibleUnverifiable => Some(Warning::advisory(
            "The extension cannot initialize as we were unable to verify the CLI version."
                .to_string(),
        )),
        CompatibilityClass::NotFound => Some(Warning::dismissible(
            "An error was thrown when trying to access the CLI.".to_string(),
            unavailable_choices(interpreter_tooling),
        )),
    }
}

/// Warning for a CLI that was reachable neither through the interpreter nor globally.
///
/// `global_version` is what the global binary reported, if it ran at all.
#[must_use]
pub fn inaccessible_anywhere(interpreter: Option<&Path>, global_version: Option<&str>) -> Warning {
    let global = match global_version {
        Some(version) if !version.is_empty() => format!("{version} is"),
        _ => "The CLI is also not".to_string(),
    };
    let interpreter = interpreter.map_or_else(|| "none".to_string(), |p| p.display().to_string());

    Warning::dismissible(
        format!(
            "The extension is unable to initialize. The CLI was not located using the \
             interpreter provided by the Python extension. {global} installed globally. \
             For auto Python environment activation, ensure the correct interpreter is set. \
             Active Python interpreter: {interpreter}."
        ),
        unavailable_choices(true),
    )
}
