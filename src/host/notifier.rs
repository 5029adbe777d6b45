//! User-notification seam.

use std::io::IsTerminal;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::display;

/// Fixed vocabulary of choices a user can pick in response to a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    SelectInterpreter,
    SetupWorkspace,
    Never,
    Yes,
    No,
}

impl Response {
    /// Label shown to the user.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::SelectInterpreter => "Select Python Interpreter",
            Self::SetupWorkspace => "Setup The Workspace",
            Self::Never => "Never",
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

/// Presents messages to the user.
///
/// `warn` and `error` are fire-and-forget. `prompt` waits for the user to
/// pick one of `choices`, returning `None` if the message was dismissed.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a warning without waiting for acknowledgement.
    fn warn(&self, message: &str);

    /// Show an error without waiting for acknowledgement.
    fn error(&self, message: &str);

    /// Show a warning with choices and wait for the response.
    async fn prompt(&self, message: &str, choices: &[Response]) -> Option<Response>;
}

/// Notifier that renders to the terminal and reads choices from stdin.
///
/// When stdin is not a terminal every prompt is treated as dismissed.
#[derive(Debug, Clone, Default)]
pub struct TerminalNotifier {
    raw_mode: bool,
}

impl TerminalNotifier {
    #[must_use]
    pub fn new(raw_mode: bool) -> Self {
        Self { raw_mode }
    }
}

#[async_trait]
impl Notifier for TerminalNotifier {
    fn warn(&self, message: &str) {
        display::print_warning(message, self.raw_mode);
    }

    fn error(&self, message: &str) {
        display::print_error(message);
    }

    async fn prompt(&self, message: &str, choices: &[Response]) -> Option<Response> {
        display::print_warning(message, self.raw_mode);
        if choices.is_empty() || !std::io::stdin().is_terminal() {
            return None;
        }
        display::print_choices(choices);

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        if let Err(e) = reader.read_line(&mut line).await {
            tracing::debug!(error = %e, "Failed to read prompt response");
            return None;
        }
        parse_choice(&line, choices)
    }
}

/// Map a typed answer (a 1-based index or a label) to one of `choices`.
fn parse_choice(input: &str, choices: &[Response]) -> Option<Response> {
    let input = input.trim();
    if let Ok(index) = input.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| choices.get(i)).copied();
    }
    choices
        .iter()
        .find(|c| c.label().eq_ignore_ascii_case(input))
        .copied()
}
