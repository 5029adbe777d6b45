//! Colored terminal output for the broker binary and terminal notifier.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::cli::CliResult;
use crate::discovery::{CanRunCli, VersionRange};
use crate::host::{Response, Settings};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length of stderr shown in a failure summary.
const STDERR_SUMMARY_LEN: usize = 200;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Print a warning.
pub fn print_warning(message: &str, raw_mode: bool) {
    let message = if raw_mode {
        message.to_string()
    } else {
        message.split_whitespace().collect::<Vec<_>>().join(" ")
    };
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        "[WARN]".yellow().bold(),
        message
    );
    let _ = io::stderr().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ERROR]".red().bold(),
        message
    );
    let _ = io::stderr().flush();
}

/// Print a follow-up hint.
pub fn print_hint(message: &str) {
    eprintln!("{} {}", "[HINT]".cyan().bold(), message);
    let _ = io::stderr().flush();
}

/// Print numbered prompt choices.
pub fn print_choices(choices: &[Response]) {
    for (index, choice) in choices.iter().enumerate() {
        eprintln!("  {} {}", format!("[{}]", index + 1).bold(), choice.label());
    }
    eprint!("{} ", "Choice (Enter to dismiss):".dimmed());
    let _ = io::stderr().flush();
}

/// Print the resolver verdict.
pub fn print_resolution(verdict: &CanRunCli, range: &VersionRange) {
    let compatible = match verdict.is_compatible {
        Some(true) => "yes".green().to_string(),
        Some(false) => "no".red().to_string(),
        None => "unknown".yellow().to_string(),
    };
    let available = if verdict.is_available {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    };
    println!(
        "{} {} available={} compatible={} {}",
        timestamp().dimmed(),
        "[CLI]".blue().bold(),
        available,
        compatible,
        format!(
            "(supported {} <= CLI < {}, tested up to {})",
            range.min, range.max, range.latest_tested
        )
        .dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print the start of a run.
pub fn print_started(command: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[RUN]".blue().bold(),
        command.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print a raw output chunk.
pub fn print_output(chunk: &str) {
    print!("{chunk}");
    let _ = io::stdout().flush();
}

/// Print the completion of a run.
pub fn print_completed(result: &CliResult, raw_mode: bool) {
    let ts = timestamp();
    if result.is_success() {
        println!(
            "{} {} {} {}",
            ts.dimmed(),
            "[DONE]".green().bold(),
            result.command,
            "exit=0".dimmed()
        );
    } else {
        let code = result
            .exit_code
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        println!(
            "{} {} {} {}",
            ts.dimmed(),
            "[FAILED]".red().bold(),
            result.command,
            format!("exit={code}").dimmed()
        );
        let stderr = result.stderr.trim();
        if !stderr.is_empty() {
            println!(
                "{} {} {}",
                ts.dimmed(),
                "[STDERR]".red().bold(),
                truncate(stderr, STDERR_SUMMARY_LEN, raw_mode).red()
            );
        }
    }
    let _ = io::stdout().flush();
}

/// Print persisted settings.
pub fn print_settings(settings: &Settings, path: &str) {
    println!("{} {}", "[SETTINGS]".blue().bold(), path.dimmed());
    println!(
        "  do_not_show_cli_unavailable = {}",
        settings.do_not_show_cli_unavailable
    );
    println!(
        "  interpreter_bin_path = {}",
        settings
            .interpreter_bin_path
            .as_ref()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    );
    let _ = io::stdout().flush();
}
