//! Telemetry seam for failed runs.

use serde::{Deserialize, Serialize};

/// Event name reported when a runner invocation fails.
pub const RUNNER_COMPLETED_EVENT: &str = "runner.completed";

/// Properties attached to a failed-run telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProperties {
    pub command: String,
    pub exit_code: Option<i32>,
}

/// Receives error telemetry.
///
/// Implementations must return promptly and must not fail; the runner calls
/// this inline before publishing the completion event.
pub trait TelemetrySink: Send + Sync {
    fn send_error(
        &self,
        event_name: &str,
        error: &(dyn std::error::Error + Send + Sync),
        context: &serde_json::Map<String, serde_json::Value>,
        properties: &RunProperties,
    );
}

/// Sink that records telemetry as structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn send_error(
        &self,
        event_name: &str,
        error: &(dyn std::error::Error + Send + Sync),
        context: &serde_json::Map<String, serde_json::Value>,
        properties: &RunProperties,
    ) {
        tracing::error!(
            event = event_name,
            error = %error,
            command = %properties.command,
            exit_code = ?properties.exit_code,
            context = %serde_json::Value::Object(context.clone()),
            "Telemetry error event"
        );
    }
}
