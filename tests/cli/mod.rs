//! CLI module tests.


/// Verify all public cli types are exported from the library.
#[test]
fn test_all_cli_types_exported() {
    use cli_broker::cli::{
        CliEvents, CliProcess, CliProcessBuilder, CliResult, CliStarted, ProcessHandle,
        ProcessRunner, RunError, RunOutcome, RunnerStats, SpawnError, DEFAULT_TERMINATE_TIMEOUT,
    };

    let _ = CliEvents::new();
    let _ = CliProcessBuilder::new("dvc");
    let _ = CliStarted;
    let _ = RunnerStats::default();
    let _: fn(&CliProcessBuilder) -> Result<CliProcess, SpawnError> = CliProcess::spawn;
    let _: Option<ProcessHandle> = None;
    let _: Option<ProcessRunner> = None;
    let _: RunOutcome = Err(RunError::Cancelled {
        command: "dvc exp run".to_string(),
    });
    let _ = CliResult {
        command: "dvc".to_string(),
        exit_code: Some(0),
        stderr: String::new(),
    };
    assert!(DEFAULT_TERMINATE_TIMEOUT.as_secs() >= 1);
}

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cli_broker::cli::ProcessRunner;
use cli_broker::host::{Notifier, Response, RunProperties, TelemetrySink};

/// Notifier that records messages instead of showing them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub warnings: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    async fn prompt(&self, message: &str, _choices: &[Response]) -> Option<Response> {
        self.warn(message);
        None
    }
}

/// A telemetry event captured by [`RecordingTelemetry`].
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub name: String,
    pub error: String,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub properties: RunProperties,
}

/// Telemetry sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    pub events: Mutex<Vec<RecordedEvent>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn send_error(
        &self,
        event_name: &str,
        error: &(dyn std::error::Error + Send + Sync),
        context: &serde_json::Map<String, serde_json::Value>,
        properties: &RunProperties,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            name: event_name.to_string(),
            error: error.to_string(),
            context: context.clone(),
            properties: properties.clone(),
        });
    }
}

/// Runner for `binary` wired to recording doubles.
pub fn recording_runner(
    binary: &str,
) -> (ProcessRunner, Arc<RecordingNotifier>, Arc<RecordingTelemetry>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let telemetry = Arc::new(RecordingTelemetry::default());
    let runner = ProcessRunner::new(binary, notifier.clone(), telemetry.clone());
    (runner, notifier, telemetry)
}
