//! Single-flight runner for long-lived CLI invocations.
//!
//! A [`ProcessRunner`] tracks at most one child process. Starting a second
//! while one is running is rejected with a user-visible error, never queued.
//! Every invocation publishes `started`, then its output chunks, then exactly
//! one `completed` on the runner's [`CliEvents`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::{CliEvents, CliProcess, CliProcessBuilder, CliResult};
use crate::host::{Notifier, RunProperties, SettingsStore, TelemetrySink, RUNNER_COMPLETED_EVENT};

/// Default timeout for graceful process termination.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the buffer used to read output chunks.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long output is still read after the process exited. Background
/// children can hold the pipes open past that.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a run did not succeed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The process could not be spawned.
    #[error("Failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },
    /// The process exited with a nonzero code or was killed externally.
    #[error("`{command}` failed with exit code {}: {}", fmt_exit_code(.exit_code), .stderr.trim())]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The process was stopped through [`ProcessRunner::stop`].
    #[error("`{command}` was stopped")]
    Cancelled { command: String },
    /// The supervising task went away without reporting a result.
    #[error("`{command}` ended without reporting a result")]
    Aborted { command: String },
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Final outcome of a run, as seen through a [`ProcessHandle`].
pub type RunOutcome = Result<CliResult, RunError>;

/// Handle to the tracked process.
///
/// Clones observe the same process. The handle outlives the run, so it can
/// be awaited after the runner has gone back to idle.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    command: String,
    cancel: CancellationToken,
    done: watch::Receiver<Option<RunOutcome>>,
}

impl ProcessHandle {
    /// The fully joined invocation.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the process has finished and its result is available.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait for the process to finish.
    ///
    /// # Errors
    ///
    /// Returns `RunError` if the process could not be spawned, exited with a
    /// nonzero code, or was stopped.
    pub async fn wait(&self) -> RunOutcome {
        let mut done = self.done.clone();
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| self.aborted())
    }

    fn aborted(&self) -> RunOutcome {
        Err(RunError::Aborted {
            command: self.command.clone(),
        })
    }
}

/// Runner state. Transition to `Running` is only valid from `Idle`.
#[derive(Debug)]
enum RunnerState {
    Idle,
    Running(ProcessHandle),
}

/// Runner statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Runs that were started.
    pub started: usize,
    /// Runs that finished successfully.
    pub completed: usize,
    /// Runs that failed to spawn or exited nonzero.
    pub failed: usize,
    /// `run()` calls rejected because a process was already running.
    pub rejected: usize,
    /// Termination requests sent to a running process.
    pub stops: usize,
}

struct Inner {
    events: CliEvents,
    notifier: Arc<dyn Notifier>,
    telemetry: Arc<dyn TelemetrySink>,
    state: Mutex<RunnerState>,
    stats: Mutex<RunnerStats>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> MutexGuard<'_, RunnerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs CLI commands one at a time.
pub struct ProcessRunner {
    binary: String,
    module: Option<String>,
    interpreter: Option<PathBuf>,
    settings: Option<Arc<dyn SettingsStore>>,
    terminate_timeout: Duration,
    inner: Arc<Inner>,
}

impl ProcessRunner {
    /// Create a runner for `binary` with fresh event channels.
    #[must_use]
    pub fn new(
        binary: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self::with_events(binary, notifier, telemetry, CliEvents::new())
    }

    /// Create a runner that publishes to existing event channels.
    #[must_use]
    pub fn with_events(
        binary: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        telemetry: Arc<dyn TelemetrySink>,
        events: CliEvents,
    ) -> Self {
        Self {
            binary: binary.into(),
            module: None,
            interpreter: None,
            settings: None,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            inner: Arc::new(Inner {
                events,
                notifier,
                telemetry,
                state: Mutex::new(RunnerState::Idle),
                stats: Mutex::new(RunnerStats::default()),
            }),
        }
    }

    /// Run through the interpreter override recorded in `settings`, when there is one.
    #[must_use]
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Interpreter to run through when `settings` holds no override.
    ///
    /// Pass the interpreter discovery approved, see
    /// [`Resolution::interpreter`](crate::discovery::Resolution::interpreter).
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Module passed as `-m <module>` when running through an interpreter.
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Grace period between SIGTERM and SIGKILL when stopping.
    #[must_use]
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// The runner's event channels.
    #[must_use]
    pub fn events(&self) -> &CliEvents {
        &self.inner.events
    }

    /// Start `args` in `cwd`.
    ///
    /// Returns `None`, after showing an error to the user, if a process is
    /// already running. Otherwise the `started` event has been published by
    /// the time this returns and the process runs in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run<S: AsRef<str>>(&self, cwd: impl AsRef<Path>, args: &[S]) -> Option<ProcessHandle> {
        let builder = self.builder(cwd.as_ref(), args);
        let command = builder.command_line();

        let mut state = self.inner.state();
        if let RunnerState::Running(current) = &*state {
            let message = format!(
                "Cannot start `{command}` while `{}` is still running.",
                current.command()
            );
            tracing::warn!(command = %command, running = %current.command(), "Rejected concurrent run");
            drop(state);
            self.inner.stats().rejected += 1;
            // The notifier may call back into the runner.
            self.inner.notifier.error(&message);
            return None;
        }

        let (done_tx, done_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let handle = ProcessHandle {
            command: command.clone(),
            cancel: cancel.clone(),
            done: done_rx,
        };

        tracing::debug!(command = %command, "Runner state: Idle -> Running");
        *state = RunnerState::Running(handle.clone());
        self.inner.stats().started += 1;
        self.inner.events.publish_started();
        drop(state);

        let cwd = cwd.as_ref().to_path_buf();
        tokio::spawn(execute(
            Arc::clone(&self.inner),
            builder,
            cwd,
            self.terminate_timeout,
            cancel,
            done_tx,
        ));

        Some(handle)
    }

    /// Ask the running process to terminate.
    ///
    /// No-op when idle or when termination was already requested. The
    /// `completed` event follows once the process has actually exited.
    pub fn stop(&self) {
        let state = self.inner.state();
        let RunnerState::Running(handle) = &*state else {
            return;
        };
        if handle.cancel.is_cancelled() {
            return;
        }
        tracing::info!(command = %handle.command(), "Stopping process");
        handle.cancel.cancel();
        self.inner.stats().stops += 1;
    }

    /// Whether a process is being tracked.
    #[must_use]
    pub fn is_experiment_running(&self) -> bool {
        matches!(*self.inner.state(), RunnerState::Running(_))
    }

    /// The tracked process, while running.
    #[must_use]
    pub fn running_process(&self) -> Option<ProcessHandle> {
        match &*self.inner.state() {
            RunnerState::Running(handle) => Some(handle.clone()),
            RunnerState::Idle => None,
        }
    }

    /// Runner statistics.
    #[must_use]
    pub fn stats(&self) -> RunnerStats {
        *self.inner.stats()
    }

    fn builder<S: AsRef<str>>(&self, cwd: &Path, args: &[S]) -> CliProcessBuilder {
        let interpreter = self
            .settings
            .as_ref()
            .and_then(|settings| settings.interpreter_bin_path())
            .or_else(|| self.interpreter.clone());

        let mut builder = CliProcessBuilder::new(&self.binary)
            .interpreter(interpreter)
            .args(args.iter().map(AsRef::<str>::as_ref))
            .working_dir(cwd);
        if let Some(module) = &self.module {
            builder = builder.module(module);
        }
        builder
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drive one invocation to completion.
async fn execute(
    inner: Arc<Inner>,
    builder: CliProcessBuilder,
    cwd: PathBuf,
    terminate_timeout: Duration,
    cancel: CancellationToken,
    done_tx: watch::Sender<Option<RunOutcome>>,
) {
    let started_at = Instant::now();
    let command = builder.command_line();

    let (exit_code, stderr, outcome) = match CliProcess::spawn(&builder) {
        Ok(process) => supervise(&inner, process, &command, terminate_timeout, &cancel).await,
        Err(e) => {
            let message = e.to_string();
            let error = RunError::Spawn {
                command: command.clone(),
                message: message.clone(),
            };
            (None, message, Err(error))
        }
    };

    let result = CliResult {
        command: command.clone(),
        exit_code,
        stderr,
    };

    match &outcome {
        Err(error @ (RunError::Spawn { .. } | RunError::Failed { .. })) => {
            let mut context = serde_json::Map::new();
            context.insert(
                "duration_ms".to_string(),
                serde_json::json!(u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)),
            );
            context.insert(
                "cwd".to_string(),
                serde_json::json!(cwd.display().to_string()),
            );
            inner.telemetry.send_error(
                RUNNER_COMPLETED_EVENT,
                error,
                &context,
                &RunProperties {
                    command: command.clone(),
                    exit_code,
                },
            );
            inner.stats().failed += 1;
            tracing::warn!(command = %command, exit_code = ?exit_code, error = %error, "Process failed");
        }
        Err(_) => {
            tracing::info!(command = %command, "Process stopped");
        }
        Ok(_) => {
            inner.stats().completed += 1;
            tracing::info!(command = %command, elapsed = ?started_at.elapsed(), "Process completed");
        }
    }

    inner.events.publish_completed(result.clone());

    {
        let mut state = inner.state();
        tracing::debug!(command = %command, "Runner state: Running -> Idle");
        *state = RunnerState::Idle;
    }

    // Handles may all have been dropped; the result is still on the event channel.
    let _ = done_tx.send(Some(outcome.map(|()| result)));
}

/// Stream output until the process exits or is stopped.
///
/// Returns the exit code, the accumulated stderr, and the run outcome.
async fn supervise(
    inner: &Inner,
    mut process: CliProcess,
    command: &str,
    terminate_timeout: Duration,
    cancel: &CancellationToken,
) -> (Option<i32>, String, Result<(), RunError>) {
    let kept = Arc::new(Mutex::new(String::new()));
    let pumps: Vec<JoinHandle<()>> = process
        .take_stdout()
        .map(|out| pump(out, inner.events.clone(), None))
        .into_iter()
        .chain(
            process
                .take_stderr()
                .map(|err| pump(err, inner.events.clone(), Some(Arc::clone(&kept)))),
        )
        .collect();

    let exited = tokio::select! {
        biased;

        () = cancel.cancelled() => None,
        status = process.wait() => Some(status),
    };

    let cancelled = exited.is_none();
    let status = match exited {
        Some(status) => status,
        None => {
            if let Err(e) = process.graceful_terminate(terminate_timeout).await {
                tracing::warn!(command, error = %e, "Failed to terminate process");
            }
            process.wait().await
        }
    };

    // Drain the pipes so every chunk is published before `completed`.
    drain(pumps, command).await;
    let stderr = std::mem::take(&mut *kept.lock().unwrap_or_else(PoisonError::into_inner));

    let exit_code = status.as_ref().ok().and_then(std::process::ExitStatus::code);
    let outcome = match status {
        _ if cancelled => Err(RunError::Cancelled {
            command: command.to_string(),
        }),
        Ok(status) if status.success() => Ok(()),
        Ok(_) => Err(RunError::Failed {
            command: command.to_string(),
            exit_code,
            stderr: stderr.clone(),
        }),
        Err(e) => Err(RunError::Failed {
            command: command.to_string(),
            exit_code: None,
            stderr: e.to_string(),
        }),
    };

    (exit_code, stderr, outcome)
}

/// Forward a pipe to the output channel, appending to `keep` when given.
fn pump<R>(mut reader: R, events: CliEvents, keep: Option<Arc<Mutex<String>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let keep = keep.as_deref();
        let mut pending = VecDeque::new();
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend(&buf[..n]);
                    let chunk = take_utf8(&mut pending);
                    if !chunk.is_empty() {
                        forward(&events, keep, chunk);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Output pipe read failed");
                    break;
                }
            }
        }
        if !pending.is_empty() {
            let rest = String::from_utf8_lossy(pending.make_contiguous()).into_owned();
            forward(&events, keep, rest);
        }
    })
}

fn forward(events: &CliEvents, keep: Option<&Mutex<String>>, chunk: String) {
    if let Some(kept) = keep {
        kept.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(&chunk);
    }
    events.publish_output(chunk);
}

/// Take everything decodable from `pending`, leaving a trailing partial
/// character for the next read. Invalid sequences become U+FFFD.
fn take_utf8(pending: &mut VecDeque<u8>) -> String {
    let mut text = String::new();
    loop {
        let bytes = pending.make_contiguous();
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                text.push_str(valid);
                pending.clear();
                return text;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&bytes[..valid]));
                match e.error_len() {
                    None => {
                        pending.drain(..valid);
                        return text;
                    }
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + len);
                    }
                }
            }
        }
    }
}

/// Wait for the output pumps, giving up after [`DRAIN_TIMEOUT`].
async fn drain(mut pumps: Vec<JoinHandle<()>>, command: &str) {
    let joined = tokio::time::timeout(DRAIN_TIMEOUT, async {
        for pump in &mut pumps {
            let _ = pump.await;
        }
    })
    .await;
    if joined.is_err() {
        tracing::warn!(command, "Output still open after exit, dropping the rest");
        for pump in &pumps {
            pump.abort();
        }
    }
}
