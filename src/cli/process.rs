//! CLI process spawning and control.
//!
//! This module provides a builder for describing a CLI invocation, either
//! against a global binary or through an interpreter (`<python> -m <module>`),
//! along with control methods for managing the spawned child.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("CLI binary not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(executable: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(executable.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(executable.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder describing a single CLI invocation.
#[derive(Debug, Clone, Default)]
pub struct CliProcessBuilder {
    binary: String,
    interpreter: Option<PathBuf>,
    module: Option<String>,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CliProcessBuilder {
    /// Create a new builder for the given global binary.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    /// Run through an interpreter instead of the global binary.
    ///
    /// `None` keeps the global binary, which lets callers pass an optional
    /// configured path straight through.
    #[must_use]
    pub fn interpreter(mut self, path: Option<PathBuf>) -> Self {
        self.interpreter = path;
        self
    }

    /// Module name passed as `-m <module>` when running through an interpreter.
    ///
    /// Defaults to the binary name.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the CLI process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Whether this invocation goes through an interpreter.
    #[must_use]
    pub fn uses_interpreter(&self) -> bool {
        self.interpreter.is_some()
    }

    /// The executable that will actually be spawned.
    #[must_use]
    pub fn executable(&self) -> String {
        match &self.interpreter {
            Some(path) => path.display().to_string(),
            None => self.binary.clone(),
        }
    }

    /// Build the command-line arguments passed to the executable.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 2);

        if self.interpreter.is_some() {
            args.push("-m".to_string());
            args.push(self.module.clone().unwrap_or_else(|| self.binary.clone()));
        }

        args.extend(self.args.iter().cloned());
        args
    }

    /// The fully joined invocation, e.g. `dvc exp run`.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CliProcessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.executable())?;
        for arg in self.build_args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A running CLI process.
#[derive(Debug)]
pub struct CliProcess {
    child: Child,
}

impl CliProcess {
    /// Spawn a CLI process with the given builder configuration.
    ///
    /// Stdin is closed and both stdout and stderr are piped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(builder: &CliProcessBuilder) -> Result<Self, SpawnError> {
        let executable = builder.executable();

        let mut cmd = Command::new(&executable);
        cmd.args(builder.build_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so termination reaches the CLI's subprocesses too.
        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(ref dir) = builder.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&executable, e))?;

        tracing::debug!(command = %builder, pid = ?child.id(), "Spawned CLI process");

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Wait for the process to exit, collecting whatever is left on its pipes.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting or reading fails.
    pub async fn output(self) -> std::io::Result<Output> {
        self.child.wait_with_output().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM to the process group first, then SIGKILL after
    /// the timeout. On other platforms, falls back to immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            // Already reaped
            return Ok(());
        };

        // The child leads its own group, see `spawn`.
        let group = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(e) = killpg(group, Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM failed, falling back to kill");
            return self.child.kill().await;
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(pid, "Process ignored SIGTERM, killing");
                if let Err(e) = killpg(group, Signal::SIGKILL) {
                    tracing::debug!(pid, error = %e, "SIGKILL to process group failed");
                }
                self.child.kill().await
            }
        }
    }
}
