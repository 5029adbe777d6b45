//! Discovery module tests.

mod resolver_test;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cli_broker::discovery::{ProbeMode, ProbeOutcome, Resolver, Version, VersionProbe, VersionRange};
use cli_broker::host::{MemorySettings, Notifier, Response, Settings, WorkspaceHost};

pub const RANGE: VersionRange = VersionRange::new(
    Version::new(3, 0, 0),
    Version::new(4, 0, 0),
    Version::new(3, 48, 0),
);

/// Probe with fixed answers per mode that records every call.
#[derive(Debug)]
pub struct ScriptedProbe {
    interpreter: ProbeOutcome,
    global: ProbeOutcome,
    pub calls: Mutex<Vec<ProbeMode>>,
}

impl ScriptedProbe {
    pub fn new(interpreter: ProbeOutcome, global: ProbeOutcome) -> Self {
        Self {
            interpreter,
            global,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn global(global: ProbeOutcome) -> Self {
        Self::new(ProbeOutcome::Failed, global)
    }

    pub fn calls(&self) -> Vec<ProbeMode> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionProbe for ScriptedProbe {
    async fn probe(&self, _cwd: &Path, mode: &ProbeMode) -> ProbeOutcome {
        self.calls.lock().unwrap().push(mode.clone());
        match mode {
            ProbeMode::Interpreter(_) => self.interpreter.clone(),
            ProbeMode::Global => self.global.clone(),
        }
    }
}

/// Host with fixed answers that counts user-driven actions.
#[derive(Debug)]
pub struct MockHost {
    pub roots: bool,
    pub interpreter_used: bool,
    pub tooling: bool,
    pub active_interpreter: Option<PathBuf>,
    pub selects: AtomicUsize,
    pub setups: AtomicUsize,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            roots: true,
            interpreter_used: false,
            tooling: true,
            active_interpreter: None,
            selects: AtomicUsize::new(0),
            setups: AtomicUsize::new(0),
        }
    }
}

impl MockHost {
    pub fn with_interpreter(path: &str) -> Self {
        Self {
            interpreter_used: true,
            active_interpreter: Some(PathBuf::from(path)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl WorkspaceHost for MockHost {
    fn has_roots(&self) -> bool {
        self.roots
    }

    async fn is_interpreter_used(&self) -> bool {
        self.interpreter_used
    }

    fn has_interpreter_tooling(&self) -> bool {
        self.tooling
    }

    async fn active_interpreter(&self) -> Option<PathBuf> {
        self.active_interpreter.clone()
    }

    async fn select_interpreter(&self) {
        self.selects.fetch_add(1, Ordering::SeqCst);
    }

    async fn setup_workspace(&self) {
        self.setups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Notifier that records warnings and prompts and answers every prompt the same way.
#[derive(Debug, Default)]
pub struct ScriptedNotifier {
    answer: Option<Response>,
    pub warnings: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<(String, Vec<Response>)>>,
}

impl ScriptedNotifier {
    pub fn answering(answer: Response) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<(String, Vec<Response>)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    async fn prompt(&self, message: &str, choices: &[Response]) -> Option<Response> {
        self.prompts
            .lock()
            .unwrap()
            .push((message.to_string(), choices.to_vec()));
        self.answer
    }
}

/// Everything a resolver test needs to inspect afterwards.
pub struct Fixture {
    pub resolver: Resolver,
    pub probe: Arc<ScriptedProbe>,
    pub host: Arc<MockHost>,
    pub notifier: Arc<ScriptedNotifier>,
    pub settings: Arc<MemorySettings>,
}

impl Fixture {
    pub fn new(probe: ScriptedProbe, host: MockHost, notifier: ScriptedNotifier) -> Self {
        Self::with_settings(probe, host, notifier, Settings::default())
    }

    pub fn with_settings(
        probe: ScriptedProbe,
        host: MockHost,
        notifier: ScriptedNotifier,
        settings: Settings,
    ) -> Self {
        let probe = Arc::new(probe);
        let host = Arc::new(host);
        let notifier = Arc::new(notifier);
        let settings = Arc::new(MemorySettings::new(settings));
        let resolver = Resolver::new(
            probe.clone(),
            RANGE,
            host.clone(),
            notifier.clone(),
            settings.clone(),
        );
        Self {
            resolver,
            probe,
            host,
            notifier,
            settings,
        }
    }
}

pub fn reported(version: &str) -> ProbeOutcome {
    ProbeOutcome::Reported(version.to_string())
}
