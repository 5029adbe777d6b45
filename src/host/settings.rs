//! Persisted user settings touched by discovery and the runner.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Errors that can occur while reading or writing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The values a [`SettingsStore`] persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Suppress the "CLI unavailable" warning.
    pub do_not_show_cli_unavailable: bool,
    /// Interpreter used to run the CLI instead of the global binary.
    pub interpreter_bin_path: Option<PathBuf>,
}

/// Storage for user settings.
pub trait SettingsStore: Send + Sync {
    /// Whether the "CLI unavailable" warning has been muted.
    fn do_not_show_cli_unavailable(&self) -> bool;

    /// Mute or unmute the "CLI unavailable" warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the setting cannot be persisted.
    fn set_do_not_show_cli_unavailable(&self, value: bool) -> Result<(), SettingsError>;

    /// The recorded interpreter override, if any.
    fn interpreter_bin_path(&self) -> Option<PathBuf>;

    /// Forget the interpreter override so the global binary is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the setting cannot be persisted.
    fn clear_interpreter_bin_path(&self) -> Result<(), SettingsError>;
}

/// Settings held in memory only.
#[derive(Debug, Default)]
pub struct MemorySettings {
    settings: Mutex<Settings>,
}

impl MemorySettings {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    /// Snapshot of the current values.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.settings.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Apply `f` to a copy, keeping the copy only if `f` succeeds.
    fn try_update<E>(&self, f: impl FnOnce(&mut Settings) -> Result<(), E>) -> Result<(), E> {
        let mut current = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = current.clone();
        f(&mut next)?;
        *current = next;
        Ok(())
    }
}

impl SettingsStore for MemorySettings {
    fn do_not_show_cli_unavailable(&self) -> bool {
        self.snapshot().do_not_show_cli_unavailable
    }

    fn set_do_not_show_cli_unavailable(&self, value: bool) -> Result<(), SettingsError> {
        self.update(|s| s.do_not_show_cli_unavailable = value);
        Ok(())
    }

    fn interpreter_bin_path(&self) -> Option<PathBuf> {
        self.snapshot().interpreter_bin_path
    }

    fn clear_interpreter_bin_path(&self) -> Result<(), SettingsError> {
        self.update(|s| s.interpreter_bin_path = None);
        Ok(())
    }
}

/// Settings persisted to a TOML file, rewritten on every change.
///
/// A change that cannot be written is not applied.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    cache: MemorySettings,
}

impl FileSettings {
    /// Default location: `<config_dir>/cli-broker/settings.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cli-broker").join("settings.toml"))
    }

    /// Open the settings file, starting from defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = if path.exists() {
            tracing::debug!(path = %path.display(), "Loading settings file");
            let content = std::fs::read_to_string(&path).map_err(|e| SettingsError::Read {
                path: path.clone(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| SettingsError::Parse {
                path: path.clone(),
                source: e,
            })?
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            cache: MemorySettings::new(settings),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current values.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.cache.snapshot()
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(settings)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|e| SettingsError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn do_not_show_cli_unavailable(&self) -> bool {
        self.cache.do_not_show_cli_unavailable()
    }

    fn set_do_not_show_cli_unavailable(&self, value: bool) -> Result<(), SettingsError> {
        self.cache.try_update(|settings| {
            settings.do_not_show_cli_unavailable = value;
            self.persist(settings)
        })
    }

    fn interpreter_bin_path(&self) -> Option<PathBuf> {
        self.cache.interpreter_bin_path()
    }

    fn clear_interpreter_bin_path(&self) -> Result<(), SettingsError> {
        self.cache.try_update(|settings| {
            settings.interpreter_bin_path = None;
            self.persist(settings)
        })
    }
}
