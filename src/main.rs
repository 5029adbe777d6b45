//! CLI Broker - checks the external CLI and runs it one invocation at a time.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli_broker::cli::{ProcessRunner, RunError};
use cli_broker::config::{BrokerConfig, ConfigLoader};
use cli_broker::discovery::{CommandProbe, Resolver};
use cli_broker::display;
use cli_broker::host::{
    ConfiguredHost, FileSettings, MemorySettings, Settings, SettingsError, SettingsStore,
    TerminalNotifier, TracingTelemetry,
};

/// Exit code used when the run was interrupted.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "cli-broker",
    about = "Checks CLI compatibility and runs it one invocation at a time",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a config file (defaults to .cli-broker.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print messages without reflowing or truncating them.
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the CLI is available and compatible.
    Check {
        /// Working directory to probe from.
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Run the CLI with the given arguments.
    Run {
        /// Working directory to run in.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Run even if the compatibility check fails.
        #[arg(long)]
        skip_check: bool,
        /// Arguments passed to the CLI.
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },
    /// Show or edit persisted settings.
    Settings {
        /// Show the "CLI unavailable" warning again.
        #[arg(long)]
        reset_warnings: bool,
        /// Forget the interpreter override.
        #[arg(long)]
        clear_interpreter: bool,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Option<BrokerConfig> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    match loader.load() {
        Ok(config) => Some(config),
        Err(e) => {
            display::print_error(&e.to_string());
            None
        }
    }
}

/// Open the settings file, falling back to in-memory settings.
fn open_settings() -> Arc<dyn SettingsStore> {
    let Some(path) = FileSettings::default_path() else {
        tracing::warn!("No user config directory, settings will not be persisted");
        return Arc::new(MemorySettings::new(Settings::default()));
    };
    match FileSettings::open(&path) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to open settings, using defaults");
            Arc::new(MemorySettings::new(Settings::default()))
        }
    }
}

fn resolver(config: &BrokerConfig, settings: Arc<dyn SettingsStore>, raw: bool) -> Resolver {
    Resolver::new(
        Arc::new(CommandProbe::new(&config.cli)),
        config.versions.range(),
        Arc::new(ConfiguredHost::new(config.workspace.clone())),
        Arc::new(TerminalNotifier::new(raw)),
        settings,
    )
}

fn cwd_or_current(cwd: Option<PathBuf>) -> PathBuf {
    cwd.unwrap_or_else(|| PathBuf::from("."))
}

async fn check(config: &BrokerConfig, cwd: PathBuf, raw: bool) -> ExitCode {
    let resolver = resolver(config, open_settings(), raw);
    let verdict = resolver.resolve(&cwd).await;
    display::print_resolution(&verdict, resolver.range());
    if verdict.is_available {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(
    config: &BrokerConfig,
    cwd: PathBuf,
    args: Vec<String>,
    skip_check: bool,
    raw: bool,
) -> ExitCode {
    let settings = open_settings();
    let resolver = resolver(config, Arc::clone(&settings), raw);

    // Run the CLI the same way discovery reached it.
    let interpreter = if skip_check {
        resolver.preferred_interpreter().await
    } else {
        let resolution = resolver.resolve_with_strategy(&cwd).await;
        if !resolution.verdict.is_available {
            display::print_error("The CLI is not available, pass --skip-check to run anyway.");
            return ExitCode::FAILURE;
        }
        resolution.interpreter()
    };

    let runner = ProcessRunner::new(
        &config.cli.binary,
        Arc::new(TerminalNotifier::new(raw)),
        Arc::new(TracingTelemetry),
    )
    .with_settings(settings)
    .with_interpreter(interpreter)
    .with_module(&config.cli.module)
    .with_terminate_timeout(config.cli.terminate_timeout());

    let mut output = runner.events().subscribe_output();
    let mut completed = runner.events().subscribe_completed();

    let Some(handle) = runner.run(&cwd, args.as_slice()) else {
        return ExitCode::FAILURE;
    };
    display::print_started(handle.command());

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut output_open = true;
    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            chunk = output.recv(), if output_open => match chunk {
                Ok(chunk) => display::print_output(&chunk),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output lagged, chunks dropped");
                }
                Err(RecvError::Closed) => output_open = false,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
                runner.stop();
            }
        }
    };

    while let Ok(chunk) = output.try_recv() {
        display::print_output(&chunk);
    }
    if let Ok(result) = completed.try_recv() {
        display::print_completed(&result, raw);
    }

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(RunError::Failed { exit_code, .. }) => exit_code
            .and_then(|code| u8::try_from(code).ok())
            .filter(|code| *code != 0)
            .map_or(ExitCode::FAILURE, ExitCode::from),
        Err(RunError::Cancelled { .. }) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn edit_settings(reset_warnings: bool, clear_interpreter: bool) -> ExitCode {
    let Some(path) = FileSettings::default_path() else {
        display::print_error("No user config directory available");
        return ExitCode::FAILURE;
    };
    let settings = match FileSettings::open(&path) {
        Ok(settings) => settings,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let edited = (|| -> Result<(), SettingsError> {
        if reset_warnings {
            settings.set_do_not_show_cli_unavailable(false)?;
        }
        if clear_interpreter {
            settings.clear_interpreter_bin_path()?;
        }
        Ok(())
    })();
    if let Err(e) = edited {
        display::print_error(&e.to_string());
        return ExitCode::FAILURE;
    }

    display::print_settings(&settings.snapshot(), &settings.path().display().to_string());
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Settings {
        reset_warnings,
        clear_interpreter,
    } = cli.command
    {
        return edit_settings(reset_warnings, clear_interpreter);
    }

    let Some(config) = load_config(cli.config) else {
        return ExitCode::FAILURE;
    };
    tracing::debug!(binary = %config.cli.binary, "Configuration loaded");

    match cli.command {
        Commands::Check { cwd } => check(&config, cwd_or_current(cwd), cli.raw).await,
        Commands::Run {
            cwd,
            skip_check,
            args,
        } => run(&config, cwd_or_current(cwd), args, skip_check, cli.raw).await,
        Commands::Settings { .. } => ExitCode::SUCCESS,
    }
}
