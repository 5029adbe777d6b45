//! Integration tests for CLI resolution and its warnings.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use cli_broker::discovery::{CanRunCli, ProbeMode, ProbeOutcome, ProbeStrategy};
use cli_broker::host::{Response, Settings, SettingsStore};

use super::{reported, Fixture, MockHost, ScriptedNotifier, ScriptedProbe};

const AVAILABLE: CanRunCli = CanRunCli {
    is_available: true,
    is_compatible: Some(true),
};

const INCOMPATIBLE: CanRunCli = CanRunCli {
    is_available: false,
    is_compatible: Some(false),
};

const NOT_FOUND: CanRunCli = CanRunCli {
    is_available: false,
    is_compatible: None,
};

fn cwd() -> &'static Path {
    Path::new("/repo")
}

#[tokio::test]
async fn global_compatible_is_silent() {
    let fixture = Fixture::new(
        ScriptedProbe::global(reported("3.1.0")),
        MockHost::default(),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, AVAILABLE);
    assert_eq!(fixture.probe.calls(), vec![ProbeMode::Global]);
    assert!(fixture.notifier.warnings().is_empty());
    assert!(fixture.notifier.prompts().is_empty());
}

#[tokio::test]
async fn global_not_found_prompts_with_tooling_choices() {
    let fixture = Fixture::new(
        ScriptedProbe::global(ProbeOutcome::Failed),
        MockHost::default(),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, NOT_FOUND);

    let prompts = fixture.notifier.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].0.contains("trying to access the CLI"));
    assert_eq!(
        prompts[0].1,
        vec![
            Response::SetupWorkspace,
            Response::SelectInterpreter,
            Response::Never
        ]
    );
}

#[tokio::test]
async fn not_found_without_tooling_omits_select_interpreter() {
    let fixture = Fixture::new(
        ScriptedProbe::global(ProbeOutcome::Failed),
        MockHost {
            tooling: false,
            ..MockHost::default()
        },
        ScriptedNotifier::default(),
    );

    fixture.resolver.resolve(cwd()).await;
    let prompts = fixture.notifier.prompts();
    assert_eq!(
        prompts[0].1,
        vec![Response::SetupWorkspace, Response::Never]
    );
}

#[tokio::test]
async fn global_below_min_warns_to_upgrade_cli() {
    let fixture = Fixture::new(
        ScriptedProbe::global(reported("2.58.2")),
        MockHost::default(),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, INCOMPATIBLE);
    let warnings = fixture.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("version 2.58.2 of the CLI"));
    assert!(warnings[0].contains("3.0.0 <= CLI < 4.0.0"));
}

#[tokio::test]
async fn unparseable_version_is_unverifiable() {
    let fixture = Fixture::new(
        ScriptedProbe::global(reported("dvc, development build")),
        MockHost::default(),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, INCOMPATIBLE);
    let warnings = fixture.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("unable to verify"));
}

#[tokio::test]
async fn interpreter_result_is_authoritative_when_found() {
    let fixture = Fixture::new(
        ScriptedProbe::new(reported("2.9.0"), reported("3.10.0")),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, INCOMPATIBLE);
    assert_eq!(
        fixture.probe.calls(),
        vec![ProbeMode::Interpreter(PathBuf::from("/venv/bin/python"))]
    );
    assert_eq!(fixture.notifier.warnings().len(), 1);
}

#[tokio::test]
async fn interpreter_ahead_of_tested_only_advises() {
    let fixture = Fixture::new(
        ScriptedProbe::new(reported("3.49.0"), ProbeOutcome::Failed),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, AVAILABLE);
    let warnings = fixture.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("(3.48.0)"));
    assert!(fixture.notifier.prompts().is_empty());
}

#[tokio::test]
async fn fallback_to_global_clears_interpreter_override() {
    let fixture = Fixture::with_settings(
        ScriptedProbe::new(ProbeOutcome::Failed, reported("3.5.0")),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
        Settings {
            interpreter_bin_path: Some(PathBuf::from("/override/bin/python")),
            ..Settings::default()
        },
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, AVAILABLE);
    assert_eq!(
        fixture.probe.calls(),
        vec![
            ProbeMode::Interpreter(PathBuf::from("/override/bin/python")),
            ProbeMode::Global
        ]
    );
    assert_eq!(fixture.settings.interpreter_bin_path(), None);
    assert!(fixture.notifier.warnings().is_empty());
    assert!(fixture.notifier.prompts().is_empty());
}

#[tokio::test]
async fn fallback_ahead_of_tested_advises_once() {
    let fixture = Fixture::new(
        ScriptedProbe::new(ProbeOutcome::Failed, reported("3.50.1")),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, AVAILABLE);
    let warnings = fixture.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("ahead of the latest version"));
    assert!(fixture.notifier.prompts().is_empty());
}

#[tokio::test]
async fn inaccessible_anywhere_names_interpreter_once() {
    let fixture = Fixture::with_settings(
        ScriptedProbe::new(ProbeOutcome::Failed, ProbeOutcome::Failed),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
        Settings {
            interpreter_bin_path: Some(PathBuf::from("/override/bin/python")),
            ..Settings::default()
        },
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, NOT_FOUND);

    let prompts = fixture.notifier.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].0.contains("Active Python interpreter: /override/bin/python."));
    assert!(prompts[0].0.contains("The CLI is also not installed globally"));
    assert!(prompts[0].1.contains(&Response::SelectInterpreter));
    assert!(fixture.notifier.warnings().is_empty());
    assert_eq!(
        fixture.settings.interpreter_bin_path(),
        Some(PathBuf::from("/override/bin/python")),
        "override is kept when nothing usable was found"
    );
}

#[tokio::test]
async fn incompatible_global_fallback_reports_its_version() {
    let fixture = Fixture::new(
        ScriptedProbe::new(ProbeOutcome::Failed, reported("2.1.0")),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, INCOMPATIBLE);
    let prompts = fixture.notifier.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].0.contains("2.1.0 is installed globally"));
    assert!(prompts[0].0.contains("/venv/bin/python"));
}

#[tokio::test]
async fn missing_interpreter_path_skips_interpreter_probe() {
    let fixture = Fixture::new(
        ScriptedProbe::new(reported("3.1.0"), reported("3.2.0")),
        MockHost {
            interpreter_used: true,
            active_interpreter: None,
            ..MockHost::default()
        },
        ScriptedNotifier::default(),
    );

    assert_eq!(
        fixture.resolver.strategies().await,
        vec![ProbeStrategy::Interpreter(None), ProbeStrategy::Global]
    );
    assert_eq!(fixture.resolver.resolve(cwd()).await, AVAILABLE);
    assert_eq!(fixture.probe.calls(), vec![ProbeMode::Global]);
}

#[tokio::test]
async fn no_roots_suppresses_all_warnings() {
    let fixture = Fixture::new(
        ScriptedProbe::new(ProbeOutcome::Failed, ProbeOutcome::Failed),
        MockHost {
            roots: false,
            ..MockHost::with_interpreter("/venv/bin/python")
        },
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, NOT_FOUND);
    assert!(fixture.notifier.warnings().is_empty());
    assert!(fixture.notifier.prompts().is_empty());
}

#[tokio::test]
async fn muted_unavailable_warning_is_not_prompted() {
    let fixture = Fixture::with_settings(
        ScriptedProbe::global(ProbeOutcome::Failed),
        MockHost::default(),
        ScriptedNotifier::default(),
        Settings {
            do_not_show_cli_unavailable: true,
            ..Settings::default()
        },
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, NOT_FOUND);
    assert!(fixture.notifier.prompts().is_empty());
}

#[tokio::test]
async fn never_response_mutes_future_prompts() {
    let fixture = Fixture::new(
        ScriptedProbe::global(ProbeOutcome::Failed),
        MockHost::default(),
        ScriptedNotifier::answering(Response::Never),
    );

    fixture.resolver.resolve(cwd()).await;
    assert!(fixture.settings.do_not_show_cli_unavailable());

    fixture.resolver.resolve(cwd()).await;
    assert_eq!(fixture.notifier.prompts().len(), 1);
}

#[tokio::test]
async fn mute_does_not_hide_version_advisories() {
    let fixture = Fixture::with_settings(
        ScriptedProbe::global(reported("4.0.0")),
        MockHost::default(),
        ScriptedNotifier::default(),
        Settings {
            do_not_show_cli_unavailable: true,
            ..Settings::default()
        },
    );

    assert_eq!(fixture.resolver.resolve(cwd()).await, INCOMPATIBLE);
    let warnings = fixture.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("version of the extension"));
}

#[tokio::test]
async fn responses_trigger_host_actions() {
    let select = Fixture::new(
        ScriptedProbe::global(ProbeOutcome::Failed),
        MockHost::default(),
        ScriptedNotifier::answering(Response::SelectInterpreter),
    );
    select.resolver.resolve(cwd()).await;
    assert_eq!(select.host.selects.load(Ordering::SeqCst), 1);
    assert_eq!(select.host.setups.load(Ordering::SeqCst), 0);

    let setup = Fixture::new(
        ScriptedProbe::global(ProbeOutcome::Failed),
        MockHost::default(),
        ScriptedNotifier::answering(Response::SetupWorkspace),
    );
    setup.resolver.resolve(cwd()).await;
    assert_eq!(setup.host.setups.load(Ordering::SeqCst), 1);
    assert!(!setup.settings.do_not_show_cli_unavailable());
}

#[tokio::test]
async fn interpreter_not_used_probes_global_only() {
    let fixture = Fixture::new(
        ScriptedProbe::new(reported("3.1.0"), ProbeOutcome::Failed),
        MockHost {
            interpreter_used: false,
            active_interpreter: Some(PathBuf::from("/venv/bin/python")),
            ..MockHost::default()
        },
        ScriptedNotifier::default(),
    );

    assert_eq!(fixture.resolver.strategies().await, vec![ProbeStrategy::Global]);
    assert_eq!(fixture.resolver.resolve(cwd()).await, NOT_FOUND);
    assert_eq!(fixture.probe.calls(), vec![ProbeMode::Global]);
}

#[tokio::test]
async fn resolution_reports_deciding_strategy() {
    let direct = Fixture::new(
        ScriptedProbe::new(reported("3.10.0"), reported("3.5.0")),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
    );
    let resolution = direct.resolver.resolve_with_strategy(cwd()).await;
    assert_eq!(resolution.verdict, AVAILABLE);
    assert_eq!(
        resolution.interpreter(),
        Some(PathBuf::from("/venv/bin/python"))
    );

    let fallback = Fixture::new(
        ScriptedProbe::new(ProbeOutcome::Failed, reported("3.5.0")),
        MockHost::with_interpreter("/venv/bin/python"),
        ScriptedNotifier::default(),
    );
    let resolution = fallback.resolver.resolve_with_strategy(cwd()).await;
    assert_eq!(resolution.verdict, AVAILABLE);
    assert_eq!(resolution.strategy, ProbeStrategy::Global);
    assert_eq!(resolution.interpreter(), None);
    assert_eq!(
        fallback.resolver.preferred_interpreter().await,
        Some(PathBuf::from("/venv/bin/python"))
    );
}
