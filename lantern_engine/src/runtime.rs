//! Script execution and replay verification over a scripted provider.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use serde::Serialize;

use lantern_runtime::{
    ConfigProvider, EventBus, ExecutionMode, ProgressSnapshot, ResourceProvider, RuntimeError,
    RuntimeEvent, SaveState, Session,
};

use crate::cli::{RunArgs, VerifyArgs};
use crate::manifest::ResourceManifest;
use crate::provider::{BusRecorder, ScriptedProvider};
use crate::script::PlaybackScript;

/// Everything one run produced, written as the `--report-json` payload.
#[derive(Serialize)]
struct RunReport {
    mode: &'static str,
    commands: usize,
    handled: usize,
    skipped: usize,
    ticks: u64,
    loads_begun: u64,
    progress: ProgressSnapshot,
    save: SaveState,
    events: Vec<RuntimeEvent>,
    provider_calls: Vec<String>,
}

struct Harness {
    session: Session,
    provider: Rc<ScriptedProvider>,
    bus: Rc<BusRecorder>,
}

fn build_harness(manifest: &ResourceManifest, load_timeout: Option<u32>) -> Harness {
    let provider = Rc::new(ScriptedProvider::new(manifest.clone()));
    let bus = Rc::new(BusRecorder::new());
    let mut session = Session::new(
        provider.clone() as Rc<dyn ResourceProvider>,
        provider.clone() as Rc<dyn ConfigProvider>,
        bus.clone() as Rc<dyn EventBus>,
    );
    if let Some(ticks) = load_timeout {
        session = session.with_load_timeout(ticks);
    }
    Harness {
        session,
        provider,
        bus,
    }
}

fn load_manifest(path: Option<&Path>) -> Result<ResourceManifest> {
    match path {
        Some(path) => ResourceManifest::from_path(path),
        None => Ok(ResourceManifest::default()),
    }
}

/// Dispatches every script line from the session's cursor onward, one tick
/// per line, and returns `(handled, skipped)` counts.
fn play(
    session: &mut Session,
    script: &PlaybackScript,
    mode: ExecutionMode,
    until: Option<usize>,
) -> (usize, usize) {
    let end = until.unwrap_or(script.len()).min(script.len());
    let mut handled = 0;
    let mut skipped = 0;
    while session.cursor() < end {
        let line = &script.lines[session.cursor()];
        if session.dispatch(&line.name, &line.args, mode) {
            handled += 1;
        } else {
            skipped += 1;
        }
        session.advance_cursor();
        session.tick();
    }
    (handled, skipped)
}

pub fn run(args: RunArgs) -> Result<()> {
    let script = PlaybackScript::from_path(&args.script)?;
    let manifest = load_manifest(args.manifest.as_deref())?;
    let mut harness = build_harness(&manifest, args.load_timeout);

    if let Some(path) = args.restore_json.as_ref() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading save snapshot {}", path.display()))?;
        let save = SaveState::from_json(&text)
            .with_context(|| format!("parsing save snapshot {}", path.display()))?;
        harness.session.restore(save);
        println!(
            "Resuming at command {} of {}",
            harness.session.cursor(),
            script.len()
        );
    }

    let mode = if args.simulate {
        ExecutionMode::Simulate
    } else {
        ExecutionMode::Execute
    };
    let start = harness.session.cursor();
    let (handled, skipped) = play(&mut harness.session, &script, mode, None);
    harness.session.run_ticks(args.drain_ticks);

    let report = RunReport {
        mode: match mode {
            ExecutionMode::Execute => "execute",
            ExecutionMode::Simulate => "simulate",
        },
        commands: script.len().saturating_sub(start),
        handled,
        skipped,
        ticks: harness.session.scheduler().ticks(),
        loads_begun: harness.provider.loads_begun(),
        progress: harness.session.progress().borrow().snapshot(),
        save: harness.session.save_state(),
        events: harness.bus.events(),
        provider_calls: harness.provider.call_log(),
    };

    println!(
        "{} commands ({} handled, {} skipped), {} ticks, {} loads",
        report.commands, report.handled, report.skipped, report.ticks, report.loads_begun
    );
    let active: Vec<String> = report
        .save
        .effects
        .active_names()
        .map(str::to_string)
        .collect();
    if active.is_empty() {
        println!("no effects active at end of run");
    } else {
        println!("active effects: {}", active.join(", "));
    }

    if let Some(path) = args.report_json.as_ref() {
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        persist_json(path, &json, "run report")?;
    }
    if let Some(path) = args.save_json.as_ref() {
        let json = report
            .save
            .to_json_pretty()
            .context("serializing save snapshot")?;
        persist_json(path, &json, "save snapshot")?;
    }

    harness.session.teardown();
    Ok(())
}

pub fn verify(args: VerifyArgs) -> Result<()> {
    let script = PlaybackScript::from_path(&args.script)?;
    let manifest = load_manifest(args.manifest.as_deref())?;

    let mut reference = build_harness(&manifest, args.load_timeout);
    play(
        &mut reference.session,
        &script,
        ExecutionMode::Execute,
        None,
    );
    reference.session.run_ticks(args.drain_ticks);
    let executed = reference.session.save_state();

    for split in 0..=script.len() {
        let mut harness = build_harness(&manifest, args.load_timeout);
        play(
            &mut harness.session,
            &script,
            ExecutionMode::Simulate,
            Some(split),
        );
        play(&mut harness.session, &script, ExecutionMode::Execute, None);
        harness.session.run_ticks(args.drain_ticks);
        let replayed = harness.session.save_state();
        check_parity(&executed, &replayed, split)?;
    }

    println!(
        "replay parity holds across {} splits of {}",
        script.len() + 1,
        args.script.display()
    );
    Ok(())
}

/// Compares the settled state of a full playback run against a
/// replay-then-resume run split at `split` commands.
fn check_parity(executed: &SaveState, replayed: &SaveState, split: usize) -> Result<()> {
    if executed == replayed {
        return Ok(());
    }
    let error = RuntimeError::ReplayDivergence {
        split,
        executed: serde_json::to_string(executed).context("serializing playback state")?,
        simulated: serde_json::to_string(replayed).context("serializing replay state")?,
    };
    Err(error.into())
}

fn persist_json(path: &Path, json: &str, label: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    fs::write(path, json).with_context(|| format!("writing {label} to {}", path.display()))?;
    println!("Saved {label} to {}", path.display());
    Ok(())
}
