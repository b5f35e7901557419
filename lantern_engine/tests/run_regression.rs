use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

const SCRIPT: &str = "\
# ambient snow, one spark, then a swap
effect_on Snow,L,loop
effect_burst Spark,M
effect_off Snow
effect_on Fog
";

const MANIFEST: &str = r#"{
    "resources": [
        { "key": "fx/snow", "load_ticks": 1 },
        { "key": "fx/spark", "load_ticks": 1, "animation_ticks": 2 }
    ],
    "anchors": { "L": [-400, 0], "M": [0, 0] },
    "aliases": { "Snow": "fx/snow", "Spark": "fx/spark" }
}"#;

fn write_fixture(dir: &Path) -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    let script = dir.join("scene.lantern");
    let manifest = dir.join("resources.json");
    fs::write(&script, SCRIPT).context("writing script fixture")?;
    fs::write(&manifest, MANIFEST).context("writing manifest fixture")?;
    Ok((script, manifest))
}

fn read_json(path: impl AsRef<Path>) -> Result<Value> {
    let text = fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading {}", path.as_ref().display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.as_ref().display()))
}

fn active_effects(save: &Value) -> Vec<String> {
    save["effects"]["active"]
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

#[test]
fn scripted_run_reports_loads_and_final_state() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let (script, manifest) = write_fixture(dir.path())?;
    let report_path = dir.path().join("report.json");
    let save_path = dir.path().join("slot0.json");

    let output = Command::new(env!("CARGO_BIN_EXE_lantern_engine"))
        .arg("--script")
        .arg(&script)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--drain-ticks")
        .arg("64")
        .arg("--report-json")
        .arg(&report_path)
        .arg("--save-json")
        .arg(&save_path)
        .output()
        .context("running lantern_engine")?;
    assert!(
        output.status.success(),
        "engine failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = read_json(&report_path)?;
    assert_eq!(report["mode"], "execute");
    assert_eq!(report["commands"], 4);
    assert_eq!(report["handled"], 4);
    assert_eq!(report["skipped"], 0);
    // Snow, Spark, and the doomed Fog lookup each start exactly one load.
    assert_eq!(report["loads_begun"], 3);

    let save = read_json(&save_path)?;
    assert_eq!(save["cursor"], 4);
    // Snow was toggled off, the spark landed and dropped its marker, and
    // Fog stays on even though it never found a visual.
    assert_eq!(active_effects(&save), vec!["Fog".to_string()]);

    let events = report["events"].as_array().context("events array")?;
    assert!(events
        .iter()
        .any(|event| event["kind"] == "effect_activated" && event["name"] == "Snow"));
    assert!(events
        .iter()
        .any(|event| event["kind"] == "effect_deactivated" && event["name"] == "Snow"));

    let calls = report["provider_calls"]
        .as_array()
        .context("provider call log")?;
    assert!(calls.iter().any(|call| call == "load.ready fx/snow -> #0"));
    assert!(calls.iter().any(|call| call == "load.missing Fog"));
    Ok(())
}

#[test]
fn simulate_run_touches_no_resources() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let (script, manifest) = write_fixture(dir.path())?;
    let report_path = dir.path().join("report.json");

    let output = Command::new(env!("CARGO_BIN_EXE_lantern_engine"))
        .arg("--script")
        .arg(&script)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--simulate")
        .arg("--report-json")
        .arg(&report_path)
        .output()
        .context("running lantern_engine --simulate")?;
    assert!(
        output.status.success(),
        "engine failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = read_json(&report_path)?;
    assert_eq!(report["mode"], "simulate");
    assert_eq!(report["loads_begun"], 0);
    assert_eq!(
        report["provider_calls"].as_array().map(Vec::len),
        Some(0),
        "state-only replay must not reach the provider"
    );
    // Same settled registry as the full run.
    assert_eq!(active_effects(&report["save"]), vec!["Fog".to_string()]);
    Ok(())
}

#[test]
fn verify_replay_passes_on_a_mixed_script() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let (script, manifest) = write_fixture(dir.path())?;

    let output = Command::new(env!("CARGO_BIN_EXE_lantern_engine"))
        .arg("--script")
        .arg(&script)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--verify-replay")
        .arg("--drain-ticks")
        .arg("64")
        .output()
        .context("running lantern_engine --verify-replay")?;
    assert!(
        output.status.success(),
        "verification failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("replay parity holds across 5 splits"),
        "unexpected output: {stdout}"
    );
    Ok(())
}

#[test]
fn restored_save_resumes_at_its_cursor() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let (script, manifest) = write_fixture(dir.path())?;
    let restore_path = dir.path().join("restore.json");
    let save_path = dir.path().join("slot1.json");
    fs::write(
        &restore_path,
        r#"{"effects":{"active":{"Snow":{"kind":"toggle","count":1}}},"cursor":2}"#,
    )
    .context("writing restore fixture")?;

    let output = Command::new(env!("CARGO_BIN_EXE_lantern_engine"))
        .arg("--script")
        .arg(&script)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--restore-json")
        .arg(&restore_path)
        .arg("--save-json")
        .arg(&save_path)
        .arg("--drain-ticks")
        .arg("32")
        .output()
        .context("running lantern_engine with a restore")?;
    assert!(
        output.status.success(),
        "engine failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Resuming at command 2 of 4"),
        "unexpected output: {stdout}"
    );

    // Only effect_off Snow and effect_on Fog ran.
    let save = read_json(&save_path)?;
    assert_eq!(save["cursor"], 4);
    assert_eq!(active_effects(&save), vec!["Fog".to_string()]);
    Ok(())
}

#[test]
fn conflicting_flags_are_rejected() -> Result<()> {
    let dir = tempdir().context("creating temp dir")?;
    let (script, manifest) = write_fixture(dir.path())?;

    let output = Command::new(env!("CARGO_BIN_EXE_lantern_engine"))
        .arg("--script")
        .arg(&script)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--verify-replay")
        .arg("--simulate")
        .output()
        .context("running lantern_engine with conflicting flags")?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("--verify-replay"),
        "unexpected stderr: {stderr}"
    );
    Ok(())
}
