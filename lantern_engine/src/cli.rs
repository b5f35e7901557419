use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Host that drives scripted effect playback over a deterministic provider",
    version
)]
pub struct Args {
    /// Path to the playback script (one command per line, `#` comments)
    #[arg(long)]
    pub script: PathBuf,

    /// Optional JSON manifest describing resources, anchors, and aliases
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Replay state only: run every command through the state-only path
    #[arg(long)]
    pub simulate: bool,

    /// Check that state-only replay matches full playback at every prefix split
    #[arg(long)]
    pub verify_replay: bool,

    /// Ticks to run after the last command so pending loads and grace periods settle
    #[arg(long, default_value_t = 256)]
    pub drain_ticks: u32,

    /// Give up on any load still pending after this many polls
    #[arg(long)]
    pub load_timeout: Option<u32>,

    /// Path to write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Path to write the final save snapshot as JSON
    #[arg(long)]
    pub save_json: Option<PathBuf>,

    /// Save snapshot to restore before the script runs (resumes at its cursor)
    #[arg(long)]
    pub restore_json: Option<PathBuf>,
}

#[derive(Debug)]
pub enum Command {
    Run(RunArgs),
    Verify(VerifyArgs),
}

#[derive(Debug)]
pub struct RunArgs {
    pub script: PathBuf,
    pub manifest: Option<PathBuf>,
    pub simulate: bool,
    pub drain_ticks: u32,
    pub load_timeout: Option<u32>,
    pub report_json: Option<PathBuf>,
    pub save_json: Option<PathBuf>,
    pub restore_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct VerifyArgs {
    pub script: PathBuf,
    pub manifest: Option<PathBuf>,
    pub drain_ticks: u32,
    pub load_timeout: Option<u32>,
}

pub fn parse() -> Result<Command> {
    let args = Args::parse();
    args.into_command()
}

impl Args {
    fn into_command(self) -> Result<Command> {
        if self.verify_replay {
            if self.simulate {
                bail!("--verify-replay already exercises both paths; drop --simulate");
            }
            if self.restore_json.is_some() {
                bail!("--verify-replay replays from a clean session; drop --restore-json");
            }
            return Ok(Command::Verify(VerifyArgs {
                script: self.script,
                manifest: self.manifest,
                drain_ticks: self.drain_ticks,
                load_timeout: self.load_timeout,
            }));
        }

        Ok(Command::Run(RunArgs {
            script: self.script,
            manifest: self.manifest,
            simulate: self.simulate,
            drain_ticks: self.drain_ticks,
            load_timeout: self.load_timeout,
            report_json: self.report_json,
            save_json: self.save_json,
            restore_json: self.restore_json,
        }))
    }
}
