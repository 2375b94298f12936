//! mission_plan - show what a QR mission string will do, without flying it.
//!
//! Plays the mission through the interpreter on a virtual clock and prints
//! one line per code with its start offset, the action sent and the settle
//! time that follows.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;

use tello_pilot::control::{MissionInterpreter, MissionProgram, MissionStep};
use tello_pilot::PilotConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the timed plan of a mission string")]
struct Args {
    /// Mission codes, e.g. `TfwfW L`.
    mission: String,

    /// JSON or TOML config file (step sizes and pauses).
    #[arg(long, env = "PILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Emit the plan as JSON.
    #[arg(long)]
    json: bool,

    /// Fail when the mission contains unrecognized codes.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct PlanEntry {
    index: usize,
    code: char,
    at_secs: f64,
    action: Option<String>,
    pause_secs: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let cfg = PilotConfig::load_from(args.config.as_deref())?;
    let program = MissionProgram::new(&args.mission);
    if program.is_empty() {
        return Err(anyhow!("mission is empty"));
    }

    let plan = plan(program, MissionInterpreter::new(cfg.actions.clone()))?;
    let skipped: Vec<char> = plan
        .iter()
        .filter(|entry| entry.action.is_none())
        .map(|entry| entry.code)
        .collect();
    if args.strict && !skipped.is_empty() {
        return Err(anyhow!("unrecognized mission codes: {:?}", skipped));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    for entry in &plan {
        match &entry.action {
            Some(action) if entry.pause_secs > 0.0 => println!(
                "{:>7.1}s  [{}] '{}'  {}  (wait {:.1}s)",
                entry.at_secs, entry.index, entry.code, action, entry.pause_secs
            ),
            Some(action) => println!(
                "{:>7.1}s  [{}] '{}'  {}",
                entry.at_secs, entry.index, entry.code, action
            ),
            None => println!(
                "{:>7.1}s  [{}] '{}'  (ignored)",
                entry.at_secs, entry.index, entry.code
            ),
        }
    }
    let total = plan
        .last()
        .map(|entry| entry.at_secs + entry.pause_secs)
        .unwrap_or(0.0);
    println!(
        "{} codes, {} ignored, at least {:.1}s",
        plan.len(),
        skipped.len(),
        total
    );
    Ok(())
}

/// Drive the interpreter on a virtual clock, one step per cycle, jumping
/// over pauses.
fn plan(program: MissionProgram, mut interpreter: MissionInterpreter) -> Result<Vec<PlanEntry>> {
    let start = Instant::now();
    let mut now = start;
    let mut entries = Vec::with_capacity(program.len());
    interpreter.load(program);

    loop {
        let index = interpreter.cursor();
        match interpreter.step(now) {
            MissionStep::Dispatch(command) => entries.push(PlanEntry {
                index,
                code: command.code,
                at_secs: (now - start).as_secs_f64(),
                action: Some(command.action.to_string()),
                pause_secs: command.pause.unwrap_or(Duration::ZERO).as_secs_f64(),
            }),
            MissionStep::Skipped(code) => entries.push(PlanEntry {
                index,
                code,
                at_secs: (now - start).as_secs_f64(),
                action: None,
                pause_secs: 0.0,
            }),
            MissionStep::Paused { remaining } => {
                now = now
                    .checked_add(remaining)
                    .ok_or_else(|| anyhow!("pause before code {} is too long to plan", index))?;
            }
            MissionStep::Done | MissionStep::Idle => break,
        }
    }
    Ok(entries)
}
