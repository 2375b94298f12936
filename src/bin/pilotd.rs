//! pilotd - vision control loop for a Tello-class quadrotor
//!
//! This daemon:
//! 1. Connects to the vehicle and starts its video stream
//! 2. Reads frames on a background thread
//! 3. Runs one perceive/decide/act cycle per frame (face steering, marker
//!    commands or QR missions, depending on `--mode`)
//! 4. Applies operator keys from stdin
//! 5. Leaves the vehicle in a safe state on exit (Ctrl-C or `esc`)

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use tello_pilot::detect::{build_backend, DetectionCapability, DetectorAdapter};
use tello_pilot::{
    ingest, operator, CancelToken, FrameReader, Pilot, PilotConfig, SimulatedLink, TelloLink,
    VehicleLink,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Vision control loop for Tello-class quadrotors")]
struct Args {
    /// What the camera looks for.
    #[arg(long, value_enum, default_value_t = DetectionCapability::Face)]
    mode: DetectionCapability,

    /// JSON or TOML config file.
    #[arg(long, env = "PILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Video source (overrides video.url), e.g. `stub://bench` or an image directory.
    #[arg(long)]
    video: Option<String>,

    /// Detector backend (`rustface`, `rqrr`, `aruco`, `scripted`).
    #[arg(long)]
    detector: Option<String>,

    /// JSON-lines detection trace for the scripted backend.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Face model for the rustface backend.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Fly nothing: log commands against a simulated vehicle.
    #[arg(long)]
    dry_run: bool,

    /// Do not read operator keys from stdin.
    #[arg(long)]
    no_console: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PilotConfig::load_from(args.config.as_deref())?;
    if let Some(video) = &args.video {
        cfg.video.url = video.clone();
    }
    if let Some(detector) = &args.detector {
        cfg.detector.backend = Some(detector.clone());
    }
    if let Some(script) = &args.script {
        cfg.detector.script_path = Some(script.clone());
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = Some(model.clone());
    }

    let mut backend = build_backend(&cfg.detector, args.mode)?;
    backend.warm_up()?;
    let adapter = DetectorAdapter::new(backend, args.mode);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("error setting Ctrl-C handler")?;
    }

    if args.dry_run {
        log::info!("pilotd: dry run, no vehicle will be contacted");
        run_session(SimulatedLink::new().with_echo(), adapter, &cfg, &args, &cancel)
    } else {
        let link = TelloLink::open(cfg.link.tello_config()?)?;
        run_session(link, adapter, &cfg, &args, &cancel)
    }
}

fn run_session<L: VehicleLink>(
    link: L,
    adapter: DetectorAdapter,
    cfg: &PilotConfig,
    args: &Args,
    cancel: &CancelToken,
) -> Result<()> {
    let mut pilot = Pilot::new(link, adapter, cfg, Instant::now());
    pilot.start()?;

    // The stream only exists after `streamon`.
    let video = cfg.video.clone();
    let reader = FrameReader::spawn(move || ingest::open_source(&video))?;
    log::info!("pilotd: reading video from {}", reader.source());

    let console = if args.no_console {
        None
    } else {
        log::info!("pilotd: keys t/l takeoff/land, w/s/a/d/r/f move, e/q rotate, p state, esc quit");
        Some(operator::spawn_console()?)
    };

    let stats = pilot.run(reader.slot(), console.as_ref(), cancel);
    pilot.shutdown();
    reader.stop()?;
    // Releases the link last.
    drop(pilot);

    log::info!(
        "pilotd: {} cycles, {} confirmations, {} actions, {} link errors",
        stats.cycles,
        stats.confirmations,
        stats.actions,
        stats.link_errors
    );
    Ok(())
}
