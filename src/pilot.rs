//! Cycle driver: one detection/decision/actuation pass per video frame.
//!
//! `Pilot` owns every piece of mutable session state (operating mode,
//! debouncer, mission interpreter, heartbeat, camera and motor flags) and is
//! driven from a single thread. Video arrives through a `FrameSlot`, operator
//! keys through a channel, and cancellation through a `CancelToken`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::PilotConfig;
use crate::control::{
    Action, ActionSettings, Debouncer, Heartbeat, MissionInterpreter, MissionProgram,
    MissionStep, SteeringController, Velocity,
};
use crate::detect::{DetectionCapability, Detection, DetectorAdapter, Identity};
use crate::frame::{Frame, FrameSlot, FrameWait};
use crate::ingest::normalize::WorkingGeometry;
use crate::link::{CameraDirection, VehicleLink, SDK_V3};
use crate::operator::OperatorCommand;

/// Shared stop flag, set from the Ctrl-C handler or the quit key.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatingMode {
    /// Only operator keys and confirmed markers move the vehicle.
    Manual,
    /// Continuous velocity toward the tracked face.
    Steering,
    /// Playing a confirmed QR mission.
    Mission,
}

/// What happened during one cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub sequence: Option<u64>,
    pub detection: Option<Detection>,
    pub confirmed: Option<Identity>,
    pub action: Option<Action>,
    pub mission: Option<MissionStep>,
    pub velocity: Option<Velocity>,
    pub keepalive: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PilotStats {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub confirmations: u64,
    pub actions: u64,
    pub missions: u64,
    pub velocity_commands: u64,
    pub keepalives: u64,
    pub operator_commands: u64,
    pub link_errors: u64,
}

pub struct Pilot<L: VehicleLink> {
    link: L,
    perception: DetectionCapability,
    mode: OperatingMode,
    adapter: DetectorAdapter,
    debouncer: Debouncer<Identity>,
    steering: SteeringController,
    mission: MissionInterpreter,
    actions: ActionSettings,
    heartbeat: Heartbeat,
    geometry: WorkingGeometry,
    frame_wait: Duration,
    camera: CameraDirection,
    motors_on: bool,
    sdk_version: Option<String>,
    last_velocity: Velocity,
    stats: PilotStats,
    shut_down: bool,
}

impl<L: VehicleLink> Pilot<L> {
    pub fn new(link: L, adapter: DetectorAdapter, cfg: &PilotConfig, start: Instant) -> Self {
        let perception = adapter.capability();
        let (adapter, threshold) = match perception {
            DetectionCapability::Face => (
                adapter.with_interval(cfg.detector.face_interval),
                cfg.confirm.marker_threshold,
            ),
            DetectionCapability::Marker => (adapter, cfg.confirm.marker_threshold),
            DetectionCapability::Qr => (adapter, cfg.confirm.qr_threshold),
        };
        Self {
            link,
            perception,
            mode: OperatingMode::Manual,
            adapter,
            debouncer: Debouncer::new(threshold),
            steering: SteeringController::new(cfg.steering.clone()),
            mission: MissionInterpreter::new(cfg.actions.clone()),
            actions: cfg.actions.clone(),
            heartbeat: Heartbeat::new(cfg.heartbeat_interval, start),
            geometry: cfg.video.working_geometry(),
            frame_wait: cfg.frame_wait,
            camera: CameraDirection::Forward,
            motors_on: false,
            sdk_version: None,
            last_velocity: Velocity::ZERO,
            stats: PilotStats::default(),
            shut_down: false,
        }
    }

    /// Enter SDK mode, (re)start the video stream and make sure the forward
    /// camera is active. Only `connect` and `start_video` failures are fatal.
    pub fn start(&mut self) -> Result<()> {
        self.link.connect().context("failed to connect to the vehicle")?;
        // A previous session may have left the stream running.
        let stale_stream = self.link.stop_video();
        self.check("streamoff", stale_stream);
        self.link
            .start_video()
            .context("failed to start the video stream")?;

        match self.link.sdk_version() {
            Ok(version) => {
                log::info!("pilot: vehicle reports SDK {}", version);
                self.sdk_version = Some(version);
            }
            Err(err) => {
                self.stats.link_errors += 1;
                log::warn!("pilot: sdk version query failed: {:#}", err);
            }
        }
        if self.supports_sdk_v3() {
            // The downward camera may still be selected after an aborted run.
            let result = self.link.set_camera(CameraDirection::Forward);
            self.check("downvision 0", result);
        }
        log::info!(
            "pilot: started ({} perception, {} detector)",
            self.perception,
            self.adapter.backend_name()
        );
        Ok(())
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn perception(&self) -> DetectionCapability {
        self.perception
    }

    pub fn camera(&self) -> CameraDirection {
        self.camera
    }

    pub fn motors_on(&self) -> bool {
        self.motors_on
    }

    pub fn stats(&self) -> &PilotStats {
        &self.stats
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn mission(&self) -> &MissionInterpreter {
        &self.mission
    }

    pub fn debouncer(&self) -> &Debouncer<Identity> {
        &self.debouncer
    }

    fn supports_sdk_v3(&self) -> bool {
        self.sdk_version.as_deref() == Some(SDK_V3)
    }

    /// Run one full cycle on a freshly received frame.
    pub fn run_cycle(&mut self, frame: &Frame, now: Instant) -> CycleReport {
        self.stats.cycles += 1;
        let mut report = CycleReport {
            sequence: Some(frame.sequence()),
            ..CycleReport::default()
        };

        let detection = self.perceive(frame);
        report.detection = detection.clone();

        match self.perception {
            DetectionCapability::Face => {
                if self.mode == OperatingMode::Steering {
                    if let Some(region) = detection.as_ref().and_then(|d| d.region) {
                        let velocity = self.steering.compute(self.steering.error_for(&region));
                        report.velocity = Some(velocity);
                        self.send_velocity(velocity);
                    }
                }
            }
            DetectionCapability::Marker | DetectionCapability::Qr => {
                if self.mode != OperatingMode::Mission {
                    let identity = detection.and_then(|d| d.identity);
                    if let Some(confirmed) = self.debouncer.update(identity) {
                        report.confirmed = Some(confirmed.identity.clone());
                        report.action = self.on_confirmed(confirmed.identity);
                    }
                }
            }
        }

        if self.mode == OperatingMode::Mission {
            let (step, action) = self.advance_mission(now);
            report.mission = Some(step);
            if action.is_some() {
                report.action = action;
            }
        }

        report.keepalive = self.tick(now);
        report
    }

    /// Housekeeping for a cycle without a new frame.
    pub fn idle_cycle(&mut self, now: Instant) -> bool {
        self.stats.idle_cycles += 1;
        self.tick(now)
    }

    fn perceive(&mut self, frame: &Frame) -> Option<Detection> {
        // QR reading pauses while a mission plays.
        if self.perception == DetectionCapability::Qr && self.mode == OperatingMode::Mission {
            return None;
        }
        let downward = self.camera == CameraDirection::Downward;
        let working = match self.geometry.apply(frame, downward) {
            Ok(working) => working,
            Err(err) => {
                log::debug!("pilot: frame {} not normalized: {:#}", frame.sequence(), err);
                return None;
            }
        };
        self.adapter.primary(&working)
    }

    fn on_confirmed(&mut self, identity: Identity) -> Option<Action> {
        self.stats.confirmations += 1;
        match (self.perception, identity) {
            (DetectionCapability::Marker, Identity::Marker(id)) => {
                let Some(action) = self.actions.marker_action(id) else {
                    log::info!("pilot: marker {} confirmed, no action bound", id);
                    return None;
                };
                log::info!("pilot: marker {} confirmed -> {}", id, action);
                self.dispatch(action);
                Some(action)
            }
            (DetectionCapability::Qr, Identity::Payload(text)) => {
                let program = MissionProgram::new(&text);
                log::info!(
                    "pilot: mission '{}' confirmed ({} codes)",
                    text,
                    program.len()
                );
                self.mission.load(program);
                self.mode = OperatingMode::Mission;
                self.stats.missions += 1;
                None
            }
            (perception, identity) => {
                log::debug!(
                    "pilot: ignoring {} confirmation in {} perception",
                    identity,
                    perception
                );
                None
            }
        }
    }

    fn advance_mission(&mut self, now: Instant) -> (MissionStep, Option<Action>) {
        let step = self.mission.step(now);
        let action = match &step {
            MissionStep::Dispatch(command) => {
                log::info!(
                    "pilot: mission code '{}' ({}/{}) -> {}",
                    command.code,
                    self.mission.cursor(),
                    self.mission.program_len(),
                    command.action
                );
                self.dispatch(command.action);
                Some(command.action)
            }
            MissionStep::Skipped(code) => {
                log::debug!("pilot: mission code '{}' not recognized", code);
                None
            }
            MissionStep::Paused { .. } => None,
            MissionStep::Done | MissionStep::Idle => {
                log::info!("pilot: mission finished");
                self.mode = OperatingMode::Manual;
                self.debouncer.reset();
                self.adapter.reset();
                None
            }
        };
        (step, action)
    }

    fn tick(&mut self, now: Instant) -> bool {
        if !self.heartbeat.poll(now) {
            return false;
        }
        self.stats.keepalives += 1;
        let result = self.link.send_keepalive();
        self.check("keepalive", result);
        true
    }

    fn dispatch(&mut self, action: Action) {
        if action.moves_vehicle() {
            self.stats.actions += 1;
        }
        let result = action.dispatch(&mut self.link);
        self.check(&action.to_string(), result);
    }

    fn send_velocity(&mut self, velocity: Velocity) {
        self.stats.velocity_commands += 1;
        self.last_velocity = velocity;
        let result = self.link.set_velocity(velocity);
        self.check("rc", result);
    }

    /// Log and count a link error. The loop always continues.
    fn check(&mut self, what: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                self.stats.link_errors += 1;
                log::warn!("pilot: '{}' failed: {:#}", what, err);
                false
            }
        }
    }

    pub fn apply_operator(&mut self, command: OperatorCommand) {
        self.stats.operator_commands += 1;
        log::debug!("pilot: operator {:?}", command);
        match command {
            // The run loop owns cancellation.
            OperatorCommand::Quit => {}
            OperatorCommand::Takeoff => self.dispatch(Action::Takeoff),
            OperatorCommand::Land => {
                self.send_velocity(Velocity::ZERO);
                self.dispatch(Action::Land);
            }
            OperatorCommand::Move(direction) => {
                self.dispatch(Action::Move(direction, self.actions.manual_distance_cm))
            }
            OperatorCommand::Rotate(rotation) => {
                self.dispatch(Action::Rotate(rotation, self.actions.manual_angle_deg))
            }
            OperatorCommand::ShowTelemetry => match self.link.query_state() {
                Some(telemetry) => log::info!("telemetry: {}", telemetry),
                None => log::info!("telemetry: nothing received yet"),
            },
            OperatorCommand::ToggleMotors => {
                if !self.supports_sdk_v3() {
                    log::warn!("pilot: motor toggle needs SDK {}", SDK_V3);
                    return;
                }
                self.motors_on = !self.motors_on;
                let result = self.link.set_motors(self.motors_on);
                self.check(if self.motors_on { "motoron" } else { "motoroff" }, result);
            }
            OperatorCommand::ToggleCamera => {
                if !self.supports_sdk_v3() {
                    log::warn!("pilot: camera switch needs SDK {}", SDK_V3);
                    return;
                }
                self.camera = self.camera.toggled();
                let result = self.link.set_camera(self.camera);
                self.check("downvision", result);
                // Detections from the other camera are meaningless now.
                self.adapter.reset();
                self.debouncer.reset();
            }
            OperatorCommand::SteeringOn => {
                if self.perception != DetectionCapability::Face {
                    log::warn!("pilot: steering needs face perception");
                    return;
                }
                log::info!("pilot: steering on");
                self.mode = OperatingMode::Steering;
            }
            OperatorCommand::SteeringOff => {
                if self.mode == OperatingMode::Steering {
                    log::info!("pilot: steering off");
                    self.mode = OperatingMode::Manual;
                }
                self.send_velocity(Velocity::ZERO);
            }
        }
    }

    /// Drive the loop until the video ends, the operator quits or `cancel`
    /// is set.
    pub fn run(
        &mut self,
        slot: &FrameSlot,
        operator: Option<&Receiver<OperatorCommand>>,
        cancel: &CancelToken,
    ) -> PilotStats {
        let mut seen = 0u64;
        while !cancel.is_cancelled() {
            match slot.wait_newer(&mut seen, self.frame_wait) {
                FrameWait::Frame(frame) => {
                    let report = self.run_cycle(&frame, Instant::now());
                    log::debug!("pilot: {:?}", report);
                }
                FrameWait::Timeout => {
                    self.idle_cycle(Instant::now());
                }
                FrameWait::Closed => {
                    log::warn!("pilot: video stream ended");
                    break;
                }
            }

            if let Some(operator) = operator {
                for command in operator.try_iter() {
                    if command == OperatorCommand::Quit {
                        log::info!("pilot: quit requested");
                        cancel.cancel();
                        break;
                    }
                    self.apply_operator(command);
                }
            }
        }
        self.stats.clone()
    }

    /// Leave the vehicle in a safe state. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        log::info!("pilot: shutting down");

        if self.mode == OperatingMode::Steering || !self.last_velocity.is_zero() {
            self.send_velocity(Velocity::ZERO);
        }
        self.mode = OperatingMode::Manual;
        self.mission.abort();
        if self.camera == CameraDirection::Downward {
            self.camera = CameraDirection::Forward;
            let result = self.link.set_camera(CameraDirection::Forward);
            self.check("downvision 0", result);
        }
        let result = self.link.stop_video();
        self.check("streamoff", result);

        match serde_json::to_string(&self.stats) {
            Ok(stats) => log::info!("pilot: session stats {}", stats),
            Err(err) => log::debug!("pilot: stats not serializable: {}", err),
        }
    }
}

impl<L: VehicleLink> Drop for Pilot<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Region, ScriptedBackend, ScriptedCycle};
    use crate::link::{LinkCommand, MoveDirection, Rotation, SimulatedLink};

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0; 64 * 48], 64, 48, seq).unwrap()
    }

    fn pilot(
        capability: DetectionCapability,
        cycles: Vec<ScriptedCycle>,
        start: Instant,
    ) -> Pilot<SimulatedLink> {
        let adapter = DetectorAdapter::new(Box::new(ScriptedBackend::new(cycles)), capability);
        Pilot::new(SimulatedLink::new(), adapter, &PilotConfig::default(), start)
    }

    #[test]
    fn start_enters_sdk_mode_and_restores_forward_camera() {
        let mut pilot = pilot(DetectionCapability::Marker, Vec::new(), Instant::now());
        pilot.start().unwrap();
        assert_eq!(
            pilot.link().commands(),
            &[
                LinkCommand::Connect,
                LinkCommand::StopVideo,
                LinkCommand::StartVideo,
                LinkCommand::SdkVersion,
                LinkCommand::Camera(CameraDirection::Forward),
            ]
        );
    }

    #[test]
    fn start_fails_when_link_is_down() {
        let mut pilot = pilot(DetectionCapability::Marker, Vec::new(), Instant::now());
        pilot.link_mut().set_failing(true);
        assert!(pilot.start().is_err());
    }

    #[test]
    fn marker_zero_confirms_takeoff() {
        let start = Instant::now();
        let cycles = (0..31)
            .map(|_| ScriptedCycle::Detections(vec![Detection::marker(0, None)]))
            .collect();
        let mut pilot = pilot(DetectionCapability::Marker, cycles, start);
        let mut actions = Vec::new();
        for seq in 1..=31 {
            let report = pilot.run_cycle(&frame(seq), start);
            actions.extend(report.action);
        }
        assert_eq!(actions, vec![Action::Takeoff]);
        assert_eq!(pilot.link().count(&LinkCommand::Takeoff), 1);
    }

    #[test]
    fn steering_follows_face_only_when_enabled() {
        let start = Instant::now();
        // Face centered at (340, 180) with reference width.
        let face = Detection::face(Region {
            x: 300,
            y: 140,
            width: 80,
            height: 80,
        });
        let cycles = (0..20)
            .map(|_| ScriptedCycle::Detections(vec![face.clone()]))
            .collect();
        let mut pilot = pilot(DetectionCapability::Face, cycles, start);

        let report = pilot.run_cycle(&frame(1), start);
        assert!(report.velocity.is_none());

        pilot.apply_operator(OperatorCommand::SteeringOn);
        assert_eq!(pilot.mode(), OperatingMode::Steering);
        let report = pilot.run_cycle(&frame(2), start);
        assert_eq!(
            report.velocity,
            Some(Velocity {
                left_right: 0,
                forward_back: 0,
                up_down: 0,
                yaw: 30,
            })
        );

        pilot.apply_operator(OperatorCommand::SteeringOff);
        assert_eq!(pilot.mode(), OperatingMode::Manual);
        assert_eq!(
            pilot.link().commands().last(),
            Some(&LinkCommand::Velocity(Velocity::ZERO))
        );
    }

    #[test]
    fn steering_is_refused_outside_face_perception() {
        let mut pilot = pilot(DetectionCapability::Qr, Vec::new(), Instant::now());
        pilot.apply_operator(OperatorCommand::SteeringOn);
        assert_eq!(pilot.mode(), OperatingMode::Manual);
    }

    #[test]
    fn operator_moves_use_manual_step() {
        let mut pilot = pilot(DetectionCapability::Marker, Vec::new(), Instant::now());
        pilot.apply_operator(OperatorCommand::Move(MoveDirection::Left));
        pilot.apply_operator(OperatorCommand::Rotate(Rotation::Clockwise));
        pilot.apply_operator(OperatorCommand::Land);
        assert_eq!(
            pilot.link().commands(),
            &[
                LinkCommand::Move(MoveDirection::Left, 30),
                LinkCommand::Rotate(Rotation::Clockwise, 30),
                LinkCommand::Velocity(Velocity::ZERO),
                LinkCommand::Land,
            ]
        );
    }

    #[test]
    fn sdk_v3_features_need_version_query() {
        let mut pilot = pilot(DetectionCapability::Marker, Vec::new(), Instant::now());
        pilot.apply_operator(OperatorCommand::ToggleMotors);
        assert!(!pilot.motors_on());
        assert!(pilot.link().commands().is_empty());

        pilot.start().unwrap();
        pilot.link_mut().clear();
        pilot.apply_operator(OperatorCommand::ToggleMotors);
        pilot.apply_operator(OperatorCommand::ToggleCamera);
        assert!(pilot.motors_on());
        assert_eq!(pilot.camera(), CameraDirection::Downward);
        assert_eq!(
            pilot.link().commands(),
            &[
                LinkCommand::Motors(true),
                LinkCommand::Camera(CameraDirection::Downward),
            ]
        );
    }

    #[test]
    fn shutdown_restores_camera_and_runs_once() {
        let mut pilot = pilot(DetectionCapability::Face, Vec::new(), Instant::now());
        pilot.start().unwrap();
        pilot.apply_operator(OperatorCommand::ToggleCamera);
        pilot.apply_operator(OperatorCommand::SteeringOn);
        pilot.link_mut().clear();

        pilot.shutdown();
        pilot.shutdown();
        assert_eq!(
            pilot.link().commands(),
            &[
                LinkCommand::Velocity(Velocity::ZERO),
                LinkCommand::Camera(CameraDirection::Forward),
                LinkCommand::StopVideo,
            ]
        );
    }

    #[test]
    fn run_stops_on_quit_key() {
        let mut pilot = pilot(DetectionCapability::Marker, Vec::new(), Instant::now());
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(OperatorCommand::Takeoff).unwrap();
        tx.send(OperatorCommand::Quit).unwrap();
        let cancel = CancelToken::new();

        let stats = pilot.run(&slot, Some(&rx), &cancel);
        assert!(cancel.is_cancelled());
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.operator_commands, 1);
        assert_eq!(pilot.link().count(&LinkCommand::Takeoff), 1);
    }
}
