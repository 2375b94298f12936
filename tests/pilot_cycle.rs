use std::time::{Duration, Instant};

use tello_pilot::config::{PilotConfig, VideoSettings};
use tello_pilot::control::{Action, MissionStep, Velocity};
use tello_pilot::detect::{
    DetectionCapability, Detection, DetectorAdapter, Identity, Region, ScriptedBackend,
    ScriptedCycle,
};
use tello_pilot::link::{LinkCommand, MoveDirection, Rotation, SimulatedLink};
use tello_pilot::{ingest, CancelToken, Frame, FrameReader, OperatingMode, OperatorCommand, Pilot};

fn frame(seq: u64) -> Frame {
    Frame::new(vec![0; 96 * 72], 96, 72, seq).expect("frame")
}

fn pilot_with(
    capability: DetectionCapability,
    backend: ScriptedBackend,
    start: Instant,
) -> Pilot<SimulatedLink> {
    let adapter = DetectorAdapter::new(Box::new(backend), capability);
    Pilot::new(SimulatedLink::new(), adapter, &PilotConfig::default(), start)
}

fn repeat(detection: Detection, cycles: usize) -> Vec<ScriptedCycle> {
    (0..cycles)
        .map(|_| ScriptedCycle::Detections(vec![detection.clone()]))
        .collect()
}

#[test]
fn marker_held_for_31_cycles_rotates_once() {
    let start = Instant::now();
    let mut cycles = repeat(Detection::marker(5, None), 31);
    cycles.extend((0..5).map(|_| ScriptedCycle::Detections(Vec::new())));
    let mut pilot = pilot_with(
        DetectionCapability::Marker,
        ScriptedBackend::new(cycles),
        start,
    );

    let mut confirmations = Vec::new();
    for seq in 1..=36 {
        let report = pilot.run_cycle(&frame(seq), start);
        if let Some(identity) = report.confirmed {
            confirmations.push((seq, identity));
        }
    }

    assert_eq!(confirmations, vec![(31, Identity::Marker(5))]);
    assert_eq!(
        pilot.link().motion_commands(),
        vec![&LinkCommand::Rotate(Rotation::Clockwise, 30)]
    );
    assert_eq!(pilot.stats().confirmations, 1);
}

#[test]
fn flickering_marker_never_confirms() {
    let start = Instant::now();
    let cycles = (0..90)
        .map(|n| {
            if n % 20 == 19 {
                ScriptedCycle::Detections(Vec::new())
            } else {
                ScriptedCycle::Detections(vec![Detection::marker(6, None)])
            }
        })
        .collect();
    let mut pilot = pilot_with(
        DetectionCapability::Marker,
        ScriptedBackend::new(cycles),
        start,
    );
    for seq in 1..=90 {
        pilot.run_cycle(&frame(seq), start);
    }
    assert!(pilot.link().motion_commands().is_empty());
}

#[test]
fn unknown_marker_confirms_without_action() {
    let start = Instant::now();
    let mut pilot = pilot_with(
        DetectionCapability::Marker,
        ScriptedBackend::new(repeat(Detection::marker(42, None), 31)),
        start,
    );
    let mut last = None;
    for seq in 1..=31 {
        last = Some(pilot.run_cycle(&frame(seq), start));
    }
    let report = last.expect("report");
    assert_eq!(report.confirmed, Some(Identity::Marker(42)));
    assert_eq!(report.action, None);
    assert!(pilot.link().commands().is_empty());
}

#[test]
fn confirmed_qr_payload_plays_mission_one_code_per_cycle() {
    let start = Instant::now();
    let mut pilot = pilot_with(
        DetectionCapability::Qr,
        ScriptedBackend::new(repeat(Detection::payload("ud", None), 10)),
        start,
    );

    for seq in 1..=5 {
        let report = pilot.run_cycle(&frame(seq), start);
        assert!(report.confirmed.is_none());
    }

    let report = pilot.run_cycle(&frame(6), start);
    assert_eq!(report.confirmed, Some(Identity::Payload("ud".to_string())));
    assert_eq!(report.action, Some(Action::Move(MoveDirection::Up, 50)));
    assert_eq!(pilot.mode(), OperatingMode::Mission);

    let report = pilot.run_cycle(&frame(7), start);
    assert!(report.detection.is_none(), "qr reading pauses during a mission");
    assert_eq!(report.action, Some(Action::Move(MoveDirection::Down, 50)));

    let report = pilot.run_cycle(&frame(8), start);
    assert_eq!(report.mission, Some(MissionStep::Done));
    assert_eq!(pilot.mode(), OperatingMode::Manual);
    assert!(!pilot.mission().is_active());

    assert_eq!(
        pilot.link().motion_commands(),
        vec![
            &LinkCommand::Move(MoveDirection::Up, 50),
            &LinkCommand::Move(MoveDirection::Down, 50),
        ]
    );
}

#[test]
fn mission_pauses_do_not_block_the_loop() {
    let start = Instant::now();
    let mut pilot = pilot_with(
        DetectionCapability::Qr,
        ScriptedBackend::new(repeat(Detection::payload("TxfW", None), 6)),
        start,
    );
    for seq in 1..=5 {
        pilot.run_cycle(&frame(seq), start);
    }

    let report = pilot.run_cycle(&frame(6), start);
    assert_eq!(report.action, Some(Action::Takeoff));

    let report = pilot.run_cycle(&frame(7), start + Duration::from_secs(1));
    assert_eq!(
        report.mission,
        Some(MissionStep::Paused {
            remaining: Duration::from_secs(4)
        })
    );
    assert_eq!(report.action, None);

    let report = pilot.run_cycle(&frame(8), start + Duration::from_secs(5));
    assert_eq!(report.mission, Some(MissionStep::Skipped('x')));

    let report = pilot.run_cycle(&frame(9), start + Duration::from_secs(5));
    assert_eq!(report.action, Some(Action::Move(MoveDirection::Forward, 50)));

    let report = pilot.run_cycle(&frame(10), start + Duration::from_secs(5));
    assert_eq!(report.action, Some(Action::Hold));
    assert!(pilot.mission().is_paused());

    // Heartbeat still runs while the hold pause elapses.
    let report = pilot.run_cycle(&frame(11), start + Duration::from_millis(10_100));
    assert!(report.keepalive);
    assert!(matches!(report.mission, Some(MissionStep::Done)));

    assert_eq!(
        pilot.link().motion_commands(),
        vec![
            &LinkCommand::Takeoff,
            &LinkCommand::Move(MoveDirection::Forward, 50),
        ]
    );
}

#[test]
fn face_steering_turns_toward_target_and_stops_on_exit() {
    let start = Instant::now();
    // Face centered at (140, 180): left of the 240 reference.
    let face = Detection::face(Region {
        x: 100,
        y: 140,
        width: 80,
        height: 80,
    });
    let mut pilot = pilot_with(
        DetectionCapability::Face,
        ScriptedBackend::new(repeat(face, 10)),
        start,
    );
    pilot.apply_operator(OperatorCommand::SteeringOn);

    let report = pilot.run_cycle(&frame(1), start);
    assert_eq!(
        report.velocity,
        Some(Velocity {
            left_right: 0,
            forward_back: 0,
            up_down: 0,
            yaw: -30,
        })
    );

    pilot.shutdown();
    let commands = pilot.link().commands();
    assert_eq!(
        &commands[commands.len() - 2..],
        &[
            LinkCommand::Velocity(Velocity::ZERO),
            LinkCommand::StopVideo,
        ]
    );
}

#[test]
fn face_detector_runs_every_fifth_cycle() {
    let start = Instant::now();
    let face = Detection::face(Region {
        x: 200,
        y: 140,
        width: 80,
        height: 80,
    });
    // Only the first and sixth cycles consult the backend.
    let cycles = vec![
        ScriptedCycle::Detections(vec![face.clone()]),
        ScriptedCycle::Detections(Vec::new()),
    ];
    let mut pilot = pilot_with(
        DetectionCapability::Face,
        ScriptedBackend::new(cycles),
        start,
    );

    for seq in 1..=5 {
        let report = pilot.run_cycle(&frame(seq), start);
        assert_eq!(report.detection.as_ref(), Some(&face), "cycle {}", seq);
    }
    let report = pilot.run_cycle(&frame(6), start);
    assert_eq!(report.detection, None);
}

#[test]
fn heartbeat_fires_only_after_ten_seconds() {
    let start = Instant::now();
    let mut pilot = pilot_with(
        DetectionCapability::Marker,
        ScriptedBackend::new(Vec::new()),
        start,
    );

    let at = |ms: u64| start + Duration::from_millis(ms);
    assert!(!pilot.run_cycle(&frame(1), at(9_900)).keepalive);
    assert!(!pilot.run_cycle(&frame(2), at(10_000)).keepalive);
    assert!(pilot.run_cycle(&frame(3), at(10_100)).keepalive);
    assert!(!pilot.run_cycle(&frame(4), at(15_000)).keepalive);
    assert!(!pilot.idle_cycle(at(20_100)));
    assert!(pilot.idle_cycle(at(20_200)));

    assert_eq!(pilot.link().count(&LinkCommand::Keepalive), 2);
}

#[test]
fn link_errors_are_counted_not_fatal() {
    let start = Instant::now();
    let mut cycles = repeat(Detection::marker(0, None), 31);
    cycles.extend(repeat(Detection::marker(1, None), 31));
    let mut pilot = pilot_with(
        DetectionCapability::Marker,
        ScriptedBackend::new(cycles),
        start,
    );
    pilot.link_mut().set_failing(true);

    for seq in 1..=31 {
        pilot.run_cycle(&frame(seq), start);
    }
    assert_eq!(pilot.stats().link_errors, 1);

    pilot.link_mut().set_failing(false);
    for seq in 32..=62 {
        pilot.run_cycle(&frame(seq), start);
    }
    assert_eq!(pilot.link().count(&LinkCommand::Takeoff), 1);
    assert_eq!(pilot.link().count(&LinkCommand::Land), 1);
    assert_eq!(pilot.stats().link_errors, 1);
}

#[test]
fn detector_failures_count_as_no_detection() {
    let start = Instant::now();
    let mut cycles = repeat(Detection::marker(2, None), 20);
    cycles.push(ScriptedCycle::Failure("corner geometry rejected".to_string()));
    cycles.extend(repeat(Detection::marker(2, None), 31));
    let mut pilot = pilot_with(
        DetectionCapability::Marker,
        ScriptedBackend::new(cycles),
        start,
    );

    let mut confirmed_at = Vec::new();
    for seq in 1..=52 {
        if pilot.run_cycle(&frame(seq), start).confirmed.is_some() {
            confirmed_at.push(seq);
        }
    }
    // The failure breaks the first run; the second run confirms on its 31st cycle.
    assert_eq!(confirmed_at, vec![52]);
}

#[test]
fn trace_file_drives_marker_session() {
    let start = Instant::now();
    let mut trace = String::from("# takeoff card held up\n");
    for _ in 0..31 {
        trace.push_str("[{\"identity\": {\"Marker\": 0}}]\n");
    }
    let backend = ScriptedBackend::parse(&trace).expect("trace");
    let mut pilot = pilot_with(DetectionCapability::Marker, backend, start);
    for seq in 1..=31 {
        pilot.run_cycle(&frame(seq), start);
    }
    assert_eq!(pilot.link().motion_commands(), vec![&LinkCommand::Takeoff]);
}

#[test]
fn run_loop_consumes_synthetic_video_until_cancelled() {
    let settings = VideoSettings {
        url: "stub://bench".to_string(),
        target_fps: 50,
        ..VideoSettings::default()
    };
    let reader = FrameReader::spawn(move || ingest::open_source(&settings)).expect("reader");
    assert_eq!(reader.source(), "stub://bench");
    let mut pilot = pilot_with(
        DetectionCapability::Marker,
        ScriptedBackend::new(Vec::new()),
        Instant::now(),
    );
    pilot.start().expect("start");

    let cancel = CancelToken::new();
    let canceller = {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(400));
            cancel.cancel();
        })
    };

    let stats = pilot.run(reader.slot(), None, &cancel);
    canceller.join().expect("canceller");
    pilot.shutdown();
    reader.stop().expect("stop reader");

    assert!(stats.cycles > 0);
    assert_eq!(stats.link_errors, 0);
    assert_eq!(
        pilot.link().commands().last(),
        Some(&LinkCommand::StopVideo)
    );
}
