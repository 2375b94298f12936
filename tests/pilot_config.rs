use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use tello_pilot::config::PilotConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PILOT_CONFIG",
        "PILOT_DRONE_ADDR",
        "PILOT_VIDEO_URL",
        "PILOT_DETECTOR",
        "PILOT_HEARTBEAT_SECS",
        "PILOT_RESPONSE_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PilotConfig::load().expect("load defaults");

    assert_eq!(cfg.link.drone_addr, "192.168.10.1:8889");
    assert_eq!(cfg.link.response_timeout, Duration::from_millis(10));
    assert_eq!(cfg.link.connect_timeout, Duration::from_secs(3));
    assert_eq!(cfg.link.retry_count, 1);
    assert_eq!(cfg.video.url, "udp://0.0.0.0:11111");
    assert_eq!((cfg.video.width, cfg.video.height), (480, 360));
    assert_eq!(cfg.detector.backend, None);
    assert_eq!(cfg.detector.face_interval, 5);
    assert_eq!(cfg.confirm.marker_threshold, 30);
    assert_eq!(cfg.confirm.qr_threshold, 5);
    assert_eq!(cfg.steering.limit, 100);
    assert_eq!(cfg.actions.mission_distance_cm, 50);
    assert_eq!(cfg.heartbeat_interval, Duration::from_secs(10));

    let tello = cfg.link.tello_config().expect("socket addresses");
    assert_eq!(tello.drone_addr.port(), 8889);
    assert_eq!(tello.state_addr.port(), 8890);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "link": {
            "drone_addr": "10.0.0.7:8889",
            "retry_count": 3
        },
        "video": {
            "url": "stub://bench",
            "target_fps": 15
        },
        "detector": {
            "backend": "scripted",
            "script_path": "/tmp/trace.jsonl",
            "face_interval": 2
        },
        "confirm": {
            "marker_threshold": 12
        },
        "steering": {
            "yaw_deadband": 15.0,
            "limit": 60
        },
        "actions": {
            "mission_angle_deg": 90,
            "takeoff_pause_secs": 2.5
        },
        "heartbeat_secs": 8
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("PILOT_CONFIG", file.path());
    std::env::set_var("PILOT_VIDEO_URL", "stub://override");
    std::env::set_var("PILOT_HEARTBEAT_SECS", "4");
    std::env::set_var("PILOT_RESPONSE_TIMEOUT_MS", "250");

    let cfg = PilotConfig::load().expect("load config");

    assert_eq!(cfg.link.drone_addr, "10.0.0.7:8889");
    assert_eq!(cfg.link.retry_count, 3);
    assert_eq!(cfg.link.response_timeout, Duration::from_millis(250));
    assert_eq!(cfg.video.url, "stub://override");
    assert_eq!(cfg.video.target_fps, 15);
    assert_eq!(cfg.detector.backend.as_deref(), Some("scripted"));
    assert_eq!(
        cfg.detector.script_path.as_deref(),
        Some(std::path::Path::new("/tmp/trace.jsonl"))
    );
    assert_eq!(cfg.detector.face_interval, 2);
    assert_eq!(cfg.confirm.marker_threshold, 12);
    assert_eq!(cfg.confirm.qr_threshold, 5);
    assert_eq!(cfg.steering.yaw_deadband, 15.0);
    assert_eq!(cfg.steering.limit, 60);
    assert_eq!(cfg.steering.size_gain, 0.4);
    assert_eq!(cfg.actions.mission_angle_deg, 90);
    assert_eq!(cfg.actions.takeoff_pause, Duration::from_millis(2500));
    assert_eq!(cfg.actions.land_pause, Duration::from_secs(4));
    assert_eq!(cfg.heartbeat_interval, Duration::from_secs(4));

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
heartbeat_secs = 12

[confirm]
qr_threshold = 3

[actions]
hold_pause_secs = 1.0
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = PilotConfig::load_from(Some(file.path())).expect("load toml config");
    assert_eq!(cfg.heartbeat_interval, Duration::from_secs(12));
    assert_eq!(cfg.confirm.qr_threshold, 3);
    assert_eq!(cfg.actions.hold_pause, Duration::from_secs(1));
}

#[test]
fn detector_env_override_selects_backend() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PILOT_DETECTOR", "rqrr");
    let cfg = PilotConfig::load().expect("load config");
    assert_eq!(cfg.detector.backend.as_deref(), Some("rqrr"));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PILOT_DRONE_ADDR", "not-an-address");
    let err = PilotConfig::load().unwrap_err();
    assert!(err.to_string().contains("link.drone_addr"));
    clear_env();

    std::env::set_var("PILOT_HEARTBEAT_SECS", "soon");
    assert!(PilotConfig::load().is_err());
    clear_env();

    std::env::set_var("PILOT_HEARTBEAT_SECS", "0");
    assert!(PilotConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"confirm": {"marker_threshold": 0}}"#)
        .expect("write config");
    assert!(PilotConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"steering": {"size_gain": -1.0}}"#)
        .expect("write config");
    assert!(PilotConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"actions": {"hold_pause_secs": 1e30}}"#)
        .expect("write config");
    let err = PilotConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("actions.hold_pause_secs"));

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    let err = PilotConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));
}
