use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::{ActionSettings, SteeringConfig};
use crate::ingest::normalize::WorkingGeometry;
use crate::link::TelloConfig;

const DEFAULT_DRONE_ADDR: &str = "192.168.10.1:8889";
const DEFAULT_LOCAL_ADDR: &str = "0.0.0.0:8889";
const DEFAULT_STATE_ADDR: &str = "0.0.0.0:8890";
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_RETRY_COUNT: u32 = 1;
const DEFAULT_VIDEO_URL: &str = "udp://0.0.0.0:11111";
const DEFAULT_VIDEO_FPS: u32 = 30;
const DEFAULT_FACE_INTERVAL: u32 = 5;
const DEFAULT_MARKER_THRESHOLD: u32 = 30;
const DEFAULT_QR_THRESHOLD: u32 = 5;
const DEFAULT_HEARTBEAT_SECS: u64 = 10;
const DEFAULT_FRAME_WAIT_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct PilotConfigFile {
    link: Option<LinkConfigFile>,
    video: Option<VideoConfigFile>,
    detector: Option<DetectorConfigFile>,
    confirm: Option<ConfirmConfigFile>,
    steering: Option<SteeringConfigFile>,
    actions: Option<ActionConfigFile>,
    heartbeat_secs: Option<u64>,
    frame_wait_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LinkConfigFile {
    drone_addr: Option<String>,
    local_addr: Option<String>,
    state_addr: Option<String>,
    response_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    retry_count: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    face_interval: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfirmConfigFile {
    marker_threshold: Option<u32>,
    qr_threshold: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SteeringConfigFile {
    lateral_gain: Option<f64>,
    vertical_gain: Option<f64>,
    size_gain: Option<f64>,
    yaw_deadband: Option<f64>,
    forward_deadband: Option<f64>,
    vertical_deadband: Option<f64>,
    limit: Option<i32>,
    reference_x: Option<f64>,
    reference_y: Option<f64>,
    reference_width: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ActionConfigFile {
    manual_distance_cm: Option<u32>,
    manual_angle_deg: Option<u32>,
    marker_distance_cm: Option<u32>,
    marker_angle_deg: Option<u32>,
    mission_distance_cm: Option<u32>,
    mission_angle_deg: Option<u32>,
    takeoff_pause_secs: Option<f64>,
    land_pause_secs: Option<f64>,
    hold_pause_secs: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub link: LinkSettings,
    pub video: VideoSettings,
    pub detector: DetectorSettings,
    pub confirm: ConfirmSettings,
    pub steering: SteeringConfig,
    pub actions: ActionSettings,
    pub heartbeat_interval: Duration,
    /// Longest the driver waits for a new frame before running the
    /// housekeeping part of a cycle anyway.
    pub frame_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub drone_addr: String,
    pub local_addr: String,
    pub state_addr: String,
    pub response_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry_count: u32,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub url: String,
    pub target_fps: u32,
    /// Working frame size the detector and steering reference operate in.
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Backend name; `None` picks the default for the perception mode.
    pub backend: Option<String>,
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    /// Face detection runs on every n-th cycle.
    pub face_interval: u32,
}

/// Consecutive-sighting thresholds per perception mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmSettings {
    pub marker_threshold: u32,
    pub qr_threshold: u32,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            link: LinkSettings::default(),
            video: VideoSettings::default(),
            detector: DetectorSettings::default(),
            confirm: ConfirmSettings::default(),
            steering: SteeringConfig::default(),
            actions: ActionSettings::default(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            frame_wait: Duration::from_millis(DEFAULT_FRAME_WAIT_MS),
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            drone_addr: DEFAULT_DRONE_ADDR.to_string(),
            local_addr: DEFAULT_LOCAL_ADDR.to_string(),
            state_addr: DEFAULT_STATE_ADDR.to_string(),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        let geometry = WorkingGeometry::default();
        Self {
            url: DEFAULT_VIDEO_URL.to_string(),
            target_fps: DEFAULT_VIDEO_FPS,
            width: geometry.width,
            height: geometry.height,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: None,
            model_path: None,
            script_path: None,
            face_interval: DEFAULT_FACE_INTERVAL,
        }
    }
}

impl Default for ConfirmSettings {
    fn default() -> Self {
        Self {
            marker_threshold: DEFAULT_MARKER_THRESHOLD,
            qr_threshold: DEFAULT_QR_THRESHOLD,
        }
    }
}

impl LinkSettings {
    pub fn tello_config(&self) -> Result<TelloConfig> {
        Ok(TelloConfig {
            drone_addr: parse_addr("link.drone_addr", &self.drone_addr)?,
            local_addr: parse_addr("link.local_addr", &self.local_addr)?,
            state_addr: parse_addr("link.state_addr", &self.state_addr)?,
            response_timeout: self.response_timeout,
            connect_timeout: self.connect_timeout,
            retry_count: self.retry_count,
        })
    }
}

impl VideoSettings {
    pub fn working_geometry(&self) -> WorkingGeometry {
        WorkingGeometry {
            width: self.width,
            height: self.height,
        }
    }
}

impl PilotConfig {
    /// Load from the file named by `PILOT_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PILOT_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Same as `load` with an explicit config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PilotConfigFile) -> Result<Self> {
        let defaults = PilotConfig::default();

        let link = file.link.unwrap_or_default();
        let link = LinkSettings {
            drone_addr: link.drone_addr.unwrap_or(defaults.link.drone_addr),
            local_addr: link.local_addr.unwrap_or(defaults.link.local_addr),
            state_addr: link.state_addr.unwrap_or(defaults.link.state_addr),
            response_timeout: link
                .response_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.link.response_timeout),
            connect_timeout: link
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.link.connect_timeout),
            retry_count: link.retry_count.unwrap_or(defaults.link.retry_count),
        };

        let video = file.video.unwrap_or_default();
        let video = VideoSettings {
            url: video.url.unwrap_or(defaults.video.url),
            target_fps: video.target_fps.unwrap_or(defaults.video.target_fps),
            width: video.width.unwrap_or(defaults.video.width),
            height: video.height.unwrap_or(defaults.video.height),
        };

        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector.backend,
            model_path: detector.model_path,
            script_path: detector.script_path,
            face_interval: detector
                .face_interval
                .unwrap_or(defaults.detector.face_interval),
        };

        let confirm = file.confirm.unwrap_or_default();
        let confirm = ConfirmSettings {
            marker_threshold: confirm
                .marker_threshold
                .unwrap_or(defaults.confirm.marker_threshold),
            qr_threshold: confirm
                .qr_threshold
                .unwrap_or(defaults.confirm.qr_threshold),
        };

        let steering = file.steering.unwrap_or_default();
        let base = defaults.steering;
        let steering = SteeringConfig {
            lateral_gain: steering.lateral_gain.unwrap_or(base.lateral_gain),
            vertical_gain: steering.vertical_gain.unwrap_or(base.vertical_gain),
            size_gain: steering.size_gain.unwrap_or(base.size_gain),
            yaw_deadband: steering.yaw_deadband.unwrap_or(base.yaw_deadband),
            forward_deadband: steering.forward_deadband.unwrap_or(base.forward_deadband),
            vertical_deadband: steering
                .vertical_deadband
                .unwrap_or(base.vertical_deadband),
            limit: steering.limit.unwrap_or(base.limit),
            reference_x: steering.reference_x.unwrap_or(base.reference_x),
            reference_y: steering.reference_y.unwrap_or(base.reference_y),
            reference_width: steering.reference_width.unwrap_or(base.reference_width),
        };

        let actions = file.actions.unwrap_or_default();
        let base = defaults.actions;
        let actions = ActionSettings {
            manual_distance_cm: actions.manual_distance_cm.unwrap_or(base.manual_distance_cm),
            manual_angle_deg: actions.manual_angle_deg.unwrap_or(base.manual_angle_deg),
            marker_distance_cm: actions.marker_distance_cm.unwrap_or(base.marker_distance_cm),
            marker_angle_deg: actions.marker_angle_deg.unwrap_or(base.marker_angle_deg),
            mission_distance_cm: actions
                .mission_distance_cm
                .unwrap_or(base.mission_distance_cm),
            mission_angle_deg: actions.mission_angle_deg.unwrap_or(base.mission_angle_deg),
            takeoff_pause: seconds("actions.takeoff_pause_secs", actions.takeoff_pause_secs)?
                .unwrap_or(base.takeoff_pause),
            land_pause: seconds("actions.land_pause_secs", actions.land_pause_secs)?
                .unwrap_or(base.land_pause),
            hold_pause: seconds("actions.hold_pause_secs", actions.hold_pause_secs)?
                .unwrap_or(base.hold_pause),
        };

        Ok(Self {
            link,
            video,
            detector,
            confirm,
            steering,
            actions,
            heartbeat_interval: file
                .heartbeat_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            frame_wait: file
                .frame_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_wait),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("PILOT_DRONE_ADDR") {
            if !addr.trim().is_empty() {
                self.link.drone_addr = addr.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("PILOT_VIDEO_URL") {
            if !url.trim().is_empty() {
                self.video.url = url.trim().to_string();
            }
        }
        if let Ok(backend) = std::env::var("PILOT_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = Some(backend.trim().to_string());
            }
        }
        if let Ok(secs) = std::env::var("PILOT_HEARTBEAT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                anyhow!("PILOT_HEARTBEAT_SECS must be an integer number of seconds")
            })?;
            self.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Ok(ms) = std::env::var("PILOT_RESPONSE_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                anyhow!("PILOT_RESPONSE_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.link.response_timeout = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.link.tello_config()?;
        if self.link.response_timeout.is_zero() {
            return Err(anyhow!("link.response_timeout_ms must be greater than zero"));
        }
        if self.link.connect_timeout.is_zero() {
            return Err(anyhow!("link.connect_timeout_ms must be greater than zero"));
        }
        if self.video.url.trim().is_empty() {
            return Err(anyhow!("video.url must not be empty"));
        }
        if self.video.target_fps == 0 {
            return Err(anyhow!("video.target_fps must be greater than zero"));
        }
        if self.video.width == 0 || self.video.height == 0 {
            return Err(anyhow!("video.width and video.height must be greater than zero"));
        }
        if self.detector.face_interval == 0 {
            return Err(anyhow!("detector.face_interval must be greater than zero"));
        }
        if self.confirm.marker_threshold == 0 || self.confirm.qr_threshold == 0 {
            return Err(anyhow!("confirm thresholds must be greater than zero"));
        }
        if self.steering.limit <= 0 {
            return Err(anyhow!("steering.limit must be greater than zero"));
        }
        let gains = [
            ("steering.lateral_gain", self.steering.lateral_gain),
            ("steering.vertical_gain", self.steering.vertical_gain),
            ("steering.size_gain", self.steering.size_gain),
            ("steering.yaw_deadband", self.steering.yaw_deadband),
            ("steering.forward_deadband", self.steering.forward_deadband),
            ("steering.vertical_deadband", self.steering.vertical_deadband),
        ];
        for (key, value) in gains {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("{} must be a finite non-negative number", key));
            }
        }
        if self.heartbeat_interval.is_zero() {
            return Err(anyhow!("heartbeat interval must be greater than zero"));
        }
        if self.frame_wait.is_zero() {
            return Err(anyhow!("frame_wait_ms must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PilotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} is not a socket address: '{}'", key, value))
}

fn seconds(key: &str, value: Option<f64>) -> Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative number of seconds, got {}", key, secs)),
    }
}
