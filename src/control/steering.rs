use serde::Serialize;

use crate::detect::Region;

/// Velocity command in the vehicle's `rc` convention, each axis in
/// `[-limit, limit]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Velocity {
    pub left_right: i32,
    pub forward_back: i32,
    pub up_down: i32,
    pub yaw: i32,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        left_right: 0,
        forward_back: 0,
        up_down: 0,
        yaw: 0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Offset of the tracked target from the reference pose, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteeringError {
    pub dx: f64,
    pub dy: f64,
    pub dsize: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SteeringConfig {
    /// Gain applied to horizontal and vertical pixel offsets.
    pub lateral_gain: f64,
    pub vertical_gain: f64,
    /// Gain applied to the target width offset (distance proxy).
    pub size_gain: f64,
    pub yaw_deadband: f64,
    pub forward_deadband: f64,
    pub vertical_deadband: f64,
    pub limit: i32,
    /// Where the target center should sit, in working-frame pixels.
    pub reference_x: f64,
    pub reference_y: f64,
    /// Target width at the desired distance.
    pub reference_width: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            lateral_gain: 0.3,
            vertical_gain: 0.3,
            size_gain: 0.4,
            yaw_deadband: 20.0,
            forward_deadband: 10.0,
            vertical_deadband: 30.0,
            limit: 100,
            reference_x: 240.0,
            reference_y: 180.0,
            reference_width: 80.0,
        }
    }
}

/// Proportional controller turning a target offset into a bounded velocity.
///
/// Only yaw, forward/back and up/down are driven. Left/right stays at zero:
/// horizontal offset is corrected by turning, not by strafing.
#[derive(Clone, Debug)]
pub struct SteeringController {
    config: SteeringConfig,
}

impl SteeringController {
    pub fn new(config: SteeringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Error of a detected region against the configured reference.
    pub fn error_for(&self, region: &Region) -> SteeringError {
        let (cx, cy) = region.center();
        SteeringError {
            dx: self.config.reference_x - f64::from(cx),
            dy: self.config.reference_y - f64::from(cy),
            dsize: self.config.reference_width - f64::from(region.width),
        }
    }

    pub fn compute(&self, error: SteeringError) -> Velocity {
        let cfg = &self.config;
        // Image x grows to the right while positive yaw turns clockwise.
        let yaw = -(cfg.lateral_gain * error.dx);
        let forward = cfg.size_gain * error.dsize;
        let vertical = cfg.vertical_gain * error.dy;

        Velocity {
            left_right: 0,
            forward_back: self.shape(forward, cfg.forward_deadband),
            up_down: self.shape(vertical, cfg.vertical_deadband),
            yaw: self.shape(yaw, cfg.yaw_deadband),
        }
    }

    fn shape(&self, scaled: f64, deadband: f64) -> i32 {
        if scaled.is_nan() || scaled.abs() < deadband {
            return 0;
        }
        let limit = f64::from(self.config.limit.abs());
        scaled.clamp(-limit, limit).trunc() as i32
    }
}

impl Default for SteeringController {
    fn default() -> Self {
        Self::new(SteeringConfig::default())
    }
}
