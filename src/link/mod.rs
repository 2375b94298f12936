//! Vehicle link: the only way the control loop talks to the aircraft.
//!
//! `VehicleLink` is the seam between the pipeline and the transport. The
//! pipeline never retries or waits on acknowledgements itself; each call
//! returns once the link has done what its own policy allows, and errors are
//! reported to the caller as plain `anyhow` errors that the cycle driver logs
//! and moves past.

mod sim;
mod telemetry;
mod tello;

use std::fmt;

use anyhow::Result;

use crate::control::Velocity;

pub use sim::{LinkCommand, SimulatedLink};
pub use telemetry::Telemetry;
pub use tello::{TelloConfig, TelloLink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl MoveDirection {
    /// SDK verb for this direction.
    pub fn verb(&self) -> &'static str {
        match self {
            MoveDirection::Up => "up",
            MoveDirection::Down => "down",
            MoveDirection::Left => "left",
            MoveDirection::Right => "right",
            MoveDirection::Forward => "forward",
            MoveDirection::Back => "back",
        }
    }
}

impl fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

impl Rotation {
    pub fn verb(&self) -> &'static str {
        match self {
            Rotation::Clockwise => "cw",
            Rotation::CounterClockwise => "ccw",
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CameraDirection {
    #[default]
    Forward,
    Downward,
}

impl CameraDirection {
    pub fn toggled(self) -> Self {
        match self {
            CameraDirection::Forward => CameraDirection::Downward,
            CameraDirection::Downward => CameraDirection::Forward,
        }
    }
}

/// Operations the control loop needs from the vehicle.
pub trait VehicleLink {
    /// Enter command mode.
    fn connect(&mut self) -> Result<()>;

    fn start_video(&mut self) -> Result<()>;

    fn stop_video(&mut self) -> Result<()>;

    fn takeoff(&mut self) -> Result<()>;

    fn land(&mut self) -> Result<()>;

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<()>;

    fn rotate(&mut self, rotation: Rotation, degrees: u32) -> Result<()>;

    /// Continuous velocity command. Fire-and-forget.
    fn set_velocity(&mut self, velocity: Velocity) -> Result<()>;

    /// No-op message keeping the vehicle from timing the session out.
    fn send_keepalive(&mut self) -> Result<()>;

    /// Latest telemetry snapshot, if any has arrived.
    fn query_state(&self) -> Option<Telemetry>;

    fn sdk_version(&mut self) -> Result<String>;

    fn set_motors(&mut self, on: bool) -> Result<()>;

    fn set_camera(&mut self, direction: CameraDirection) -> Result<()>;
}

/// SDK version that supports motor and camera switching.
pub const SDK_V3: &str = "30";
