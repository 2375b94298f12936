use anyhow::{anyhow, Result};

use super::{CameraDirection, MoveDirection, Rotation, Telemetry, VehicleLink, SDK_V3};
use crate::control::Velocity;

/// Command as observed by a `SimulatedLink`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkCommand {
    Connect,
    StartVideo,
    StopVideo,
    Takeoff,
    Land,
    Move(MoveDirection, u32),
    Rotate(Rotation, u32),
    Velocity(Velocity),
    Keepalive,
    SdkVersion,
    Motors(bool),
    Camera(CameraDirection),
}

/// In-process stand-in for the vehicle.
///
/// Records every command in order. When `failing` is set, every command is
/// still recorded but reported as a link error, which is how a dead radio
/// link looks to the control loop.
#[derive(Debug)]
pub struct SimulatedLink {
    commands: Vec<LinkCommand>,
    telemetry: Option<Telemetry>,
    sdk_version: String,
    failing: bool,
    echo: bool,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            telemetry: None,
            sdk_version: SDK_V3.to_string(),
            failing: false,
            echo: false,
        }
    }

    /// Log every command at info level (dry-run mode).
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn with_sdk_version(mut self, version: &str) -> Self {
        self.sdk_version = version.to_string();
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn commands(&self) -> &[LinkCommand] {
        &self.commands
    }

    /// Commands other than velocity and keepalive.
    pub fn motion_commands(&self) -> Vec<&LinkCommand> {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    LinkCommand::Takeoff
                        | LinkCommand::Land
                        | LinkCommand::Move(..)
                        | LinkCommand::Rotate(..)
                )
            })
            .collect()
    }

    pub fn count(&self, wanted: &LinkCommand) -> usize {
        self.commands.iter().filter(|c| *c == wanted).count()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    fn record(&mut self, command: LinkCommand) -> Result<()> {
        if self.echo {
            log::info!("sim link <- {:?}", command);
        }
        self.commands.push(command);
        if self.failing {
            return Err(anyhow!("simulated link is down"));
        }
        Ok(())
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleLink for SimulatedLink {
    fn connect(&mut self) -> Result<()> {
        self.record(LinkCommand::Connect)
    }

    fn start_video(&mut self) -> Result<()> {
        self.record(LinkCommand::StartVideo)
    }

    fn stop_video(&mut self) -> Result<()> {
        self.record(LinkCommand::StopVideo)
    }

    fn takeoff(&mut self) -> Result<()> {
        self.record(LinkCommand::Takeoff)
    }

    fn land(&mut self) -> Result<()> {
        self.record(LinkCommand::Land)
    }

    fn move_by(&mut self, direction: MoveDirection, cm: u32) -> Result<()> {
        self.record(LinkCommand::Move(direction, cm))
    }

    fn rotate(&mut self, rotation: Rotation, degrees: u32) -> Result<()> {
        self.record(LinkCommand::Rotate(rotation, degrees))
    }

    fn set_velocity(&mut self, velocity: Velocity) -> Result<()> {
        self.record(LinkCommand::Velocity(velocity))
    }

    fn send_keepalive(&mut self) -> Result<()> {
        self.record(LinkCommand::Keepalive)
    }

    fn query_state(&self) -> Option<Telemetry> {
        self.telemetry.clone()
    }

    fn sdk_version(&mut self) -> Result<String> {
        self.record(LinkCommand::SdkVersion)?;
        Ok(self.sdk_version.clone())
    }

    fn set_motors(&mut self, on: bool) -> Result<()> {
        self.record(LinkCommand::Motors(on))
    }

    fn set_camera(&mut self, direction: CameraDirection) -> Result<()> {
        self.record(LinkCommand::Camera(direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_commands_skip_velocity_and_housekeeping() {
        let mut link = SimulatedLink::default();
        link.connect().unwrap();
        link.takeoff().unwrap();
        link.set_velocity(Velocity::default()).unwrap();
        link.send_keepalive().unwrap();
        link.rotate(Rotation::Clockwise, 30).unwrap();
        link.move_by(MoveDirection::Up, 50).unwrap();
        link.land().unwrap();

        assert_eq!(
            link.motion_commands(),
            vec![
                &LinkCommand::Takeoff,
                &LinkCommand::Rotate(Rotation::Clockwise, 30),
                &LinkCommand::Move(MoveDirection::Up, 50),
                &LinkCommand::Land,
            ]
        );
        assert_eq!(link.commands().len(), 7);
    }

    #[test]
    fn failing_link_still_records() {
        let mut link = SimulatedLink::new();
        link.set_failing(true);
        assert!(link.land().is_err());
        assert_eq!(link.count(&LinkCommand::Land), 1);
    }
}
