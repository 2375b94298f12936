use std::fmt;
use std::time::Duration;

use anyhow::Result;

use crate::link::{MoveDirection, Rotation, VehicleLink};

/// A discrete vehicle action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Takeoff,
    Land,
    Move(MoveDirection, u32),
    Rotate(Rotation, u32),
    /// Keep position; nothing is sent to the vehicle.
    Hold,
}

impl Action {
    /// Send the action to the vehicle.
    pub fn dispatch(&self, link: &mut dyn VehicleLink) -> Result<()> {
        match *self {
            Action::Takeoff => link.takeoff(),
            Action::Land => link.land(),
            Action::Move(direction, cm) => link.move_by(direction, cm),
            Action::Rotate(rotation, degrees) => link.rotate(rotation, degrees),
            Action::Hold => Ok(()),
        }
    }

    pub fn moves_vehicle(&self) -> bool {
        !matches!(self, Action::Hold)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Takeoff => write!(f, "takeoff"),
            Action::Land => write!(f, "land"),
            Action::Move(direction, cm) => write!(f, "{} {}cm", direction, cm),
            Action::Rotate(rotation, degrees) => write!(f, "{} {}deg", rotation, degrees),
            Action::Hold => write!(f, "hold"),
        }
    }
}

/// Step sizes and settle pauses used when building actions.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionSettings {
    pub manual_distance_cm: u32,
    pub manual_angle_deg: u32,
    pub marker_distance_cm: u32,
    pub marker_angle_deg: u32,
    pub mission_distance_cm: u32,
    pub mission_angle_deg: u32,
    pub takeoff_pause: Duration,
    pub land_pause: Duration,
    pub hold_pause: Duration,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            manual_distance_cm: 30,
            manual_angle_deg: 30,
            marker_distance_cm: 30,
            marker_angle_deg: 30,
            mission_distance_cm: 50,
            mission_angle_deg: 45,
            takeoff_pause: Duration::from_secs(5),
            land_pause: Duration::from_secs(4),
            hold_pause: Duration::from_secs(5),
        }
    }
}

/// One decoded mission code: the action plus how long to wait after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissionCommand {
    pub code: char,
    pub action: Action,
    pub pause: Option<Duration>,
}

impl ActionSettings {
    /// Action bound to a marker id. Marker actions never pause.
    pub fn marker_action(&self, id: u32) -> Option<Action> {
        let cm = self.marker_distance_cm;
        let deg = self.marker_angle_deg;
        let action = match id {
            0 => Action::Takeoff,
            1 => Action::Land,
            2 => Action::Move(MoveDirection::Up, cm),
            3 => Action::Move(MoveDirection::Down, cm),
            4 => Action::Rotate(Rotation::CounterClockwise, deg),
            5 => Action::Rotate(Rotation::Clockwise, deg),
            6 => Action::Move(MoveDirection::Forward, cm),
            7 => Action::Move(MoveDirection::Back, cm),
            8 => Action::Move(MoveDirection::Left, cm),
            9 => Action::Move(MoveDirection::Right, cm),
            _ => return None,
        };
        Some(action)
    }

    /// Decode one mission code. Unknown codes yield `None`.
    pub fn mission_command(&self, code: char) -> Option<MissionCommand> {
        let cm = self.mission_distance_cm;
        let deg = self.mission_angle_deg;
        let (action, pause) = match code {
            'T' => (Action::Takeoff, Some(self.takeoff_pause)),
            'L' => (Action::Land, Some(self.land_pause)),
            'u' => (Action::Move(MoveDirection::Up, cm), None),
            'd' => (Action::Move(MoveDirection::Down, cm), None),
            'c' => (Action::Rotate(Rotation::CounterClockwise, deg), None),
            'w' => (Action::Rotate(Rotation::Clockwise, deg), None),
            'f' => (Action::Move(MoveDirection::Forward, cm), None),
            'b' => (Action::Move(MoveDirection::Back, cm), None),
            'l' => (Action::Move(MoveDirection::Left, cm), None),
            'r' => (Action::Move(MoveDirection::Right, cm), None),
            'W' => (Action::Hold, Some(self.hold_pause)),
            _ => return None,
        };
        Some(MissionCommand {
            code,
            action,
            pause,
        })
    }
}
