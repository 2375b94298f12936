//! Control core: confirmation, steering, mission playback and keepalive.
//!
//! Everything here is pure state and arithmetic. Nothing in this module
//! touches the network or the clock directly; callers pass `Instant`s in,
//! which keeps every component deterministic under test.

mod action;
mod debounce;
mod heartbeat;
mod mission;
mod steering;

pub use action::{Action, ActionSettings, MissionCommand};
pub use debounce::{Confirmed, Debouncer};
pub use heartbeat::Heartbeat;
pub use mission::{MissionInterpreter, MissionProgram, MissionStep};
pub use steering::{SteeringConfig, SteeringController, SteeringError, Velocity};
