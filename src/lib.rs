//! Tello Pilot
//!
//! Vision-driven control loop for a small quadrotor speaking the Tello SDK
//! text protocol.
//!
//! # Architecture
//!
//! Each video frame runs through one cycle:
//!
//! 1. **Perceive**: normalize the frame and ask the detector for at most one
//!    primary candidate (a face, a fiducial marker or a QR payload).
//! 2. **Decide**: faces feed the proportional steering controller; marker
//!    and QR identities must be seen on enough consecutive frames before they
//!    count as confirmed.
//! 3. **Act**: confirmed markers dispatch one discrete action, confirmed QR
//!    payloads start a mission that plays one code per cycle, and steering
//!    sends a continuous velocity.
//! 4. **Keep alive**: a periodic no-op stops the vehicle from dropping the
//!    session.
//!
//! # Module Structure
//!
//! - `control`: debouncer, steering controller, mission interpreter, heartbeat
//! - `detect`: detector backends and the per-cycle adapter
//! - `frame` / `ingest`: frame hand-off, video sources, pixel normalization
//! - `link`: vehicle link trait, UDP implementation, simulated vehicle
//! - `operator`: console keys
//! - `pilot`: the cycle driver

pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod link;
pub mod operator;
pub mod pilot;

pub use config::PilotConfig;
pub use detect::{Detection, DetectionCapability, Identity, Region};
pub use frame::{Frame, FrameReader, FrameSlot};
pub use link::{SimulatedLink, TelloLink, VehicleLink};
pub use operator::OperatorCommand;
pub use pilot::{CancelToken, CycleReport, OperatingMode, Pilot, PilotStats};
