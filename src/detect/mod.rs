mod adapter;
mod backend;
pub mod backends;
mod result;

pub use adapter::DetectorAdapter;
pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::{build_backend, ScriptedBackend, ScriptedCycle};
pub use result::{Detection, Identity, Region};
