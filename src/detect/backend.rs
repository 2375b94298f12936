use std::fmt;

use anyhow::Result;
use serde::Deserialize;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Perception capabilities a backend can provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetectionCapability {
    Face,
    Marker,
    Qr,
}

impl fmt::Display for DetectionCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionCapability::Face => "face",
            DetectionCapability::Marker => "marker",
            DetectionCapability::Qr => "qr",
        };
        f.write_str(name)
    }
}

/// Perception primitive.
///
/// Implementations receive the normalized grayscale working frame and return
/// candidates in their own priority order; the first entry is treated as the
/// primary subject. Errors are transient: the caller treats them as an empty
/// result for that cycle.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
