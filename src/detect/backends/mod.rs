#[cfg(feature = "detect-face")]
pub mod face;
#[cfg(feature = "detect-marker")]
pub mod marker;
#[cfg(feature = "detect-qr")]
pub mod qr;
pub mod scripted;

#[cfg(feature = "detect-face")]
pub use face::FaceBackend;
#[cfg(feature = "detect-marker")]
pub use marker::MarkerBackend;
#[cfg(feature = "detect-qr")]
pub use qr::QrBackend;
pub use scripted::{ScriptedBackend, ScriptedCycle};

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::backend::{DetectionCapability, DetectorBackend};

/// Build the backend named in the settings, or the default backend for the
/// capability when no name is given.
pub fn build_backend(
    settings: &DetectorSettings,
    capability: DetectionCapability,
) -> Result<Box<dyn DetectorBackend>> {
    let name = match settings.backend.as_deref() {
        Some(name) => name,
        None => default_backend_name(capability),
    };

    let backend: Box<dyn DetectorBackend> = match name {
        "scripted" => {
            let path = settings
                .script_path
                .as_deref()
                .ok_or_else(|| anyhow!("scripted detector requires a trace path (--script)"))?;
            Box::new(ScriptedBackend::from_path(path)?)
        }
        "rustface" => build_face(settings)?,
        "rqrr" => build_qr()?,
        "aruco" => build_marker()?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };

    if !backend.supports(capability) {
        return Err(anyhow!(
            "detector backend '{}' does not support {} detection",
            backend.name(),
            capability
        ));
    }
    Ok(backend)
}

fn default_backend_name(capability: DetectionCapability) -> &'static str {
    match capability {
        DetectionCapability::Face => "rustface",
        DetectionCapability::Qr => "rqrr",
        DetectionCapability::Marker => "aruco",
    }
}

#[cfg(feature = "detect-face")]
fn build_face(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let path = settings
        .model_path
        .as_deref()
        .ok_or_else(|| anyhow!("rustface detector requires detector.model_path"))?;
    Ok(Box::new(FaceBackend::from_model(path)?))
}

#[cfg(not(feature = "detect-face"))]
fn build_face(_settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("face detection requires the detect-face feature"))
}

#[cfg(feature = "detect-qr")]
fn build_qr() -> Result<Box<dyn DetectorBackend>> {
    Ok(Box::new(QrBackend::new()))
}

#[cfg(not(feature = "detect-qr"))]
fn build_qr() -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("qr detection requires the detect-qr feature"))
}

#[cfg(feature = "detect-marker")]
fn build_marker() -> Result<Box<dyn DetectorBackend>> {
    Ok(Box::new(MarkerBackend::new()))
}

#[cfg(not(feature = "detect-marker"))]
fn build_marker() -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("marker detection requires the detect-marker feature"))
}
