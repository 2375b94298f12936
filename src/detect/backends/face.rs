//! SeetaFace frontal face detector (feature `detect-face`).

use std::path::Path;

use anyhow::{anyhow, Result};
use rustface::{Detector, ImageData};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, Region};
use crate::frame::Frame;
use crate::ingest::normalize::equalize_histogram;

/// Smallest face the detector will report, in working-frame pixels.
const MIN_FACE_SIZE: u32 = 20;

pub struct FaceBackend {
    detector: Box<dyn Detector>,
}

impl FaceBackend {
    pub fn from_model(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("face model path is not valid UTF-8"))?;
        let mut detector = rustface::create_detector(path_str)
            .map_err(|e| anyhow!("failed to load face model {}: {}", path.display(), e))?;
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);
        Ok(Self { detector })
    }
}

impl DetectorBackend for FaceBackend {
    fn name(&self) -> &'static str {
        "rustface"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::Face)
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let equalized = equalize_histogram(frame.pixels());
        let mut image = ImageData::new(&equalized, frame.width(), frame.height());
        let faces = self.detector.detect(&mut image);
        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Detection::face(Region {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                })
            })
            .collect())
    }
}
