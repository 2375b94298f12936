//! QR grid detection and decoding (feature `detect-qr`).

use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, Region};
use crate::frame::Frame;

#[derive(Default)]
pub struct QrBackend {
    undecodable: u64,
}

impl QrBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grids that were located but failed to decode.
    pub fn undecodable(&self) -> u64 {
        self.undecodable
    }
}

impl DetectorBackend for QrBackend {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::Qr)
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let width = frame.width() as usize;
        let pixels = frame.pixels();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, frame.height() as usize, |x, y| {
                pixels[y * width + x]
            });

        let mut detections = Vec::new();
        for grid in prepared.detect_grids() {
            let corners: Vec<(i32, i32)> = grid.bounds.iter().map(|p| (p.x, p.y)).collect();
            match grid.decode() {
                Ok((_meta, text)) if !text.is_empty() => {
                    detections.push(Detection::payload(text, Region::from_points(&corners)));
                }
                Ok(_) => {}
                Err(err) => {
                    self.undecodable += 1;
                    log::debug!("qr grid at {:?} not decodable: {}", corners.first(), err);
                }
            }
        }
        Ok(detections)
    }
}
