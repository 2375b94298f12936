//! ArUco marker detection (feature `detect-marker`).
//!
//! Quad extraction, warping and bit sampling come from `aruco-rs`. The
//! dictionary is the 50-marker 4x4 set printed by common ArUco generators.

use std::sync::OnceLock;

use anyhow::Result;
use aruco_rs::core::detector::Detector;
use aruco_rs::core::dictionary::{Dictionary, DictionaryConfig};
use aruco_rs::cv::scalar::ScalarCV;
use aruco_rs::ImageBuffer;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, Region};
use crate::frame::Frame;

/// 4x4 / 50 marker codes. Row-major inner cells, first cell in the most
/// significant bit, white = 1.
static MARKER_4X4_50: DictionaryConfig = DictionaryConfig {
    n_bits: 16,
    // Accept at most one flipped cell.
    tau: 2,
    code_list: &[
        0xb532, 0x0f9a, 0x332d, 0x9946, 0x549e, 0x79cd, 0x9e2e, 0xc4f2, 0xfeda, 0xcf56, 0xf991,
        0x11a7, 0x0eb7, 0x2a0f, 0x24b1, 0x263e, 0x4665, 0x6600, 0x6c5e, 0x76af, 0x868b, 0xb02b,
        0xccd5, 0xdd82, 0xfe47, 0x9471, 0xace4, 0xa554, 0x2123, 0x346f, 0x4415, 0x57b2, 0x9ecf,
        0xf0cb, 0x08ae, 0x0929, 0x1875, 0x04ff, 0x0df6, 0x1c5a, 0x1718, 0x2a28, 0x328c, 0x38b2,
        0x24e8, 0x2eeb, 0x2d3f, 0x4b64, 0x502e, 0x5013,
    ],
};

fn dictionary() -> &'static Dictionary {
    static DICTIONARY: OnceLock<Dictionary> = OnceLock::new();
    DICTIONARY.get_or_init(|| Dictionary::new(&MARKER_4X4_50))
}

#[derive(Default)]
pub struct MarkerBackend {
    // The detector expects RGBA input.
    rgba: Vec<u8>,
    out_of_range: u64,
}

impl MarkerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded ids that did not fit `u32`. Always zero for this dictionary.
    pub fn out_of_range(&self) -> u64 {
        self.out_of_range
    }
}

impl DetectorBackend for MarkerBackend {
    fn name(&self) -> &'static str {
        "aruco"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::Marker)
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.rgba.clear();
        self.rgba.reserve(frame.pixels().len() * 4);
        for &luma in frame.pixels() {
            self.rgba.extend_from_slice(&[luma, luma, luma, 255]);
        }
        let image = ImageBuffer {
            data: &self.rgba,
            width: frame.width(),
            height: frame.height(),
        };

        let detector = Detector::new(dictionary(), ScalarCV);
        let mut detections = Vec::new();
        for marker in detector.detect(&image) {
            let Ok(id) = u32::try_from(marker.id) else {
                self.out_of_range += 1;
                continue;
            };
            let corners: Vec<(i32, i32)> = marker
                .corners
                .iter()
                .map(|corner| (corner.x.round() as i32, corner.y.round() as i32))
                .collect();
            log::trace!(
                "marker {} at {:?} ({} corrected cells)",
                id,
                corners.first(),
                marker.hamming_distance
            );
            detections.push(Detection::marker(id, Region::from_points(&corners)));
        }
        Ok(detections)
    }
}
