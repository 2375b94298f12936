//! Pixel conversions applied before perception.
//!
//! The control law is tuned in working-frame pixels (480x360 by default), so
//! every source is reduced to grayscale and resampled to that size, and the
//! downward camera image is rotated so that "up" is the vehicle's forward.

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub fn rgb_to_gray(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    Ok(pixels
        .chunks_exact(3)
        .map(|px| {
            let luma =
                0.299_f32 * px[0] as f32 + 0.587_f32 * px[1] as f32 + 0.114_f32 * px[2] as f32;
            clamp_to_u8(luma)
        })
        .collect())
}

/// Nearest-neighbour resample.
pub fn resize_nearest(
    pixels: &[u8],
    width: u32,
    height: u32,
    to_width: u32,
    to_height: u32,
) -> Vec<u8> {
    if width == to_width && height == to_height {
        return pixels.to_vec();
    }
    let (w, h) = (width as usize, height as usize);
    let (tw, th) = (to_width as usize, to_height as usize);
    if w == 0 || h == 0 {
        return vec![0u8; tw * th];
    }
    let mut out = Vec::with_capacity(tw * th);
    for j in 0..th {
        let src_y = (j * h / th).min(h.saturating_sub(1));
        let row = &pixels[src_y * w..src_y * w + w];
        for i in 0..tw {
            let src_x = (i * w / tw).min(w.saturating_sub(1));
            out.push(row[src_x]);
        }
    }
    out
}

/// Rotate 90 degrees clockwise. The result is `height` wide and `width` tall.
pub fn rotate_clockwise(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            // Source (x, y) lands at column h-1-y, row x.
            out[x * h + (h - 1 - y)] = pixels[y * w + x];
        }
    }
    out
}

/// Global histogram equalization.
pub fn equalize_histogram(pixels: &[u8]) -> Vec<u8> {
    let mut histogram = [0u32; 256];
    for &p in pixels {
        histogram[p as usize] += 1;
    }
    let total = pixels.len() as u32;
    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (bin, count) in histogram.iter().enumerate() {
        running += count;
        cdf[bin] = running;
    }
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return pixels.to_vec();
    }
    let scale = 255.0 / (total - cdf_min) as f32;
    let lut: Vec<u8> = cdf
        .iter()
        .map(|&c| clamp_to_u8(c.saturating_sub(cdf_min) as f32 * scale))
        .collect();
    pixels.iter().map(|&p| lut[p as usize]).collect()
}

/// Working-frame geometry for the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkingGeometry {
    pub width: u32,
    pub height: u32,
}

impl WorkingGeometry {
    /// Resize to the working size, then rotate for the downward camera.
    pub fn apply(&self, frame: &Frame, downward: bool) -> Result<Frame> {
        let resized = resize_nearest(
            frame.pixels(),
            frame.width(),
            frame.height(),
            self.width,
            self.height,
        );
        if downward {
            let rotated = rotate_clockwise(&resized, self.width, self.height);
            Frame::new(rotated, self.height, self.width, frame.sequence())
        } else {
            Frame::new(resized, self.width, self.height, frame.sequence())
        }
    }
}

impl Default for WorkingGeometry {
    fn default() -> Self {
        Self {
            width: 480,
            height: 360,
        }
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
