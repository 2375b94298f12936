//! Synthetic frame source (`stub://`).
//!
//! Produces an endless, slowly shifting gradient at the vehicle camera's
//! native size and paces itself to the configured frame rate. Nothing in the
//! image is meant to be detected; it exercises the video path while a
//! scripted detector supplies the perception results.

use std::time::{Duration, Instant};

use anyhow::Result;

use super::FrameSource;
use crate::frame::Frame;

pub const SYNTHETIC_WIDTH: u32 = 960;
pub const SYNTHETIC_HEIGHT: u32 = 720;

pub struct SyntheticSource {
    url: String,
    frame_interval: Duration,
    frame_count: u64,
    scene_state: u8,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(url: &str, target_fps: u32) -> Self {
        let fps = u64::from(target_fps.max(1));
        Self {
            url: url.to_string(),
            frame_interval: Duration::from_millis(1000 / fps),
            frame_count: 0,
            scene_state: 0,
            next_due: None,
        }
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let width = SYNTHETIC_WIDTH as u64;
        let offset = self.frame_count + u64::from(self.scene_state);
        (0..(SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT) as u64)
            .map(|i| ((i % width + i / width + offset) % 256) as u8)
            .collect()
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.frame_interval);
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(pixels, SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, self.frame_count).map(Some)
    }
}
