//! Still-image directory source (feature `ingest-image`).
//!
//! Replays `*.jpg`, `*.jpeg` and `*.png` files from a local directory in file
//! name order, paced to the configured frame rate, then ends the stream.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::FrameSource;
use crate::frame::Frame;

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
    frame_interval: Duration,
    next_due: Option<Instant>,
}

impl ImageDirSource {
    pub fn open(dir: &Path, target_fps: u32) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to list image directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_supported_image(path))
            .collect();
        if files.is_empty() {
            return Err(anyhow!("no jpeg or png frames in {}", dir.display()));
        }
        files.sort();
        let fps = u64::from(target_fps.max(1));
        log::info!(
            "ImageDirSource: {} frames from {}",
            files.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next_index: 0,
            frame_interval: Duration::from_millis(1000 / fps),
            next_due: None,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next_index) else {
            return Ok(None);
        };
        self.next_index += 1;

        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.frame_interval);

        let gray = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_luma8();
        let (width, height) = gray.dimensions();
        Frame::new(gray.into_raw(), width, height, self.next_index as u64).map(Some)
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ext == "jpg" || ext == "jpeg" || ext == "png"
        })
        .unwrap_or(false)
}
