//! Video frame sources.
//!
//! - Synthetic source (`stub://name`) for dry runs and tests
//! - Directory of still images (feature: ingest-image)
//! - Network H.264 stream such as the vehicle's `udp://0.0.0.0:11111`
//!   (feature: video-ffmpeg)
//!
//! Every source yields 8-bit grayscale `Frame`s at its native size. Resizing
//! and camera rotation happen in the control loop (see `normalize`), because
//! the camera direction is control-loop state.

#[cfg(feature = "ingest-image")]
pub mod images;
pub mod normalize;
pub mod synthetic;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod video_ffmpeg;

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::config::VideoSettings;
use crate::frame::Frame;

#[cfg(feature = "ingest-image")]
pub use images::ImageDirSource;
pub use synthetic::SyntheticSource;

/// Producer of frames for the background reader. Sources are opened on the
/// reader thread and never move between threads.
pub trait FrameSource {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Next frame, `Ok(None)` at end of stream. May block until one is ready.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Open the source named by `settings.url`.
pub fn open_source(settings: &VideoSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.is_empty() {
        return Err(anyhow!("video url must not be empty"));
    }
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(url, settings.target_fps)));
    }
    if !url.contains("://") && Path::new(url).is_dir() {
        return open_image_dir(url, settings.target_fps);
    }
    open_stream(url)
}

#[cfg(feature = "ingest-image")]
fn open_image_dir(path: &str, target_fps: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ImageDirSource::open(Path::new(path), target_fps)?))
}

#[cfg(not(feature = "ingest-image"))]
fn open_image_dir(_path: &str, _target_fps: u32) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "image directory ingestion requires the ingest-image feature"
    ))
}

#[cfg(feature = "video-ffmpeg")]
fn open_stream(url: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(video_ffmpeg::FfmpegVideoSource::open(url)?))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_stream(url: &str) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "decoding video stream '{}' requires the video-ffmpeg feature",
        url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_the_synthetic_source() {
        let settings = VideoSettings {
            url: "stub://bench".to_string(),
            ..VideoSettings::default()
        };
        let source = open_source(&settings).unwrap();
        assert_eq!(source.describe(), "stub://bench");
    }

    #[test]
    fn empty_url_is_rejected() {
        let settings = VideoSettings {
            url: "  ".to_string(),
            ..VideoSettings::default()
        };
        assert!(open_source(&settings).is_err());
    }
}
