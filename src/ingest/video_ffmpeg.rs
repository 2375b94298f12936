//! Network video decoder using FFmpeg (feature `video-ffmpeg`).
//!
//! Opens the vehicle's raw H.264 stream (for example `udp://0.0.0.0:11111`)
//! or any other URL FFmpeg understands, and converts each decoded picture to
//! 8-bit grayscale.
//!
//! Reads use a network timeout, so a stream that stops (after `streamoff`)
//! turns into read errors instead of a read that never returns.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::FrameSource;
use crate::frame::Frame;

/// Network read timeout, in microseconds as FFmpeg expects.
const READ_TIMEOUT_US: u64 = 1_000_000;

pub(crate) struct FfmpegVideoSource {
    url: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
}

impl FfmpegVideoSource {
    pub(crate) fn open(url: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut options = ffmpeg::Dictionary::new();
        options.set("timeout", &READ_TIMEOUT_US.to_string());
        let input = ffmpeg::format::input_with_dictionary(&url, options)
            .with_context(|| format!("failed to open video input '{}' with ffmpeg", url))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("input '{}' has no video track", url))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::GRAY8,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!("video: opened {} (ffmpeg)", url);
        Ok(Self {
            url: url.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
        })
    }
}

impl FrameSource for FfmpegVideoSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut gray_frame = ffmpeg::frame::Video::empty();

        let mut packet = ffmpeg::Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    log::info!("video: {} ended after {} frames", self.url, self.frame_count);
                    return Ok(None);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to read from {}", self.url))
                }
            }
            if packet.stream() != self.stream_index {
                continue;
            }

            // Corrupt packets are common on a lossy UDP link; skip them.
            if let Err(err) = self.decoder.send_packet(&packet) {
                log::debug!("video: dropped packet: {}", err);
                continue;
            }

            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.scaler
                    .run(&decoded, &mut gray_frame)
                    .context("scale frame to grayscale")?;
                let (pixels, width, height) = frame_to_pixels(&gray_frame)?;
                self.frame_count += 1;
                return Frame::new(pixels, width, height, self.frame_count).map(Some);
            }
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((
            data.get(..row_bytes * height as usize)
                .context("ffmpeg frame is shorter than its dimensions")?
                .to_vec(),
            width,
            height,
        ));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
