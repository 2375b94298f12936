//! Frames and the latest-frame hand-off between video and control.
//!
//! - `Frame`: one 8-bit grayscale image plus its capture sequence number.
//! - `FrameSlot`: single-producer, latest-wins mailbox. Frames are published
//!   as `Arc<Frame>`, so the control loop always reads a complete frame even
//!   while the producer is already writing the next one.
//! - `FrameReader`: background thread that opens a `FrameSource` and pulls
//!   from it into a `FrameSlot`. Stopping waits a bounded time, because a
//!   source may sit in a blocking read after the stream is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::ingest::FrameSource;

/// Consecutive source errors tolerated before the reader gives up.
pub const MAX_CONSECUTIVE_SOURCE_ERRORS: u32 = 50;

/// How long `FrameReader::stop` waits for the reader thread before detaching it.
pub const READER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Grayscale frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Result of waiting on a `FrameSlot`.
#[derive(Debug)]
pub enum FrameWait {
    Frame(Arc<Frame>),
    /// No newer frame arrived within the timeout.
    Timeout,
    /// The producer is gone and every frame has been consumed.
    Closed,
}

#[derive(Default)]
struct SlotState {
    latest: Option<Arc<Frame>>,
    published: u64,
    closed: bool,
}

/// Latest-frame mailbox shared between the reader thread and the control loop.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<(Mutex<SlotState>, Condvar)>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame. Older unread frames are dropped.
    pub fn publish(&self, frame: Frame) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut state) = lock.lock() {
            state.latest = Some(Arc::new(frame));
            state.published += 1;
            cvar.notify_all();
        }
    }

    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut state) = lock.lock() {
            state.closed = true;
            cvar.notify_all();
        }
    }

    /// Wait until the producer closes the slot. Returns false on timeout.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let Ok(state) = lock.lock() else {
            return true;
        };
        match cvar.wait_timeout_while(state, timeout, |state| !state.closed) {
            Ok((state, _)) => state.closed,
            Err(_) => true,
        }
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        let (lock, _) = &*self.inner;
        lock.lock().map(|state| state.published).unwrap_or(0)
    }

    /// Wait until a frame newer than `*seen` is available.
    ///
    /// `seen` is the publish counter of the last frame the caller consumed and
    /// is updated on success.
    pub fn wait_newer(&self, seen: &mut u64, timeout: Duration) -> FrameWait {
        let (lock, cvar) = &*self.inner;
        let Ok(state) = lock.lock() else {
            return FrameWait::Closed;
        };
        let waited = cvar.wait_timeout_while(state, timeout, |state| {
            state.published <= *seen && !state.closed
        });
        let Ok((state, _)) = waited else {
            return FrameWait::Closed;
        };
        match &state.latest {
            Some(frame) if state.published > *seen => {
                *seen = state.published;
                FrameWait::Frame(frame.clone())
            }
            _ if state.closed => FrameWait::Closed,
            _ => FrameWait::Timeout,
        }
    }
}

/// Background thread feeding a `FrameSlot` from a `FrameSource`.
pub struct FrameReader {
    slot: FrameSlot,
    source: String,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

impl FrameReader {
    /// Open the source on a new reader thread and start reading.
    ///
    /// The source never leaves the reader thread. An error from `open` is
    /// returned here.
    pub fn spawn<F>(open: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn FrameSource>> + Send + 'static,
    {
        let slot = FrameSlot::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<String>>(1);
        let thread_slot = slot.clone();
        let thread_shutdown = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || {
                match open() {
                    Ok(mut source) => {
                        // The receiver only disappears if `spawn` itself is gone.
                        let _ = ready_tx.send(Ok(source.describe()));
                        read_frames(source.as_mut(), &thread_slot, &thread_shutdown);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
                thread_slot.close();
            })?;

        let opened = ready_rx
            .recv()
            .map_err(|_| anyhow!("frame reader exited before opening its source"))
            .and_then(|opened| opened);
        match opened {
            Ok(source) => Ok(Self {
                slot,
                source,
                shutdown,
                join: Some(join),
                stop_timeout: READER_STOP_TIMEOUT,
            }),
            Err(err) => {
                let _ = join.join();
                Err(err)
            }
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Description of the source being read.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stop(mut self) -> Result<()> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        if !self.slot.wait_closed(self.stop_timeout) {
            // Still inside a blocking read. The thread exits on its own once
            // the read returns.
            log::warn!(
                "frame reader for {} did not stop within {:?}, detaching it",
                self.source,
                self.stop_timeout
            );
            return Ok(());
        }
        join.join()
            .map_err(|_| anyhow!("frame reader thread panicked"))
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if let Err(err) = self.stop_inner() {
            log::error!("{}", err);
        }
    }
}

fn read_frames(source: &mut dyn FrameSource, slot: &FrameSlot, shutdown: &AtomicBool) {
    let mut consecutive_errors = 0u32;
    while !shutdown.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                slot.publish(frame);
            }
            Ok(None) => {
                log::info!("video source {} reached end of stream", source.describe());
                return;
            }
            Err(err) => {
                consecutive_errors += 1;
                log::warn!("video source {} error: {}", source.describe(), err);
                if consecutive_errors >= MAX_CONSECUTIVE_SOURCE_ERRORS {
                    log::error!(
                        "video source {} failed {} times in a row, giving up",
                        source.describe(),
                        consecutive_errors
                    );
                    return;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![sequence as u8; 6], 3, 2, sequence).unwrap()
    }

    #[test]
    fn frame_rejects_wrong_length() {
        assert!(Frame::new(vec![0u8; 5], 3, 2, 0).is_err());
    }

    #[test]
    fn slot_hands_out_only_the_latest_frame() {
        let slot = FrameSlot::new();
        let mut seen = 0;

        assert!(matches!(
            slot.wait_newer(&mut seen, Duration::from_millis(5)),
            FrameWait::Timeout
        ));

        slot.publish(frame(1));
        slot.publish(frame(2));
        match slot.wait_newer(&mut seen, Duration::from_millis(5)) {
            FrameWait::Frame(f) => assert_eq!(f.sequence(), 2),
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(seen, 2);

        // Already consumed: nothing new.
        assert!(matches!(
            slot.wait_newer(&mut seen, Duration::from_millis(5)),
            FrameWait::Timeout
        ));
    }

    #[test]
    fn closed_slot_still_delivers_the_final_frame() {
        let slot = FrameSlot::new();
        let mut seen = 0;
        slot.publish(frame(7));
        slot.close();
        assert!(matches!(
            slot.wait_newer(&mut seen, Duration::from_millis(5)),
            FrameWait::Frame(_)
        ));
        assert!(matches!(
            slot.wait_newer(&mut seen, Duration::from_millis(5)),
            FrameWait::Closed
        ));
    }

    struct CountingSource {
        remaining: u64,
    }

    impl FrameSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(frame(self.remaining)))
        }
    }

    #[test]
    fn reader_closes_the_slot_at_end_of_stream() {
        let reader = FrameReader::spawn(|| {
            Ok(Box::new(CountingSource { remaining: 3 }) as Box<dyn FrameSource>)
        })
        .unwrap();
        let slot = reader.slot().clone();
        let mut seen = 0;
        let mut closed = false;
        for _ in 0..100 {
            if let FrameWait::Closed = slot.wait_newer(&mut seen, Duration::from_millis(50)) {
                closed = true;
                break;
            }
        }
        assert!(closed);
        assert_eq!(slot.published(), 3);
        reader.stop().unwrap();
    }

    /// Blocks in `recv_from` with no timeout, like a network decoder whose
    /// stream has stopped.
    struct StalledSource {
        socket: std::net::UdpSocket,
    }

    impl FrameSource for StalledSource {
        fn describe(&self) -> String {
            "stalled".to_string()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let mut buf = [0u8; 16];
            self.socket.recv_from(&mut buf)?;
            Ok(Some(frame(1)))
        }
    }

    #[test]
    fn stop_returns_while_the_source_is_blocked() {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let reader = FrameReader::spawn(move || {
            Ok(Box::new(StalledSource { socket }) as Box<dyn FrameSource>)
        })
        .unwrap()
        .with_stop_timeout(Duration::from_millis(100));
        assert_eq!(reader.source(), "stalled");

        let started = Instant::now();
        reader.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        // Release the detached thread.
        let waker = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        waker.send_to(b"x", addr).unwrap();
    }

    #[test]
    fn open_failure_is_returned_from_spawn() {
        let err = FrameReader::spawn(|| Err(anyhow!("no such camera")))
            .err()
            .expect("open must fail");
        assert!(err.to_string().contains("no such camera"));
    }
}
