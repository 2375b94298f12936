use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Runs one backend for one capability, once per control cycle.
///
/// The adapter owns two policies the cycle driver relies on:
/// - backend failures are absorbed and reported as "nothing found";
/// - an optional cadence (`interval` > 1) re-runs the backend only every Nth
///   cycle and replays the previous result in between.
pub struct DetectorAdapter {
    backend: Box<dyn DetectorBackend>,
    capability: DetectionCapability,
    interval: u32,
    cycles_since_run: u32,
    last: Vec<Detection>,
    failures: u64,
}

impl DetectorAdapter {
    pub fn new(backend: Box<dyn DetectorBackend>, capability: DetectionCapability) -> Self {
        Self {
            backend,
            capability,
            interval: 1,
            cycles_since_run: 0,
            last: Vec::new(),
            failures: 0,
        }
    }

    /// Run the backend every `interval` cycles (values below 1 mean every cycle).
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }

    pub fn capability(&self) -> DetectionCapability {
        self.capability
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Number of backend invocations that failed and were absorbed.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn detect(&mut self, frame: &Frame) -> &[Detection] {
        let due = self.cycles_since_run == 0;
        self.cycles_since_run = (self.cycles_since_run + 1) % self.interval;
        if due {
            self.last = match self.backend.detect(frame) {
                Ok(detections) => detections,
                Err(err) => {
                    self.failures += 1;
                    log::debug!(
                        "{} detector ({}) failed on frame {}: {}",
                        self.capability,
                        self.backend.name(),
                        frame.sequence(),
                        err
                    );
                    Vec::new()
                }
            };
        }
        &self.last
    }

    /// Run detection and keep only the highest-priority candidate.
    pub fn primary(&mut self, frame: &Frame) -> Option<Detection> {
        self.detect(frame).first().cloned()
    }

    /// Forget the cached result and run the backend on the next cycle.
    pub fn reset(&mut self) {
        self.cycles_since_run = 0;
        self.last.clear();
    }
}
