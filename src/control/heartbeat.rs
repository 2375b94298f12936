use std::time::{Duration, Instant};

/// Periodic keepalive timer.
///
/// Fires on the first poll where strictly more than `interval` has elapsed
/// since the last firing, then restarts from that poll.
#[derive(Clone, Debug)]
pub struct Heartbeat {
    interval: Duration,
    last: Instant,
}

impl Heartbeat {
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last: start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) > self.interval {
            self.last = now;
            return true;
        }
        false
    }
}
