/// Emitted once when an identity has held for more than the threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmed<I> {
    pub identity: I,
}

/// Run-length confirmation of a noisy per-frame identity.
///
/// A run counts consecutive cycles that report the same identity. The
/// confirmation fires on the cycle where the run first exceeds `threshold`,
/// after which the run restarts from zero so a target that stays in view has
/// to rebuild the whole run before it confirms again.
#[derive(Clone, Debug)]
pub struct Debouncer<I> {
    threshold: u32,
    last_identity: Option<I>,
    run_length: u32,
}

impl<I: Clone + PartialEq> Debouncer<I> {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            last_identity: None,
            run_length: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn run_length(&self) -> u32 {
        self.run_length
    }

    pub fn last_identity(&self) -> Option<&I> {
        self.last_identity.as_ref()
    }

    /// Feed one cycle's observation.
    pub fn update(&mut self, observed: Option<I>) -> Option<Confirmed<I>> {
        match observed {
            Some(identity) if self.last_identity.as_ref() == Some(&identity) => {
                self.run_length = self.run_length.saturating_add(1);
            }
            Some(identity) => {
                self.last_identity = Some(identity);
                self.run_length = 1;
            }
            None => {
                self.last_identity = None;
                self.run_length = 0;
            }
        }

        if self.run_length > self.threshold {
            self.run_length = 0;
            return self
                .last_identity
                .clone()
                .map(|identity| Confirmed { identity });
        }
        None
    }

    pub fn reset(&mut self) {
        self.last_identity = None;
        self.run_length = 0;
    }
}
