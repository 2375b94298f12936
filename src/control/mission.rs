//! Flat mission tapes decoded from a confirmed QR payload.
//!
//! A program is a string over a fixed alphabet of single-character codes
//! (see [`ActionSettings::mission_command`]). The interpreter plays exactly one
//! code per call to [`MissionInterpreter::step`]. Codes with a settle time put
//! the interpreter into a paused state; the pause is measured against the
//! caller's clock so the control loop keeps running while it elapses.

use std::time::{Duration, Instant};

use super::action::{ActionSettings, MissionCommand};

/// Ordered mission codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissionProgram {
    codes: Vec<char>,
}

impl MissionProgram {
    pub fn new(text: &str) -> Self {
        Self {
            codes: text.chars().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, index: usize) -> Option<char> {
        self.codes.get(index).copied()
    }

    pub fn codes(&self) -> &[char] {
        &self.codes
    }
}

/// Outcome of a single interpreter step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MissionStep {
    /// No program loaded.
    Idle,
    /// A recognized code was decoded; the caller sends its action.
    Dispatch(MissionCommand),
    /// An unrecognized code was consumed without any action.
    Skipped(char),
    /// Waiting out the settle time of the previous command.
    Paused { remaining: Duration },
    /// The program is exhausted and has been cleared.
    Done,
}

#[derive(Clone, Debug)]
enum MissionState {
    Idle,
    Running {
        program: MissionProgram,
        cursor: usize,
    },
    Paused {
        program: MissionProgram,
        cursor: usize,
        since: Instant,
        pause: Duration,
    },
}

#[derive(Clone, Debug)]
pub struct MissionInterpreter {
    settings: ActionSettings,
    state: MissionState,
}

impl MissionInterpreter {
    pub fn new(settings: ActionSettings) -> Self {
        Self {
            settings,
            state: MissionState::Idle,
        }
    }

    /// Replace any running program and start from the first code.
    pub fn load(&mut self, program: MissionProgram) {
        self.state = MissionState::Running { program, cursor: 0 };
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, MissionState::Idle)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, MissionState::Paused { .. })
    }

    /// Index of the next code to execute.
    pub fn cursor(&self) -> usize {
        match &self.state {
            MissionState::Idle => 0,
            MissionState::Running { cursor, .. } | MissionState::Paused { cursor, .. } => *cursor,
        }
    }

    /// Length of the loaded program (0 when idle).
    pub fn program_len(&self) -> usize {
        match &self.state {
            MissionState::Idle => 0,
            MissionState::Running { program, .. } | MissionState::Paused { program, .. } => {
                program.len()
            }
        }
    }

    pub fn abort(&mut self) {
        self.state = MissionState::Idle;
    }

    pub fn step(&mut self, now: Instant) -> MissionStep {
        let state = std::mem::replace(&mut self.state, MissionState::Idle);
        let (program, cursor) = match state {
            MissionState::Idle => return MissionStep::Idle,
            MissionState::Paused {
                program,
                cursor,
                since,
                pause,
            } => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed < pause {
                    self.state = MissionState::Paused {
                        program,
                        cursor,
                        since,
                        pause,
                    };
                    return MissionStep::Paused {
                        remaining: pause - elapsed,
                    };
                }
                (program, cursor)
            }
            MissionState::Running { program, cursor } => (program, cursor),
        };

        let Some(code) = program.code(cursor) else {
            return MissionStep::Done;
        };
        let next = cursor + 1;

        match self.settings.mission_command(code) {
            Some(command) => {
                self.state = match command.pause {
                    Some(pause) => MissionState::Paused {
                        program,
                        cursor: next,
                        since: now,
                        pause,
                    },
                    None => MissionState::Running {
                        program,
                        cursor: next,
                    },
                };
                MissionStep::Dispatch(command)
            }
            None => {
                self.state = MissionState::Running {
                    program,
                    cursor: next,
                };
                MissionStep::Skipped(code)
            }
        }
    }
}

impl Default for MissionInterpreter {
    fn default() -> Self {
        Self::new(ActionSettings::default())
    }
}
