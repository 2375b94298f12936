//! Trace-replay backend.
//!
//! Replays a recorded or hand-written detection trace, one entry per control
//! cycle. The trace format is JSON lines:
//!
//! ```text
//! []
//! [{"identity": {"Marker": 5}}]
//! [{"identity": {"Payload": "Tud L"}}]
//! [{"region": {"x": 200, "y": 140, "width": 80, "height": 80}}]
//! {"error": "decoder rejected corner geometry"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Once the trace is
//! exhausted every further cycle reports nothing.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, Identity, Region};
use crate::frame::Frame;

/// One cycle of a detection trace.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptedCycle {
    Detections(Vec<Detection>),
    Failure(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceLine {
    Failure { error: String },
    Detections(Vec<TraceDetection>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TraceDetection {
    region: Option<Region>,
    identity: Option<Identity>,
}

pub struct ScriptedBackend {
    cycles: VecDeque<ScriptedCycle>,
    replayed: u64,
}

impl ScriptedBackend {
    pub fn new(cycles: Vec<ScriptedCycle>) -> Self {
        Self {
            cycles: cycles.into(),
            replayed: 0,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection trace {}: {}", path.display(), e))?;
        Self::parse(&raw).with_context(|| format!("invalid detection trace {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut cycles = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed: TraceLine = serde_json::from_str(trimmed)
                .map_err(|e| anyhow!("line {}: {}", index + 1, e))?;
            cycles.push(match parsed {
                TraceLine::Failure { error } => ScriptedCycle::Failure(error),
                TraceLine::Detections(entries) => ScriptedCycle::Detections(
                    entries
                        .into_iter()
                        .map(|entry| Detection {
                            region: entry.region,
                            identity: entry.identity,
                        })
                        .collect(),
                ),
            });
        }
        Ok(Self::new(cycles))
    }

    /// Cycles left in the trace.
    pub fn remaining(&self) -> usize {
        self.cycles.len()
    }

    /// Cycles replayed so far.
    pub fn replayed(&self) -> u64 {
        self.replayed
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, _capability: DetectionCapability) -> bool {
        true
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let Some(cycle) = self.cycles.pop_front() else {
            return Ok(Vec::new());
        };
        self.replayed += 1;
        match cycle {
            ScriptedCycle::Detections(detections) => Ok(detections),
            ScriptedCycle::Failure(reason) => Err(anyhow!("scripted failure: {}", reason)),
        }
    }
}
