use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in working-frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Integer center, truncated like the pixel grid.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Bounding box of a set of corner points.
    pub fn from_points(points: &[(i32, i32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut min_x, mut min_y) = *first;
        let (mut max_x, mut max_y) = *first;
        for &(x, y) in rest {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        })
    }
}

/// Discrete identity of a detection, compared across cycles for confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    Marker(u32),
    Payload(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Marker(id) => write!(f, "marker #{}", id),
            Identity::Payload(text) => write!(f, "payload {:?}", text),
        }
    }
}

/// One candidate found in a single frame. Never outlives the cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detection {
    pub region: Option<Region>,
    pub identity: Option<Identity>,
}

impl Detection {
    pub fn face(region: Region) -> Self {
        Self {
            region: Some(region),
            identity: None,
        }
    }

    pub fn marker(id: u32, region: Option<Region>) -> Self {
        Self {
            region,
            identity: Some(Identity::Marker(id)),
        }
    }

    pub fn payload(text: impl Into<String>, region: Option<Region>) -> Self {
        Self {
            region,
            identity: Some(Identity::Payload(text.into())),
        }
    }
}
