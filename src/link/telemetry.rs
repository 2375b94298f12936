use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Result};

/// Snapshot of the vehicle's state datagram (`key:value;key:value;...`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Telemetry {
    fields: BTreeMap<String, String>,
}

impl Telemetry {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut fields = BTreeMap::new();
        for pair in raw.trim().split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once(':')
                .ok_or_else(|| anyhow!("malformed telemetry field '{}'", pair))?;
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
        if fields.is_empty() {
            return Err(anyhow!("empty telemetry datagram"));
        }
        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn number(&self, key: &str) -> Option<i32> {
        self.get(key)?.parse().ok()
    }

    /// Battery charge in percent.
    pub fn battery(&self) -> Option<i32> {
        self.number("bat")
    }

    /// Height above takeoff point in cm.
    pub fn height_cm(&self) -> Option<i32> {
        self.number("h")
    }

    /// Time-of-flight distance sensor reading in cm.
    pub fn tof_cm(&self) -> Option<i32> {
        self.number("tof")
    }

    /// Motor-on time in seconds.
    pub fn flight_time_s(&self) -> Option<i32> {
        self.number("time")
    }

    /// (pitch, roll, yaw) in degrees.
    pub fn attitude(&self) -> Option<(i32, i32, i32)> {
        Some((
            self.number("pitch")?,
            self.number("roll")?,
            self.number("yaw")?,
        ))
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.fields {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}
