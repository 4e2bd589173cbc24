use crate::protocol::{StatusFlags, Summary};
use chrono::{DateTime, Local};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// One combined reading, assembled fresh every poll cycle.
///
/// Each page contributes its fields only when it decoded successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Local>,
    pub summary: Option<Summary>,
    pub status: Option<StatusFlags>,
    /// Raw cell values keyed by cell number (1..=16).
    pub cells: BTreeMap<u8, u16>,
    /// Calibrated °C keyed by sensor channel.
    pub temperatures: BTreeMap<&'static str, f64>,
}

impl TelemetryRecord {
    pub fn new(timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            summary: None,
            status: None,
            cells: BTreeMap::new(),
            temperatures: BTreeMap::new(),
        }
    }

    /// True if no page contributed any field.
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.status.is_none()
            && self.cells.is_empty()
            && self.temperatures.is_empty()
    }

    /// Flat JSON object with absent fields omitted.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?;
        if let Some(summary) = &self.summary {
            map.serialize_entry("voltage", &summary.voltage)?;
            map.serialize_entry("current", &summary.current)?;
            map.serialize_entry("state_of_charge", &summary.state_of_charge)?;
            map.serialize_entry("state_of_health", &summary.state_of_health)?;
            map.serialize_entry("stored_capacity_ah", &summary.stored_capacity_ah)?;
            map.serialize_entry("full_capacity_ah", &summary.full_capacity_ah)?;
        }
        if let Some(status) = &self.status {
            map.serialize_entry("warning", &status.warning)?;
            map.serialize_entry("protect", &status.protect)?;
            map.serialize_entry("balance", &status.balance)?;
            map.serialize_entry("hardware_error", &status.hardware_error)?;
        }
        for (idx, value) in &self.cells {
            map.serialize_entry(&format!("cell_{idx}"), value)?;
        }
        for (channel, celsius) in &self.temperatures {
            map.serialize_entry(channel, celsius)?;
        }
        map.end()
    }
}
