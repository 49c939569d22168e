//! Advisory device status broadcast by the station.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Sensor-head health report. Advisory only; not required for
/// downstream safety evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub hub_sn: Option<String>,
    /// Epoch seconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Seconds since boot.
    #[serde(default)]
    pub uptime: u64,
    /// Battery voltage (V).
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub firmware_revision: i64,
    /// Device radio signal strength (dBm).
    #[serde(default)]
    pub rssi: i32,
    /// Hub radio signal strength (dBm).
    #[serde(default)]
    pub hub_rssi: i32,
    /// Sensor-status bitmask; zero means all sensors nominal.
    #[serde(default)]
    pub sensor_status: u32,
}

impl DeviceStatus {
    /// Report time as a UTC timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_and_timestamp() {
        let json = r#"{
            "serial_number": "ST-00012345",
            "hub_sn": "HB-00009876",
            "timestamp": 1700000000,
            "uptime": 86400,
            "voltage": 2.64,
            "firmware_revision": 176,
            "rssi": -52,
            "hub_rssi": -41,
            "sensor_status": 0
        }"#;

        let status: DeviceStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.serial_number.as_deref(), Some("ST-00012345"));
        assert_eq!(status.voltage, 2.64);
        assert_eq!(status.timestamp().unwrap().timestamp(), 1700000000);
    }
}
