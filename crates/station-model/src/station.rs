//! Station and device metadata from the cloud query endpoints.

use serde::{Deserialize, Serialize};

use crate::snapshot::ObservationSummary;

/// Integrated sensor head, the canonical telemetry source.
pub const DEVICE_TYPE_SENSOR: &str = "ST";
/// Relay hub; carries no telemetry of its own.
pub const DEVICE_TYPE_HUB: &str = "HB";

/// A physical sensor unit belonging to a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: i64,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub serial_number: Option<String>,
}

impl Device {
    pub fn is_sensor(&self) -> bool {
        self.device_type == DEVICE_TYPE_SENSOR
    }

    pub fn is_hub(&self) -> bool {
        self.device_type == DEVICE_TYPE_HUB
    }
}

/// A registered station account entity with its devices.
///
/// Owned by the orchestrator for the session; refreshed from the
/// query client and never mutated by channel adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub station_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Elevation above sea level (m).
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl StationConfig {
    /// Human-readable name, falling back to the station id.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.public_name.as_deref())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Station {}", self.station_id))
    }

    /// The telemetry-bearing ("ST") devices of this station.
    pub fn sensor_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_sensor())
    }

    /// The relay hub, if the account lists one.
    pub fn hub_device(&self) -> Option<&Device> {
        self.devices.iter().find(|d| d.is_hub())
    }
}

/// Status block returned by every query endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub status_code: i32,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Envelope for the station-list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationsResponse {
    #[serde(default)]
    pub stations: Vec<StationConfig>,
    #[serde(default)]
    pub status: Option<ApiStatus>,
}

/// Envelope for the device-level latest-observation endpoint.
///
/// Carries the server-computed [`ObservationSummary`] plus raw
/// observation rows in the canonical 18-field layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceObservationResponse {
    #[serde(default)]
    pub device_id: i64,
    #[serde(default)]
    pub summary: Option<ObservationSummary>,
    #[serde(default)]
    pub obs: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub status: Option<ApiStatus>,
}

/// Envelope for the station-level latest-observation endpoint.
/// Station rows are keyed objects rather than positional arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationObservationResponse {
    #[serde(default)]
    pub station_id: i64,
    #[serde(default)]
    pub obs: Vec<serde_json::Value>,
    #[serde(default)]
    pub status: Option<ApiStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stations_response_decode() {
        let json = r#"{
            "stations": [{
                "station_id": 4211,
                "name": "Backyard",
                "latitude": 59.91,
                "longitude": 10.75,
                "elevation": 94.0,
                "devices": [
                    {"device_id": 1001, "device_type": "HB", "serial_number": "HB-00009876"},
                    {"device_id": 1002, "device_type": "ST", "serial_number": "ST-00012345"}
                ]
            }],
            "status": {"status_code": 0, "status_message": "SUCCESS"}
        }"#;

        let response: StationsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.stations.len(), 1);

        let station = &response.stations[0];
        assert_eq!(station.display_name(), "Backyard");
        assert_eq!(station.sensor_devices().count(), 1);
        assert_eq!(station.sensor_devices().next().unwrap().device_id, 1002);
        assert_eq!(station.hub_device().unwrap().device_id, 1001);
    }

    #[test]
    fn test_empty_station_list() {
        let response: StationsResponse = serde_json::from_str(r#"{"stations": []}"#).unwrap();
        assert!(response.stations.is_empty());
    }

    #[test]
    fn test_display_name_fallback() {
        let station: StationConfig = serde_json::from_str(r#"{"station_id": 7}"#).unwrap();
        assert_eq!(station.display_name(), "Station 7");
    }

    #[test]
    fn test_device_observation_decode() {
        let json = r#"{
            "device_id": 1002,
            "summary": {"pressure_trend": "falling", "strike_count_1h": 2},
            "obs": [[1700000000,0.1,2.3,5.0,180,3,1005.2,21.5,55,1200,1.2,300,0.0,0,0,0,2.6,1]]
        }"#;

        let response: DeviceObservationResponse = serde_json::from_str(json).unwrap();
        let rows = response.obs.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 18);
        assert_eq!(
            response.summary.unwrap().pressure_trend.as_deref(),
            Some("falling")
        );
    }
}
