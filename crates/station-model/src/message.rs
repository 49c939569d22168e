//! Tagged decode of inbound wire messages.
//!
//! The local broadcast and the cloud stream share one frame family,
//! discriminated by a `type` tag. Decoding goes straight into a closed
//! set of variants, each carrying its own required fields, with an
//! explicit [`StationMessage::Unknown`] variant for unrecognized tags
//! instead of a silent fallthrough.

use serde::Deserialize;

use crate::snapshot::ObservationSummary;
use crate::status::DeviceStatus;

/// One inbound frame from the broadcast or stream channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationMessage {
    /// Full observation report. `obs` is newest-first; each row is a
    /// positional 18-field record.
    ObsSt {
        #[serde(default)]
        serial_number: Option<String>,
        #[serde(default)]
        hub_sn: Option<String>,
        /// Present on cloud stream frames only.
        #[serde(default)]
        device_id: Option<i64>,
        #[serde(default)]
        obs: Vec<Vec<f64>>,
        #[serde(default)]
        summary: Option<ObservationSummary>,
    },

    /// High-frequency wind report: `ob` is `[timestamp, speed, direction]`.
    RapidWind {
        #[serde(default)]
        serial_number: Option<String>,
        #[serde(default)]
        hub_sn: Option<String>,
        /// Present on cloud stream frames only.
        #[serde(default)]
        device_id: Option<i64>,
        #[serde(default)]
        ob: Vec<f64>,
    },

    /// Sensor-head health report.
    DeviceStatus(DeviceStatus),

    /// Rain-start event. Informational; no snapshot is derived.
    EvtPrecip {},

    /// Lightning-strike event. Informational; no snapshot is derived.
    EvtStrike {},

    /// Hub health report. Informational.
    HubStatus {},

    /// Cloud stream acknowledgment of a control message.
    Ack {
        #[serde(default)]
        id: Option<String>,
    },

    /// Any tag outside the known set.
    #[serde(other)]
    Unknown,
}
