//! Canonical weather-station data model.
//!
//! Value types shared by every ingestion channel: the canonical
//! [`WeatherSnapshot`], the high-frequency [`WindSample`], advisory
//! [`DeviceStatus`], station/device metadata, and the tagged wire
//! message decode ([`StationMessage`]) shared by the local broadcast
//! and cloud stream transports.
//!
//! This crate is pure data: parsing and derivation functions only,
//! no I/O and no behavior.

pub mod message;
pub mod snapshot;
pub mod station;
pub mod status;
pub mod wind;

// Re-exports
pub use message::StationMessage;
pub use snapshot::{ObservationSummary, PrecipType, WeatherSnapshot};
pub use station::{
    ApiStatus, Device, DeviceObservationResponse, StationConfig, StationObservationResponse,
    StationsResponse, DEVICE_TYPE_HUB, DEVICE_TYPE_SENSOR,
};
pub use status::DeviceStatus;
pub use wind::WindSample;
