//! Canonical weather snapshot derived from a raw observation row.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of numeric fields in a valid observation row.
pub const OBSERVATION_ROW_LEN: usize = 18;

/// Precipitation type reported by the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecipType {
    None,
    Rain,
    Hail,
}

impl PrecipType {
    /// Map the wire integer to a precipitation type.
    ///
    /// Codes outside the documented 0/1/2 range are treated as no
    /// precipitation rather than rejected.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => PrecipType::Rain,
            2 => PrecipType::Hail,
            _ => PrecipType::None,
        }
    }

    /// The wire integer for this type.
    pub fn code(&self) -> i64 {
        match self {
            PrecipType::None => 0,
            PrecipType::Rain => 1,
            PrecipType::Hail => 2,
        }
    }
}

/// One canonical weather observation, immutable once constructed.
///
/// Every field comes from a single raw observation row; a partial
/// snapshot is never built (see [`WeatherSnapshot::from_row`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Wind lull over the sample interval (m/s).
    pub wind_lull: f64,
    /// Average wind over the sample interval (m/s).
    pub wind_avg: f64,
    /// Wind gust over the sample interval (m/s).
    pub wind_gust: f64,
    /// Wind direction (degrees).
    pub wind_direction: f64,
    /// Wind sample interval (seconds).
    pub wind_sample_interval: f64,
    /// Station pressure (mb).
    pub station_pressure: f64,
    /// Air temperature (°C).
    pub air_temperature: f64,
    /// Relative humidity (%).
    pub relative_humidity: f64,
    /// Illuminance (lux).
    pub illuminance: f64,
    /// UV index.
    pub uv_index: f64,
    /// Solar radiation (W/m²).
    pub solar_radiation: f64,
    /// Accumulated precipitation (mm).
    pub precip_accumulated: f64,
    pub precip_type: PrecipType,
    /// Average lightning strike distance (km).
    pub lightning_avg_distance: f64,
    pub lightning_strike_count: u32,
    /// Battery voltage (V).
    pub battery_voltage: f64,
    /// Report interval (seconds).
    pub report_interval: u32,
}

impl WeatherSnapshot {
    /// Derive a snapshot from a raw observation row.
    ///
    /// Pure: the same row always yields an identical snapshot. Rows
    /// with fewer than 18 fields (or an unrepresentable timestamp)
    /// yield `None`; a partial snapshot is never produced.
    pub fn from_row(row: &[f64]) -> Option<Self> {
        if row.len() < OBSERVATION_ROW_LEN {
            return None;
        }

        let timestamp = Utc.timestamp_opt(row[0] as i64, 0).single()?;

        Some(Self {
            timestamp,
            wind_lull: row[1],
            wind_avg: row[2],
            wind_gust: row[3],
            wind_direction: row[4],
            wind_sample_interval: row[5],
            station_pressure: row[6],
            air_temperature: row[7],
            relative_humidity: row[8],
            illuminance: row[9],
            uv_index: row[10],
            solar_radiation: row[11],
            precip_accumulated: row[12],
            precip_type: PrecipType::from_code(row[13] as i64),
            lightning_avg_distance: row[14],
            lightning_strike_count: row[15] as u32,
            battery_voltage: row[16],
            report_interval: row[17] as u32,
        })
    }

    /// Dew point (°C) via the Magnus formula.
    pub fn dew_point(&self) -> f64 {
        let a = 17.27;
        let b = 237.7;
        let alpha = ((a * self.air_temperature) / (b + self.air_temperature))
            + (self.relative_humidity / 100.0).ln();
        (b * alpha) / (a - alpha)
    }

    /// Sea-level pressure (mb) from station pressure and elevation,
    /// using the standard-atmosphere reduction.
    pub fn sea_level_pressure(&self, elevation_meters: f64) -> f64 {
        let temp_k = self.air_temperature + 273.15;
        let factor = (1.0 - (0.0065 * elevation_meters / temp_k)).powf(5.257);
        self.station_pressure / factor
    }
}

/// Server-computed summary attached to a snapshot by the query channel.
///
/// Composed next to a [`WeatherSnapshot`], never merged into its fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSummary {
    #[serde(default)]
    pub pressure_trend: Option<String>,
    #[serde(default)]
    pub strike_count_1h: Option<u32>,
    #[serde(default)]
    pub strike_count_3h: Option<u32>,
    #[serde(default)]
    pub precip_total_1h: Option<f64>,
    #[serde(default)]
    pub strike_last_dist: Option<f64>,
    #[serde(default)]
    pub strike_last_epoch: Option<i64>,
    #[serde(default)]
    pub precip_accum_local_yesterday: Option<f64>,
    #[serde(default)]
    pub feels_like: Option<f64>,
    #[serde(default)]
    pub heat_index: Option<f64>,
    #[serde(default)]
    pub wind_chill: Option<f64>,
    #[serde(default)]
    pub wet_bulb_temperature: Option<f64>,
    #[serde(default)]
    pub delta_t: Option<f64>,
}
