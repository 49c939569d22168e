//! High-frequency wind sample, independent of the full observation stream.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One rapid-wind sample. Published on its own event stream; never
/// folded into a [`crate::WeatherSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub timestamp: DateTime<Utc>,
    /// Wind speed (m/s).
    pub speed: f64,
    /// Wind direction (degrees).
    pub direction: f64,
}

impl WindSample {
    /// Derive a sample from a raw `[timestamp, speed, direction]` row.
    ///
    /// Pure and total over well-formed input; rows with fewer than
    /// 3 fields yield `None`, never a partial sample.
    pub fn from_row(row: &[f64]) -> Option<Self> {
        if row.len() < 3 {
            return None;
        }

        let timestamp = Utc.timestamp_opt(row[0] as i64, 0).single()?;

        Some(Self {
            timestamp,
            speed: row[1],
            direction: row[2],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row() {
        let sample = WindSample::from_row(&[1700000000.0, 3.4, 270.0]).unwrap();
        assert_eq!(sample.timestamp.timestamp(), 1700000000);
        assert_eq!(sample.speed, 3.4);
        assert_eq!(sample.direction, 270.0);
    }

    #[test]
    fn test_malformed_row_yields_none() {
        assert!(WindSample::from_row(&[]).is_none());
        assert!(WindSample::from_row(&[1700000000.0, 3.4]).is_none());
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        assert!(WindSample::from_row(&[1700000000.0, 3.4, 270.0, 1.0]).is_some());
    }
}
