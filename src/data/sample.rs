//! Camera references and density samples.
//!
//! These types mirror what the backend produces. The client never computes
//! density itself; it only timestamps the readings it receives.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A registered camera, as returned by the registration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
}

impl CameraRef {
    /// Location for display, with a placeholder when the camera has none.
    pub fn location_label(&self) -> &str {
        if self.location.trim().is_empty() {
            "No location"
        } else {
            &self.location
        }
    }
}

/// One density reading as computed by the inference backend.
///
/// Missing fields default to zero, matching how the backend reports frames
/// it could not analyse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityReading {
    #[serde(default)]
    pub person_count: u32,
    #[serde(default)]
    pub density_value: f64,
    #[serde(default)]
    pub density_per_sqm: f64,
}

/// A density reading stamped with the time it was received (or logged).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensitySample {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub person_count: u32,
    #[serde(default)]
    pub density_value: f64,
    #[serde(default)]
    pub density_per_sqm: f64,
}

impl DensitySample {
    /// Build a sample for an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, reading: DensityReading) -> Self {
        Self {
            timestamp,
            person_count: reading.person_count,
            density_value: reading.density_value,
            density_per_sqm: reading.density_per_sqm,
        }
    }

    /// The reading carried by this sample.
    pub fn reading(&self) -> DensityReading {
        DensityReading {
            person_count: self.person_count,
            density_value: self.density_value,
            density_per_sqm: self.density_per_sqm,
        }
    }
}

/// Parse a timestamp from the history endpoint.
///
/// Accepts RFC 3339 as well as the naive ISO form the backend writes for
/// UTC times (`2024-05-01T12:30:00.123456`).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn parses_rfc3339_timestamps() {
        let ts = parse_timestamp("2024-05-01T12:30:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn parses_naive_timestamps_as_utc() {
        let ts = parse_timestamp("2024-05-01T12:30:00.250000").unwrap();
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.nanosecond(), 250_000_000);
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn history_log_entries_deserialize_without_per_sqm() {
        let json = r#"{"id":"x","timestamp":"2024-05-01T12:30:00","person_count":7,"density_value":0.3,"alert_triggered":false}"#;
        let sample: DensitySample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.person_count, 7);
        assert_eq!(sample.density_per_sqm, 0.0);
    }

    #[test]
    fn reading_fields_default_to_zero() {
        let reading: DensityReading = serde_json::from_str(r#"{"person_count":3}"#).unwrap();
        assert_eq!(reading.person_count, 3);
        assert_eq!(reading.density_value, 0.0);
    }

    #[test]
    fn negative_person_count_is_rejected() {
        assert!(serde_json::from_str::<DensityReading>(r#"{"person_count":-1}"#).is_err());
    }

    #[test]
    fn location_label_has_placeholder() {
        let camera = CameraRef {
            id: "1".into(),
            name: "Gate".into(),
            location: "  ".into(),
        };
        assert_eq!(camera.location_label(), "No location");
    }
}
