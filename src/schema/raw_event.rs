//! Untrusted input records
//!
//! These mirror what the sensor and storage layers hand over. Counts are signed
//! and sessions unvalidated so that malformed entries can be reported one by
//! one instead of failing the whole batch at deserialization.

use crate::types::SessionSource;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Current input schema version
pub const SCHEMA_VERSION: &str = "rhythm.activity_sample.v1";

/// A raw activity reading as delivered by the sensor layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawActivitySample {
    /// Bucket start (RFC 3339)
    pub timestamp: DateTime<Utc>,
    /// Activity count; negative values are rejected during sanitation
    pub activity_count: i64,
}

/// A coarse daily activity total, expanded into synthetic buckets before segmentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivityTotal {
    /// Local calendar date
    pub date: NaiveDate,
    /// Total count for the day (e.g. steps)
    pub total_count: u64,
}

/// A sleep session as stored or supplied by an external sensor API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSleepSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Defaults to the UTC date of `sleep_start` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_date: Option<NaiveDate>,
    pub sleep_start: DateTime<Utc>,
    pub sleep_end: DateTime<Utc>,
    /// Informational; always recomputed from the span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub source: SessionSource,
}

/// Why an input item was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NegativeCount,
    NonMonotonicTimestamp,
    InvertedSession,
}

/// A dropped activity sample, reported back to the sensor layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSample {
    /// Position in the input batch
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub reason: RejectionReason,
}

/// A dropped sleep session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSession {
    pub index: usize,
    pub id: Option<String>,
    pub reason: RejectionReason,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sample_accepts_negative_count() {
        let raw: RawActivitySample =
            serde_json::from_str(r#"{"timestamp": "2024-01-15T03:00:00Z", "activity_count": -2}"#)
                .unwrap();
        assert_eq!(raw.activity_count, -2);
    }

    #[test]
    fn test_raw_session_optional_fields() {
        let raw: RawSleepSession = serde_json::from_str(
            r#"{
                "sleep_start": "2024-01-14T23:00:00Z",
                "sleep_end": "2024-01-15T06:00:00Z",
                "source": "sensor"
            }"#,
        )
        .unwrap();
        assert!(raw.id.is_none());
        assert!(raw.calendar_date.is_none());

        let json = serde_json::to_value(&raw).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["source"], "sensor");
    }
}
