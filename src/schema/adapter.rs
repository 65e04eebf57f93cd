//! Adapter from raw records to validated samples and sessions
//!
//! Malformed items are dropped individually and reported; only unparseable
//! JSON fails a batch.

use crate::config::SegmenterConfig;
use crate::error::ComputeError;
use crate::schema::raw_event::*;
use crate::types::{ActivitySample, SleepSession};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Share of a day's activity falling in each local hour (sums to 1.0).
///
/// 07:00-09:00 carries 15% of the day, 22:00-07:00 is near zero.
pub const DIURNAL_ACTIVITY_WEIGHTS: [f64; 24] = [
    0.001, 0.001, 0.001, 0.001, 0.001, 0.001, 0.001, // 00-06
    0.075, 0.075, // 07-08
    0.070, 0.070, 0.070, 0.080, 0.070, // 09-13
    0.060, 0.060, 0.070, 0.080, 0.080, // 14-18
    0.060, 0.040, 0.031, // 19-21
    0.001, 0.001, // 22-23
];

/// Samples that survived sanitation plus the data-quality report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SanitizedSamples {
    pub samples: Vec<ActivitySample>,
    pub rejected: Vec<RejectedSample>,
}

/// Adapter for converting raw records into engine types
pub struct SampleAdapter;

impl SampleAdapter {
    /// Parse a JSON string containing an array of raw samples
    pub fn parse_array(json: &str) -> Result<Vec<RawActivitySample>, ComputeError> {
        let samples: Vec<RawActivitySample> = serde_json::from_str(json)?;
        Ok(samples)
    }

    /// Parse NDJSON (one raw sample per line)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawActivitySample>, ComputeError> {
        let mut samples = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawActivitySample>(trimmed) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(samples)
    }

    /// Drop negative counts and non-monotonic timestamps, keeping the rest.
    ///
    /// Input must already be sorted by the caller; an out-of-order sample is
    /// dropped rather than reordered.
    pub fn sanitize(raw: &[RawActivitySample]) -> SanitizedSamples {
        let mut sanitized = SanitizedSamples {
            samples: Vec::with_capacity(raw.len()),
            rejected: Vec::new(),
        };
        let mut last_kept: Option<DateTime<Utc>> = None;

        for (index, record) in raw.iter().enumerate() {
            if let Some(previous) = last_kept {
                if record.timestamp <= previous {
                    tracing::warn!(
                        index,
                        timestamp = %record.timestamp.to_rfc3339(),
                        previous = %previous.to_rfc3339(),
                        "dropping non-monotonic activity sample"
                    );
                    sanitized.rejected.push(RejectedSample {
                        index,
                        timestamp: record.timestamp,
                        reason: RejectionReason::NonMonotonicTimestamp,
                    });
                    continue;
                }
            }

            match ActivitySample::try_new(record.timestamp, record.activity_count) {
                Ok(sample) => {
                    last_kept = Some(sample.timestamp);
                    sanitized.samples.push(sample);
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "dropping activity sample");
                    sanitized.rejected.push(RejectedSample {
                        index,
                        timestamp: record.timestamp,
                        reason: RejectionReason::NegativeCount,
                    });
                }
            }
        }

        sanitized
    }

    /// Redistribute daily totals into synthetic per-bucket samples.
    ///
    /// Each day is split over `sample_interval_minutes` buckets in the local
    /// calendar using [`DIURNAL_ACTIVITY_WEIGHTS`]. Duplicate dates keep the
    /// first total.
    pub fn expand_daily_totals(
        totals: &[DailyActivityTotal],
        config: &SegmenterConfig,
    ) -> Vec<ActivitySample> {
        let mut days: Vec<&DailyActivityTotal> = totals.iter().collect();
        days.sort_by_key(|t| t.date);
        days.dedup_by(|later, earlier| {
            let duplicate = later.date == earlier.date;
            if duplicate {
                tracing::warn!(date = %later.date, "ignoring duplicate daily total");
            }
            duplicate
        });

        let offset = config.offset();
        let interval = config.sample_interval_minutes.max(1);
        let buckets_per_day = (24 * 60) / interval;
        let buckets_per_hour = (60.0 / interval as f64).max(1.0);

        let mut samples = Vec::with_capacity(days.len() * buckets_per_day as usize);
        for day in days {
            let Some(midnight) = day.date.and_hms_opt(0, 0, 0) else {
                continue;
            };
            for bucket in 0..buckets_per_day {
                let local = midnight + Duration::minutes((bucket * interval) as i64);
                let weight = DIURNAL_ACTIVITY_WEIGHTS[local.hour() as usize];
                let count = (day.total_count as f64 * weight / buckets_per_hour).round();

                let Some(timestamp) = local.and_local_timezone(offset).single() else {
                    continue;
                };
                samples.push(ActivitySample::new(
                    timestamp.with_timezone(&Utc),
                    count.min(u32::MAX as f64) as u32,
                ));
            }
        }

        samples
    }

    /// Validate externally supplied sessions one by one.
    pub fn sessions_from_records(
        records: Vec<RawSleepSession>,
    ) -> (Vec<SleepSession>, Vec<RejectedSession>) {
        let mut sessions = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for (index, record) in records.into_iter().enumerate() {
            let id = record.id.clone();
            match SleepSession::try_from(record) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(index, error = %e, "dropping sleep session");
                    rejected.push(RejectedSession {
                        index,
                        id,
                        reason: RejectionReason::InvertedSession,
                        message: e.to_string(),
                    });
                }
            }
        }

        (sessions, rejected)
    }

    /// Parse a JSON array of sessions, dropping invalid entries.
    pub fn parse_sessions(
        json: &str,
    ) -> Result<(Vec<SleepSession>, Vec<RejectedSession>), ComputeError> {
        let records: Vec<RawSleepSession> = serde_json::from_str(json)?;
        Ok(Self::sessions_from_records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn raw(h: u32, m: u32, count: i64) -> RawActivitySample {
        RawActivitySample {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap(),
            activity_count: count,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum: f64 = DIURNAL_ACTIVITY_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let morning = DIURNAL_ACTIVITY_WEIGHTS[7] + DIURNAL_ACTIVITY_WEIGHTS[8];
        assert!((morning - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_sanitize_drops_bad_samples_individually() {
        let input = vec![
            raw(1, 0, 0),
            raw(1, 5, -3),
            raw(1, 10, 4),
            raw(1, 5, 0),
            raw(1, 10, 9),
            raw(1, 15, 2),
        ];
        let sanitized = SampleAdapter::sanitize(&input);

        assert_eq!(sanitized.samples.len(), 3);
        assert_eq!(sanitized.rejected.len(), 3);
        assert_eq!(sanitized.rejected[0].index, 1);
        assert_eq!(sanitized.rejected[0].reason, RejectionReason::NegativeCount);
        assert_eq!(
            sanitized.rejected[1].reason,
            RejectionReason::NonMonotonicTimestamp
        );
        assert_eq!(sanitized.rejected[2].index, 4);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"timestamp\": \"2024-01-15T00:00:00Z\", \"activity_count\": 1}\n\nnot json\n";
        let err = SampleAdapter::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_expand_daily_totals() {
        let config = SegmenterConfig::default();
        let totals = vec![DailyActivityTotal {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            total_count: 9600,
        }];
        let samples = SampleAdapter::expand_daily_totals(&totals, &config);

        assert_eq!(samples.len(), 288);
        // 9600 * 0.075 / 12 = 60 per bucket during 07:00-09:00
        assert_eq!(samples[7 * 12].activity_count, 60);
        // 9600 * 0.001 / 12 rounds to 1, below the noise floor
        assert!(samples[2 * 12].activity_count <= config.noise_floor);
        assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_expand_respects_offset() {
        let config = SegmenterConfig {
            utc_offset_minutes: 120,
            ..Default::default()
        };
        let totals = vec![DailyActivityTotal {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            total_count: 1000,
        }];
        let samples = SampleAdapter::expand_daily_totals(&totals, &config);
        assert_eq!(
            samples[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 14, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_sessions_from_records() {
        let json = r#"[
            {"sleep_start": "2024-01-14T23:00:00Z", "sleep_end": "2024-01-15T07:00:00Z", "source": "sensor"},
            {"id": "broken", "sleep_start": "2024-01-16T07:00:00Z", "sleep_end": "2024-01-15T23:00:00Z", "source": "sensor"}
        ]"#;
        let (sessions, rejected) = SampleAdapter::parse_sessions(json).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id.as_deref(), Some("broken"));
        assert_eq!(rejected[0].reason, RejectionReason::InvertedSession);
    }
}
