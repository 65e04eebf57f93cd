//! Core types for the Synheart Rhythm engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: activity samples, sleep sessions, the derived sleep profile and the
//! read model handed to UI and alarm consumers.

use crate::error::ComputeError;
use crate::schema::RawSleepSession;
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minutes in a day
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A single activity reading from the sensor layer, typically one 5-minute bucket.
///
/// Gaps between samples mean "unknown", never "zero activity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySample {
    /// Bucket start (UTC)
    pub timestamp: DateTime<Utc>,
    /// Activity count for the bucket (steps or accelerometer counts)
    pub activity_count: u32,
}

impl ActivitySample {
    pub fn new(timestamp: DateTime<Utc>, activity_count: u32) -> Self {
        Self {
            timestamp,
            activity_count,
        }
    }

    /// Build a sample from an untrusted count, rejecting negative values.
    pub fn try_new(timestamp: DateTime<Utc>, activity_count: i64) -> Result<Self, ComputeError> {
        let count = u32::try_from(activity_count).map_err(|_| {
            ComputeError::InvalidSample(format!(
                "activity count {} at {} is out of range",
                activity_count,
                timestamp.to_rfc3339()
            ))
        })?;
        Ok(Self::new(timestamp, count))
    }
}

/// Where a sleep session came from.
///
/// Ordered by trust when a sync supersedes same-date sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionSource {
    Sensor,
    SensorInferred,
    Manual,
    Demo,
}

impl SessionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionSource::Sensor => "sensor",
            SessionSource::SensorInferred => "sensor-inferred",
            SessionSource::Manual => "manual",
            SessionSource::Demo => "demo",
        }
    }

    /// Trust rank; a session only supersedes one of equal or lower rank.
    pub fn trust_rank(&self) -> u8 {
        match self {
            SessionSource::Manual => 3,
            SessionSource::Sensor => 2,
            SessionSource::SensorInferred => 1,
            SessionSource::Demo => 0,
        }
    }
}

/// A validated sleep session.
///
/// Fields are private so the invariants hold for every instance:
/// `sleep_end > sleep_start` and `duration_minutes` is the rounded span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSleepSession", into = "RawSleepSession")]
pub struct SleepSession {
    id: String,
    calendar_date: NaiveDate,
    sleep_start: DateTime<Utc>,
    sleep_end: DateTime<Utc>,
    duration_minutes: u32,
    source: SessionSource,
}

impl SleepSession {
    /// Create a session, rejecting empty or inverted spans.
    pub fn new(
        id: impl Into<String>,
        calendar_date: NaiveDate,
        sleep_start: DateTime<Utc>,
        sleep_end: DateTime<Utc>,
        source: SessionSource,
    ) -> Result<Self, ComputeError> {
        let id = id.into();
        if sleep_end <= sleep_start {
            return Err(ComputeError::InvalidSession(format!(
                "session {} ends at {} which is not after its start {}",
                id,
                sleep_end.to_rfc3339(),
                sleep_start.to_rfc3339()
            )));
        }

        let seconds = (sleep_end - sleep_start).num_seconds();
        let duration_minutes = (seconds as f64 / 60.0).round() as u32;
        if duration_minutes == 0 {
            return Err(ComputeError::InvalidSession(format!(
                "session {} is shorter than half a minute",
                id
            )));
        }

        Ok(Self {
            id,
            calendar_date,
            sleep_start,
            sleep_end,
            duration_minutes,
            source,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn calendar_date(&self) -> NaiveDate {
        self.calendar_date
    }

    pub fn sleep_start(&self) -> DateTime<Utc> {
        self.sleep_start
    }

    pub fn sleep_end(&self) -> DateTime<Utc> {
        self.sleep_end
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn source(&self) -> SessionSource {
        self.source
    }
}

impl TryFrom<RawSleepSession> for SleepSession {
    type Error = ComputeError;

    fn try_from(raw: RawSleepSession) -> Result<Self, Self::Error> {
        let calendar_date = raw
            .calendar_date
            .unwrap_or_else(|| raw.sleep_start.date_naive());
        let id = raw
            .id
            .unwrap_or_else(|| format!("{}-{}", raw.source.as_str(), calendar_date));
        SleepSession::new(id, calendar_date, raw.sleep_start, raw.sleep_end, raw.source)
    }
}

impl From<SleepSession> for RawSleepSession {
    fn from(session: SleepSession) -> Self {
        RawSleepSession {
            id: Some(session.id),
            calendar_date: Some(session.calendar_date),
            sleep_start: session.sleep_start,
            sleep_end: session.sleep_end,
            duration_minutes: Some(session.duration_minutes),
            source: session.source,
        }
    }
}

/// A local wall-clock time, minute resolution, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ComputeError> {
        if hour > 23 || minute > 59 {
            return Err(ComputeError::InvalidTimeOfDay(format!(
                "{:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self {
            minutes: hour as u16 * 60 + minute as u16,
        })
    }

    /// Minutes since local midnight (0..1440)
    pub fn minutes_since_midnight(&self) -> u32 {
        self.minutes as u32
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    /// Wall-clock time of a naive time, truncated to the minute.
    pub fn from_naive(time: NaiveTime) -> Self {
        Self {
            minutes: (time.hour() * 60 + time.minute()) as u16,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ComputeError::InvalidTimeOfDay(s.to_string()))?;
        let hour: u8 = hour
            .parse()
            .map_err(|_| ComputeError::InvalidTimeOfDay(s.to_string()))?;
        let minute: u8 = minute
            .parse()
            .map_err(|_| ComputeError::InvalidTimeOfDay(s.to_string()))?;
        TimeOfDay::new(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ComputeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Habitual wake and sleep times used to anchor the energy curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepAnchors {
    pub wake: TimeOfDay,
    pub sleep: TimeOfDay,
}

impl Default for SleepAnchors {
    fn default() -> Self {
        Self {
            wake: TimeOfDay { minutes: 7 * 60 },
            sleep: TimeOfDay { minutes: 23 * 60 },
        }
    }
}

/// Natural tendency toward morning or evening alertness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chronotype {
    Morning,
    Evening,
    #[default]
    Balanced,
}

/// One sample of the 24-hour energy curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Local hour of day (0-23)
    pub hour_of_day: u8,
    /// Predicted alertness (0-100)
    pub energy: f64,
}

/// Severity bucket for the current sleep debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtSeverity {
    Good,
    Okay,
    Warning,
}

/// Derived sleep model, always replaced as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepProfile {
    /// Estimated nightly sleep need (300-690 minutes)
    pub sleep_need_minutes: u32,
    /// Decayed sleep debt (-900 to 0 minutes)
    pub sleep_debt_minutes: i32,
    /// 24 hourly curve points
    pub circadian_curve: Vec<CurvePoint>,
    /// When this profile was computed
    pub last_computed_at: DateTime<Utc>,
}

/// Read model exposed to UI and alarm consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmSummary {
    /// Energy at the time of computation (0-100)
    pub current_energy: f64,
    /// Highest point of the curve (earliest hour on ties)
    pub peak: CurvePoint,
    /// Lowest point of the curve (earliest hour on ties)
    pub valley: CurvePoint,
    pub curve: Vec<CurvePoint>,
    pub debt_severity: DebtSeverity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
    }

    #[test]
    fn test_session_duration_is_rounded() {
        let start = utc(0, 0);
        let end = start + chrono::Duration::seconds(7 * 3600 + 89);
        let session = SleepSession::new(
            "s1",
            start.date_naive(),
            start,
            end,
            SessionSource::Sensor,
        )
        .unwrap();
        assert_eq!(session.duration_minutes(), 421);
    }

    #[test]
    fn test_session_rejects_inverted_span() {
        let result = SleepSession::new(
            "bad",
            utc(0, 0).date_naive(),
            utc(7, 0),
            utc(7, 0),
            SessionSource::Manual,
        );
        assert!(matches!(result, Err(ComputeError::InvalidSession(_))));
    }

    #[test]
    fn test_session_json_is_validated() {
        let json = r#"{
            "sleep_start": "2024-01-15T07:00:00Z",
            "sleep_end": "2024-01-14T23:00:00Z",
            "source": "sensor"
        }"#;
        assert!(serde_json::from_str::<SleepSession>(json).is_err());

        let json = r#"{
            "sleep_start": "2024-01-14T23:00:00Z",
            "sleep_end": "2024-01-15T07:00:00Z",
            "source": "sensor-inferred"
        }"#;
        let session: SleepSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.duration_minutes(), 480);
        assert_eq!(session.source(), SessionSource::SensorInferred);
        assert_eq!(session.id(), "sensor-inferred-2024-01-14");
    }

    #[test]
    fn test_time_of_day_parsing() {
        let t: TimeOfDay = "06:45".parse().unwrap();
        assert_eq!(t.minutes_since_midnight(), 405);
        assert_eq!(t.to_string(), "06:45");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("7".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_negative_sample_count_rejected() {
        assert!(ActivitySample::try_new(utc(1, 0), -4).is_err());
        assert_eq!(ActivitySample::try_new(utc(1, 0), 12).unwrap().activity_count, 12);
    }

    #[test]
    fn test_trust_ranking() {
        assert!(SessionSource::Sensor.trust_rank() > SessionSource::SensorInferred.trust_rank());
        assert!(SessionSource::SensorInferred.trust_rank() > SessionSource::Demo.trust_rank());
    }
}
