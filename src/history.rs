//! Session history management
//!
//! This module keeps the rolling, per-date sleep session history the engine
//! recomputes from. Syncs supersede same-date sessions by source trust
//! (manual > sensor > sensor-inferred > demo); sessions are replaced, never
//! mutated.

use crate::error::ComputeError;
use crate::types::{SessionSource, SleepSession};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default history window in days
pub const DEFAULT_HISTORY_DAYS: usize = 60;

/// Outcome of merging a batch of sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Sessions for dates that had none
    pub added: usize,
    /// Sessions that superseded an existing one
    pub replaced: usize,
    /// Incoming sessions ignored in favour of a higher-trust existing one
    pub kept: usize,
}

/// Per-date session store with a bounded window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistory {
    sessions: BTreeMap<NaiveDate, SleepSession>,
    max_days: usize,
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DAYS)
    }
}

impl SessionHistory {
    /// Create an empty history keeping at most `max_days` dates
    pub fn new(max_days: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            max_days: max_days.max(1),
        }
    }

    /// Merge sessions, superseding same-date entries of equal or lower trust.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = SleepSession>) -> MergeReport {
        let mut report = MergeReport::default();

        for session in incoming {
            let date = session.calendar_date();
            match self.sessions.get(&date).map(|s| s.source()) {
                None => {
                    self.sessions.insert(date, session);
                    report.added += 1;
                }
                Some(existing) if session.source().trust_rank() >= existing.trust_rank() => {
                    tracing::info!(
                        %date,
                        from = existing.as_str(),
                        to = session.source().as_str(),
                        "superseding sleep session"
                    );
                    self.sessions.insert(date, session);
                    report.replaced += 1;
                }
                Some(_) => {
                    report.kept += 1;
                }
            }
        }

        while self.sessions.len() > self.max_days {
            self.sessions.pop_first();
        }

        report
    }

    /// Record a session entered by the user.
    pub fn add_manual(
        &mut self,
        sleep_start: DateTime<Utc>,
        sleep_end: DateTime<Utc>,
        calendar_date: Option<NaiveDate>,
    ) -> Result<SleepSession, ComputeError> {
        let date = calendar_date.unwrap_or_else(|| sleep_start.date_naive());
        let session = SleepSession::new(
            Uuid::new_v4().to_string(),
            date,
            sleep_start,
            sleep_end,
            SessionSource::Manual,
        )?;
        self.merge([session.clone()]);
        Ok(session)
    }

    /// Sessions in ascending date order
    pub fn sessions(&self) -> Vec<SleepSession> {
        self.sessions.values().cloned().collect()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&SleepSession> {
        self.sessions.get(&date)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Load history from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize history to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session(day: u32, minutes: i64, source: SessionSource) -> SleepSession {
        let start = Utc.with_ymd_and_hms(2024, 2, day, 23, 0, 0).unwrap();
        SleepSession::new(
            format!("{}-{}", source.as_str(), day),
            start.date_naive(),
            start,
            start + Duration::minutes(minutes),
            source,
        )
        .unwrap()
    }

    #[test]
    fn test_higher_trust_supersedes() {
        let mut history = SessionHistory::default();
        history.merge([session(1, 400, SessionSource::Demo)]);
        let report = history.merge([session(1, 420, SessionSource::SensorInferred)]);
        assert_eq!(report.replaced, 1);

        let report = history.merge([session(1, 450, SessionSource::Sensor)]);
        assert_eq!(report.replaced, 1);

        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(history.get(date).unwrap().duration_minutes(), 450);
    }

    #[test]
    fn test_lower_trust_is_ignored() {
        let mut history = SessionHistory::default();
        history.merge([session(1, 450, SessionSource::Sensor)]);
        let report = history.merge([
            session(1, 300, SessionSource::SensorInferred),
            session(2, 420, SessionSource::SensorInferred),
        ]);

        assert_eq!(
            report,
            MergeReport {
                added: 1,
                replaced: 0,
                kept: 1
            }
        );
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(history.get(date).unwrap().source(), SessionSource::Sensor);
    }

    #[test]
    fn test_manual_sessions_survive_sync() {
        let mut history = SessionHistory::default();
        let start = Utc.with_ymd_and_hms(2024, 2, 3, 22, 30, 0).unwrap();
        let manual = history
            .add_manual(start, start + Duration::hours(8), None)
            .unwrap();
        assert_eq!(manual.source(), SessionSource::Manual);

        history.merge([session(3, 300, SessionSource::Sensor)]);
        assert_eq!(history.get(start.date_naive()).unwrap().id(), manual.id());
    }

    #[test]
    fn test_manual_rejects_inverted_span() {
        let mut history = SessionHistory::default();
        let start = Utc.with_ymd_and_hms(2024, 2, 3, 22, 30, 0).unwrap();
        assert!(history.add_manual(start, start, None).is_err());
        assert!(history.is_empty());
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut history = SessionHistory::new(3);
        history.merge((1..=5).map(|d| session(d, 420, SessionSource::Sensor)));
        let dates: Vec<u32> = history
            .sessions()
            .iter()
            .map(|s| chrono::Datelike::day(&s.calendar_date()))
            .collect();
        assert_eq!(dates, vec![3, 4, 5]);
    }

    #[test]
    fn test_serialization() {
        let mut history = SessionHistory::new(7);
        history.merge([session(1, 420, SessionSource::Sensor)]);
        let json = history.to_json().unwrap();
        let loaded = SessionHistory::from_json(&json).unwrap();
        assert_eq!(loaded.sessions(), history.sessions());
    }
}
