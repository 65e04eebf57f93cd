//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Rhythm.
//! It composes the stages in one direction: samples → sessions → {need, debt}
//! → curve → summary. Every call recomputes from its inputs and returns a new
//! snapshot; nothing is cached between calls.

use crate::config::RhythmConfig;
use crate::curve::{energy_at, generate_curve, neutral_curve, peak, valley};
use crate::debt::{accumulate_debt, debt_severity};
use crate::encoder::RhythmEncoder;
use crate::error::ComputeError;
use crate::history::{MergeReport, SessionHistory};
use crate::need::estimate_need;
use crate::schema::{
    RawActivitySample, RawSleepSession, RejectedSample, RejectedSession, SampleAdapter,
};
use crate::segmenter::SleepSegmenter;
use crate::types::{
    ActivitySample, Chronotype, CurvePoint, SleepAnchors, SleepProfile, SleepSession,
    RhythmSummary, TimeOfDay,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Profile and read model produced by one recomputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmSnapshot {
    pub profile: SleepProfile,
    pub summary: RhythmSummary,
    /// Sessions the profile was computed from
    pub session_count: usize,
}

/// Compute the sleep profile and summary for a session history.
///
/// Always recomputes need, then debt, then the curve. With no sessions the
/// result is the default profile (need 480, no debt, neutral curve).
///
/// # Example
/// ```ignore
/// let snapshot = compute_summary(
///     &sessions,
///     &SleepAnchors::default(),
///     Chronotype::Balanced,
///     Utc::now(),
///     &RhythmConfig::default(),
/// );
/// println!("energy now: {}", snapshot.summary.current_energy);
/// ```
pub fn compute_summary(
    sessions: &[SleepSession],
    anchors: &SleepAnchors,
    chronotype: Chronotype,
    now: DateTime<Utc>,
    config: &RhythmConfig,
) -> RhythmSnapshot {
    let need = estimate_need(sessions, &config.need);

    let (debt, curve) = if sessions.is_empty() {
        tracing::debug!("no sleep history, using default profile");
        (0, neutral_curve(&config.curve))
    } else {
        let debt = accumulate_debt(sessions, need, &config.debt);
        let curve = generate_curve(anchors, need, debt, chronotype, &config.curve);
        (debt, curve)
    };

    let fallback = CurvePoint {
        hour_of_day: 0,
        energy: config.curve.neutral_energy.clamp(0.0, 100.0),
    };
    let local_now = TimeOfDay::from_naive(now.with_timezone(&config.segmenter.offset()).time());

    let summary = RhythmSummary {
        current_energy: energy_at(&curve, local_now).unwrap_or(fallback.energy),
        peak: peak(&curve).unwrap_or(fallback),
        valley: valley(&curve).unwrap_or(fallback),
        curve: curve.clone(),
        debt_severity: debt_severity(debt, &config.severity),
    };

    tracing::debug!(
        sessions = sessions.len(),
        need,
        debt,
        current_energy = summary.current_energy,
        "computed rhythm summary"
    );

    RhythmSnapshot {
        profile: SleepProfile {
            sleep_need_minutes: need,
            sleep_debt_minutes: debt,
            circadian_curve: curve,
            last_computed_at: now,
        },
        summary,
        session_count: sessions.len(),
    }
}

/// One-shot: raw samples (JSON array or NDJSON) to a snapshot.
///
/// Malformed samples are dropped and logged; only unparseable input fails.
pub fn samples_to_summary(
    samples_json: &str,
    anchors: &SleepAnchors,
    chronotype: Chronotype,
    now: DateTime<Utc>,
    config: &RhythmConfig,
) -> Result<RhythmSnapshot, ComputeError> {
    let raw = parse_raw_samples(samples_json)?;
    let samples = SampleAdapter::sanitize(&raw).samples;
    let sessions = SleepSegmenter::new(config.segmenter.clone()).segment(&samples);
    Ok(compute_summary(&sessions, anchors, chronotype, now, config))
}

/// Accept either a JSON array or NDJSON
fn parse_raw_samples(input: &str) -> Result<Vec<RawActivitySample>, ComputeError> {
    if input.trim_start().starts_with('[') {
        SampleAdapter::parse_array(input)
    } else {
        SampleAdapter::parse_ndjson(input)
    }
}

/// Self-contained summary request, as accepted over FFI and the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryRequest {
    pub sessions: Vec<RawSleepSession>,
    pub anchors: SleepAnchors,
    pub chronotype: Chronotype,
    /// Defaults to the current time
    pub now: Option<DateTime<Utc>>,
    pub config: RhythmConfig,
}

/// Answer a [`SummaryRequest`] with an encoded payload.
pub fn compute_summary_json(request_json: &str) -> Result<String, ComputeError> {
    let request: SummaryRequest = serde_json::from_str(request_json)?;
    request.config.validate()?;

    let (sessions, rejected) = SampleAdapter::sessions_from_records(request.sessions);
    if !rejected.is_empty() {
        tracing::warn!(rejected = rejected.len(), "dropped invalid sessions from request");
    }

    let snapshot = compute_summary(
        &sessions,
        &request.anchors,
        request.chronotype,
        request.now.unwrap_or_else(Utc::now),
        &request.config,
    );
    RhythmEncoder::new()
        .with_min_sessions(request.config.need.min_sessions)
        .encode_to_json(&snapshot)
}

/// Data-quality report from one ingestion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub merge: MergeReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_samples: Vec<RejectedSample>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_sessions: Vec<RejectedSession>,
}

/// Persisted per-user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRhythmState {
    /// Last computed profile, absent until the first recomputation
    #[serde(flatten)]
    pub profile: Option<SleepProfile>,
    #[serde(default)]
    pub session_history: Vec<SleepSession>,
}

/// Stateful processor owning the session history and the last profile.
///
/// Recomputation takes `&mut self`, so one processor never has two
/// recomputations in flight; the previous profile is replaced as a whole.
pub struct RhythmProcessor {
    config: RhythmConfig,
    anchors: SleepAnchors,
    chronotype: Chronotype,
    segmenter: SleepSegmenter,
    history: SessionHistory,
    profile: Option<SleepProfile>,
}

impl Default for RhythmProcessor {
    fn default() -> Self {
        Self::new(RhythmConfig::default())
    }
}

impl RhythmProcessor {
    /// Create a processor with an empty history
    pub fn new(config: RhythmConfig) -> Self {
        Self {
            segmenter: SleepSegmenter::new(config.segmenter.clone()),
            config,
            anchors: SleepAnchors::default(),
            chronotype: Chronotype::default(),
            history: SessionHistory::default(),
            profile: None,
        }
    }

    /// Create a processor with a specific history window
    pub fn with_history_days(config: RhythmConfig, max_days: usize) -> Self {
        Self {
            history: SessionHistory::new(max_days),
            ..Self::new(config)
        }
    }

    pub fn set_anchors(&mut self, anchors: SleepAnchors) {
        self.anchors = anchors;
    }

    pub fn set_chronotype(&mut self, chronotype: Chronotype) {
        self.chronotype = chronotype;
    }

    pub fn anchors(&self) -> &SleepAnchors {
        &self.anchors
    }

    pub fn chronotype(&self) -> Chronotype {
        self.chronotype
    }

    pub fn config(&self) -> &RhythmConfig {
        &self.config
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Last computed profile, if any
    pub fn profile(&self) -> Option<&SleepProfile> {
        self.profile.as_ref()
    }

    /// Segment raw samples (JSON array or NDJSON) and merge the sessions.
    pub fn ingest_samples(&mut self, samples_json: &str) -> Result<IngestReport, ComputeError> {
        let raw = parse_raw_samples(samples_json)?;
        let sanitized = SampleAdapter::sanitize(&raw);
        let merge = self.ingest_activity(&sanitized.samples);

        Ok(IngestReport {
            merge,
            rejected_samples: sanitized.rejected,
            rejected_sessions: Vec::new(),
        })
    }

    /// Segment already validated samples and merge the sessions.
    pub fn ingest_activity(&mut self, samples: &[ActivitySample]) -> MergeReport {
        let sessions = self.segmenter.segment(samples);
        self.history.merge(sessions)
    }

    /// Merge externally supplied sessions (JSON array), dropping invalid ones.
    pub fn ingest_sessions(&mut self, sessions_json: &str) -> Result<IngestReport, ComputeError> {
        let (sessions, rejected) = SampleAdapter::parse_sessions(sessions_json)?;
        Ok(IngestReport {
            merge: self.history.merge(sessions),
            rejected_samples: Vec::new(),
            rejected_sessions: rejected,
        })
    }

    /// Record a user-entered session.
    pub fn add_manual_session(
        &mut self,
        sleep_start: DateTime<Utc>,
        sleep_end: DateTime<Utc>,
        calendar_date: Option<NaiveDate>,
    ) -> Result<SleepSession, ComputeError> {
        self.history.add_manual(sleep_start, sleep_end, calendar_date)
    }

    /// Recompute from the full history and replace the stored profile.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> RhythmSnapshot {
        let snapshot = compute_summary(
            &self.history.sessions(),
            &self.anchors,
            self.chronotype,
            now,
            &self.config,
        );
        self.profile = Some(snapshot.profile.clone());
        snapshot
    }

    /// Recompute and encode as a payload
    pub fn recompute_to_json(&mut self, now: DateTime<Utc>) -> Result<String, ComputeError> {
        let snapshot = self.recompute(now);
        RhythmEncoder::new()
            .with_min_sessions(self.config.need.min_sessions)
            .encode_to_json(&snapshot)
    }

    /// Save profile and history to JSON
    pub fn save_state(&self) -> Result<String, ComputeError> {
        let state = PersistedRhythmState {
            profile: self.profile.clone(),
            session_history: self.history.sessions(),
        };
        serde_json::to_string(&state).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    /// Load profile and history from JSON, replacing the current state
    pub fn load_state(&mut self, json: &str) -> Result<(), ComputeError> {
        let state: PersistedRhythmState =
            serde_json::from_str(json).map_err(|e| ComputeError::ParseError(e.to_string()))?;
        self.history.clear();
        self.history.merge(state.session_history);
        self.profile = state.profile;
        Ok(())
    }
}
