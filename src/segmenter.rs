//! Sleep segmentation
//!
//! This module scans an activity series for long inactivity runs inside the
//! night window and turns them into sleep sessions:
//! - Runs are tracked across midnight (the night window is contiguous)
//! - Data gaps and window edges close a run; gaps never count as inactivity.
//!   The part of a run observed before a gap is still a candidate when it
//!   meets the minimum run length on its own; the missing stretch is never
//!   added to it
//! - Runs still open at the end of the data are discarded
//! - At most one session per calendar date, the longest wins

use crate::config::SegmenterConfig;
use crate::types::{ActivitySample, SessionSource, SleepSession};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use std::collections::BTreeMap;

/// Why an inactivity run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    ActivityResumed,
    DataGap,
    WindowClosed,
}

/// A contiguous span of inactive samples
#[derive(Debug, Clone, Copy)]
struct InactivityRun {
    start: DateTime<Utc>,
    last_inactive: DateTime<Utc>,
}

/// Segmenter for turning activity samples into sleep sessions
#[derive(Debug, Clone, Default)]
pub struct SleepSegmenter {
    config: SegmenterConfig,
}

impl SleepSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segment a timestamp-ascending series into sleep sessions sorted by date.
    ///
    /// Samples that do not advance the timestamp are skipped.
    pub fn segment(&self, samples: &[ActivitySample]) -> Vec<SleepSession> {
        let offset = self.config.offset();
        let max_gap = Duration::minutes(self.config.max_gap_minutes as i64);

        let mut by_date: BTreeMap<NaiveDate, SleepSession> = BTreeMap::new();
        let mut run: Option<InactivityRun> = None;
        let mut previous: Option<DateTime<Utc>> = None;

        for sample in samples {
            if let Some(prev) = previous {
                if sample.timestamp <= prev {
                    tracing::warn!(
                        timestamp = %sample.timestamp.to_rfc3339(),
                        "skipping non-monotonic sample during segmentation"
                    );
                    continue;
                }
                if sample.timestamp - prev > max_gap {
                    if let Some(open) = run.take() {
                        self.close_run(open, RunEnd::DataGap, &mut by_date);
                    }
                }
            }
            previous = Some(sample.timestamp);

            let local_hour = sample.timestamp.with_timezone(&offset).hour();
            if !self.config.in_night_window(local_hour) {
                if let Some(open) = run.take() {
                    self.close_run(open, RunEnd::WindowClosed, &mut by_date);
                }
                continue;
            }

            if sample.activity_count <= self.config.noise_floor {
                match run.as_mut() {
                    Some(open) => open.last_inactive = sample.timestamp,
                    None => {
                        run = Some(InactivityRun {
                            start: sample.timestamp,
                            last_inactive: sample.timestamp,
                        })
                    }
                }
            } else if let Some(open) = run.take() {
                self.close_run(open, RunEnd::ActivityResumed, &mut by_date);
            }
        }

        if let Some(open) = run {
            tracing::debug!(
                start = %open.start.to_rfc3339(),
                "discarding inactivity run still open at end of data"
            );
        }

        by_date.into_values().collect()
    }

    fn close_run(
        &self,
        run: InactivityRun,
        reason: RunEnd,
        by_date: &mut BTreeMap<NaiveDate, SleepSession>,
    ) {
        let end = run.last_inactive + Duration::minutes(self.config.sample_interval_minutes as i64);
        let minutes = ((end - run.start).num_seconds() as f64 / 60.0).round() as u32;

        if minutes < self.config.min_run_minutes {
            return;
        }
        if minutes < self.config.min_session_minutes || minutes > self.config.max_session_minutes {
            tracing::debug!(
                start = %run.start.to_rfc3339(),
                minutes,
                ?reason,
                "rejecting inactivity run outside session duration bounds"
            );
            return;
        }

        let local_start = run.start.with_timezone(&self.config.offset());
        let mut date = local_start.date_naive();
        if local_start.hour() < self.config.early_start_cutoff_hour as u32 {
            date = date.pred_opt().unwrap_or(date);
        }

        let session = match SleepSession::new(
            format!("inferred-{}", date),
            date,
            run.start,
            end,
            SessionSource::SensorInferred,
        ) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed inferred session");
                return;
            }
        };

        tracing::debug!(
            %date,
            minutes = session.duration_minutes(),
            ?reason,
            "accepted sleep candidate"
        );

        match by_date.get(&date) {
            Some(existing) if existing.duration_minutes() >= session.duration_minutes() => {}
            _ => {
                by_date.insert(date, session);
            }
        }
    }
}

/// Segment samples with the given configuration.
pub fn segment(samples: &[ActivitySample], config: &SegmenterConfig) -> Vec<SleepSession> {
    SleepSegmenter::new(config.clone()).segment(samples)
}
