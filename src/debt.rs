//! Sleep debt accumulation
//!
//! Debt is the recency-weighted sum of nightly shortfalls over the last two
//! weeks of history. Surplus sleep never offsets a shortfall, so debt is always
//! zero or negative.

use crate::config::{DebtConfig, SeverityThresholds};
use crate::types::{DebtSeverity, SleepSession};
use chrono::{Duration, NaiveDate};

/// Accumulate decayed sleep debt in minutes, within `[-max_debt_minutes, 0]`.
///
/// The window is anchored on the most recent session's calendar date.
pub fn accumulate_debt(sessions: &[SleepSession], need_minutes: u32, config: &DebtConfig) -> i32 {
    let Some(latest) = sessions.iter().map(|s| s.calendar_date()).max() else {
        return 0;
    };
    let window_start = latest
        .checked_sub_signed(Duration::days(i64::from(config.window_days.saturating_sub(1))))
        .unwrap_or(NaiveDate::MIN);

    let mut recent: Vec<&SleepSession> = sessions
        .iter()
        .filter(|s| s.calendar_date() >= window_start)
        .collect();
    recent.sort_by_key(|s| (s.calendar_date(), s.sleep_start()));

    let n = recent.len();
    let weighted: f64 = recent
        .iter()
        .enumerate()
        .map(|(i, session)| {
            let shortfall = need_minutes.saturating_sub(session.duration_minutes());
            if shortfall < config.deficit_tolerance_minutes {
                return 0.0;
            }
            let decay = (-config.decay_rate * (n - i - 1) as f64).exp();
            shortfall as f64 * decay
        })
        .sum();

    if !weighted.is_finite() {
        tracing::warn!(sessions = n, "non-finite sleep debt, using zero");
        return 0;
    }

    let floor = -config.max_debt_minutes.max(0);
    let debt = -(weighted.round());
    (debt.max(floor as f64) as i32).clamp(floor, 0)
}

/// Bucket a debt value for display.
pub fn debt_severity(debt_minutes: i32, thresholds: &SeverityThresholds) -> DebtSeverity {
    let magnitude = debt_minutes.unsigned_abs();
    if magnitude < thresholds.okay_from_minutes {
        DebtSeverity::Good
    } else if magnitude < thresholds.warning_from_minutes {
        DebtSeverity::Okay
    } else {
        DebtSeverity::Warning
    }
}
