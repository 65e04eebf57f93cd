//! Sleep need estimation
//!
//! Need is the habitual duration nudged upward by a fraction of its spread,
//! since habitual sleep alone underestimates need for people already in debt.
//! Blending toward the population default is available through
//! `prior_weight_sessions` but off by default.

use crate::config::NeedConfig;
use crate::types::SleepSession;

/// Estimate nightly sleep need in minutes, always within the configured clamp.
pub fn estimate_need(sessions: &[SleepSession], config: &NeedConfig) -> u32 {
    let fallback = config.default_minutes.clamp(config.min_minutes, config.max_minutes);

    if sessions.is_empty() || sessions.len() < config.min_sessions {
        return fallback;
    }

    let n = sessions.len() as f64;
    let durations: Vec<f64> = sessions
        .iter()
        .map(|s| s.duration_minutes() as f64)
        .collect();
    let mean = durations.iter().sum::<f64>() / n;
    let variance = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let habitual = mean + config.std_dev_factor * std_dev;
    let weight = n / (n + config.prior_weight_sessions);
    let need = weight * habitual + (1.0 - weight) * config.default_minutes as f64;

    if !need.is_finite() {
        tracing::warn!(mean, std_dev, "non-finite sleep need, using default");
        return fallback;
    }

    (need.round() as u32).clamp(config.min_minutes, config.max_minutes)
}
