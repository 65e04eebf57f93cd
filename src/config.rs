//! Engine configuration
//!
//! Every tunable constant of the engine lives here with its documented default.
//! The decay constant and the need adjustment factor are hand-tuned rather than
//! derived, so they are exposed instead of hard-coded.

use crate::error::ComputeError;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Default sleep need when there is not enough history (minutes)
pub const DEFAULT_SLEEP_NEED_MINUTES: u32 = 480;

/// Sleep need clamp (minutes)
pub const MIN_SLEEP_NEED_MINUTES: u32 = 300;
pub const MAX_SLEEP_NEED_MINUTES: u32 = 690;

/// Sleep debt floor (minutes); debt is never positive
pub const MAX_SLEEP_DEBT_MINUTES: i32 = 900;

/// Longest accepted debt window (days)
pub const MAX_DEBT_WINDOW_DAYS: u32 = 3650;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    pub segmenter: SegmenterConfig,
    pub need: NeedConfig,
    pub debt: DebtConfig,
    pub curve: CurveConfig,
    pub severity: SeverityThresholds,
}

impl RhythmConfig {
    /// Load configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: RhythmConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject values that would make the computations meaningless.
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.segmenter.validate()?;
        self.need.validate()?;
        self.debt.validate()?;
        self.curve.validate()?;
        self.severity.validate()
    }
}

/// Sleep segmentation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Local calendar offset from UTC (minutes)
    pub utc_offset_minutes: i32,
    /// Nominal spacing of samples (minutes)
    pub sample_interval_minutes: u32,
    /// Counts at or below this value are treated as inactivity
    pub noise_floor: u32,
    /// Night window opens at this local hour
    pub night_start_hour: u8,
    /// Night window closes at this local hour (exclusive)
    pub night_end_hour: u8,
    /// A run starting before this local hour is dated to the previous day
    pub early_start_cutoff_hour: u8,
    /// Minimum inactivity run to become a candidate (minutes)
    pub min_run_minutes: u32,
    /// Accepted session duration range (minutes)
    pub min_session_minutes: u32,
    pub max_session_minutes: u32,
    /// Spacing above which consecutive samples are treated as a data gap (minutes)
    pub max_gap_minutes: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            sample_interval_minutes: 5,
            noise_floor: 3,
            night_start_hour: 21,
            night_end_hour: 11,
            early_start_cutoff_hour: 3,
            min_run_minutes: 180,
            min_session_minutes: 120,
            max_session_minutes: 780,
            max_gap_minutes: 15,
        }
    }
}

impl SegmenterConfig {
    /// Fixed offset of the local calendar
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Whether a local hour falls inside the night window
    pub fn in_night_window(&self, hour: u32) -> bool {
        let start = self.night_start_hour as u32;
        let end = self.night_end_hour as u32;
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ComputeError::InvalidConfig(format!(
                "utc_offset_minutes {} is outside +/-24h",
                self.utc_offset_minutes
            )));
        }
        if self.sample_interval_minutes == 0 {
            return Err(ComputeError::InvalidConfig(
                "sample_interval_minutes must be positive".to_string(),
            ));
        }
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            return Err(ComputeError::InvalidConfig(
                "night window hours must be 0-23".to_string(),
            ));
        }
        if self.min_session_minutes > self.max_session_minutes {
            return Err(ComputeError::InvalidConfig(format!(
                "min_session_minutes {} exceeds max_session_minutes {}",
                self.min_session_minutes, self.max_session_minutes
            )));
        }
        if self.max_gap_minutes < self.sample_interval_minutes {
            return Err(ComputeError::InvalidConfig(
                "max_gap_minutes must be at least one sample interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sleep need estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedConfig {
    /// Sessions required before the history is trusted
    pub min_sessions: usize,
    /// Weight of the population standard deviation added to the mean
    pub std_dev_factor: f64,
    /// Pseudo-count of default nights blended into the estimate; 0 (default) disables
    pub prior_weight_sessions: f64,
    pub default_minutes: u32,
    pub min_minutes: u32,
    pub max_minutes: u32,
}

impl Default for NeedConfig {
    fn default() -> Self {
        Self {
            min_sessions: 3,
            std_dev_factor: 0.2,
            prior_weight_sessions: 0.0,
            default_minutes: DEFAULT_SLEEP_NEED_MINUTES,
            min_minutes: MIN_SLEEP_NEED_MINUTES,
            max_minutes: MAX_SLEEP_NEED_MINUTES,
        }
    }
}

impl NeedConfig {
    fn validate(&self) -> Result<(), ComputeError> {
        if self.min_minutes > self.max_minutes {
            return Err(ComputeError::InvalidConfig(format!(
                "need min_minutes {} exceeds max_minutes {}",
                self.min_minutes, self.max_minutes
            )));
        }
        if !self.std_dev_factor.is_finite() || !self.prior_weight_sessions.is_finite() {
            return Err(ComputeError::InvalidConfig(
                "need factors must be finite".to_string(),
            ));
        }
        if self.prior_weight_sessions < 0.0 {
            return Err(ComputeError::InvalidConfig(
                "prior_weight_sessions must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sleep debt accumulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtConfig {
    /// Calendar days of history considered
    pub window_days: u32,
    /// Exponential recency decay per session step
    pub decay_rate: f64,
    /// Nightly shortfalls below this are ignored; 0 (default) counts every shortfall
    pub deficit_tolerance_minutes: u32,
    /// Debt floor magnitude (minutes)
    pub max_debt_minutes: i32,
}

impl Default for DebtConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            decay_rate: 0.05,
            deficit_tolerance_minutes: 0,
            max_debt_minutes: MAX_SLEEP_DEBT_MINUTES,
        }
    }
}

impl DebtConfig {
    fn validate(&self) -> Result<(), ComputeError> {
        if self.window_days == 0 || self.window_days > MAX_DEBT_WINDOW_DAYS {
            return Err(ComputeError::InvalidConfig(format!(
                "debt window_days {} must be within 1-{}",
                self.window_days, MAX_DEBT_WINDOW_DAYS
            )));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(ComputeError::InvalidConfig(format!(
                "decay_rate {} must be a non-negative number",
                self.decay_rate
            )));
        }
        if self.max_debt_minutes < 0 {
            return Err(ComputeError::InvalidConfig(
                "max_debt_minutes must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Two-process energy curve parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    pub circadian_mesor: f64,
    pub circadian_amplitude: f64,
    /// Endogenous period (hours)
    pub circadian_period_hours: f64,
    /// Hour at which the oscillator crosses its mesor upward
    pub circadian_phase_hour: f64,
    /// Post-lunch dip, applied for hours 14-16
    pub afternoon_dip: f64,
    /// Pre-dawn trough, applied for hours 2-5
    pub predawn_dip: f64,
    /// Saturating rise time constant while awake (hours)
    pub pressure_rise_tau_hours: f64,
    /// Wake duration at which the rise reaches its nominal scale (hours)
    pub pressure_scale_hours: f64,
    pub pressure_cap: f64,
    /// Decay time constant while asleep (hours)
    pub pressure_decay_tau_hours: f64,
    pub chronotype_shift: f64,
    pub balanced_boost: f64,
    /// Debt penalty per hour of debt
    pub debt_penalty_per_hour: f64,
    pub max_debt_penalty: f64,
    /// Debts smaller than this apply at half strength (hours)
    pub small_debt_hours: f64,
    pub inertia_penalty: f64,
    pub inertia_minutes: u32,
    /// Need at which the baseline shift is zero (hours)
    pub reference_need_hours: f64,
    pub need_shift_per_hour: f64,
    /// Energy of the flat curve used when no history exists
    pub neutral_energy: f64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            circadian_mesor: 50.0,
            circadian_amplitude: 45.0,
            circadian_period_hours: 24.2,
            circadian_phase_hour: 6.0,
            afternoon_dip: 8.0,
            predawn_dip: 12.0,
            pressure_rise_tau_hours: 18.2,
            pressure_scale_hours: 16.0,
            pressure_cap: 35.0,
            pressure_decay_tau_hours: 2.5,
            chronotype_shift: 6.0,
            balanced_boost: 3.0,
            debt_penalty_per_hour: 2.5,
            max_debt_penalty: 20.0,
            small_debt_hours: 2.0,
            inertia_penalty: 20.0,
            inertia_minutes: 30,
            reference_need_hours: 8.0,
            need_shift_per_hour: 2.5,
            neutral_energy: 50.0,
        }
    }
}

impl CurveConfig {
    fn validate(&self) -> Result<(), ComputeError> {
        let positives = [
            ("circadian_period_hours", self.circadian_period_hours),
            ("pressure_rise_tau_hours", self.pressure_rise_tau_hours),
            ("pressure_scale_hours", self.pressure_scale_hours),
            ("pressure_decay_tau_hours", self.pressure_decay_tau_hours),
        ];
        for (name, value) in positives {
            if !value.is_finite() || value <= 0.0 {
                return Err(ComputeError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.neutral_energy) {
            return Err(ComputeError::InvalidConfig(format!(
                "neutral_energy {} is outside 0-100",
                self.neutral_energy
            )));
        }
        Ok(())
    }
}

/// Debt magnitude thresholds for severity classification (minutes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    /// Debt magnitudes below this are `good`
    pub okay_from_minutes: u32,
    /// Debt magnitudes at or above this are `warning`
    pub warning_from_minutes: u32,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            okay_from_minutes: 120,
            warning_from_minutes: 300,
        }
    }
}

impl SeverityThresholds {
    fn validate(&self) -> Result<(), ComputeError> {
        if self.okay_from_minutes > self.warning_from_minutes {
            return Err(ComputeError::InvalidConfig(
                "okay threshold exceeds warning threshold".to_string(),
            ));
        }
        Ok(())
    }
}
