//! Circadian energy curve
//!
//! Two-process model sampled once per local hour:
//! - Process C: a ~24.2h sinusoid with heuristic afternoon and pre-dawn dips
//! - Process S: homeostatic pressure rising while awake, decaying while asleep
//!
//! Chronotype, sleep debt, sleep inertia and individual need shift the result,
//! which is clamped to 0-100. The dips are additive constants, not part of the
//! oscillator.

use crate::config::CurveConfig;
use crate::types::{Chronotype, CurvePoint, SleepAnchors, TimeOfDay, MINUTES_PER_DAY};
use std::f64::consts::PI;

/// Number of points in a curve
pub const CURVE_POINTS: usize = 24;

/// Generate the 24-point energy curve. Identical inputs give identical output.
pub fn generate_curve(
    anchors: &SleepAnchors,
    need_minutes: u32,
    debt_minutes: i32,
    chronotype: Chronotype,
    config: &CurveConfig,
) -> Vec<CurvePoint> {
    let debt_penalty = debt_penalty(debt_minutes, config);
    let need_shift = (config.reference_need_hours - need_minutes as f64 / 60.0)
        * config.need_shift_per_hour;

    (0..CURVE_POINTS as u8)
        .map(|hour| {
            let minute_of_day = hour as u32 * 60;
            let raw = circadian(hour, config) + chronotype_adjustment(hour, chronotype, config)
                - homeostatic_pressure(minute_of_day, anchors, config)
                - inertia_penalty(minute_of_day, anchors, config)
                - debt_penalty
                + need_shift;
            CurvePoint {
                hour_of_day: hour,
                energy: finalize(raw, config),
            }
        })
        .collect()
}

/// Flat curve used when there is no sleep history at all
pub fn neutral_curve(config: &CurveConfig) -> Vec<CurvePoint> {
    (0..CURVE_POINTS as u8)
        .map(|hour| CurvePoint {
            hour_of_day: hour,
            energy: config.neutral_energy.clamp(0.0, 100.0),
        })
        .collect()
}

/// Highest point of the curve; the earliest hour wins ties.
pub fn peak(curve: &[CurvePoint]) -> Option<CurvePoint> {
    curve.iter().copied().reduce(|best, p| {
        if p.energy > best.energy {
            p
        } else {
            best
        }
    })
}

/// Lowest point of the curve; the earliest hour wins ties.
pub fn valley(curve: &[CurvePoint]) -> Option<CurvePoint> {
    curve.iter().copied().reduce(|best, p| {
        if p.energy < best.energy {
            p
        } else {
            best
        }
    })
}

/// Energy at a wall-clock time, interpolated linearly between hourly points.
pub fn energy_at(curve: &[CurvePoint], time: TimeOfDay) -> Option<f64> {
    if curve.is_empty() {
        return None;
    }
    let len = curve.len();
    let minutes_per_point = MINUTES_PER_DAY as f64 / len as f64;
    let position = time.minutes_since_midnight() as f64 / minutes_per_point;
    let index = (position.floor() as usize).min(len - 1);
    let fraction = position - index as f64;

    let current = curve[index].energy;
    let next = curve[(index + 1) % len].energy;
    Some(current + (next - current) * fraction)
}

fn circadian(hour: u8, config: &CurveConfig) -> f64 {
    let phase = 2.0 * PI * (hour as f64 - config.circadian_phase_hour) / config.circadian_period_hours;
    let mut value = config.circadian_mesor + config.circadian_amplitude * phase.sin();
    if (14..=16).contains(&hour) {
        value -= config.afternoon_dip;
    }
    if (2..=5).contains(&hour) {
        value -= config.predawn_dip;
    }
    value
}

fn chronotype_adjustment(hour: u8, chronotype: Chronotype, config: &CurveConfig) -> f64 {
    let morning = (5..12).contains(&hour);
    let evening = hour >= 20;
    match chronotype {
        Chronotype::Morning if morning => config.chronotype_shift,
        Chronotype::Morning if evening => -config.chronotype_shift,
        Chronotype::Evening if morning => -config.chronotype_shift,
        Chronotype::Evening if evening => config.chronotype_shift,
        Chronotype::Balanced if (9..12).contains(&hour) => config.balanced_boost,
        _ => 0.0,
    }
}

/// Minutes from `from` forward to `to` on the 24h clock
fn minutes_after(to: u32, from: u32) -> u32 {
    (to + MINUTES_PER_DAY - from % MINUTES_PER_DAY) % MINUTES_PER_DAY
}

/// Minutes since the wake anchor, or `None` while asleep.
fn minutes_awake(minute_of_day: u32, anchors: &SleepAnchors) -> Option<u32> {
    let wake = anchors.wake.minutes_since_midnight();
    let mut awake_span = minutes_after(anchors.sleep.minutes_since_midnight(), wake);
    if awake_span == 0 {
        awake_span = MINUTES_PER_DAY;
    }
    let since_wake = minutes_after(minute_of_day, wake);
    (since_wake < awake_span).then_some(since_wake)
}

fn homeostatic_pressure(minute_of_day: u32, anchors: &SleepAnchors, config: &CurveConfig) -> f64 {
    match minutes_awake(minute_of_day, anchors) {
        Some(awake) => {
            let t = awake as f64 / 60.0;
            let rise = 100.0
                * (1.0 - (-t / config.pressure_rise_tau_hours).exp())
                * (t / config.pressure_scale_hours);
            rise.min(config.pressure_cap)
        }
        None => {
            let asleep = minutes_after(minute_of_day, anchors.sleep.minutes_since_midnight());
            let t = asleep as f64 / 60.0;
            config.pressure_cap * (-t / config.pressure_decay_tau_hours).exp()
        }
    }
}

fn inertia_penalty(minute_of_day: u32, anchors: &SleepAnchors, config: &CurveConfig) -> f64 {
    match minutes_awake(minute_of_day, anchors) {
        Some(awake) if awake < config.inertia_minutes => config.inertia_penalty,
        _ => 0.0,
    }
}

fn debt_penalty(debt_minutes: i32, config: &CurveConfig) -> f64 {
    let hours = debt_minutes.unsigned_abs() as f64 / 60.0;
    let penalty = (hours * config.debt_penalty_per_hour).min(config.max_debt_penalty);
    if hours < config.small_debt_hours {
        penalty * 0.5
    } else {
        penalty
    }
}

fn finalize(raw: f64, config: &CurveConfig) -> f64 {
    let value = if raw.is_finite() {
        raw
    } else {
        tracing::warn!("non-finite energy value, using neutral energy");
        config.neutral_energy
    };
    (value.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn anchors(wake: &str, sleep: &str) -> SleepAnchors {
        SleepAnchors {
            wake: wake.parse().unwrap(),
            sleep: sleep.parse().unwrap(),
        }
    }

    fn default_curve(chronotype: Chronotype) -> Vec<CurvePoint> {
        generate_curve(
            &SleepAnchors::default(),
            480,
            0,
            chronotype,
            &CurveConfig::default(),
        )
    }

    #[test]
    fn test_curve_has_24_ordered_points() {
        let curve = default_curve(Chronotype::Balanced);
        assert_eq!(curve.len(), 24);
        for (i, point) in curve.iter().enumerate() {
            assert_eq!(point.hour_of_day as usize, i);
            assert!((0.0..=100.0).contains(&point.energy));
        }
    }

    #[test]
    fn test_inertia_dip_at_wake() {
        for chronotype in [Chronotype::Morning, Chronotype::Evening, Chronotype::Balanced] {
            let curve = default_curve(chronotype);
            assert!(curve[7].energy < curve[6].energy, "{:?}", chronotype);
            assert!(curve[7].energy < curve[8].energy, "{:?}", chronotype);
        }
    }

    #[test]
    fn test_inertia_window_is_thirty_minutes() {
        let config = CurveConfig::default();
        let just_woke = anchors("06:45", "22:45");
        assert_eq!(inertia_penalty(7 * 60, &just_woke, &config), 20.0);
        let woke_earlier = anchors("06:20", "22:20");
        assert_eq!(inertia_penalty(7 * 60, &woke_earlier, &config), 0.0);
    }

    #[test]
    fn test_midday_peak_and_night_valley() {
        let curve = default_curve(Chronotype::Balanced);
        let peak = peak(&curve).unwrap();
        let valley = valley(&curve).unwrap();
        assert!((10..=13).contains(&peak.hour_of_day));
        assert!(valley.hour_of_day <= 5);
        assert!(curve.iter().all(|p| p.energy <= peak.energy));
        let first_min = curve
            .iter()
            .position(|p| p.energy == valley.energy)
            .unwrap();
        assert_eq!(valley.hour_of_day as usize, first_min);
    }

    #[test]
    fn test_ties_break_to_earliest_hour() {
        let curve = neutral_curve(&CurveConfig::default());
        assert_eq!(peak(&curve).unwrap().hour_of_day, 0);
        assert_eq!(valley(&curve).unwrap().hour_of_day, 0);
        assert!(peak(&[]).is_none());
    }

    #[test]
    fn test_debt_lowers_energy() {
        let config = CurveConfig::default();
        let rested = generate_curve(&SleepAnchors::default(), 480, 0, Chronotype::Balanced, &config);
        let tired =
            generate_curve(&SleepAnchors::default(), 480, -600, Chronotype::Balanced, &config);
        // 10h of debt: min(25, 20) = 20 points
        assert!((rested[12].energy - tired[12].energy - 20.0).abs() < 0.15);
        assert_eq!(debt_penalty(-60, &config), 1.25);
    }

    #[test]
    fn test_short_sleepers_run_higher() {
        let config = CurveConfig::default();
        let short = generate_curve(&SleepAnchors::default(), 420, 0, Chronotype::Balanced, &config);
        let long = generate_curve(&SleepAnchors::default(), 540, 0, Chronotype::Balanced, &config);
        assert!(short[16].energy > long[16].energy);
    }

    #[test]
    fn test_chronotypes_diverge() {
        let morning = default_curve(Chronotype::Morning);
        let evening = default_curve(Chronotype::Evening);
        assert!(morning[9].energy > evening[9].energy);

        // Late risers, so evening pressure has not saturated yet.
        let config = CurveConfig::default();
        let late = anchors("15:00", "07:00");
        let morning = generate_curve(&late, 480, 0, Chronotype::Morning, &config);
        let evening = generate_curve(&late, 480, 0, Chronotype::Evening, &config);
        assert!(morning[21].energy < evening[21].energy);
    }

    #[test]
    fn test_energy_at_interpolates_and_wraps() {
        let mut curve = neutral_curve(&CurveConfig::default());
        curve[10].energy = 60.0;
        curve[11].energy = 80.0;
        curve[23].energy = 20.0;
        curve[0].energy = 40.0;
        assert_eq!(energy_at(&curve, "10:30".parse().unwrap()), Some(70.0));
        assert_eq!(energy_at(&curve, "23:30".parse().unwrap()), Some(30.0));
        assert_eq!(energy_at(&[], "10:30".parse().unwrap()), None);
    }

    #[test]
    fn test_deterministic() {
        let config = CurveConfig::default();
        let a = generate_curve(&anchors("06:10", "22:40"), 455, -95, Chronotype::Evening, &config);
        let b = generate_curve(&anchors("06:10", "22:40"), 455, -95, Chronotype::Evening, &config);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_curve_bounded(
            wake in 0u8..24, wake_min in 0u8..60,
            sleep in 0u8..24, sleep_min in 0u8..60,
            need in 300u32..=690,
            debt in -900i32..=0,
            chronotype in prop_oneof![
                Just(Chronotype::Morning),
                Just(Chronotype::Evening),
                Just(Chronotype::Balanced),
            ],
        ) {
            let anchors = SleepAnchors {
                wake: TimeOfDay::new(wake, wake_min).unwrap(),
                sleep: TimeOfDay::new(sleep, sleep_min).unwrap(),
            };
            let curve = generate_curve(&anchors, need, debt, chronotype, &CurveConfig::default());
            prop_assert_eq!(curve.len(), 24);
            prop_assert!(curve.iter().all(|p| (0.0..=100.0).contains(&p.energy)));
        }
    }
}
