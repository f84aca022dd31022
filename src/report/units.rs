//! Temperature unit conversion
//!
//! Sensors send millikelvin so the hot path never sees negative numbers or
//! floating point. Conversion to Celsius only happens when reporting.

use crate::pipeline::WindowResult;
use serde::Serialize;

/// 0 °C expressed in millikelvin
pub const ZERO_CELSIUS_MK: f64 = 273_150.0;

/// Convert Celsius to millikelvin, rounding to the nearest unit
///
/// Temperatures below absolute zero clamp to 0.
pub fn celsius_to_millikelvin(celsius: f64) -> u64 {
    (celsius * 1000.0 + ZERO_CELSIUS_MK).round().max(0.0) as u64
}

pub fn millikelvin_to_celsius(mk: u64) -> f64 {
    (mk as f64 - ZERO_CELSIUS_MK) / 1000.0
}

pub fn millikelvin_to_celsius_slice(values: &[u64]) -> Vec<f64> {
    values.iter().map(|&mk| millikelvin_to_celsius(mk)).collect()
}

/// A `WindowResult` of millikelvin averages converted to Celsius
///
/// Empty buckets are `None` rather than the 0 mK rows of the raw result, and
/// the window aggregates are `None` when the window holds no samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CelsiusResult {
    pub nonzero: bool,
    pub window_max: Option<f64>,
    pub window_min: Option<f64>,
    pub window_average: Option<f64>,
    pub max: Vec<Option<f64>>,
    pub min: Vec<Option<f64>>,
    pub average: Vec<Option<f64>>,
    pub count: Vec<u64>,
}

impl From<&WindowResult> for CelsiusResult {
    fn from(result: &WindowResult) -> Self {
        let window = |mk: u64| result.nonzero.then(|| millikelvin_to_celsius(mk));
        let rows = |values: &[u64]| -> Vec<Option<f64>> {
            values
                .iter()
                .zip(&result.count)
                .map(|(&mk, &count)| (count > 0).then(|| millikelvin_to_celsius(mk)))
                .collect()
        };

        Self {
            nonzero: result.nonzero,
            window_max: window(result.window_max),
            window_min: window(result.window_min),
            window_average: window(result.window_average),
            max: rows(&result.max),
            min: rows(&result.min),
            average: rows(&result.values),
            count: result.count.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ValueKind, WindowCounter};

    #[test]
    fn test_celsius_round_trip_points() {
        assert_eq!(celsius_to_millikelvin(0.0), 273_150);
        assert_eq!(celsius_to_millikelvin(20.0), 293_150);
        assert_eq!(celsius_to_millikelvin(-273.15), 0);
        assert_eq!(celsius_to_millikelvin(-300.0), 0);
        assert_eq!(celsius_to_millikelvin(36.6), 309_750);

        assert_eq!(millikelvin_to_celsius(273_150), 0.0);
        assert_eq!(millikelvin_to_celsius(298_150), 25.0);
        assert_eq!(millikelvin_to_celsius(0), -273.15);
    }

    #[test]
    fn test_celsius_result_from_window() {
        let mut window = WindowCounter::new(7);
        window.add(celsius_to_millikelvin(20.0));
        window.add(celsius_to_millikelvin(30.0));
        window.tick();
        window.add(celsius_to_millikelvin(10.0));

        let result = CelsiusResult::from(&window.snapshot(1, ValueKind::Average));
        assert!(result.nonzero);
        assert_eq!(result.average, vec![Some(25.0), Some(10.0)]);
        assert_eq!(result.max, vec![Some(30.0), Some(10.0)]);
        assert_eq!(result.min, vec![Some(20.0), Some(10.0)]);
        assert_eq!(result.window_max, Some(30.0));
        assert_eq!(result.window_min, Some(10.0));
        assert_eq!(result.window_average, Some(17.5));
        assert_eq!(result.count, vec![2, 1]);
    }

    #[test]
    fn test_empty_buckets_are_not_absolute_zero() {
        // Test: a day without readings in the middle of the window has no value
        let mut window = WindowCounter::new(7);
        window.add(celsius_to_millikelvin(20.0));
        window.tick();
        window.tick();
        window.add(celsius_to_millikelvin(22.0));

        let result = CelsiusResult::from(&window.snapshot(1, ValueKind::Average));
        assert_eq!(result.average, vec![Some(20.0), None, Some(22.0)]);
        assert_eq!(result.min, vec![Some(20.0), None, Some(22.0)]);
        assert_eq!(result.max, vec![Some(20.0), None, Some(22.0)]);
        assert_eq!(result.window_min, Some(20.0));

        let empty = CelsiusResult::from(&WindowCounter::new(7).snapshot(1, ValueKind::Average));
        assert!(!empty.nonzero);
        assert_eq!(empty.average, vec![None]);
        assert_eq!(empty.window_average, None);
    }
}
