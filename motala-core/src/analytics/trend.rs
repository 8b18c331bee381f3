//! Trend classification between two adjacent windows
//!
//! One primitive serves both comparisons the dashboards need:
//! today-vs-yesterday at school scale and this-week-vs-last-week per
//! student. The ±5% dead-band absorbs noise from small session counts.

use serde::{Deserialize, Serialize};

/// Percentages inside `±DEAD_BAND_PERCENT` classify as stable.
pub const DEAD_BAND_PERCENT: f64 = 5.0;

/// Direction of change between two window totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Stable => "stable",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified change between a current and a previous window total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    /// Percent change, rounded to one decimal place
    pub percent: f64,
    pub direction: TrendDirection,
}

impl Trend {
    /// Compare two adjacent window totals.
    ///
    /// A zero previous total means there is no baseline: any current
    /// activity reads as +100% up, none as 0% stable. Otherwise the
    /// percent is `(current - previous) / previous * 100`, rounded to
    /// one decimal place half away from zero (`f64::round` semantics).
    /// Classification uses the rounded value, so a raw +5.04% lands
    /// inside the dead-band.
    pub fn compare(current: i64, previous: i64) -> Self {
        if previous == 0 {
            return if current > 0 {
                Trend {
                    percent: 100.0,
                    direction: TrendDirection::Up,
                }
            } else {
                Trend {
                    percent: 0.0,
                    direction: TrendDirection::Stable,
                }
            };
        }

        let raw = (current - previous) as f64 / previous as f64 * 100.0;
        let percent = (raw * 10.0).round() / 10.0;

        let direction = if percent > DEAD_BAND_PERCENT {
            TrendDirection::Up
        } else if percent < -DEAD_BAND_PERCENT {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        };

        Trend { percent, direction }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_baseline() {
        let trend = Trend::compare(100, 0);
        assert_eq!(trend.percent, 100.0);
        assert_eq!(trend.direction, TrendDirection::Up);

        let trend = Trend::compare(0, 0);
        assert_eq!(trend.percent, 0.0);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_down_outside_dead_band() {
        let trend = Trend::compare(94, 100);
        assert_eq!(trend.percent, -6.0);
        assert_eq!(trend.direction, TrendDirection::Down);
    }

    #[test]
    fn test_stable_inside_dead_band() {
        let trend = Trend::compare(103, 100);
        assert_eq!(trend.percent, 3.0);
        assert_eq!(trend.direction, TrendDirection::Stable);

        let trend = Trend::compare(105, 100);
        assert_eq!(trend.percent, 5.0);
        assert_eq!(trend.direction, TrendDirection::Stable);

        let trend = Trend::compare(95, 100);
        assert_eq!(trend.percent, -5.0);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_up_just_outside_dead_band() {
        let trend = Trend::compare(1051, 1000);
        assert_eq!(trend.percent, 5.1);
        assert_eq!(trend.direction, TrendDirection::Up);
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        // -6.25% rounds to -6.3, +6.25% to 6.3
        let trend = Trend::compare(7500, 8000);
        assert_eq!(trend.percent, -6.3);
        let trend = Trend::compare(8500, 8000);
        assert_eq!(trend.percent, 6.3);
    }

    #[test]
    fn test_rounding_pulls_into_dead_band() {
        // Raw +5.04% rounds to 5.0, which is stable
        let trend = Trend::compare(10504, 10000);
        assert_eq!(trend.percent, 5.0);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }
}
