use serde::{Deserialize, Serialize};

use crate::models::GlucoseReading;

/// Average reported when there is too little data to compute one.
pub const NEUTRAL_AVERAGE: f64 = 100.0;
/// Inclusive bounds used for time-in-range.
pub const IN_RANGE_LOW: i32 = 70;
pub const IN_RANGE_HIGH: i32 = 140;
/// Readings strictly above this count as spikes.
pub const SPIKE_THRESHOLD: i32 = 180;
/// Minimum mg/dL difference between recent and older means to call a trend.
pub const TREND_DELTA: f64 = 15.0;
const TREND_SAMPLE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseTrend {
    /// Recent readings are higher: control is worsening.
    Rising,
    /// Recent readings are lower: control is improving.
    Falling,
    Stable,
}

impl GlucoseTrend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Stable => "stable",
        }
    }

    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Rising => "worsening",
            Self::Falling => "improving",
            Self::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub average: f64,
    pub time_in_range_percent: u32,
    pub trend: GlucoseTrend,
    pub recent_spike_count: usize,
    pub reading_count: usize,
}

/// Summarize a window of readings ordered most-recent-first.
#[must_use]
pub fn analyze(readings: &[GlucoseReading]) -> TrendSummary {
    let values: Vec<i32> = readings.iter().map(|r| r.value).collect();
    analyze_values(&values)
}

/// Same as [`analyze`] over bare values, most-recent-first.
///
/// Total over its input: an empty or single-reading window yields the
/// neutral average and a stable trend rather than an error.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn analyze_values(values: &[i32]) -> TrendSummary {
    let n = values.len();

    let in_range = values
        .iter()
        .filter(|v| (IN_RANGE_LOW..=IN_RANGE_HIGH).contains(*v))
        .count();
    let time_in_range_percent = if n == 0 {
        0
    } else {
        (in_range as f64 * 100.0 / n as f64).round() as u32
    };
    let recent_spike_count = values.iter().filter(|v| **v > SPIKE_THRESHOLD).count();

    if n < 2 {
        return TrendSummary {
            average: NEUTRAL_AVERAGE,
            time_in_range_percent,
            trend: GlucoseTrend::Stable,
            recent_spike_count,
            reading_count: n,
        };
    }

    let sample = TREND_SAMPLE.min(n);
    let recent = mean(&values[..sample]);
    let older = mean(&values[n - sample..]);
    let trend = if recent - older > TREND_DELTA {
        GlucoseTrend::Rising
    } else if older - recent > TREND_DELTA {
        GlucoseTrend::Falling
    } else {
        GlucoseTrend::Stable
    };

    TrendSummary {
        average: mean(values),
        time_in_range_percent,
        trend,
        recent_spike_count,
        reading_count: n,
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[i32]) -> f64 {
    let sum: i64 = values.iter().map(|v| i64::from(*v)).sum();
    sum as f64 / values.len() as f64
}
