//! Overnight session structure (Asian and London ranges)
//!
//! Sessions are defined in New York local time on the analysis date. Only bars
//! from New York midnight up to the optional cutoff are considered.

use super::bars::{highest_high, lowest_low, Bar};
use super::liquidity::LiquidityKind;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session windows as hour offsets from New York midnight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub asian_start_hour: i64,
    pub asian_end_hour: i64,
    pub london_start_hour: i64,
    pub london_end_hour: i64,
    /// Tolerance for "London holds the session extreme" (default: 1e-6)
    pub extreme_tolerance: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            asian_start_hour: 0,
            asian_end_hour: 5,
            london_start_hour: 2,
            london_end_hour: 8,
            extreme_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRange {
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl SessionRange {
    fn from_bars(bars: &[&Bar]) -> Self {
        Self {
            high: bars.iter().map(|b| b.high).reduce(f64::max),
            low: bars.iter().map(|b| b.low).reduce(f64::min),
        }
    }
}

/// A session level taken out by later price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub kind: LiquidityKind,
    pub level: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub asian_bars: usize,
    pub london_bars: usize,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub asian_complete: bool,
    pub london_complete: bool,
    pub overall_high: Option<f64>,
    pub overall_low: Option<f64>,
    pub london_made_high: bool,
    pub london_made_low: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStructure {
    pub asian: SessionRange,
    pub london: SessionRange,
    pub sweeps: Vec<Sweep>,
    pub meta: SessionMeta,
}

impl SessionStructure {
    pub fn has_sweep(&self, kind: LiquidityKind) -> bool {
        self.sweeps.iter().any(|s| s.kind == kind)
    }
}

/// New York midnight of `date`, in UTC
pub fn ny_midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    New_York
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// New York midnight after `date`, in UTC
pub fn ny_day_end(date: NaiveDate) -> Option<DateTime<Utc>> {
    ny_midnight(date.succ_opt()?)
}

/// Build the session structure for `date` as seen at `now`
pub fn analyze_sessions(
    bars: &[Bar],
    date: NaiveDate,
    cutoff: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &SessionConfig,
) -> SessionStructure {
    // A date chrono cannot place in New York degrades to an empty day
    let day_start = ny_midnight(date).unwrap_or(now);
    let day_end = ny_day_end(date);
    let at = |hours: i64| day_start + Duration::hours(hours);
    let (asian_start, asian_end) = (at(config.asian_start_hour), at(config.asian_end_hour));
    let (london_start, london_end) = (at(config.london_start_hour), at(config.london_end_hour));

    let day: Vec<Bar> = bars
        .iter()
        .filter(|b| b.timestamp >= day_start)
        .filter(|b| day_end.map_or(true, |end| b.timestamp < end))
        .filter(|b| cutoff.map_or(true, |c| b.timestamp <= c))
        .cloned()
        .collect();

    let in_window = |start: DateTime<Utc>, end: DateTime<Utc>| -> Vec<&Bar> {
        day.iter()
            .filter(|b| b.timestamp >= start && b.timestamp < end)
            .collect()
    };
    let asian_bars = in_window(asian_start, asian_end);
    let london_bars = in_window(london_start, london_end);

    let asian = SessionRange::from_bars(&asian_bars);
    let london = SessionRange::from_bars(&london_bars);
    let overall_high = highest_high(&day);
    let overall_low = lowest_low(&day);

    let mut sweeps = Vec::new();
    if let (Some(level), Some(high)) = (asian.high, overall_high) {
        if high > level {
            sweeps.push(Sweep {
                kind: LiquidityKind::Bsl,
                level: "Asian High".to_string(),
                price: level,
            });
        }
    }
    if let (Some(level), Some(low)) = (asian.low, overall_low) {
        if low < level {
            sweeps.push(Sweep {
                kind: LiquidityKind::Ssl,
                level: "Asian Low".to_string(),
                price: level,
            });
        }
    }

    let holds = |session: Option<f64>, overall: Option<f64>| match (session, overall) {
        (Some(s), Some(o)) => (s - o).abs() <= config.extreme_tolerance,
        _ => false,
    };

    let meta = SessionMeta {
        asian_bars: asian_bars.len(),
        london_bars: london_bars.len(),
        last_timestamp: day.last().map(|b| b.timestamp),
        asian_complete: now >= asian_end,
        london_complete: now >= london_end,
        overall_high,
        overall_low,
        london_made_high: holds(london.high, overall_high),
        london_made_low: holds(london.low, overall_low),
    };

    debug!(
        "Sessions {}: asian {} bars, london {} bars, {} sweeps",
        date,
        meta.asian_bars,
        meta.london_bars,
        sweeps.len()
    );

    SessionStructure {
        asian,
        london,
        sweeps,
        meta,
    }
}
