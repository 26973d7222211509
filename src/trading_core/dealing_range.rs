//! Dealing range: the high/low band the day trades inside, with its
//! equilibrium, premium and discount levels.
//!
//! The band comes from the first source in a fixed chain that yields one:
//! previous completed daily bar, then the HTF snapshot range, then the
//! extremes of recent daily bars.

use super::bars::{highest_high, lowest_low, tail, Bar};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DealingRangeConfig {
    /// Daily bars inspected for the previous-day source (default: 5)
    pub prev_day_bars: usize,
    /// Daily bars for the recent-extremes source (default: 50)
    pub recent_bars: usize,
    pub equilibrium_ratio: f64,
    pub premium_ratio: f64,
    pub discount_ratio: f64,
}

impl Default for DealingRangeConfig {
    fn default() -> Self {
        Self {
            prev_day_bars: 5,
            recent_bars: 50,
            equilibrium_ratio: 0.5,
            premium_ratio: 0.618,
            discount_ratio: 0.382,
        }
    }
}

/// Where a dealing range came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeSource {
    #[serde(rename = "prev_day")]
    PrevDay,
    #[serde(rename = "htf")]
    Htf,
    #[serde(rename = "recent_1D")]
    RecentDaily,
}

impl std::fmt::Display for RangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeSource::PrevDay => write!(f, "prev_day"),
            RangeSource::Htf => write!(f, "htf"),
            RangeSource::RecentDaily => write!(f, "recent_1D"),
        }
    }
}

/// A plain high/low pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub high: f64,
    pub low: f64,
}

impl PriceRange {
    pub fn of_bars(bars: &[Bar]) -> Option<Self> {
        Some(Self {
            high: highest_high(bars)?,
            low: lowest_low(bars)?,
        })
    }

    fn is_usable(&self) -> bool {
        self.high.is_finite() && self.low.is_finite() && self.high >= self.low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DealingRange {
    pub high: f64,
    pub low: f64,
    pub equilibrium: f64,
    pub premium: f64,
    pub discount: f64,
    pub source: RangeSource,
}

impl DealingRange {
    pub fn new(range: PriceRange, source: RangeSource, config: &DealingRangeConfig) -> Self {
        let span = range.high - range.low;
        Self {
            high: range.high,
            low: range.low,
            equilibrium: range.low + span * config.equilibrium_ratio,
            premium: range.low + span * config.premium_ratio,
            discount: range.low + span * config.discount_ratio,
            source,
        }
    }
}

/// One source of a dealing range
pub trait RangeStrategy {
    fn source(&self) -> RangeSource;
    fn resolve(&self) -> Option<PriceRange>;
}

/// Previous completed daily bar. A bar dated today or later is still forming.
pub struct PrevDayRange<'a> {
    pub daily: &'a [Bar],
    pub today: NaiveDate,
}

impl RangeStrategy for PrevDayRange<'_> {
    fn source(&self) -> RangeSource {
        RangeSource::PrevDay
    }

    fn resolve(&self) -> Option<PriceRange> {
        let last = self.daily.last()?;
        let bar = if last.date_ny() >= self.today {
            let n = self.daily.len();
            if n < 2 {
                return None;
            }
            &self.daily[n - 2]
        } else {
            last
        };
        Some(PriceRange {
            high: bar.high,
            low: bar.low,
        })
    }
}

/// Range reported by the HTF analysis snapshot
pub struct HtfRange(pub Option<PriceRange>);

impl RangeStrategy for HtfRange {
    fn source(&self) -> RangeSource {
        RangeSource::Htf
    }

    fn resolve(&self) -> Option<PriceRange> {
        self.0
    }
}

/// Extremes of recent daily bars
pub struct RecentDailyRange<'a> {
    pub daily: &'a [Bar],
}

impl RangeStrategy for RecentDailyRange<'_> {
    fn source(&self) -> RangeSource {
        RangeSource::RecentDaily
    }

    fn resolve(&self) -> Option<PriceRange> {
        PriceRange::of_bars(self.daily)
    }
}

/// Try each strategy in order; the first usable range wins
pub fn first_success(strategies: &[&dyn RangeStrategy], config: &DealingRangeConfig) -> Option<DealingRange> {
    strategies.iter().find_map(|s| {
        let range = s.resolve().filter(PriceRange::is_usable);
        if range.is_none() {
            debug!("Dealing range source {} unavailable", s.source());
        }
        range.map(|r| DealingRange::new(r, s.source(), config))
    })
}

/// Build the dealing range from daily bars and the HTF snapshot range
pub fn build_dealing_range(
    daily: &[Bar],
    today: NaiveDate,
    htf: Option<PriceRange>,
    config: &DealingRangeConfig,
) -> Option<DealingRange> {
    let prev_day = PrevDayRange {
        daily: tail(daily, config.prev_day_bars),
        today,
    };
    let htf = HtfRange(htf);
    let recent = RecentDailyRange {
        daily: tail(daily, config.recent_bars),
    };

    let range = first_success(&[&prev_day, &htf, &recent], config);
    if let Some(r) = &range {
        info!(
            "Dealing range {:.2} - {:.2} (EQ {:.2}, source {})",
            r.low, r.high, r.equilibrium, r.source
        );
    }
    range
}
