//! Fair Value Gap Detection
//!
//! A fair value gap is a 3-bar imbalance where the first and third bars do not
//! overlap. Each gap carries two one-way flags computed from the bars after it:
//! - mitigated: a later wick traded back into the gap
//! - invalidated: a later close went fully through the gap against its direction

use super::bars::{tail, Bar};
use super::structure::PatternDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for FVG detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgConfig {
    /// Trailing bars scanned (default: 100)
    pub lookback: usize,
    /// Minimum bars for any detection (default: 3)
    pub min_bars: usize,
    /// Minimum gap_size / low kept by `filter_significant_fvgs` (default: 0.001)
    pub min_significance: f64,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            min_bars: 3,
            min_significance: 0.001,
        }
    }
}

/// A detected fair value gap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fvg {
    pub high: f64,
    pub low: f64,
    /// Timestamp of the third bar of the forming triple
    pub timestamp: DateTime<Utc>,
    pub gap_size: f64,
    pub direction: PatternDirection,
    pub mitigated: bool,
    pub invalidated: bool,
    /// Legacy alias of `invalidated`
    pub filled: bool,
}

impl Fvg {
    fn new(direction: PatternDirection, high: f64, low: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            high,
            low,
            timestamp,
            gap_size: high - low,
            direction,
            mitigated: false,
            invalidated: false,
            filled: false,
        }
    }

    /// Update fill state from one later bar. Flags only ever turn on.
    fn observe(&mut self, bar: &Bar) {
        match self.direction {
            PatternDirection::Bullish => {
                if bar.low <= self.high {
                    self.mitigated = true;
                }
                if bar.close < self.low {
                    self.invalidated = true;
                }
            }
            PatternDirection::Bearish => {
                if bar.high >= self.low {
                    self.mitigated = true;
                }
                if bar.close > self.high {
                    self.invalidated = true;
                }
            }
        }
        self.filled = self.invalidated;
    }

    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn is_bullish(&self) -> bool {
        self.direction == PatternDirection::Bullish
    }
}

/// Detect fair value gaps over the trailing `lookback` bars
pub fn detect_fvgs(bars: &[Bar], config: &FvgConfig) -> Vec<Fvg> {
    if bars.len() < config.min_bars.max(3) {
        return Vec::new();
    }

    let window = tail(bars, config.lookback);
    let mut fvgs = Vec::new();

    for i in 2..window.len() {
        let first = &window[i - 2];
        let third = &window[i];

        let mut fvg = if first.high < third.low {
            Fvg::new(PatternDirection::Bullish, third.low, first.high, third.timestamp)
        } else if first.low > third.high {
            Fvg::new(PatternDirection::Bearish, first.low, third.high, third.timestamp)
        } else {
            continue;
        };

        for later in &window[i + 1..] {
            fvg.observe(later);
        }

        fvgs.push(fvg);
    }

    debug!("Detected {} FVGs over {} bars", fvgs.len(), window.len());
    fvgs
}

/// Keep gaps whose size relative to their low meets `min_significance`
pub fn filter_significant_fvgs(fvgs: &[Fvg], min_significance: f64) -> Vec<Fvg> {
    fvgs.iter()
        .filter(|f| f.low > 0.0 && f.gap_size / f.low >= min_significance)
        .cloned()
        .collect()
}

/// Gaps that have not been invalidated, in detection order
pub fn unfilled(fvgs: &[Fvg]) -> impl Iterator<Item = &Fvg> {
    fvgs.iter().filter(|f| !f.invalidated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::bars::fixtures::{approx_eq, bars_from_ohlc};

    #[test]
    fn test_bullish_gap_from_three_bars() {
        let bars = bars_from_ohlc(&[
            (9.9, 10.0, 9.8, 9.95),
            (10.0, 11.0, 9.9, 10.9),
            (11.0, 16.0, 10.5, 15.5),
        ]);
        let fvgs = detect_fvgs(&bars, &FvgConfig::default());
        assert_eq!(fvgs.len(), 1);
        let fvg = &fvgs[0];
        assert_eq!(fvg.direction, PatternDirection::Bullish);
        assert!(approx_eq(fvg.low, 10.0));
        assert!(approx_eq(fvg.high, 10.5));
        assert!(approx_eq(fvg.gap_size, 0.5));
        assert_eq!(fvg.timestamp, bars[2].timestamp);
        assert!(!fvg.mitigated && !fvg.invalidated && !fvg.filled);
    }

    #[test]
    fn test_bearish_gap_and_flags() {
        let bars = bars_from_ohlc(&[
            (20.0, 20.2, 19.5, 19.6),
            (19.6, 19.7, 18.0, 18.1),
            (18.1, 18.5, 17.0, 17.2),
            // wick back into the gap [18.5, 19.5]
            (17.2, 18.8, 17.1, 18.0),
        ]);
        let fvgs = detect_fvgs(&bars, &FvgConfig::default());
        let bearish: Vec<_> = fvgs.iter().filter(|f| !f.is_bullish()).collect();
        assert_eq!(bearish.len(), 1);
        assert!(approx_eq(bearish[0].high, 19.5));
        assert!(approx_eq(bearish[0].low, 18.5));
        assert!(bearish[0].mitigated);
        assert!(!bearish[0].invalidated);
    }

    #[test]
    fn test_close_through_gap_invalidates() {
        let bars = bars_from_ohlc(&[
            (9.9, 10.0, 9.8, 9.95),
            (10.0, 11.0, 9.9, 10.9),
            (11.0, 16.0, 10.5, 15.5),
            (15.5, 15.6, 9.0, 9.5),
            // back up: flags never reset
            (9.5, 17.0, 9.4, 16.8),
        ]);
        let fvgs = detect_fvgs(&bars, &FvgConfig::default());
        let gap = fvgs.iter().find(|f| approx_eq(f.low, 10.0)).unwrap();
        assert!(gap.mitigated);
        assert!(gap.invalidated);
        assert!(gap.filled);
        assert_eq!(unfilled(&fvgs).filter(|f| approx_eq(f.low, 10.0)).count(), 0);
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let bars = bars_from_ohlc(&[(1.0, 2.0, 0.5, 1.5), (1.5, 5.0, 3.0, 4.0)]);
        assert!(detect_fvgs(&bars, &FvgConfig::default()).is_empty());
    }

    #[test]
    fn test_filter_significant() {
        let ts = Utc::now();
        let fvgs = vec![
            Fvg::new(PatternDirection::Bullish, 100.5, 100.0, ts),
            Fvg::new(PatternDirection::Bullish, 100.05, 100.0, ts),
        ];
        let kept = filter_significant_fvgs(&fvgs, 0.001);
        assert_eq!(kept.len(), 1);
        assert!(approx_eq(kept[0].high, 100.5));
    }

    #[test]
    fn test_gap_size_always_positive() {
        let rows: Vec<_> = (0..60)
            .map(|i| {
                let base = 100.0 + ((i * 7) % 11) as f64 - ((i * 3) % 5) as f64 * 1.7;
                (base, base + 1.0, base - 1.0, base + 0.3)
            })
            .collect();
        let bars = bars_from_ohlc(&rows);
        for fvg in detect_fvgs(&bars, &FvgConfig::default()) {
            assert!(fvg.gap_size > 0.0);
            assert_eq!(fvg.filled, fvg.invalidated);
        }
    }
}
