//! Order Block Detection
//!
//! An order block is a displacement candle (large body, small wicks) that is
//! followed within a few bars by a close beyond its own extreme.

use super::bars::{tail, Bar};
use super::structure::PatternDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Configuration for order block detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderBlockConfig {
    /// Trailing bars scanned (default: 100)
    pub lookback: usize,
    /// Minimum bars for any detection (default: 20)
    pub min_bars: usize,
    /// Rolling window for the average body size (default: 20)
    pub avg_body_window: usize,
    /// Bars required before a candidate (default: 10)
    pub min_bars_before: usize,
    /// Bars after a candidate used for confirmation (default: 5)
    pub confirm_bars: usize,
    /// Body must exceed this multiple of the rolling average (default: 1.5)
    pub body_multiplier: f64,
    /// Minimum body / range ratio (default: 0.6)
    pub min_body_ratio: f64,
}

impl Default for OrderBlockConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            min_bars: 20,
            avg_body_window: 20,
            min_bars_before: 10,
            confirm_bars: 5,
            body_multiplier: 1.5,
            min_body_ratio: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub high: f64,
    pub low: f64,
    pub timestamp: DateTime<Utc>,
    pub direction: PatternDirection,
    /// In [0, 1]
    pub strength: f64,
}

impl OrderBlock {
    /// True when the two price ranges intersect
    pub fn overlaps(&self, other: &OrderBlock) -> bool {
        !(self.high < other.low || self.low > other.high)
    }
}

/// Rolling mean of `values` over `window` entries ending at `i` (inclusive).
/// `None` until a full window is available.
fn rolling_mean(values: &[f64], i: usize, window: usize) -> Option<f64> {
    if window == 0 || i + 1 < window {
        return None;
    }
    let slice = &values[i + 1 - window..=i];
    Some(slice.iter().sum::<f64>() / window as f64)
}

/// Strength from body excess over the average and body/range ratio, capped at 1.0
pub fn block_strength(body: f64, avg_body: f64, body_ratio: f64) -> f64 {
    ((body / avg_body - 1.0) * 0.5 + body_ratio * 0.3 + 0.2).min(1.0)
}

/// Detect confirmed order blocks, strongest first, with overlaps removed
pub fn detect_order_blocks(bars: &[Bar], config: &OrderBlockConfig) -> Vec<OrderBlock> {
    if bars.len() < config.min_bars {
        return Vec::new();
    }

    let window = tail(bars, config.lookback);
    if window.len() <= config.min_bars_before + config.confirm_bars {
        return Vec::new();
    }

    let bodies: Vec<f64> = window.iter().map(Bar::body_size).collect();
    let mut candidates = Vec::new();

    for i in config.min_bars_before..window.len() - config.confirm_bars {
        let bar = &window[i];
        let range = bar.range();
        if range <= 0.0 {
            continue;
        }
        let Some(avg_body) = rolling_mean(&bodies, i, config.avg_body_window) else {
            continue;
        };
        if avg_body <= 0.0 {
            continue;
        }

        let body = bodies[i];
        let body_ratio = body / range;
        if body <= config.body_multiplier * avg_body || body_ratio <= config.min_body_ratio {
            continue;
        }

        let next = &window[i + 1..=i + config.confirm_bars];
        let (direction, confirmed) = if bar.is_bullish() {
            let max_close = next.iter().map(|b| b.close).fold(f64::NEG_INFINITY, f64::max);
            (PatternDirection::Bullish, max_close > bar.high)
        } else {
            let min_close = next.iter().map(|b| b.close).fold(f64::INFINITY, f64::min);
            (PatternDirection::Bearish, min_close < bar.low)
        };

        if confirmed {
            candidates.push(OrderBlock {
                high: bar.high,
                low: bar.low,
                timestamp: bar.timestamp,
                direction,
                strength: block_strength(body, avg_body, body_ratio),
            });
        }
    }

    let blocks = prune_overlapping(candidates);
    debug!("Detected {} order blocks over {} bars", blocks.len(), window.len());
    blocks
}

/// Keep the strongest block of every overlapping cluster
pub fn prune_overlapping(mut blocks: Vec<OrderBlock>) -> Vec<OrderBlock> {
    blocks.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal));

    let mut kept: Vec<OrderBlock> = Vec::new();
    for block in blocks {
        if !kept.iter().any(|k| k.overlaps(&block)) {
            kept.push(block);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::bars::fixtures::{approx_eq, bars_from_ohlc};

    /// 25 quiet bars, one displacement candle, then follow-through
    fn displacement_series(bullish: bool) -> Vec<Bar> {
        let mut rows: Vec<(f64, f64, f64, f64)> = (0..25)
            .map(|i| {
                let o = 100.0 + (i % 2) as f64 * 0.1;
                (o, o + 0.5, o - 0.5, o + 0.2)
            })
            .collect();
        if bullish {
            rows.push((100.0, 104.2, 99.9, 104.0));
            for k in 0..5 {
                let c = 104.5 + k as f64;
                rows.push((c - 0.3, c + 0.3, c - 0.5, c));
            }
        } else {
            rows.push((100.0, 100.1, 95.8, 96.0));
            for k in 0..5 {
                let c = 95.5 - k as f64;
                rows.push((c + 0.3, c + 0.5, c - 0.3, c));
            }
        }
        bars_from_ohlc(&rows)
    }

    #[test]
    fn test_bullish_block_detected() {
        let bars = displacement_series(true);
        let blocks = detect_order_blocks(&bars, &OrderBlockConfig::default());
        let block = blocks
            .iter()
            .find(|b| approx_eq(b.high, 104.2))
            .expect("displacement candle should be an order block");
        assert_eq!(block.direction, PatternDirection::Bullish);
        assert!(approx_eq(block.low, 99.9));
        assert!(block.strength > 0.0 && block.strength <= 1.0);
    }

    #[test]
    fn test_bearish_block_detected() {
        let bars = displacement_series(false);
        let blocks = detect_order_blocks(&bars, &OrderBlockConfig::default());
        assert!(blocks
            .iter()
            .any(|b| b.direction == PatternDirection::Bearish && approx_eq(b.low, 95.8)));
    }

    #[test]
    fn test_unconfirmed_candle_rejected() {
        let mut rows: Vec<(f64, f64, f64, f64)> = (0..25)
            .map(|_| (100.0, 100.5, 99.5, 100.2))
            .collect();
        rows.push((100.0, 104.2, 99.9, 104.0));
        // price fades back, never closing above 104.2
        for _ in 0..5 {
            rows.push((103.0, 103.5, 102.0, 102.5));
        }
        let bars = bars_from_ohlc(&rows);
        let blocks = detect_order_blocks(&bars, &OrderBlockConfig::default());
        assert!(blocks.iter().all(|b| !approx_eq(b.high, 104.2)));
    }

    #[test]
    fn test_strength_formula_capped() {
        // body 4x average, ratio 0.9
        assert!(approx_eq(block_strength(4.0, 1.0, 0.9), 1.0));
        // body 2x average, ratio 0.7: 0.5 + 0.21 + 0.2
        assert!(approx_eq(block_strength(2.0, 1.0, 0.7), 0.91));
    }

    #[test]
    fn test_prune_keeps_strongest_non_overlapping() {
        let ts = Utc::now();
        let block = |low: f64, high: f64, strength: f64| OrderBlock {
            high,
            low,
            timestamp: ts,
            direction: PatternDirection::Bullish,
            strength,
        };
        let kept = prune_overlapping(vec![
            block(100.0, 102.0, 0.6),
            block(101.0, 103.0, 0.9),
            block(105.0, 106.0, 0.5),
        ]);
        assert_eq!(kept.len(), 2);
        assert!(approx_eq(kept[0].strength, 0.9));
        assert!(approx_eq(kept[1].low, 105.0));
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn test_too_few_bars() {
        let bars = displacement_series(true);
        assert!(detect_order_blocks(&bars[..15], &OrderBlockConfig::default()).is_empty());
    }
}
