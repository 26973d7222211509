//! Liquidity zone detection and the daily liquidity map
//!
//! Resting orders are assumed above swing highs (buy-side) and below swing lows
//! (sell-side). Equal highs/lows mark stronger pools.

use super::bars::{tail, Bar};
use super::sessions::SessionRange;
use super::structure::{find_swings, SwingKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Configuration for liquidity zone detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Trailing bars scanned (default: 100)
    pub lookback: usize,
    /// Minimum bars for any detection (default: 20)
    pub min_bars: usize,
    /// Swing window radius (default: 5)
    pub swing_window: usize,
    /// Bars scanned backwards for an equal level (default: 10)
    pub equal_lookback: usize,
    /// Relative tolerance for equal levels and touches (default: 0.001)
    pub equal_tolerance: f64,
    /// Strength bonus for equal-level zones (default: 0.2)
    pub equal_bonus: f64,
    /// Relative distance under which same-type zones merge (default: 0.002)
    pub merge_tolerance: f64,
    /// Volume spike multiple of the mean (default: 1.5)
    pub volume_spike: f64,
    /// HTF zones carried into the liquidity map as targets (default: 3)
    pub map_targets: usize,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            min_bars: 20,
            swing_window: 5,
            equal_lookback: 10,
            equal_tolerance: 0.001,
            equal_bonus: 0.2,
            merge_tolerance: 0.002,
            volume_spike: 1.5,
            map_targets: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    BuySide,
    SellSide,
}

impl std::fmt::Display for ZoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneType::BuySide => write!(f, "buy_side"),
            ZoneType::SellSide => write!(f, "sell_side"),
        }
    }
}

/// Buy-side or sell-side liquidity, as used on session levels and sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityKind {
    #[serde(rename = "BSL")]
    Bsl,
    #[serde(rename = "SSL")]
    Ssl,
}

impl From<ZoneType> for LiquidityKind {
    fn from(zone_type: ZoneType) -> Self {
        match zone_type {
            ZoneType::BuySide => LiquidityKind::Bsl,
            ZoneType::SellSide => LiquidityKind::Ssl,
        }
    }
}

impl std::fmt::Display for LiquidityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiquidityKind::Bsl => write!(f, "BSL"),
            LiquidityKind::Ssl => write!(f, "SSL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub price: f64,
    pub zone_type: ZoneType,
    /// In [0, 1]
    pub strength: f64,
    pub timestamp: DateTime<Utc>,
}

/// Score a level from recency, touch count and volume at its bar
fn zone_strength(bars: &[Bar], index: usize, price: f64, zone_type: ZoneType, config: &LiquidityConfig) -> f64 {
    let mut strength = 0.3;
    strength += index as f64 / bars.len() as f64 * 0.3;

    let lower = price * (1.0 - config.equal_tolerance);
    let upper = price * (1.0 + config.equal_tolerance);
    let touches = bars
        .iter()
        .map(|b| match zone_type {
            ZoneType::BuySide => b.high,
            ZoneType::SellSide => b.low,
        })
        .filter(|&p| p >= lower && p <= upper)
        .count();
    if touches >= 3 {
        strength += 0.3;
    } else if touches == 2 {
        strength += 0.2;
    }

    let mean_volume = bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64;
    if mean_volume > 0.0 && bars[index].volume > config.volume_spike * mean_volume {
        strength += 0.1;
    }

    strength.min(1.0)
}

/// Equal highs/lows hold more resting orders than a lone swing
fn with_equal_bonus(base: f64, config: &LiquidityConfig) -> f64 {
    (base + config.equal_bonus).min(1.0)
}

/// First earlier price within tolerance of each bar, as (index, price)
fn find_equal_levels(values: &[f64], config: &LiquidityConfig) -> Vec<(usize, f64)> {
    let edge = config.swing_window;
    if values.len() <= 2 * edge {
        return Vec::new();
    }

    let mut levels = Vec::new();
    for i in edge..values.len() - edge {
        let current = values[i];
        let start = i.saturating_sub(config.equal_lookback);
        let matched = values[start..i]
            .iter()
            .any(|&prev| prev > 0.0 && (current - prev).abs() / prev <= config.equal_tolerance);
        if matched {
            levels.push((i, current));
        }
    }
    levels
}

/// Detect buy-side and sell-side liquidity zones, strongest first
pub fn detect_liquidity_zones(bars: &[Bar], config: &LiquidityConfig) -> Vec<LiquidityZone> {
    if bars.len() < config.min_bars {
        return Vec::new();
    }

    let window = tail(bars, config.lookback);
    let highs: Vec<f64> = window.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = window.iter().map(|b| b.low).collect();

    let mut zones = Vec::new();

    for (values, kind, zone_type) in [
        (&highs, SwingKind::High, ZoneType::BuySide),
        (&lows, SwingKind::Low, ZoneType::SellSide),
    ] {
        for swing in find_swings(values, kind, config.swing_window) {
            zones.push(LiquidityZone {
                price: swing.price,
                zone_type,
                strength: zone_strength(window, swing.index, swing.price, zone_type, config),
                timestamp: window[swing.index].timestamp,
            });
        }

        for (index, price) in find_equal_levels(values, config) {
            let base = zone_strength(window, index, price, zone_type, config);
            zones.push(LiquidityZone {
                price,
                zone_type,
                strength: with_equal_bonus(base, config),
                timestamp: window[index].timestamp,
            });
        }
    }

    let mut merged = merge_zones(zones, config.merge_tolerance);
    merged.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal));

    debug!("Detected {} liquidity zones over {} bars", merged.len(), window.len());
    merged
}

/// Merge same-type zones closer than `tolerance` (relative), keeping the stronger
pub fn merge_zones(mut zones: Vec<LiquidityZone>, tolerance: f64) -> Vec<LiquidityZone> {
    zones.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));

    let mut merged: Vec<LiquidityZone> = Vec::new();
    for zone in zones {
        let close = merged
            .iter()
            .rposition(|m| m.zone_type == zone.zone_type)
            .filter(|&i| {
                let last = &merged[i];
                last.price > 0.0 && (zone.price - last.price).abs() / last.price <= tolerance
            });
        match close {
            Some(i) => {
                if zone.strength > merged[i].strength {
                    merged[i] = zone;
                }
            }
            None => merged.push(zone),
        }
    }
    merged
}

/// A named level in the liquidity map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub kind: LiquidityKind,
    pub price: f64,
    pub description: String,
}

/// Session levels likely to be raided first, and HTF pools price is drawn to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidityMap {
    pub inducement: Vec<LiquidityLevel>,
    pub targets: Vec<LiquidityLevel>,
}

pub fn build_liquidity_map(asian: &SessionRange, htf_zones: &[LiquidityZone], config: &LiquidityConfig) -> LiquidityMap {
    let mut inducement = Vec::new();
    if let Some(high) = asian.high {
        inducement.push(LiquidityLevel {
            kind: LiquidityKind::Bsl,
            price: high,
            description: "Asian Session High".to_string(),
        });
    }
    if let Some(low) = asian.low {
        inducement.push(LiquidityLevel {
            kind: LiquidityKind::Ssl,
            price: low,
            description: "Asian Session Low".to_string(),
        });
    }

    let targets = htf_zones
        .iter()
        .take(config.map_targets)
        .map(|z| LiquidityLevel {
            kind: z.zone_type.into(),
            price: z.price,
            description: format!("HTF {} liquidity (strength: {:.1})", z.zone_type, z.strength),
        })
        .collect();

    LiquidityMap { inducement, targets }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::bars::fixtures::{approx_eq, bars_from_ohlc};

    fn zone(price: f64, zone_type: ZoneType, strength: f64) -> LiquidityZone {
        LiquidityZone {
            price,
            zone_type,
            strength,
            timestamp: Utc::now(),
        }
    }

    /// Oscillating series with repeated peaks at 110 and troughs at 100
    fn double_top_series() -> Vec<Bar> {
        let rows: Vec<_> = (0..60)
            .map(|i| {
                let phase = (i % 12) as f64;
                let mid = if phase <= 6.0 { 100.5 + phase * 1.5 } else { 100.5 + (12.0 - phase) * 1.5 };
                (mid, mid + 0.5, mid - 0.5, mid)
            })
            .collect();
        bars_from_ohlc(&rows)
    }

    #[test]
    fn test_zones_from_swings() {
        let zones = detect_liquidity_zones(&double_top_series(), &LiquidityConfig::default());
        assert!(!zones.is_empty());
        assert!(zones.iter().any(|z| z.zone_type == ZoneType::BuySide && approx_eq(z.price, 110.0)));
        assert!(zones.iter().any(|z| z.zone_type == ZoneType::SellSide && approx_eq(z.price, 100.0)));

        for w in zones.windows(2) {
            assert!(w[0].strength >= w[1].strength);
        }
        for z in &zones {
            assert!(z.strength >= 0.3 && z.strength <= 1.0);
        }
    }

    /// Ten flat bars (high 100, low 90, volume 1000)
    fn flat_bars() -> Vec<Bar> {
        bars_from_ohlc(&[(95.0, 100.0, 90.0, 95.0); 10])
    }

    #[test]
    fn test_zone_strength_terms() {
        let config = LiquidityConfig::default();
        let mut bars = flat_bars();
        bars[5].high = 110.0;

        // base 0.3 + recency 5/10 * 0.3, single touch
        assert!(approx_eq(zone_strength(&bars, 5, 110.0, ZoneType::BuySide, &config), 0.45));

        // second touch within 0.1%
        bars[8].high = 110.05;
        assert!(approx_eq(zone_strength(&bars, 5, 110.0, ZoneType::BuySide, &config), 0.65));

        // third touch
        bars[2].high = 109.95;
        assert!(approx_eq(zone_strength(&bars, 5, 110.0, ZoneType::BuySide, &config), 0.75));

        // volume 5000 against a mean of 1400
        bars[5].volume = 5000.0;
        assert!(approx_eq(zone_strength(&bars, 5, 110.0, ZoneType::BuySide, &config), 0.85));
    }

    #[test]
    fn test_zone_strength_sell_side_and_no_volume() {
        let config = LiquidityConfig::default();
        let mut bars = flat_bars();
        for bar in &mut bars {
            bar.volume = 0.0;
        }
        bars[9].low = 80.0;

        // 0.3 + 9/10 * 0.3, volume term skipped without volume data
        assert!(approx_eq(zone_strength(&bars, 9, 80.0, ZoneType::SellSide, &config), 0.57));

        // every low at 90 counts as a touch of the 90 level
        assert!(approx_eq(zone_strength(&bars, 0, 90.0, ZoneType::SellSide, &config), 0.6));
    }

    #[test]
    fn test_equal_level_bonus_is_capped() {
        let config = LiquidityConfig::default();
        assert!(approx_eq(with_equal_bonus(0.45, &config), 0.65));
        assert!(approx_eq(with_equal_bonus(0.97, &config), 1.0));
    }

    #[test]
    fn test_merged_zones_are_separated() {
        let zones = detect_liquidity_zones(&double_top_series(), &LiquidityConfig::default());
        for (i, a) in zones.iter().enumerate() {
            for b in &zones[i + 1..] {
                if a.zone_type == b.zone_type {
                    assert!((a.price - b.price).abs() / a.price.min(b.price) > 0.002);
                }
            }
        }
    }

    #[test]
    fn test_merge_keeps_stronger() {
        let merged = merge_zones(
            vec![
                zone(100.0, ZoneType::BuySide, 0.4),
                zone(100.1, ZoneType::BuySide, 0.8),
                zone(100.05, ZoneType::SellSide, 0.5),
                zone(105.0, ZoneType::BuySide, 0.3),
            ],
            0.002,
        );
        assert_eq!(merged.len(), 3);
        let buy: Vec<_> = merged.iter().filter(|z| z.zone_type == ZoneType::BuySide).collect();
        assert!(approx_eq(buy[0].price, 100.1));
        assert!(approx_eq(buy[0].strength, 0.8));
        assert!(approx_eq(buy[1].price, 105.0));
    }

    #[test]
    fn test_equal_levels_found() {
        let config = LiquidityConfig::default();
        let values = [100.0, 101.0, 102.0, 103.0, 104.0, 100.05, 99.0, 98.0, 97.0, 96.0, 95.0];
        let levels = find_equal_levels(&values, &config);
        assert_eq!(levels, vec![(5, 100.05)]);
    }

    #[test]
    fn test_too_few_bars() {
        let bars = double_top_series();
        assert!(detect_liquidity_zones(&bars[..10], &LiquidityConfig::default()).is_empty());
    }

    #[test]
    fn test_liquidity_map() {
        let asian = SessionRange {
            high: Some(105.0),
            low: Some(101.0),
        };
        let zones = vec![
            zone(110.0, ZoneType::BuySide, 0.84),
            zone(95.0, ZoneType::SellSide, 0.7),
            zone(112.0, ZoneType::BuySide, 0.6),
            zone(90.0, ZoneType::SellSide, 0.5),
        ];
        let map = build_liquidity_map(&asian, &zones, &LiquidityConfig::default());
        assert_eq!(map.inducement.len(), 2);
        assert_eq!(map.inducement[0].kind, LiquidityKind::Bsl);
        assert_eq!(map.inducement[1].description, "Asian Session Low");
        assert_eq!(map.targets.len(), 3);
        assert_eq!(map.targets[0].description, "HTF buy_side liquidity (strength: 0.8)");
        assert_eq!(map.targets[1].kind, LiquidityKind::Ssl);
    }
}
