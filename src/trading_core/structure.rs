//! Swing point detection and market structure classification
//!
//! A bar is a swing high when its high is >= every high within `swing_window`
//! bars on both sides (mirrored for swing lows). The structure label is read
//! from the last few swings.

use super::bars::{highest_high, lowest_low, tail, Bar};
use serde::{Deserialize, Serialize};

/// Configuration for swing and structure analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Bars on each side a swing must dominate (default: 5)
    pub swing_window: usize,
    /// Minimum bars for a structure label (default: 30)
    pub min_structure_bars: usize,
    /// Minimum bars for a break-of-structure check (default: 20)
    pub min_bos_bars: usize,
    /// Number of recent swings compared for HH/HL and LH/LL (default: 5)
    pub recent_swings: usize,
    /// Bars inspected for the ranging test (default: 30)
    pub ranging_lookback: usize,
    /// Max (high - low) / low for a ranging market (default: 0.03)
    pub ranging_threshold: f64,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            swing_window: 5,
            min_structure_bars: 30,
            min_bos_bars: 20,
            recent_swings: 5,
            ranging_lookback: 30,
            ranging_threshold: 0.03,
        }
    }
}

/// Direction of a price-action pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternDirection {
    Bullish,
    Bearish,
}

impl std::fmt::Display for PatternDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternDirection::Bullish => write!(f, "bullish"),
            PatternDirection::Bearish => write!(f, "bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

/// A local extreme in a bar series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// Market structure label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStructure {
    HigherHighsHigherLows,
    HigherHighs,
    LowerHighsLowerLows,
    LowerLows,
    Ranging,
    Choppy,
    InsufficientData,
    /// No bars at all
    Unknown,
}

impl MarketStructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStructure::HigherHighsHigherLows => "higher_highs_higher_lows",
            MarketStructure::HigherHighs => "higher_highs",
            MarketStructure::LowerHighsLowerLows => "lower_highs_lower_lows",
            MarketStructure::LowerLows => "lower_lows",
            MarketStructure::Ranging => "ranging",
            MarketStructure::Choppy => "choppy",
            MarketStructure::InsufficientData => "insufficient_data",
            MarketStructure::Unknown => "unknown",
        }
    }

    /// True for the trending labels (anything naming higher or lower swings)
    pub fn is_directional(&self) -> bool {
        matches!(
            self,
            MarketStructure::HigherHighsHigherLows
                | MarketStructure::HigherHighs
                | MarketStructure::LowerHighsLowerLows
                | MarketStructure::LowerLows
        )
    }
}

impl std::fmt::Display for MarketStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a break-of-structure check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureBreak {
    Bullish,
    Bearish,
    None,
}

impl StructureBreak {
    pub fn is_break(&self) -> bool {
        !matches!(self, StructureBreak::None)
    }
}

/// Find swing points in a price series using a symmetric window
pub fn find_swings(values: &[f64], kind: SwingKind, window: usize) -> Vec<SwingPoint> {
    if window == 0 || values.len() <= 2 * window {
        return Vec::new();
    }

    (window..values.len() - window)
        .filter(|&i| {
            let current = values[i];
            let neighbours = values[i - window..i].iter().chain(&values[i + 1..=i + window]);
            match kind {
                SwingKind::High => neighbours.into_iter().all(|&v| current >= v),
                SwingKind::Low => neighbours.into_iter().all(|&v| current <= v),
            }
        })
        .map(|index| SwingPoint {
            index,
            price: values[index],
            kind,
        })
        .collect()
}

pub fn swing_highs(bars: &[Bar], window: usize) -> Vec<SwingPoint> {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    find_swings(&highs, SwingKind::High, window)
}

pub fn swing_lows(bars: &[Bar], window: usize) -> Vec<SwingPoint> {
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    find_swings(&lows, SwingKind::Low, window)
}

fn strictly_increasing(prices: &[f64]) -> bool {
    prices.windows(2).all(|w| w[0] < w[1])
}

fn strictly_decreasing(prices: &[f64]) -> bool {
    prices.windows(2).all(|w| w[0] > w[1])
}

fn recent_prices(swings: &[SwingPoint], n: usize) -> Vec<f64> {
    swings[swings.len().saturating_sub(n)..].iter().map(|s| s.price).collect()
}

/// True when the trailing range is within `threshold` of its low
pub fn is_ranging(bars: &[Bar], lookback: usize, threshold: f64) -> bool {
    let recent = tail(bars, lookback);
    match (highest_high(recent), lowest_low(recent)) {
        (Some(high), Some(low)) if low > 0.0 => (high - low) / low <= threshold,
        _ => false,
    }
}

/// Classify market structure from the most recent swing highs and lows
pub fn analyze_market_structure(bars: &[Bar], config: &StructureConfig) -> MarketStructure {
    if bars.len() < config.min_structure_bars {
        return MarketStructure::InsufficientData;
    }

    let highs = recent_prices(&swing_highs(bars, config.swing_window), config.recent_swings);
    let lows = recent_prices(&swing_lows(bars, config.swing_window), config.recent_swings);

    if highs.len() >= 2 && lows.len() >= 2 {
        let higher_highs = strictly_increasing(&highs);
        let higher_lows = strictly_increasing(&lows);
        if higher_highs && higher_lows {
            return MarketStructure::HigherHighsHigherLows;
        }
        if higher_highs {
            return MarketStructure::HigherHighs;
        }

        let lower_highs = strictly_decreasing(&highs);
        let lower_lows = strictly_decreasing(&lows);
        if lower_highs && lower_lows {
            return MarketStructure::LowerHighsLowerLows;
        }
        if lower_lows {
            return MarketStructure::LowerLows;
        }
    }

    if is_ranging(bars, config.ranging_lookback, config.ranging_threshold) {
        MarketStructure::Ranging
    } else {
        MarketStructure::Choppy
    }
}

/// Check whether the latest close has broken the most recent swing high or low
pub fn detect_break_of_structure(bars: &[Bar], config: &StructureConfig) -> StructureBreak {
    if bars.len() < config.min_bos_bars {
        return StructureBreak::None;
    }

    let (Some(last_high), Some(last_low)) = (
        swing_highs(bars, config.swing_window).last().copied(),
        swing_lows(bars, config.swing_window).last().copied(),
    ) else {
        return StructureBreak::None;
    };

    let Some(current) = bars.last().map(|b| b.close) else {
        return StructureBreak::None;
    };

    if current > last_high.price {
        StructureBreak::Bullish
    } else if current < last_low.price {
        StructureBreak::Bearish
    } else {
        StructureBreak::None
    }
}
