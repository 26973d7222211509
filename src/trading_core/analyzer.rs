//! Analysis snapshot: one pass of every detector over a bar series, trimmed
//! and ranked for downstream use.

use super::bars::{tail, Bar};
use super::bias::{score_bias, Bias, BiasScore};
use super::dealing_range::PriceRange;
use super::fvg::{detect_fvgs, Fvg};
use super::liquidity::{detect_liquidity_zones, LiquidityZone};
use super::order_blocks::{detect_order_blocks, OrderBlock};
use super::sessions::{SessionRange, SessionStructure};
use super::structure::{analyze_market_structure, detect_break_of_structure, MarketStructure, PatternDirection, StructureBreak};
use crate::config::IctConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Items kept per pattern list (default: 5)
    pub max_items: usize,
    /// Trailing bars for the HTF dealing range (default: 50)
    pub dealing_range_bars: usize,
    /// Blocks averaged into snapshot confidence (default: 3)
    pub confidence_blocks: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_items: 5,
            dealing_range_bars: 50,
            confidence_blocks: 3,
        }
    }
}

/// Which detectors run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Everything
    Full,
    /// Order blocks and FVGs, no liquidity zones
    StructureOnly,
    /// Bias, structure and dealing range only
    BiasOnly,
}

impl std::str::FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(AnalysisMode::Full),
            "structure_only" => Ok(AnalysisMode::StructureOnly),
            "bias_only" => Ok(AnalysisMode::BiasOnly),
            other => Err(format!("Unknown analysis mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub symbol: String,
    /// Timestamp of the last analysed bar
    pub as_of: Option<DateTime<Utc>>,
    pub bias: Bias,
    pub bias_score: BiasScore,
    /// Max high / min low of the trailing bars, absent on short series
    pub dealing_range: Option<PriceRange>,
    pub order_blocks: Vec<OrderBlock>,
    /// Non-invalidated gaps only
    pub fvgs: Vec<Fvg>,
    pub liquidity_zones: Vec<LiquidityZone>,
    pub market_structure: MarketStructure,
    pub structure_break: StructureBreak,
    pub asian_session: SessionRange,
    pub london_session: SessionRange,
    pub confidence: f64,
}

impl AnalysisSnapshot {
    /// Snapshot for a series with no bars
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            as_of: None,
            bias: Bias::Neutral,
            bias_score: BiasScore {
                bias: Bias::Neutral,
                bullish_score: 0,
                bearish_score: 0,
            },
            dealing_range: None,
            order_blocks: Vec::new(),
            fvgs: Vec::new(),
            liquidity_zones: Vec::new(),
            market_structure: MarketStructure::Unknown,
            structure_break: StructureBreak::None,
            asian_session: SessionRange::default(),
            london_session: SessionRange::default(),
            confidence: 0.0,
        }
    }

    pub fn with_sessions(mut self, sessions: &SessionStructure) -> Self {
        self.asian_session = sessions.asian;
        self.london_session = sessions.london;
        self
    }

    /// Plain-text description used when no narrative generator is available
    pub fn summary(&self) -> String {
        if self.as_of.is_none() {
            return format!("Analysis unavailable for {}: no bars.", self.symbol);
        }

        let mut parts = vec![
            format!("{} shows a {} bias.", self.symbol, self.bias),
            format!("Market structure: {}.", self.market_structure),
        ];
        if let Some(range) = &self.dealing_range {
            parts.push(format!("Dealing range: {:.2} - {:.2}.", range.low, range.high));
        }
        if let Some(ob) = self.order_blocks.first() {
            parts.push(format!(
                "Key {} order block at {:.2}-{:.2} (strength: {:.2}).",
                ob.direction, ob.low, ob.high, ob.strength
            ));
        }
        if !self.fvgs.is_empty() {
            parts.push(format!("{} unfilled FVGs present.", self.fvgs.len()));
        }
        parts.join(" ")
    }
}

/// Keep blocks aligned with a directional bias, strongest first
pub fn rank_order_blocks(blocks: Vec<OrderBlock>, bias: Bias) -> Vec<OrderBlock> {
    let wanted = match bias {
        Bias::Bullish => Some(PatternDirection::Bullish),
        Bias::Bearish => Some(PatternDirection::Bearish),
        Bias::Neutral => None,
    };
    let mut ranked: Vec<OrderBlock> = blocks
        .into_iter()
        .filter(|ob| wanted.map_or(true, |d| ob.direction == d))
        .collect();
    ranked.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal));
    ranked
}

/// Confidence in [0, 1] from how clear the analysis is
pub fn snapshot_confidence(
    bias: Bias,
    order_blocks: &[OrderBlock],
    fvgs: &[Fvg],
    structure: MarketStructure,
    config: &AnalyzerConfig,
) -> f64 {
    let mut confidence = 0.5;
    if bias.is_directional() {
        confidence += 0.15;
    }

    let top = &order_blocks[..order_blocks.len().min(config.confidence_blocks)];
    if !top.is_empty() {
        let avg = top.iter().map(|ob| ob.strength).sum::<f64>() / top.len() as f64;
        confidence += avg * 0.2;
    }

    if structure.is_directional() {
        confidence += 0.1;
    }
    if !fvgs.is_empty() {
        confidence += 0.05;
    }
    confidence.min(1.0)
}

/// Runs the detectors with a fixed configuration
pub struct Analyzer<'a> {
    config: &'a IctConfig,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a IctConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, symbol: &str, bars: &[Bar], mode: AnalysisMode) -> AnalysisSnapshot {
        if bars.is_empty() {
            warn!("No bars for {}, returning empty snapshot", symbol);
            return AnalysisSnapshot::empty(symbol);
        }

        let cfg = self.config;
        let limits = &cfg.analyzer;

        let bias_score = score_bias(bars, &cfg.bias);
        let bias = bias_score.bias;

        let dealing_range = if bars.len() >= limits.dealing_range_bars {
            PriceRange::of_bars(tail(bars, limits.dealing_range_bars))
        } else {
            None
        };

        let with_patterns = matches!(mode, AnalysisMode::Full | AnalysisMode::StructureOnly);

        let order_blocks = if with_patterns {
            let mut ranked = rank_order_blocks(detect_order_blocks(bars, &cfg.order_blocks), bias);
            ranked.truncate(limits.max_items);
            ranked
        } else {
            Vec::new()
        };

        let fvgs: Vec<Fvg> = if with_patterns {
            detect_fvgs(bars, &cfg.fvg)
                .into_iter()
                .filter(|f| !f.invalidated)
                .take(limits.max_items)
                .collect()
        } else {
            Vec::new()
        };

        let liquidity_zones = if mode == AnalysisMode::Full {
            let mut zones = detect_liquidity_zones(bars, &cfg.liquidity);
            zones.truncate(limits.max_items);
            zones
        } else {
            Vec::new()
        };

        let market_structure = analyze_market_structure(bars, &cfg.structure);
        let structure_break = detect_break_of_structure(bars, &cfg.structure);
        let confidence = snapshot_confidence(bias, &order_blocks, &fvgs, market_structure, limits);

        info!(
            "Analyzed {} ({} bars): bias {}, structure {}, {} OBs, {} FVGs, {} zones",
            symbol,
            bars.len(),
            bias,
            market_structure,
            order_blocks.len(),
            fvgs.len(),
            liquidity_zones.len()
        );

        AnalysisSnapshot {
            symbol: symbol.to_string(),
            as_of: bars.last().map(|b| b.timestamp),
            bias,
            bias_score,
            dealing_range,
            order_blocks,
            fvgs,
            liquidity_zones,
            market_structure,
            structure_break,
            asian_session: SessionRange::default(),
            london_session: SessionRange::default(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::bars::fixtures::{approx_eq, daily_from_closes};

    fn block(direction: PatternDirection, strength: f64) -> OrderBlock {
        OrderBlock {
            high: 101.0,
            low: 100.0,
            timestamp: Utc::now(),
            direction,
            strength,
        }
    }

    fn trending_daily(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.8 + ((i % 7) as f64 - 3.0) * 1.5).collect();
        daily_from_closes(&closes)
    }

    #[test]
    fn test_rank_filters_by_bias() {
        let blocks = vec![
            block(PatternDirection::Bearish, 0.9),
            block(PatternDirection::Bullish, 0.4),
            block(PatternDirection::Bullish, 0.7),
        ];
        let ranked = rank_order_blocks(blocks.clone(), Bias::Bullish);
        assert_eq!(ranked.len(), 2);
        assert!(approx_eq(ranked[0].strength, 0.7));

        let ranked = rank_order_blocks(blocks, Bias::Neutral);
        assert_eq!(ranked.len(), 3);
        assert!(approx_eq(ranked[0].strength, 0.9));
    }

    #[test]
    fn test_confidence_terms() {
        let config = AnalyzerConfig::default();
        assert!(approx_eq(
            snapshot_confidence(Bias::Neutral, &[], &[], MarketStructure::Choppy, &config),
            0.5
        ));

        let blocks = vec![
            block(PatternDirection::Bullish, 1.0),
            block(PatternDirection::Bullish, 0.5),
            block(PatternDirection::Bullish, 0.0),
            block(PatternDirection::Bullish, 1.0),
        ];
        // 0.5 + 0.15 + 0.2 * 0.5 + 0.1
        let c = snapshot_confidence(Bias::Bullish, &blocks, &[], MarketStructure::HigherHighs, &config);
        assert!(approx_eq(c, 0.85));
    }

    #[test]
    fn test_empty_series() {
        let config = IctConfig::default();
        let snapshot = Analyzer::new(&config).analyze("QQQ", &[], AnalysisMode::Full);
        assert_eq!(snapshot.bias, Bias::Neutral);
        assert_eq!(snapshot.market_structure, MarketStructure::Unknown);
        assert_eq!(snapshot.confidence, 0.0);
        assert!(snapshot.summary().contains("no bars"));
    }

    #[test]
    fn test_full_analysis_limits() {
        let config = IctConfig::default();
        let bars = trending_daily(120);
        let snapshot = Analyzer::new(&config).analyze("QQQ", &bars, AnalysisMode::Full);

        assert!(snapshot.order_blocks.len() <= 5);
        assert!(snapshot.fvgs.len() <= 5);
        assert!(snapshot.liquidity_zones.len() <= 5);
        assert!(snapshot.fvgs.iter().all(|f| !f.invalidated));
        assert!(snapshot.confidence >= 0.5 && snapshot.confidence <= 1.0);

        let range = snapshot.dealing_range.unwrap();
        assert!(range.high > range.low);
        assert!(snapshot.summary().starts_with("QQQ shows a "));
    }

    #[test]
    fn test_modes_skip_detectors() {
        let config = IctConfig::default();
        let bars = trending_daily(120);
        let analyzer = Analyzer::new(&config);

        let bias_only = analyzer.analyze("QQQ", &bars, AnalysisMode::BiasOnly);
        assert!(bias_only.order_blocks.is_empty() && bias_only.fvgs.is_empty());
        assert!(bias_only.liquidity_zones.is_empty());

        let structure = analyzer.analyze("QQQ", &bars, AnalysisMode::StructureOnly);
        assert!(structure.liquidity_zones.is_empty());

        // Same input, same snapshot
        assert_eq!(structure, analyzer.analyze("QQQ", &bars, AnalysisMode::StructureOnly));
    }

    #[test]
    fn test_short_series_has_no_range() {
        let config = IctConfig::default();
        let snapshot = Analyzer::new(&config).analyze("QQQ", &trending_daily(30), AnalysisMode::Full);
        assert!(snapshot.dealing_range.is_none());
    }
}
