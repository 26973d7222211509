//! Higher-timeframe bias classification
//!
//! Three additive votes: moving-average stack, swing progression, and
//! short-term momentum. A side wins only with a clear margin.

use super::bars::{highest_high, lowest_low, Bar};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    pub fn is_directional(&self) -> bool {
        !matches!(self, Bias::Neutral)
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Neutral => write!(f, "neutral"),
        }
    }
}

/// Configuration for bias scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    /// Minimum bars, below which bias is NEUTRAL (default: 20)
    pub min_bars: usize,
    pub fast_sma: usize,
    pub slow_sma: usize,
    /// Bars per swing block compared against the block before it (default: 20)
    pub swing_block: usize,
    /// Bars back for the momentum return (default: 10)
    pub momentum_lookback: usize,
    /// Absolute return counted as momentum (default: 0.02)
    pub momentum_threshold: f64,
    /// Points for the moving-average stack (default: 2)
    pub ma_points: u32,
    /// Points for swing progression (default: 2)
    pub swing_points: u32,
    /// Points for momentum (default: 1)
    pub momentum_points: u32,
    /// Required lead of the winning side (default: 2)
    pub margin: u32,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            min_bars: 20,
            fast_sma: 20,
            slow_sma: 50,
            swing_block: 20,
            momentum_lookback: 10,
            momentum_threshold: 0.02,
            ma_points: 2,
            swing_points: 2,
            momentum_points: 1,
            margin: 2,
        }
    }
}

/// Bias together with the scores that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasScore {
    pub bias: Bias,
    pub bullish_score: u32,
    pub bearish_score: u32,
}

/// Simple moving average of closes ending at the last bar
pub fn sma(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let recent = &bars[bars.len() - period..];
    Some(recent.iter().map(|b| b.close).sum::<f64>() / period as f64)
}

/// Pick a side only when it leads the other by at least `margin`
pub fn classify_scores(bullish_score: u32, bearish_score: u32, margin: u32) -> Bias {
    if bullish_score >= bearish_score + margin {
        Bias::Bullish
    } else if bearish_score >= bullish_score + margin {
        Bias::Bearish
    } else {
        Bias::Neutral
    }
}

pub fn score_bias(bars: &[Bar], config: &BiasConfig) -> BiasScore {
    let neutral = BiasScore {
        bias: Bias::Neutral,
        bullish_score: 0,
        bearish_score: 0,
    };
    if bars.len() < config.min_bars.max(1) {
        return neutral;
    }
    let Some(current) = bars.last().map(|b| b.close) else {
        return neutral;
    };

    let mut bullish = 0;
    let mut bearish = 0;

    if let (Some(fast), Some(slow)) = (sma(bars, config.fast_sma), sma(bars, config.slow_sma)) {
        if current > fast && fast > slow {
            bullish += config.ma_points;
        } else if current < fast && fast < slow {
            bearish += config.ma_points;
        }
    }

    let len = bars.len();
    if len > config.swing_block {
        let recent = &bars[len - config.swing_block..];
        let prior = &bars[len.saturating_sub(2 * config.swing_block)..len - config.swing_block];
        if let (Some(rh), Some(rl), Some(ph), Some(pl)) =
            (highest_high(recent), lowest_low(recent), highest_high(prior), lowest_low(prior))
        {
            if rh > ph && rl > pl {
                bullish += config.swing_points;
            } else if rh < ph && rl < pl {
                bearish += config.swing_points;
            }
        }
    }

    if config.momentum_lookback > 0 && len >= config.momentum_lookback {
        let past = bars[len - config.momentum_lookback].close;
        if past != 0.0 {
            let momentum = (current - past) / past;
            if momentum > config.momentum_threshold {
                bullish += config.momentum_points;
            } else if momentum < -config.momentum_threshold {
                bearish += config.momentum_points;
            }
        }
    }

    let bias = classify_scores(bullish, bearish, config.margin);
    debug!("Bias {} (bullish {} / bearish {})", bias, bullish, bearish);

    BiasScore {
        bias,
        bullish_score: bullish,
        bearish_score: bearish,
    }
}

pub fn determine_bias(bars: &[Bar], config: &BiasConfig) -> Bias {
    score_bias(bars, config).bias
}
