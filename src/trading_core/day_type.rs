//! Day-type classification: trend, reversal or consolidation

use super::bias::Bias;
use super::fvg::Fvg;
use super::liquidity::LiquidityKind;
use super::order_blocks::OrderBlock;
use super::sessions::SessionStructure;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DayTypeConfig {
    /// Order block strength counted as "strong" (default: 0.7)
    pub strong_block_strength: f64,
    /// Unfilled FVG count that must be exceeded for a trend vote (default: 2)
    pub min_unfilled_fvgs: usize,
    /// Lead a day type needs over both others (default: 1)
    pub margin: u32,
}

impl Default for DayTypeConfig {
    fn default() -> Self {
        Self {
            strong_block_strength: 0.7,
            min_unfilled_fvgs: 2,
            margin: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Trend,
    Reversal,
    Consolidation,
}

impl std::fmt::Display for DayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayType::Trend => write!(f, "trend"),
            DayType::Reversal => write!(f, "reversal"),
            DayType::Consolidation => write!(f, "consolidation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTypeResult {
    pub day_type: DayType,
    pub reasoning: String,
    pub trend_score: u32,
    pub reversal_score: u32,
    pub consolidation_score: u32,
}

pub fn classify_day_type(
    bias: Bias,
    sessions: &SessionStructure,
    order_blocks: &[OrderBlock],
    fvgs: &[Fvg],
    config: &DayTypeConfig,
) -> DayTypeResult {
    let mut trend = 0;
    let mut reversal = 0;
    let mut consolidation = 0;

    if bias.is_directional() {
        trend += 2;
    } else {
        consolidation += 2;
    }

    let bsl_swept = sessions.has_sweep(LiquidityKind::Bsl);
    let ssl_swept = sessions.has_sweep(LiquidityKind::Ssl);
    match (bsl_swept, ssl_swept) {
        (true, true) => reversal += 3,
        (true, false) | (false, true) => trend += 2,
        (false, false) => consolidation += 2,
    }

    let strong_blocks = order_blocks
        .iter()
        .filter(|ob| ob.strength > config.strong_block_strength)
        .count();
    if strong_blocks > 0 {
        reversal += 1;
    }

    let unfilled = fvgs.iter().filter(|f| !f.invalidated).count();
    if unfilled > config.min_unfilled_fvgs {
        trend += 1;
    }

    let (day_type, reasoning) = if trend >= reversal.max(consolidation) + config.margin {
        (
            DayType::Trend,
            format!(
                "Strong HTF bias ({}), clean London sweep, {} unfilled FVGs. Expect continuation.",
                bias, unfilled
            ),
        )
    } else if reversal >= trend.max(consolidation) + config.margin {
        (
            DayType::Reversal,
            format!(
                "London swept both sides, {} strong OBs present. Watch for reversal from HTF zone.",
                strong_blocks
            ),
        )
    } else {
        (
            DayType::Consolidation,
            "No clear directional bias, minimal London activity. Reduce size or avoid trading.".to_string(),
        )
    };

    info!(
        "Day type {} (trend {}, reversal {}, consolidation {})",
        day_type, trend, reversal, consolidation
    );

    DayTypeResult {
        day_type,
        reasoning,
        trend_score: trend,
        reversal_score: reversal,
        consolidation_score: consolidation,
    }
}
