//! Configuration for the pre-market pipeline
//!
//! Every threshold lives on a per-component struct next to the code that uses
//! it. `IctConfig` gathers them so a single JSON file can override any subset.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::trading_core::analyzer::AnalyzerConfig;
use crate::trading_core::bias::BiasConfig;
use crate::trading_core::cache::CacheConfig;
use crate::trading_core::day_type::DayTypeConfig;
use crate::trading_core::dealing_range::DealingRangeConfig;
use crate::trading_core::fvg::FvgConfig;
use crate::trading_core::liquidity::LiquidityConfig;
use crate::trading_core::order_blocks::OrderBlockConfig;
use crate::trading_core::routine::RoutineConfig;
use crate::trading_core::scenario::ScenarioConfig;
use crate::trading_core::sessions::SessionConfig;
use crate::trading_core::structure::StructureConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IctConfig {
    pub structure: StructureConfig,
    pub fvg: FvgConfig,
    pub order_blocks: OrderBlockConfig,
    pub liquidity: LiquidityConfig,
    pub bias: BiasConfig,
    pub sessions: SessionConfig,
    pub dealing_range: DealingRangeConfig,
    pub day_type: DayTypeConfig,
    pub scenario: ScenarioConfig,
    pub analyzer: AnalyzerConfig,
    pub routine: RoutineConfig,
    pub cache: CacheConfig,
}

impl IctConfig {
    /// Load overrides from a JSON file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Defaults, or the file at `path` when one is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Config for an instrument with a known average daily range in points
    pub fn with_default_adr(adr: f64) -> Self {
        let mut config = Self::default();
        config.scenario.default_adr = adr;
        config
    }
}
