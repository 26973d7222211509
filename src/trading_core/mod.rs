//! Trading Core - pattern detection and pre-market plan synthesis
//!
//! This module contains the pieces of the daily routine:
//! - OHLCV bars and CSV loading
//! - Market structure, fair value gaps, order blocks and liquidity zones
//! - Directional bias and dealing range
//! - Overnight session structure and day type
//! - Long/short trade scenarios and live plan validation
//! - Routine orchestration, context cache and scenario replay

pub mod bars;
pub mod structure;
pub mod fvg;
pub mod order_blocks;
pub mod liquidity;
pub mod bias;
pub mod sessions;
pub mod dealing_range;
pub mod day_type;
pub mod scenario;
pub mod plan_status;
pub mod analyzer;
pub mod cache;
pub mod routine;
pub mod simulate;

// Re-export commonly used types
pub use bars::{Bar, Timeframe};
pub use structure::{MarketStructure, PatternDirection, StructureBreak};
pub use fvg::Fvg;
pub use order_blocks::OrderBlock;
pub use liquidity::{LiquidityKind, LiquidityMap, LiquidityZone, ZoneType};
pub use bias::Bias;
pub use sessions::{SessionRange, SessionStructure};
pub use dealing_range::{DealingRange, RangeSource};
pub use day_type::{DayType, DayTypeResult};
pub use scenario::{Direction, SetupQuality, TradeScenario};
pub use plan_status::{validate_plan, PlanStatus, PlanValidation, StoredPlan};
pub use analyzer::{AnalysisMode, AnalysisSnapshot, Analyzer};
pub use cache::ContextCache;
pub use routine::{BarSource, CsvBarSource, MemoryBarSource, NarrativeGenerator, PreMarketRoutine, RoutineOutput};
pub use simulate::{simulate_scenario, summarize, SimulationOutcome, SimulationResult, SimulationSummary};
