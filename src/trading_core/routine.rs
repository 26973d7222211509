//! Daily pre-market routine
//!
//! Steps, all computed from bars fetched through a `BarSource`:
//! 1. HTF analysis snapshot on daily bars
//! 2. Asian/London session structure on 15m bars
//! 3. Dealing range (previous day, else HTF, else recent daily)
//! 4. Liquidity map
//! 5. Day type
//! 6. Long and short scenarios from the latest 5m close
//! 7. Routine confidence and narrative

use super::analyzer::{AnalysisMode, AnalysisSnapshot, Analyzer};
use super::bars::{average_daily_range, load_bars_csv, Bar, Timeframe};
use super::cache::ContextCache;
use super::day_type::{classify_day_type, DayType, DayTypeResult};
use super::dealing_range::{build_dealing_range, DealingRange};
use super::liquidity::{build_liquidity_map, LiquidityKind, LiquidityMap};
use super::scenario::{build_scenarios, Direction, ScenarioInputs, TradeScenario};
use super::sessions::{analyze_sessions, ny_day_end, SessionStructure};
use crate::config::IctConfig;
use crate::error::DataError;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

/// Provider of bar series. Implementations return bars ascending by time.
pub trait BarSource: Send + Sync {
    fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, DataError>;
}

/// Reads `<dir>/<SYMBOL>_<timeframe>.csv`; a missing file is an empty series
pub struct CsvBarSource {
    dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", symbol.to_uppercase(), timeframe))
    }
}

impl BarSource for CsvBarSource {
    fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, DataError> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            warn!("No bar file {:?}", path);
            return Ok(Vec::new());
        }
        let mut bars = load_bars_csv(&path)?;
        let skip = bars.len().saturating_sub(limit);
        bars.drain(..skip);
        Ok(bars)
    }
}

/// Bars held in memory, keyed by (symbol, timeframe)
#[derive(Debug, Default)]
pub struct MemoryBarSource {
    series: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl MemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) {
        self.series.insert((symbol.to_uppercase(), timeframe), bars);
    }
}

impl BarSource for MemoryBarSource {
    fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>, DataError> {
        let bars = self
            .series
            .get(&(symbol.to_uppercase(), timeframe))
            .map(|b| b[b.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default();
        Ok(bars)
    }
}

/// Turns a routine result into prose
pub trait NarrativeGenerator: Send + Sync {
    fn narrate(&self, output: &RoutineOutput) -> Result<String>;
}

/// Deterministic narrative built from the snapshot summary and the plans
pub struct SummaryNarrative;

impl NarrativeGenerator for SummaryNarrative {
    fn narrate(&self, output: &RoutineOutput) -> Result<String> {
        Ok(format!(
            "{} Day type: {} ({}) Long: {}. Short: {}.",
            output.snapshot.summary(),
            output.day.day_type,
            output.day.reasoning,
            output.long_scenario.summary(),
            output.short_scenario.summary()
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineConfig {
    pub htf_timeframe: Timeframe,
    /// Daily bars fetched for analysis, dealing range and ADR (default: 500)
    pub htf_limit: usize,
    pub session_timeframe: Timeframe,
    pub session_limit: usize,
    pub entry_timeframe: Timeframe,
    pub entry_limit: usize,
    pub base_confidence: f64,
    pub bias_bonus: f64,
    /// Added on trend days, subtracted on consolidation days (default: 0.15)
    pub day_type_bonus: f64,
    /// Order block count that must be exceeded for the block bonus (default: 2)
    pub min_order_blocks: usize,
    pub order_block_bonus: f64,
    pub sweep_bonus: f64,
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            htf_timeframe: Timeframe::D1,
            htf_limit: 500,
            session_timeframe: Timeframe::M15,
            session_limit: 200,
            entry_timeframe: Timeframe::M5,
            entry_limit: 500,
            base_confidence: 0.5,
            bias_bonus: 0.2,
            day_type_bonus: 0.15,
            min_order_blocks: 2,
            order_block_bonus: 0.1,
            sweep_bonus: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineOutput {
    pub run_id: Uuid,
    pub symbol: String,
    pub date: NaiveDate,
    pub cutoff: Option<DateTime<Utc>>,
    pub snapshot: AnalysisSnapshot,
    pub sessions: SessionStructure,
    pub dealing_range: DealingRange,
    pub liquidity_map: LiquidityMap,
    pub day: DayTypeResult,
    pub current_price: f64,
    pub adr: f64,
    pub long_scenario: TradeScenario,
    pub short_scenario: TradeScenario,
    pub primary_direction: Direction,
    pub confidence: f64,
    pub narrative: String,
}

impl RoutineOutput {
    /// Parse a list of outputs as written by the routine command
    pub fn list_from_json(raw: &str) -> Result<Vec<Self>, DataError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn scenario(&self, direction: Direction) -> &TradeScenario {
        match direction {
            Direction::Long => &self.long_scenario,
            Direction::Short => &self.short_scenario,
        }
    }
}

/// Confidence in [0, 1] for the whole plan
pub fn routine_confidence(
    snapshot: &AnalysisSnapshot,
    day_type: DayType,
    sessions: &SessionStructure,
    config: &RoutineConfig,
) -> f64 {
    let mut confidence = config.base_confidence;
    if snapshot.bias.is_directional() {
        confidence += config.bias_bonus;
    }
    match day_type {
        DayType::Trend => confidence += config.day_type_bonus,
        DayType::Consolidation => confidence -= config.day_type_bonus,
        DayType::Reversal => {}
    }
    if snapshot.order_blocks.len() > config.min_order_blocks {
        confidence += config.order_block_bonus;
    }
    if sessions.has_sweep(LiquidityKind::Bsl) || sessions.has_sweep(LiquidityKind::Ssl) {
        confidence += config.sweep_bonus;
    }
    confidence.clamp(0.0, 1.0)
}

/// Bars a run for `date` may see: nothing after the cutoff or past the end of the day
fn visible_bars(bars: Vec<Bar>, date: NaiveDate, cutoff: Option<DateTime<Utc>>) -> Vec<Bar> {
    let day_end = ny_day_end(date);
    bars.into_iter()
        .filter(|b| day_end.map_or(true, |end| b.timestamp < end))
        .filter(|b| cutoff.map_or(true, |c| b.timestamp <= c))
        .collect()
}

pub struct PreMarketRoutine<'a, S: BarSource> {
    source: &'a S,
    config: &'a IctConfig,
    cache: Option<&'a ContextCache<AnalysisSnapshot>>,
    narrator: Option<&'a dyn NarrativeGenerator>,
}

impl<'a, S: BarSource> PreMarketRoutine<'a, S> {
    pub fn new(source: &'a S, config: &'a IctConfig) -> Self {
        Self {
            source,
            config,
            cache: None,
            narrator: None,
        }
    }

    /// Reuse HTF snapshots across runs within the cache TTL
    pub fn with_cache(mut self, cache: &'a ContextCache<AnalysisSnapshot>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_narrator(mut self, narrator: &'a dyn NarrativeGenerator) -> Self {
        self.narrator = Some(narrator);
        self
    }

    fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>> {
        self.source
            .fetch(symbol, timeframe, limit)
            .with_context(|| format!("Failed to fetch {} {} bars", symbol, timeframe))
    }

    fn htf_snapshot(&self, symbol: &str, daily: &[Bar], cache_key: &str) -> AnalysisSnapshot {
        let analyze = || Analyzer::new(self.config).analyze(symbol, daily, AnalysisMode::Full);
        match self.cache {
            Some(cache) => cache
                .get_or_build("htf", cache_key, || Some(analyze()))
                .unwrap_or_else(analyze),
            None => analyze(),
        }
    }

    /// Run the routine for `symbol` on `date`, seeing only bars up to `cutoff`
    pub fn run(&self, symbol: &str, date: NaiveDate, cutoff: Option<DateTime<Utc>>) -> Result<RoutineOutput> {
        let cfg = self.config;
        let rc = &cfg.routine;
        info!("Pre-market routine for {} on {}", symbol, date);

        // Step 1: HTF analysis
        let daily: Vec<Bar> = visible_bars(self.fetch(symbol, rc.htf_timeframe, rc.htf_limit)?, date, cutoff)
            .into_iter()
            .filter(|b| b.date_ny() <= date)
            .collect();
        if daily.is_empty() {
            return Err(DataError::EmptySeries {
                symbol: symbol.to_string(),
                timeframe: rc.htf_timeframe.to_string(),
            }
            .into());
        }

        let cache_key = format!("{}:{}:{}", symbol, date, cutoff.map(|c| c.timestamp()).unwrap_or_default());
        let snapshot = self.htf_snapshot(symbol, &daily, &cache_key);

        // Step 2: session structure
        let session_bars = visible_bars(self.fetch(symbol, rc.session_timeframe, rc.session_limit)?, date, cutoff);
        let now = cutoff.unwrap_or_else(Utc::now);
        let sessions = analyze_sessions(&session_bars, date, cutoff, now, &cfg.sessions);
        let snapshot = snapshot.with_sessions(&sessions);

        // Step 3: dealing range
        let dealing_range = build_dealing_range(&daily, date, snapshot.dealing_range, &cfg.dealing_range)
            .ok_or_else(|| anyhow!("No dealing range for {} on {}", symbol, date))?;

        // Step 4: liquidity map
        let liquidity_map = build_liquidity_map(&sessions.asian, &snapshot.liquidity_zones, &cfg.liquidity);

        // Step 5: day type
        let day = classify_day_type(snapshot.bias, &sessions, &snapshot.order_blocks, &snapshot.fvgs, &cfg.day_type);

        // Step 6: scenarios
        let entry_bars = visible_bars(self.fetch(symbol, rc.entry_timeframe, rc.entry_limit)?, date, cutoff);
        let current_price = entry_bars
            .last()
            .or_else(|| session_bars.last())
            .or_else(|| daily.last())
            .map(|b| b.close)
            .ok_or_else(|| anyhow!("No price for {}", symbol))?;

        let intraday = Analyzer::new(cfg).analyze(symbol, &session_bars, AnalysisMode::StructureOnly);
        let all_fvgs: Vec<_> = intraday.fvgs.iter().chain(&snapshot.fvgs).cloned().collect();

        let measured_adr = average_daily_range(&daily, cfg.scenario.adr_period);
        let adr = if measured_adr > 0.0 {
            measured_adr
        } else {
            cfg.scenario.default_adr
        };

        let inputs = ScenarioInputs {
            current_price,
            bias: snapshot.bias,
            dealing_range: &dealing_range,
            fvgs: &all_fvgs,
            intraday_fvgs: &intraday.fvgs,
            adr,
        };
        let (long_scenario, short_scenario) = build_scenarios(&inputs, &cfg.scenario);

        // Step 7: confidence and narrative
        let confidence = routine_confidence(&snapshot, day.day_type, &sessions, rc);
        let primary_direction = match snapshot.bias {
            super::bias::Bias::Bullish => Direction::Long,
            _ => Direction::Short,
        };

        let mut output = RoutineOutput {
            run_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            date,
            cutoff,
            snapshot,
            sessions,
            dealing_range,
            liquidity_map,
            day,
            current_price,
            adr,
            long_scenario,
            short_scenario,
            primary_direction,
            confidence,
            narrative: String::new(),
        };

        output.narrative = match self.narrator {
            Some(narrator) => narrator.narrate(&output).unwrap_or_else(|e| {
                warn!("Narrative generation failed for {}: {:#}", symbol, e);
                SummaryNarrative.narrate(&output).unwrap_or_default()
            }),
            None => SummaryNarrative.narrate(&output)?,
        };

        info!(
            "{} {}: bias {}, day type {}, price {:.2}, confidence {:.2}",
            symbol, date, output.snapshot.bias, output.day.day_type, current_price, output.confidence
        );
        Ok(output)
    }

    /// Run several symbols in parallel; each result stands alone
    pub fn run_many(
        &self,
        symbols: &[String],
        date: NaiveDate,
        cutoff: Option<DateTime<Utc>>,
    ) -> Vec<(String, Result<RoutineOutput>)>
    where
        Self: Sync,
    {
        symbols
            .par_iter()
            .map(|symbol| (symbol.clone(), self.run(symbol, date, cutoff)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::bars::fixtures::{approx_eq, daily_from_closes};
    use crate::trading_core::bias::Bias;
    use crate::trading_core::sessions::ny_midnight;
    use chrono::Duration;

    const SYMBOL: &str = "QQQ";

    fn analysis_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    /// 80 rising daily bars ending the day before `analysis_date`
    fn daily_series() -> Vec<Bar> {
        let closes: Vec<f64> = (0..80).map(|i| 400.0 + i as f64 * 1.2 + ((i % 5) as f64 - 2.0) * 2.0).collect();
        let mut bars = daily_from_closes(&closes);
        let last_date = analysis_date().pred_opt().unwrap();
        let offset = last_date.signed_duration_since(bars[bars.len() - 1].date_ny()).num_days();
        for bar in &mut bars {
            bar.timestamp += Duration::days(offset);
        }
        bars
    }

    /// 15m bars from NY midnight: Asian drift, then London takes the Asian high
    fn session_series() -> Vec<Bar> {
        let start = ny_midnight(analysis_date()).unwrap();
        (0..36)
            .map(|i| {
                let mid = if i < 20 { 495.0 + (i % 4) as f64 * 0.5 } else { 497.0 + (i - 20) as f64 * 0.3 };
                Bar::new(start + Duration::minutes(15 * i), mid, mid + 0.4, mid - 0.4, mid + 0.1, 1000.0)
            })
            .collect()
    }

    fn source() -> MemoryBarSource {
        let mut source = MemoryBarSource::new();
        source.insert(SYMBOL, Timeframe::D1, daily_series());
        let sessions = session_series();
        source.insert(SYMBOL, Timeframe::M15, sessions.clone());
        source.insert(SYMBOL, Timeframe::M5, sessions);
        source
    }

    fn cutoff() -> DateTime<Utc> {
        ny_midnight(analysis_date()).unwrap() + Duration::hours(9)
    }

    #[test]
    fn test_routine_produces_complete_plan() {
        let config = IctConfig::default();
        let source = source();
        let output = PreMarketRoutine::new(&source, &config)
            .run(SYMBOL, analysis_date(), Some(cutoff()))
            .unwrap();

        assert_eq!(output.symbol, SYMBOL);
        assert_eq!(output.long_scenario.direction, Direction::Long);
        assert_eq!(output.short_scenario.direction, Direction::Short);
        assert!(output.long_scenario.targets.len() >= 3);
        assert!(output.confidence >= 0.0 && output.confidence <= 1.0);
        assert!(output.sessions.has_sweep(LiquidityKind::Bsl));
        assert_eq!(output.liquidity_map.inducement.len(), 2);
        assert!(!output.narrative.is_empty());

        // Last daily bar is yesterday, so the previous-day source applies
        assert_eq!(output.dealing_range.source, crate::trading_core::dealing_range::RangeSource::PrevDay);
        let dr = &output.dealing_range;
        assert!(dr.discount < dr.equilibrium && dr.equilibrium < dr.premium);

        let expected = if output.snapshot.bias == Bias::Bullish {
            Direction::Long
        } else {
            Direction::Short
        };
        assert_eq!(output.primary_direction, expected);
    }

    #[test]
    fn test_past_date_without_cutoff_ignores_later_days() {
        let config = IctConfig::default();
        let mut source = source();
        let mut intraday = session_series();
        let same_day_close = intraday[intraday.len() - 1].close;
        let next_day = ny_midnight(analysis_date().succ_opt().unwrap()).unwrap() + Duration::hours(10);
        intraday.push(Bar::new(next_day, 480.0, 560.0, 440.0, 550.0, 1000.0));
        source.insert(SYMBOL, Timeframe::M15, intraday.clone());
        source.insert(SYMBOL, Timeframe::M5, intraday);

        let output = PreMarketRoutine::new(&source, &config)
            .run(SYMBOL, analysis_date(), None)
            .unwrap();

        assert!(approx_eq(output.current_price, same_day_close));
        assert!(!output.sessions.has_sweep(LiquidityKind::Ssl));
        assert!(output.sessions.meta.overall_high.unwrap() < 560.0);
        assert!(output.sessions.meta.last_timestamp.unwrap() < next_day);
    }

    #[test]
    fn test_output_json_round_trip() {
        let config = IctConfig::default();
        let source = source();
        let output = PreMarketRoutine::new(&source, &config)
            .run(SYMBOL, analysis_date(), Some(cutoff()))
            .unwrap();
        let raw = serde_json::to_string(&vec![output.clone()]).unwrap();

        let parsed = RoutineOutput::list_from_json(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].run_id, output.run_id);
        assert_eq!(parsed[0].symbol, SYMBOL);
        assert_eq!(parsed[0].scenario(Direction::Short).direction, Direction::Short);
        assert!(matches!(RoutineOutput::list_from_json("{}"), Err(DataError::Json(_))));
    }

    #[test]
    fn test_empty_daily_series_is_an_error() {
        let config = IctConfig::default();
        let source = MemoryBarSource::new();
        let err = PreMarketRoutine::new(&source, &config)
            .run(SYMBOL, analysis_date(), None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::EmptySeries { .. })
        ));
    }

    #[test]
    fn test_confidence_bounds() {
        let mut snapshot = AnalysisSnapshot::empty(SYMBOL);
        let sessions = analyze_sessions(&[], analysis_date(), None, Utc::now(), &Default::default());
        let config = RoutineConfig::default();

        // neutral consolidation: 0.5 - 0.15
        assert!(approx_eq(
            routine_confidence(&snapshot, DayType::Consolidation, &sessions, &config),
            0.35
        ));

        snapshot.bias = Bias::Bearish;
        assert!(approx_eq(routine_confidence(&snapshot, DayType::Trend, &sessions, &config), 0.85));
    }

    #[test]
    fn test_cache_reuses_snapshot() {
        let config = IctConfig::default();
        let source = source();
        let cache = ContextCache::from_config(&config.cache);
        let routine = PreMarketRoutine::new(&source, &config).with_cache(&cache);

        let a = routine.run(SYMBOL, analysis_date(), Some(cutoff())).unwrap();
        let b = routine.run(SYMBOL, analysis_date(), Some(cutoff())).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(a.snapshot, b.snapshot);
        assert_eq!(a.long_scenario, b.long_scenario);
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_run_many_in_parallel() {
        let config = IctConfig::default();
        let source = source();
        let symbols = vec![SYMBOL.to_string(), "SPY".to_string()];
        let results = PreMarketRoutine::new(&source, &config).run_many(&symbols, analysis_date(), Some(cutoff()));

        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }

    #[test]
    fn test_csv_source_missing_file_is_empty() {
        let source = CsvBarSource::new("/nonexistent/dir");
        assert_eq!(
            source.path_for("qqq", Timeframe::M15),
            PathBuf::from("/nonexistent/dir/QQQ_15m.csv")
        );
        assert!(source.fetch("qqq", Timeframe::D1, 10).unwrap().is_empty());
    }
}
