//! Replay a scenario over intraday bars
//!
//! Only bars inside the scenario's time window on the given date are used.
//! The first bar overlapping the entry zone fills the trade at the zone edge;
//! from that bar on, a stop touch loses 1R and otherwise the first target
//! touched closes the trade.

use super::bars::Bar;
use super::scenario::{Direction, TradeScenario};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationOutcome {
    NoEntry,
    /// Entered, neither stop nor target reached inside the window
    Open,
    Stopped,
    Target,
    /// Zero risk between entry and stop
    Invalid,
}

impl std::fmt::Display for SimulationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationOutcome::NoEntry => write!(f, "no_entry"),
            SimulationOutcome::Open => write!(f, "open"),
            SimulationOutcome::Stopped => write!(f, "stopped"),
            SimulationOutcome::Target => write!(f, "target"),
            SimulationOutcome::Invalid => write!(f, "invalid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub direction: Direction,
    pub outcome: SimulationOutcome,
    pub entry_time: Option<DateTime<Utc>>,
    pub entry_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    /// Index into the scenario targets for `Target` outcomes
    pub target_index: Option<usize>,
    pub r_multiple: f64,
}

impl SimulationResult {
    fn unfilled(direction: Direction, outcome: SimulationOutcome) -> Self {
        Self {
            direction,
            outcome,
            entry_time: None,
            entry_price: None,
            exit_time: None,
            exit_price: None,
            target_index: None,
            r_multiple: 0.0,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(
            self.outcome,
            SimulationOutcome::Open | SimulationOutcome::Stopped | SimulationOutcome::Target
        )
    }
}

/// Parse `"HH:MM-HH:MM NY"` into New York local start and end times
pub fn parse_time_window(window: &str) -> Option<(NaiveTime, NaiveTime)> {
    let trimmed = window.trim();
    let times = trimmed.strip_suffix("NY").unwrap_or(trimmed).trim();
    let (start, end) = times.split_once('-')?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    Some((start, end))
}

fn ny_instant(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    New_York
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Replay `scenario` over `bars` on `date`
pub fn simulate_scenario(bars: &[Bar], scenario: &TradeScenario, date: NaiveDate) -> Result<SimulationResult> {
    let direction = scenario.direction;
    let (start, end) = parse_time_window(&scenario.valid_time_window)
        .with_context(|| format!("Bad time window '{}'", scenario.valid_time_window))?;
    let (start, end) = ny_instant(date, start)
        .zip(ny_instant(date, end))
        .ok_or_else(|| anyhow!("Time window {} does not exist on {}", scenario.valid_time_window, date))?;

    let window: Vec<&Bar> = bars
        .iter()
        .filter(|b| b.timestamp >= start && b.timestamp <= end)
        .collect();

    let zone = scenario.entry_zone;
    let entry_price = match direction {
        Direction::Long => zone.low,
        Direction::Short => zone.high,
    };
    let risk = (entry_price - scenario.stop_loss).abs();
    if risk <= 0.0 {
        return Ok(SimulationResult::unfilled(direction, SimulationOutcome::Invalid));
    }

    let Some(entry_idx) = window.iter().position(|b| b.low <= zone.high && b.high >= zone.low) else {
        debug!("{} scenario never reached its entry zone on {}", direction, date);
        return Ok(SimulationResult::unfilled(direction, SimulationOutcome::NoEntry));
    };

    let mut result = SimulationResult {
        entry_time: Some(window[entry_idx].timestamp),
        entry_price: Some(entry_price),
        ..SimulationResult::unfilled(direction, SimulationOutcome::Open)
    };

    for bar in &window[entry_idx..] {
        let stopped = match direction {
            Direction::Long => bar.low <= scenario.stop_loss,
            Direction::Short => bar.high >= scenario.stop_loss,
        };
        if stopped {
            result.outcome = SimulationOutcome::Stopped;
            result.exit_time = Some(bar.timestamp);
            result.exit_price = Some(scenario.stop_loss);
            result.r_multiple = -1.0;
            return Ok(result);
        }

        let touched = scenario.targets.iter().position(|&t| match direction {
            Direction::Long => bar.high >= t,
            Direction::Short => bar.low <= t,
        });
        if let Some(index) = touched {
            let target = scenario.targets[index];
            result.outcome = SimulationOutcome::Target;
            result.exit_time = Some(bar.timestamp);
            result.exit_price = Some(target);
            result.target_index = Some(index);
            result.r_multiple = direction.sign() * (target - entry_price) / risk;
            return Ok(result);
        }
    }

    Ok(result)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub total: usize,
    pub filled: usize,
    pub wins: usize,
    pub losses: usize,
    /// Wins over resolved trades, zero with none resolved
    pub win_rate: f64,
    pub avg_win_r: f64,
}

pub fn summarize(results: &[SimulationResult]) -> SimulationSummary {
    let filled = results.iter().filter(|r| r.is_filled()).count();
    let wins: Vec<f64> = results
        .iter()
        .filter(|r| r.outcome == SimulationOutcome::Target)
        .map(|r| r.r_multiple)
        .collect();
    let losses = results
        .iter()
        .filter(|r| r.outcome == SimulationOutcome::Stopped)
        .count();

    let resolved = wins.len() + losses;
    SimulationSummary {
        total: results.len(),
        filled,
        wins: wins.len(),
        losses,
        win_rate: if resolved > 0 {
            wins.len() as f64 / resolved as f64
        } else {
            0.0
        },
        avg_win_r: if wins.is_empty() {
            0.0
        } else {
            wins.iter().sum::<f64>() / wins.len() as f64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::bars::fixtures::{approx_eq, bars_from_ohlc};
    use crate::trading_core::scenario::{EntrySource, EntryZone, SetupQuality};

    // bars_from_ohlc starts at 09:30 New York on 2025-03-03
    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn long_scenario() -> TradeScenario {
        TradeScenario {
            direction: Direction::Long,
            entry_conditions: vec![],
            entry_zone: EntryZone { high: 100.0, low: 99.0 },
            entry_type: "Discount zone entry".to_string(),
            entry_source: EntrySource::Math,
            stop_loss: 97.0,
            targets: vec![103.0, 105.0, 107.0],
            invalidation: 95.0,
            risk_reward: 2.0,
            confluence_factors: vec![],
            setup_quality: SetupQuality::B,
            valid_time_window: "08:30-11:00 NY".to_string(),
        }
    }

    #[test]
    fn test_parse_time_window() {
        let (start, end) = parse_time_window("08:30-11:00 NY").unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
        assert!(parse_time_window("morning").is_none());
    }

    #[test]
    fn test_long_hits_first_target() {
        let bars = bars_from_ohlc(&[
            (101.0, 101.5, 100.5, 101.0),
            (100.5, 101.0, 99.5, 100.0),
            (100.0, 103.5, 99.8, 103.0),
        ]);
        let result = simulate_scenario(&bars, &long_scenario(), date()).unwrap();
        assert_eq!(result.outcome, SimulationOutcome::Target);
        assert_eq!(result.entry_time, Some(bars[1].timestamp));
        assert_eq!(result.entry_price, Some(99.0));
        assert_eq!(result.target_index, Some(0));
        // (103 - 99) / 2
        assert!(approx_eq(result.r_multiple, 2.0));
    }

    #[test]
    fn test_long_stopped() {
        let bars = bars_from_ohlc(&[(100.5, 101.0, 99.5, 100.0), (100.0, 100.2, 96.9, 97.5)]);
        let result = simulate_scenario(&bars, &long_scenario(), date()).unwrap();
        assert_eq!(result.outcome, SimulationOutcome::Stopped);
        assert_eq!(result.exit_price, Some(97.0));
        assert!(approx_eq(result.r_multiple, -1.0));
    }

    #[test]
    fn test_short_target_and_open() {
        let mut short = long_scenario();
        short.direction = Direction::Short;
        short.entry_zone = EntryZone { high: 106.0, low: 105.0 };
        short.stop_loss = 108.0;
        short.targets = vec![102.0, 100.0, 98.0];

        let bars = bars_from_ohlc(&[(105.2, 105.8, 104.9, 105.0), (105.0, 105.1, 103.0, 103.5)]);
        let result = simulate_scenario(&bars, &short, date()).unwrap();
        assert_eq!(result.outcome, SimulationOutcome::Open);
        assert_eq!(result.entry_price, Some(106.0));

        let bars = bars_from_ohlc(&[(105.2, 105.8, 104.9, 105.0), (105.0, 105.1, 99.5, 100.0)]);
        let result = simulate_scenario(&bars, &short, date()).unwrap();
        assert_eq!(result.outcome, SimulationOutcome::Target);
        // (106 - 102) / 2
        assert!(approx_eq(result.r_multiple, 2.0));
    }

    #[test]
    fn test_no_entry_outside_window() {
        let mut scenario = long_scenario();
        scenario.valid_time_window = "09:00-09:30 NY".to_string();
        let bars = bars_from_ohlc(&[(101.0, 101.5, 100.5, 101.0), (100.5, 101.0, 99.5, 100.0)]);
        let result = simulate_scenario(&bars, &scenario, date()).unwrap();
        assert_eq!(result.outcome, SimulationOutcome::NoEntry);
        assert!(!result.is_filled());
    }

    #[test]
    fn test_zero_risk_is_invalid() {
        let mut scenario = long_scenario();
        scenario.stop_loss = 99.0;
        let result = simulate_scenario(&[], &scenario, date()).unwrap();
        assert_eq!(result.outcome, SimulationOutcome::Invalid);

        scenario.valid_time_window = "whenever".to_string();
        assert!(simulate_scenario(&[], &scenario, date()).is_err());
    }

    #[test]
    fn test_summarize() {
        let mut win = SimulationResult::unfilled(Direction::Long, SimulationOutcome::Target);
        win.r_multiple = 3.0;
        let mut loss = SimulationResult::unfilled(Direction::Long, SimulationOutcome::Stopped);
        loss.r_multiple = -1.0;
        let results = vec![
            win.clone(),
            loss,
            SimulationResult::unfilled(Direction::Short, SimulationOutcome::NoEntry),
            SimulationResult { r_multiple: 1.0, ..win },
        ];

        let summary = summarize(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.filled, 3);
        assert_eq!(summary.wins, 2);
        assert!(approx_eq(summary.win_rate, 2.0 / 3.0));
        assert!(approx_eq(summary.avg_win_r, 2.0));
        assert_eq!(summarize(&[]), SimulationSummary::default());
    }
}
