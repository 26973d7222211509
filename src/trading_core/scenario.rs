//! Trade scenario synthesis
//!
//! One long and one short plan per run. Entry selection walks a fixed ladder:
//! 1. Ideal: reachable HTF-side FVG on the correct side of equilibrium (A)
//! 2. Continuation: intraday FVG between price and the trade direction (B)
//! 3. Market execution: a suitable FVG exists but is out of reach (C+)
//! 4. Math: zone around the discount/premium level (C)
//!
//! The plan is then graded on reward-to-risk against the dealing-range targets.

use super::bias::Bias;
use super::dealing_range::DealingRange;
use super::fvg::Fvg;
use super::structure::PatternDirection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short. Favorable moves are `sign * delta > 0`.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn pattern_direction(&self) -> PatternDirection {
        match self {
            Direction::Long => PatternDirection::Bullish,
            Direction::Short => PatternDirection::Bearish,
        }
    }

    /// FVG edge facing price on the approach (high for longs, low for shorts)
    fn near_edge(&self, fvg: &Fvg) -> f64 {
        match self {
            Direction::Long => fvg.high,
            Direction::Short => fvg.low,
        }
    }

    /// FVG edge the stop hides behind
    fn far_edge(&self, fvg: &Fvg) -> f64 {
        match self {
            Direction::Long => fvg.low,
            Direction::Short => fvg.high,
        }
    }

    /// Entry price risk and reward are measured from
    fn entry_ref(&self, zone: &EntryZone) -> f64 {
        match self {
            Direction::Long => zone.high,
            Direction::Short => zone.low,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Direction::Long),
            "short" | "sell" => Ok(Direction::Short),
            other => Err(format!("Unknown direction: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SetupQuality {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "INVALID")]
    Invalid,
}

impl std::fmt::Display for SetupQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupQuality::A => write!(f, "A"),
            SetupQuality::B => write!(f, "B"),
            SetupQuality::CPlus => write!(f, "C+"),
            SetupQuality::C => write!(f, "C"),
            SetupQuality::CMinus => write!(f, "C-"),
            SetupQuality::Invalid => write!(f, "INVALID"),
        }
    }
}

/// Which rung of the selection ladder produced the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    IdealFvg,
    Continuation,
    MarketExecution,
    Math,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryZone {
    pub high: f64,
    pub low: f64,
}

impl EntryZone {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeScenario {
    pub direction: Direction,
    pub entry_conditions: Vec<String>,
    pub entry_zone: EntryZone,
    pub entry_type: String,
    pub entry_source: EntrySource,
    pub stop_loss: f64,
    /// Strictly ordered in the trade direction, at least three
    pub targets: Vec<f64>,
    pub invalidation: f64,
    pub risk_reward: f64,
    pub confluence_factors: Vec<String>,
    pub setup_quality: SetupQuality,
    pub valid_time_window: String,
}

impl TradeScenario {
    pub fn is_valid(&self) -> bool {
        self.setup_quality != SetupQuality::Invalid
    }

    /// One-line description with prices at two decimals
    pub fn summary(&self) -> String {
        let targets: Vec<String> = self.targets.iter().map(|t| format!("{:.2}", t)).collect();
        format!(
            "{} [{}] {} entry {:.2}-{:.2} stop {:.2} targets {} R:R {:.2}",
            self.direction,
            self.setup_quality,
            self.entry_type,
            self.entry_zone.low,
            self.entry_zone.high,
            self.stop_loss,
            targets.join("/"),
            self.risk_reward
        )
    }
}

/// Configuration for scenario synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Fraction of ADR an FVG edge may sit from price (default: 0.5)
    pub reach_adr_fraction: f64,
    /// ADR used when daily history is too short (default: 5.0)
    pub default_adr: f64,
    /// Daily bars averaged for ADR (default: 10)
    pub adr_period: usize,
    /// Stop distance beyond the FVG far edge (default: 1.0)
    pub fvg_stop_offset: f64,
    /// Stop distance in market-execution mode (default: 2.0)
    pub market_stop_offset: f64,
    /// Half-width of the math entry zone (default: 1.0)
    pub math_zone_half_width: f64,
    /// Stop distance beyond the math entry zone (default: 2.5)
    pub math_stop_offset: f64,
    /// Invalidation distance beyond the dealing range (default: 1.0)
    pub invalidation_offset: f64,
    /// Step used to pad the target ladder (default: 1.0)
    pub target_step: f64,
    /// R multiple of the projected target when no range level qualifies (default: 2.0)
    pub projected_target_r: f64,
    /// Minimum R to first target before the plan is INVALID (default: 1.0)
    pub min_rr: f64,
    /// R to first target above which no second-target check is made (default: 2.0)
    pub good_rr: f64,
    /// Minimum R to second target before downgrading to C- (default: 1.5)
    pub min_second_target_rr: f64,
    /// Minimum R to first target for continuation entries (default: 1.5)
    pub continuation_min_rr: f64,
    pub valid_time_window: String,
    pub killzone_label: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            reach_adr_fraction: 0.5,
            default_adr: 5.0,
            adr_period: 10,
            fvg_stop_offset: 1.0,
            market_stop_offset: 2.0,
            math_zone_half_width: 1.0,
            math_stop_offset: 2.5,
            invalidation_offset: 1.0,
            target_step: 1.0,
            projected_target_r: 2.0,
            min_rr: 1.0,
            good_rr: 2.0,
            min_second_target_rr: 1.5,
            continuation_min_rr: 1.5,
            valid_time_window: "08:30-11:00 NY".to_string(),
            killzone_label: "NY killzone 8:30-11:00 AM".to_string(),
        }
    }
}

/// Everything the builder reads
#[derive(Debug, Clone, Copy)]
pub struct ScenarioInputs<'a> {
    pub current_price: f64,
    pub bias: Bias,
    pub dealing_range: &'a DealingRange,
    /// Intraday gaps first, then HTF gaps
    pub fvgs: &'a [Fvg],
    pub intraday_fvgs: &'a [Fvg],
    /// Average daily range; non-positive disables the reachability gate
    pub adr: f64,
}

/// True when `target` is within `fraction * adr` of price
pub fn is_reachable(target: f64, current_price: f64, adr: f64, fraction: f64) -> bool {
    if adr <= 0.0 {
        return true;
    }
    (target - current_price).abs() <= adr * fraction
}

/// Grade a plan from its risk and the rewards to its first two targets.
/// Returns the final quality and the reported reward-to-risk.
pub fn grade_risk_reward(
    risk: f64,
    first_reward: f64,
    second_reward: f64,
    quality: SetupQuality,
    is_continuation: bool,
    config: &ScenarioConfig,
) -> (SetupQuality, f64) {
    if risk <= 0.0 {
        return (SetupQuality::Invalid, 0.0);
    }

    let mut quality = quality;
    let mut reward = first_reward;
    let rr = first_reward / risk;

    if rr < config.min_rr {
        quality = SetupQuality::Invalid;
    } else if rr < config.good_rr {
        reward = second_reward;
        if reward / risk < config.min_second_target_rr {
            quality = SetupQuality::CMinus;
        }
    }

    if is_continuation && quality != SetupQuality::Invalid && first_reward / risk < config.continuation_min_rr {
        quality = SetupQuality::CMinus;
    }

    (quality, reward / risk)
}

struct Entry<'a> {
    fvg: Option<&'a Fvg>,
    source: EntrySource,
    entry_type: String,
    quality: SetupQuality,
}

fn select_entry<'a>(direction: Direction, inputs: &ScenarioInputs<'a>, config: &ScenarioConfig) -> Entry<'a> {
    let sign = direction.sign();
    let wanted = direction.pattern_direction();
    let eq = inputs.dealing_range.equilibrium;
    let price = inputs.current_price;
    let word = match direction {
        Direction::Long => "Bullish",
        Direction::Short => "Bearish",
    };

    // closest to price from the value side has the largest sign * edge
    let nearest = |a: &&Fvg, b: &&Fvg| {
        (sign * direction.near_edge(a))
            .partial_cmp(&(sign * direction.near_edge(b)))
            .unwrap_or(std::cmp::Ordering::Equal)
    };

    let on_value_side: Vec<&Fvg> = inputs
        .fvgs
        .iter()
        .filter(|f| f.direction == wanted && !f.invalidated && sign * (eq - direction.near_edge(f)) > 0.0)
        .collect();

    let ideal: Vec<&Fvg> = on_value_side
        .iter()
        .copied()
        .filter(|f| is_reachable(direction.near_edge(f), price, inputs.adr, config.reach_adr_fraction))
        .collect();

    if !ideal.is_empty() {
        let mitigated: Vec<&Fvg> = ideal.iter().copied().filter(|f| f.mitigated).collect();
        let (pool, label) = if mitigated.is_empty() {
            (&ideal, "HTF FVG")
        } else {
            (&mitigated, "HTF FVG (Retest)")
        };
        if let Some(fvg) = pool.iter().copied().max_by(nearest) {
            return Entry {
                fvg: Some(fvg),
                source: EntrySource::IdealFvg,
                entry_type: format!("{} {} ({:.2} pts)", word, label, fvg.gap_size),
                quality: SetupQuality::A,
            };
        }
    }

    if ideal.is_empty() && !inputs.intraday_fvgs.is_empty() {
        let continuation = inputs
            .intraday_fvgs
            .iter()
            .filter(|f| f.direction == wanted && !f.invalidated && sign * (price - direction.near_edge(f)) > 0.0)
            .max_by(nearest);
        if let Some(fvg) = continuation {
            return Entry {
                fvg: Some(fvg),
                source: EntrySource::Continuation,
                entry_type: format!("Intraday Continuation FVG ({:.2} pts)", fvg.gap_size),
                quality: SetupQuality::B,
            };
        }
    }

    if !on_value_side.is_empty() {
        debug!("{} FVGs out of reach, switching to market execution", direction);
        return Entry {
            fvg: None,
            source: EntrySource::MarketExecution,
            entry_type: "Market Execution (Wait for MSS)".to_string(),
            quality: SetupQuality::CPlus,
        };
    }

    let label = match direction {
        Direction::Long => "Discount Level (Math)",
        Direction::Short => "Premium Level (Math)",
    };
    Entry {
        fvg: None,
        source: EntrySource::Math,
        entry_type: label.to_string(),
        quality: SetupQuality::C,
    }
}

/// Build the scenario for one direction
pub fn build_scenario(direction: Direction, inputs: &ScenarioInputs<'_>, config: &ScenarioConfig) -> TradeScenario {
    let sign = direction.sign();
    let price = inputs.current_price;
    let range = inputs.dealing_range;

    let entry = select_entry(direction, inputs, config);
    let mut entry_type = entry.entry_type;

    let (entry_zone, stop_loss) = match (entry.fvg, entry.source) {
        (Some(fvg), _) => (
            EntryZone {
                high: fvg.high,
                low: fvg.low,
            },
            direction.far_edge(fvg) - sign * config.fvg_stop_offset,
        ),
        (None, EntrySource::MarketExecution) => (
            EntryZone {
                high: price,
                low: price,
            },
            price - sign * config.market_stop_offset,
        ),
        (None, _) => {
            let level = match direction {
                Direction::Long => range.discount,
                Direction::Short => range.premium,
            };
            let zone = EntryZone {
                high: level + config.math_zone_half_width,
                low: level - config.math_zone_half_width,
            };
            let stop = match direction {
                Direction::Long => zone.low - config.math_stop_offset,
                Direction::Short => zone.high + config.math_stop_offset,
            };
            (zone, stop)
        }
    };

    let mut condition_note = "";
    if entry.source != EntrySource::MarketExecution {
        let passed = match direction {
            Direction::Long => price < entry_zone.low,
            Direction::Short => price > entry_zone.high,
        };
        if passed {
            condition_note = match direction {
                Direction::Long => " (PRICE BELOW ZONE - WAIT FOR RECLAIM)",
                Direction::Short => " (PRICE ABOVE ZONE - WAIT FOR RECLAIM)",
            };
            entry_type.push_str(" [RECLAIM]");
        }
    }

    let entry_ref = direction.entry_ref(&entry_zone);
    let targets = build_targets(direction, range, entry_ref, stop_loss, config);
    let invalidation = match direction {
        Direction::Long => range.low - config.invalidation_offset,
        Direction::Short => range.high + config.invalidation_offset,
    };

    let risk = sign * (entry_ref - stop_loss);
    let reward = |t: f64| sign * (t - entry_ref);
    let (setup_quality, risk_reward) = grade_risk_reward(
        risk,
        reward(targets[0]),
        reward(targets[1]),
        entry.quality,
        entry.source == EntrySource::Continuation,
        config,
    );

    let mut confluence_factors = Vec::new();
    match direction {
        Direction::Long => {
            if inputs.bias == Bias::Bullish {
                confluence_factors.push("HTF bias bullish".to_string());
            }
            if price < range.equilibrium {
                confluence_factors.push("Price in discount".to_string());
            }
        }
        Direction::Short => {
            if inputs.bias == Bias::Bearish {
                confluence_factors.push("HTF bias bearish".to_string());
            }
            if price > range.equilibrium {
                confluence_factors.push("Price in premium".to_string());
            }
        }
    }
    if entry.fvg.is_some() {
        confluence_factors.push(format!("Aligned with {}", entry_type));
    }
    confluence_factors.push(config.killzone_label.clone());

    let (sweep, displacement) = match direction {
        Direction::Long => ("Sweep of Sell-Side Liquidity (SSL)", "Bullish displacement confirmed"),
        Direction::Short => ("Sweep of Buy-Side Liquidity (BSL)", "Bearish displacement confirmed"),
    };
    let entry_conditions = vec![
        sweep.to_string(),
        displacement.to_string(),
        format!("Entry at {}{}", entry_type, condition_note),
    ];

    let scenario = TradeScenario {
        direction,
        entry_conditions,
        entry_zone,
        entry_type,
        entry_source: entry.source,
        stop_loss,
        targets,
        invalidation,
        risk_reward,
        confluence_factors,
        setup_quality,
        valid_time_window: config.valid_time_window.clone(),
    };
    info!("Scenario {}", scenario.summary());
    scenario
}

/// Dealing-range targets beyond the entry, else a projected R target, padded to three
fn build_targets(
    direction: Direction,
    range: &DealingRange,
    entry_ref: f64,
    stop_loss: f64,
    config: &ScenarioConfig,
) -> Vec<f64> {
    let sign = direction.sign();
    let candidates = match direction {
        Direction::Long => [range.equilibrium, range.premium, range.high],
        Direction::Short => [range.equilibrium, range.discount, range.low],
    };

    let mut targets: Vec<f64> = candidates
        .into_iter()
        .filter(|&t| sign * (t - entry_ref) > 0.0)
        .collect();

    if targets.is_empty() {
        let risk = sign * (entry_ref - stop_loss);
        let distance = if risk > 0.0 { risk * config.projected_target_r } else { config.target_step };
        targets.push(entry_ref + sign * distance);
    }

    targets.sort_by(|a, b| (sign * a).partial_cmp(&(sign * b)).unwrap_or(std::cmp::Ordering::Equal));
    targets.dedup_by(|a, b| a == b);

    while targets.len() < 3 {
        let last = targets[targets.len() - 1];
        targets.push(last + sign * config.target_step);
    }
    targets
}

/// Build the (long, short) pair
pub fn build_scenarios(inputs: &ScenarioInputs<'_>, config: &ScenarioConfig) -> (TradeScenario, TradeScenario) {
    (
        build_scenario(Direction::Long, inputs, config),
        build_scenario(Direction::Short, inputs, config),
    )
}
