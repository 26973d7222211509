//! Live plan validation
//!
//! Re-scores a stored scenario against a fresh price. Nothing is remembered
//! between calls: the status is recomputed from (plan, price, direction).
//!
//! Check order:
//! 1. Missing plan or incomplete levels -> N/A
//! 2. Hard breach of invalidation or stop -> INVALIDATED
//! 3. Inside the entry zone -> ACTIVE
//! 4. Still approaching from the expected side -> WAITING
//! 5. Past the zone but short of the stop -> ACTIVE (holding)

use super::scenario::{Direction, TradeScenario};
use crate::error::DataError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "INVALIDATED")]
    Invalidated,
    /// Reserved; the validator does not currently produce it
    #[serde(rename = "MISSED")]
    Missed,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Active => write!(f, "ACTIVE"),
            PlanStatus::Waiting => write!(f, "WAITING"),
            PlanStatus::Invalidated => write!(f, "INVALIDATED"),
            PlanStatus::Missed => write!(f, "MISSED"),
            PlanStatus::NotApplicable => write!(f, "N/A"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredZone {
    pub high: Option<f64>,
    pub low: Option<f64>,
}

/// A scenario as it comes back from storage: any level may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredPlan {
    pub entry_zone: StoredZone,
    pub stop_loss: Option<f64>,
    pub invalidation: Option<f64>,
    pub targets: Vec<f64>,
}

impl StoredPlan {
    /// Parse a stored plan or a full scenario record
    pub fn from_json(raw: &str) -> Result<Self, DataError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl From<&TradeScenario> for StoredPlan {
    fn from(s: &TradeScenario) -> Self {
        Self {
            entry_zone: StoredZone {
                high: Some(s.entry_zone.high),
                low: Some(s.entry_zone.low),
            },
            stop_loss: Some(s.stop_loss),
            invalidation: Some(s.invalidation),
            targets: s.targets.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanValidation {
    pub status: PlanStatus,
    pub reason: String,
}

impl PlanValidation {
    fn new(status: PlanStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// Zero counts as missing, like an unset level
fn present(level: Option<f64>) -> Option<f64> {
    level.filter(|v| *v != 0.0 && v.is_finite())
}

pub fn validate_plan(plan: Option<&StoredPlan>, current_price: f64, direction: Direction) -> PlanValidation {
    let Some(plan) = plan else {
        return PlanValidation::new(PlanStatus::NotApplicable, "No plan");
    };

    let (Some(entry_high), Some(entry_low), Some(stop_loss)) = (
        present(plan.entry_zone.high),
        present(plan.entry_zone.low),
        present(plan.stop_loss),
    ) else {
        return PlanValidation::new(PlanStatus::NotApplicable, "Incomplete plan data");
    };
    let invalidation = present(plan.invalidation);

    let breached = |level: f64| match direction {
        Direction::Long => current_price <= level,
        Direction::Short => current_price >= level,
    };

    if let Some(level) = invalidation {
        if breached(level) {
            return PlanValidation::new(PlanStatus::Invalidated, format!("Price hit invalidation {:.2}", level));
        }
    }
    if breached(stop_loss) {
        return PlanValidation::new(PlanStatus::Invalidated, format!("Price hit stop loss {:.2}", stop_loss));
    }

    if current_price >= entry_low && current_price <= entry_high {
        return PlanValidation::new(PlanStatus::Active, "price is in the entry zone");
    }

    match direction {
        Direction::Long if current_price > entry_high => PlanValidation::new(
            PlanStatus::Waiting,
            format!("Price above zone ({:.2}), waiting for pullback", entry_high),
        ),
        Direction::Long => PlanValidation::new(PlanStatus::Active, "Price slightly below zone but holding stop"),
        Direction::Short if current_price < entry_low => PlanValidation::new(
            PlanStatus::Waiting,
            format!("Price below zone ({:.2}), waiting for pullback", entry_low),
        ),
        Direction::Short => PlanValidation::new(PlanStatus::Active, "Price slightly above zone but holding stop"),
    }
}

/// Validate a freshly built scenario
pub fn validate_scenario(scenario: &TradeScenario, current_price: f64) -> PlanValidation {
    validate_plan(Some(&StoredPlan::from(scenario)), current_price, scenario.direction)
}
