pub mod graph;
pub mod load;
pub mod money;
pub mod normalize;

use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::optimizer::Objective;

pub use normalize::{normalize, normalize_bounded};

/// A validated, fundable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub cost: Decimal,
    pub expected_benefit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_score: Option<f64>,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionProfile>,
}

/// Condition figures supplied by the assessment layer for portfolio metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionProfile {
    pub current_ci: f64,
    pub target_ci: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_value: Option<f64>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, cost: Decimal, expected_benefit: f64) -> Self {
        Self {
            id: id.into(),
            cost: money::round_cents(cost),
            expected_benefit,
            priority_score: None,
            depends_on: BTreeSet::new(),
            period: None,
            mandatory: false,
            condition: None,
        }
    }

    pub fn with_priority(mut self, score: f64) -> Self {
        self.priority_score = Some(score);
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn in_period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_condition(mut self, condition: ConditionProfile) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn cost_f64(&self) -> f64 {
        self.cost.to_f64().unwrap_or(f64::MAX)
    }

    /// Objective coefficient for this candidate. A missing priority score
    /// falls back to the expected benefit.
    pub fn weight(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Benefit => self.expected_benefit,
            Objective::Priority => self.priority_score.unwrap_or(self.expected_benefit),
        }
    }

    pub fn efficiency(&self, objective: Objective) -> f64 {
        let cost = self.cost_f64();
        if cost > 0.0 {
            self.weight(objective) / cost
        } else {
            0.0
        }
    }
}

/// A project/component record as delivered by the assessment layer. Fields
/// stay loosely typed until [`normalize`] validates them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub id: Value,
    #[serde(default, alias = "estimatedCost", alias = "estimated_cost")]
    pub cost: Value,
    #[serde(default, alias = "expectedBenefit", alias = "benefit")]
    pub expected_benefit: Value,
    #[serde(default, alias = "priorityScore", alias = "priority")]
    pub priority_score: Value,
    #[serde(default, alias = "dependsOn", alias = "dependencies")]
    pub depends_on: Value,
    #[serde(default, alias = "periodConstraint", alias = "period_constraint", alias = "year")]
    pub period: Value,
    #[serde(default)]
    pub mandatory: Value,
    #[serde(default, alias = "currentCi", alias = "current_condition")]
    pub current_ci: Value,
    #[serde(default, alias = "targetCi", alias = "target_condition")]
    pub target_ci: Value,
    #[serde(default, alias = "replacementValue")]
    pub replacement_value: Value,
}

impl From<&Candidate> for RawCandidate {
    fn from(value: &Candidate) -> Self {
        let condition = value.condition;
        Self {
            id: Value::String(value.id.clone()),
            cost: Value::String(value.cost.to_string()),
            expected_benefit: Value::from(value.expected_benefit),
            priority_score: value.priority_score.map(Value::from).unwrap_or(Value::Null),
            depends_on: Value::Array(
                value
                    .depends_on
                    .iter()
                    .map(|id| Value::String(id.clone()))
                    .collect(),
            ),
            period: value
                .period
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            mandatory: Value::Bool(value.mandatory),
            current_ci: condition
                .map(|c| Value::from(c.current_ci))
                .unwrap_or(Value::Null),
            target_ci: condition
                .map(|c| Value::from(c.target_ci))
                .unwrap_or(Value::Null),
            replacement_value: condition
                .and_then(|c| c.replacement_value)
                .map(Value::from)
                .unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn new_rounds_cost_to_cents() {
        let candidate = Candidate::new("hvac", dec!(1250.456), 12.0);
        assert_eq!(candidate.cost, dec!(1250.46));
    }

    #[test]
    fn priority_objective_falls_back_to_benefit() {
        let plain = Candidate::new("a", dec!(100), 40.0);
        let scored = Candidate::new("b", dec!(100), 40.0).with_priority(90.0);
        assert_eq!(plain.weight(Objective::Priority), 40.0);
        assert_eq!(scored.weight(Objective::Priority), 90.0);
        assert_eq!(scored.weight(Objective::Benefit), 40.0);
        assert!((scored.efficiency(Objective::Benefit) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn raw_record_accepts_camel_case_fields() {
        let raw: RawCandidate = serde_json::from_value(serde_json::json!({
            "id": "roof-2",
            "cost": "4,500.00",
            "expectedBenefit": 18,
            "dependsOn": ["roof-1"],
            "periodConstraint": 2027,
            "mandatory": true
        }))
        .expect("raw record should deserialize");
        assert_eq!(raw.expected_benefit, serde_json::json!(18));
        assert_eq!(raw.period, serde_json::json!(2027));
        assert_eq!(raw.depends_on, serde_json::json!(["roof-1"]));
    }
}
