use std::collections::BTreeSet;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::candidate::money::scale;
use crate::candidate::Candidate;
use crate::constraints::{build, ConstraintOptions};
use crate::error::ValidationError;
use crate::optimizer::{AllocationResult, Objective, Optimizer};

pub const DEFAULT_LEVELS: [f64; 5] = [0.8, 0.9, 1.0, 1.1, 1.2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub budget_level: f64,
    pub budget: Decimal,
    pub result: AllocationResult,
}

/// A level at which the funded selection differs from the previous level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflectionPoint {
    pub budget_level: f64,
    pub budget: Decimal,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub benefit_delta: f64,
}

impl Optimizer {
    /// Re-runs the allocation at `base_budget × level` for every level.
    /// Levels are solved in parallel; the output follows `levels` order.
    pub fn analyze_sensitivity(
        &self,
        candidates: &[Candidate],
        base_budget: Decimal,
        levels: &[f64],
        options: &ConstraintOptions,
        objective: Objective,
    ) -> Result<Vec<SensitivityPoint>, ValidationError> {
        let budgets = levels
            .iter()
            .map(|&level| {
                if !level.is_finite() || level < 0.0 {
                    return Err(ValidationError::InvalidLevel { value: level });
                }
                let budget = scale(base_budget, level)
                    .ok_or(ValidationError::InvalidLevel { value: level })?;
                Ok((level, budget))
            })
            .collect::<Result<Vec<_>, _>>()?;

        build(candidates, base_budget, options)?;

        let points = budgets
            .par_iter()
            .map(|&(level, budget)| {
                let result = self.plan(candidates, budget, options, objective)?;
                Ok(SensitivityPoint {
                    budget_level: level,
                    budget,
                    result,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        info!(
            levels = points.len(),
            base_budget = %base_budget,
            "sensitivity sweep finished"
        );
        Ok(points)
    }
}

/// Sensitivity sweep with the default solver, benefit objective and no
/// phasing caps.
pub fn analyze_sensitivity(
    candidates: &[Candidate],
    base_budget: Decimal,
    levels: &[f64],
) -> Result<Vec<SensitivityPoint>, ValidationError> {
    Optimizer::default().analyze_sensitivity(
        candidates,
        base_budget,
        levels,
        &ConstraintOptions::default(),
        Objective::Benefit,
    )
}

pub fn inflection_points(points: &[SensitivityPoint]) -> Vec<InflectionPoint> {
    points
        .windows(2)
        .filter_map(|pair| {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.result.selected_ids == next.result.selected_ids {
                return None;
            }
            Some(InflectionPoint {
                budget_level: next.budget_level,
                budget: next.budget,
                added: set_difference(&next.result.selected_ids, &prev.result.selected_ids),
                removed: set_difference(&prev.result.selected_ids, &next.result.selected_ids),
                benefit_delta: next.result.total_benefit - prev.result.total_benefit,
            })
        })
        .collect()
}

fn set_difference(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Vec<String> {
    a.difference(b).cloned().collect()
}
