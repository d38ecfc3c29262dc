use std::collections::BTreeSet;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candidate::money::round_cents;
use crate::candidate::Candidate;
use crate::constraints::{build, ConstraintOptions};
use crate::error::ValidationError;
use crate::optimizer::{AllocationResult, Objective, Optimizer};

/// Benefit differences below this are treated as ties.
pub const BENEFIT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoPoint {
    pub total_cost: Decimal,
    pub total_benefit: f64,
    pub selected_ids: BTreeSet<String>,
    /// Sweep budget that produced the point; absent for enumerated points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Decimal>,
}

impl ParetoPoint {
    fn from_result(budget: Decimal, result: AllocationResult) -> Self {
        Self {
            total_cost: result.total_cost,
            total_benefit: result.total_benefit,
            selected_ids: result.selected_ids,
            budget: Some(budget),
        }
    }

    /// Costs no more, yields no less, and is strictly better in one of the two.
    pub fn dominates(&self, other: &ParetoPoint) -> bool {
        let no_worse = self.total_cost <= other.total_cost
            && self.total_benefit + BENEFIT_EPSILON >= other.total_benefit;
        let better = self.total_cost < other.total_cost
            || self.total_benefit > other.total_benefit + BENEFIT_EPSILON;
        no_worse && better
    }
}

/// Keeps the non-dominated points, ascending by cost, one point per
/// (cost, benefit) pair.
pub fn non_dominated(mut points: Vec<ParetoPoint>) -> Vec<ParetoPoint> {
    points.sort_by(|a, b| {
        a.total_cost
            .cmp(&b.total_cost)
            .then_with(|| b.total_benefit.total_cmp(&a.total_benefit))
            .then_with(|| a.selected_ids.cmp(&b.selected_ids))
    });

    let mut frontier: Vec<ParetoPoint> = Vec::new();
    for point in points {
        let improves = frontier
            .last()
            .map_or(true, |best| point.total_benefit > best.total_benefit + BENEFIT_EPSILON);
        if improves {
            frontier.push(point);
        }
    }
    frontier
}

/// `steps` evenly spaced budgets from `max_budget / steps` up to `max_budget`.
pub fn budget_sweep(max_budget: Decimal, steps: usize) -> Vec<Decimal> {
    if steps == 0 || max_budget <= Decimal::ZERO {
        return Vec::new();
    }
    let count = Decimal::from(steps as u64);
    let mut budgets: Vec<Decimal> = (1..=steps as u64)
        .map(|step| round_cents(max_budget * Decimal::from(step) / count))
        .collect();
    budgets.dedup();
    budgets
}

impl Optimizer {
    pub fn pareto_frontier(
        &self,
        candidates: &[Candidate],
        budgets: &[Decimal],
        options: &ConstraintOptions,
        objective: Objective,
    ) -> Result<Vec<ParetoPoint>, ValidationError> {
        let points = budgets
            .par_iter()
            .map(|&budget| {
                let result = self.plan(candidates, budget, options, objective)?;
                Ok((budget, result))
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        let feasible: Vec<ParetoPoint> = points
            .into_iter()
            .filter(|(_, result)| result.feasible)
            .map(|(budget, result)| ParetoPoint::from_result(budget, result))
            .collect();
        let frontier = non_dominated(feasible);
        info!(
            budgets = budgets.len(),
            points = frontier.len(),
            "pareto sweep finished"
        );
        Ok(frontier)
    }
}

/// Frontier over a budget sweep with the default solver and benefit objective.
pub fn pareto_frontier(
    candidates: &[Candidate],
    budgets: &[Decimal],
) -> Result<Vec<ParetoPoint>, ValidationError> {
    Optimizer::default().pareto_frontier(
        candidates,
        budgets,
        &ConstraintOptions::default(),
        Objective::Benefit,
    )
}

/// Exact frontier: enumerates every subset of the optional candidates that
/// respects the constraints at `max_budget`.
pub fn exhaustive_frontier(
    candidates: &[Candidate],
    options: &ConstraintOptions,
    max_budget: Decimal,
    cap: usize,
) -> Result<Vec<ParetoPoint>, ValidationError> {
    let constraints = build(candidates, max_budget, options)?;
    let optional: Vec<&Candidate> = {
        let mut items: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| !constraints.is_forced(&c.id))
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    };
    if optional.len() > cap || optional.len() >= u64::BITS as usize {
        return Err(ValidationError::TooManyCandidates {
            count: optional.len(),
            max: cap,
        });
    }
    if constraints.forced_shortfall().is_some() {
        return Ok(Vec::new());
    }

    let total = 1u64 << optional.len();
    let mut points = Vec::new();
    for mask in 0..total {
        let mut selected = constraints.forced_ids.clone();
        selected.extend(
            optional
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, c)| c.id.clone()),
        );
        if !constraints.violations(candidates, &selected).is_empty() {
            continue;
        }
        let chosen = candidates.iter().filter(|c| selected.contains(&c.id));
        let (cost, benefit) = chosen.fold((Decimal::ZERO, 0.0), |(cost, benefit), c| {
            (cost + c.cost, benefit + c.expected_benefit)
        });
        points.push(ParetoPoint {
            total_cost: round_cents(cost),
            total_benefit: benefit,
            selected_ids: selected,
            budget: None,
        });
    }
    debug!(
        subsets = total,
        admissible = points.len(),
        "enumerated allocation subsets"
    );
    Ok(non_dominated(points))
}
