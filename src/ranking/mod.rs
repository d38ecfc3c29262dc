pub mod greedy;

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::optimizer::Objective;

pub use greedy::greedy_select;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub rank: usize,
    pub id: String,
    pub cost: Decimal,
    pub expected_benefit: f64,
    /// Objective weight the ratio was computed from.
    pub weight: f64,
    pub ratio: f64,
    pub mandatory: bool,
}

/// Benefit-per-dollar ranking.
pub fn rank(candidates: &[Candidate]) -> Vec<RankedCandidate> {
    rank_by(candidates, Objective::Benefit)
}

pub fn rank_by(candidates: &[Candidate], objective: Objective) -> Vec<RankedCandidate> {
    ranked_order(candidates.iter(), objective)
        .into_iter()
        .enumerate()
        .map(|(idx, c)| RankedCandidate {
            rank: idx + 1,
            id: c.id.clone(),
            cost: c.cost,
            expected_benefit: c.expected_benefit,
            weight: c.weight(objective),
            ratio: c.efficiency(objective),
            mandatory: c.mandatory,
        })
        .collect()
}

/// Descending efficiency, then cheaper first, then id.
pub fn compare_efficiency(a: &Candidate, b: &Candidate, objective: Objective) -> Ordering {
    b.efficiency(objective)
        .total_cmp(&a.efficiency(objective))
        .then_with(|| a.cost.cmp(&b.cost))
        .then_with(|| a.id.cmp(&b.id))
}

pub(crate) fn ranked_order<'a>(
    candidates: impl Iterator<Item = &'a Candidate>,
    objective: Objective,
) -> Vec<&'a Candidate> {
    let mut order: Vec<&Candidate> = candidates.collect();
    order.sort_by(|a, b| compare_efficiency(a, b, objective));
    order
}
