use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::candidate::graph::dependency_closure;
use crate::candidate::money::round_cents;
use crate::candidate::Candidate;
use crate::error::{UnknownDependency, ValidationError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintOptions {
    /// Maximum number of funded candidates per period bucket.
    #[serde(default)]
    pub max_per_period: Option<u32>,
}

/// `dependent` may only be funded when `required` is funded
/// (`x_dependent - x_required <= 0`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: String,
    pub required: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCap {
    pub period: String,
    pub cap: u32,
    pub members: BTreeSet<String>,
    pub forced: usize,
}

impl PeriodCap {
    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.forced as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub budget: Decimal,
    /// Candidates flagged mandatory by the caller.
    pub mandatory_ids: BTreeSet<String>,
    /// Mandatory candidates plus everything they transitively depend on;
    /// all of these are fixed at `x = 1`.
    pub forced_ids: BTreeSet<String>,
    pub forced_cost: Decimal,
    pub dependencies: Vec<DependencyEdge>,
    pub period_caps: Vec<PeriodCap>,
}

pub fn build(
    candidates: &[Candidate],
    budget: Decimal,
    options: &ConstraintOptions,
) -> Result<ConstraintSet, ValidationError> {
    if budget.is_sign_negative() && !budget.is_zero() {
        return Err(ValidationError::InvalidBudget {
            value: budget.to_string(),
        });
    }

    let known: BTreeSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let mut unknown = Vec::new();
    let mut dependencies = Vec::new();
    for candidate in candidates {
        for dep in &candidate.depends_on {
            if known.contains(dep.as_str()) {
                dependencies.push(DependencyEdge {
                    dependent: candidate.id.clone(),
                    required: dep.clone(),
                });
            } else {
                unknown.push(UnknownDependency {
                    candidate: candidate.id.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }
    if !unknown.is_empty() {
        return Err(ValidationError::UnknownDependency {
            references: unknown,
        });
    }
    dependencies.sort();

    let mandatory_ids: BTreeSet<String> = candidates
        .iter()
        .filter(|c| c.mandatory)
        .map(|c| c.id.clone())
        .collect();
    let forced_ids = dependency_closure(candidates, &mandatory_ids);
    let forced_cost = round_cents(
        candidates
            .iter()
            .filter(|c| forced_ids.contains(&c.id))
            .map(|c| c.cost)
            .sum(),
    );

    let mut period_caps = Vec::new();
    if let Some(cap) = options.max_per_period {
        let mut buckets: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for candidate in candidates {
            if let Some(period) = candidate.period.as_deref() {
                buckets
                    .entry(period)
                    .or_default()
                    .insert(candidate.id.clone());
            }
        }
        for (period, members) in buckets {
            let forced = members.iter().filter(|id| forced_ids.contains(*id)).count();
            period_caps.push(PeriodCap {
                period: period.to_string(),
                cap,
                members,
                forced,
            });
        }
    }

    Ok(ConstraintSet {
        budget: round_cents(budget),
        mandatory_ids,
        forced_ids,
        forced_cost,
        dependencies,
        period_caps,
    })
}

impl ConstraintSet {
    pub fn is_forced(&self, id: &str) -> bool {
        self.forced_ids.contains(id)
    }

    /// Budget left for optional candidates once forced ones are paid for.
    pub fn available_budget(&self) -> Decimal {
        (self.budget - self.forced_cost).max(Decimal::ZERO)
    }

    pub fn period_cap(&self, period: &str) -> Option<&PeriodCap> {
        self.period_caps.iter().find(|cap| cap.period == period)
    }

    /// Explains why the forced set alone cannot be funded, if it cannot.
    pub fn forced_shortfall(&self) -> Option<String> {
        let mut reasons = Vec::new();
        if self.forced_cost > self.budget {
            let ids = self.forced_ids.iter().cloned().collect::<Vec<_>>().join(", ");
            reasons.push(format!(
                "mandatory candidates [{ids}] cost {} which exceeds the budget of {}",
                self.forced_cost, self.budget
            ));
        }
        for cap in &self.period_caps {
            if cap.forced > cap.cap as usize {
                reasons.push(format!(
                    "period {} has {} mandatory candidates but allows {}",
                    cap.period, cap.forced, cap.cap
                ));
            }
        }
        (!reasons.is_empty()).then(|| reasons.join("; "))
    }

    /// Every hard constraint the selection breaks; empty when it is valid.
    pub fn violations(&self, candidates: &[Candidate], selected: &BTreeSet<String>) -> Vec<String> {
        let mut out = Vec::new();
        let cost: Decimal = candidates
            .iter()
            .filter(|c| selected.contains(&c.id))
            .map(|c| c.cost)
            .sum();
        if round_cents(cost) > self.budget {
            out.push(format!("cost {cost} exceeds budget {}", self.budget));
        }
        for id in self.forced_ids.difference(selected) {
            out.push(format!("mandatory candidate {id} is not selected"));
        }
        for edge in &self.dependencies {
            if selected.contains(&edge.dependent) && !selected.contains(&edge.required) {
                out.push(format!(
                    "{} is selected without its dependency {}",
                    edge.dependent, edge.required
                ));
            }
        }
        for cap in &self.period_caps {
            let count = cap.members.intersection(selected).count();
            if count > cap.cap as usize {
                out.push(format!(
                    "period {} funds {count} candidates (cap {})",
                    cap.period, cap.cap
                ));
            }
        }
        out
    }
}
