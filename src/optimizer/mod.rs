pub mod pareto;
pub mod sensitivity;
pub mod solver;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::candidate::money::{round_cents, to_cents_f64};
use crate::candidate::Candidate;
use crate::constraints::{build, ConstraintOptions, ConstraintSet};
use crate::error::ValidationError;
use crate::ranking::greedy_select;

pub use pareto::{ParetoPoint, BENEFIT_EPSILON};
pub use sensitivity::{InflectionPoint, SensitivityPoint, DEFAULT_LEVELS};
pub use solver::{AllocationProblem, AllocationSolver, MilpSolver, SolverError};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Benefit,
    Priority,
}

impl Display for Objective {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Benefit => write!(f, "benefit"),
            Self::Priority => write!(f, "priority"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown objective: {0} (expected benefit or priority)")]
pub struct ObjectiveParseError(pub String);

impl FromStr for Objective {
    type Err = ObjectiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "benefit" | "expected_benefit" | "ci" => Ok(Self::Benefit),
            "priority" | "priority_score" | "risk" => Ok(Self::Priority),
            _ => Err(ObjectiveParseError(s.to_string())),
        }
    }
}

/// Which algorithm produced an [`AllocationResult`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Lp,
    GreedyFallback,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lp => write!(f, "lp"),
            Self::GreedyFallback => write!(f, "greedy-fallback"),
        }
    }
}

/// Strategy an [`Optimizer`] runs first.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolverChoice {
    #[default]
    Milp,
    Greedy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub selected_ids: BTreeSet<String>,
    pub total_cost: Decimal,
    pub total_benefit: f64,
    /// Sum of the objective weights over the selection.
    pub objective_value: f64,
    pub feasible: bool,
    pub method: Method,
    pub objective: Objective,
    pub budget: Decimal,
    pub mandatory_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infeasibility: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AllocationResult {
    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_ids.contains(id)
    }

    pub fn unspent_budget(&self) -> Decimal {
        (self.budget - self.total_cost).max(Decimal::ZERO)
    }
}

/// Runs the allocation program with an explicitly supplied solver backend.
#[derive(Clone)]
pub struct Optimizer {
    solver: Arc<dyn AllocationSolver>,
    choice: SolverChoice,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("solver", &self.solver.name())
            .field("choice", &self.choice)
            .finish()
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(Arc::new(MilpSolver))
    }
}

impl Optimizer {
    pub fn new(solver: Arc<dyn AllocationSolver>) -> Self {
        Self {
            solver,
            choice: SolverChoice::Milp,
        }
    }

    pub fn from_choice(choice: SolverChoice) -> Self {
        Self {
            choice,
            ..Self::default()
        }
    }

    pub fn solver_name(&self) -> &'static str {
        match self.choice {
            SolverChoice::Milp => self.solver.name(),
            SolverChoice::Greedy => "greedy",
        }
    }

    /// Builds the constraint set and optimizes in one step.
    pub fn plan(
        &self,
        candidates: &[Candidate],
        budget: Decimal,
        options: &ConstraintOptions,
        objective: Objective,
    ) -> Result<AllocationResult, ValidationError> {
        let constraints = build(candidates, budget, options)?;
        Ok(self.optimize(candidates, &constraints, objective))
    }

    /// Never fails: infeasibility is reported in the result and solver
    /// failures fall back to greedy selection.
    pub fn optimize(
        &self,
        candidates: &[Candidate],
        constraints: &ConstraintSet,
        objective: Objective,
    ) -> AllocationResult {
        if let Some(reason) = constraints.forced_shortfall() {
            info!(budget = %constraints.budget, "mandatory candidates cannot be funded: {reason}");
            return assemble(
                candidates,
                constraints.forced_ids.clone(),
                constraints,
                objective,
                Method::Lp,
            )
            .infeasible(reason);
        }

        if self.choice == SolverChoice::Greedy {
            let selected = greedy_select(candidates, constraints, objective);
            return assemble(
                candidates,
                selected,
                constraints,
                objective,
                Method::GreedyFallback,
            );
        }

        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        let problem = lower(&ordered, constraints, objective);
        debug!(
            solver = self.solver.name(),
            variables = problem.items.len(),
            capacity_cents = problem.capacity_cents,
            "solving allocation program"
        );

        let outcome = self.solver.solve(&problem).and_then(|picks| {
            if picks.len() != problem.items.len() {
                return Err(SolverError::InvalidSolution(format!(
                    "expected {} decisions, got {}",
                    problem.items.len(),
                    picks.len()
                )));
            }
            let mut selected = constraints.forced_ids.clone();
            selected.extend(
                problem
                    .items
                    .iter()
                    .zip(picks)
                    .filter(|(_, picked)| *picked)
                    .map(|(item, _)| item.id.clone()),
            );
            let violations = constraints.violations(candidates, &selected);
            if violations.is_empty() {
                Ok(selected)
            } else {
                Err(SolverError::InvalidSolution(violations.join("; ")))
            }
        });

        match outcome {
            Ok(selected) => assemble(candidates, selected, constraints, objective, Method::Lp),
            Err(SolverError::Infeasible) => {
                info!(budget = %constraints.budget, "solver reported the program infeasible");
                assemble(
                    candidates,
                    constraints.forced_ids.clone(),
                    constraints,
                    objective,
                    Method::Lp,
                )
                .infeasible("solver found no allocation satisfying every constraint".to_string())
            }
            Err(err) => {
                warn!(
                    solver = self.solver.name(),
                    error = %err,
                    "solver failed, falling back to greedy selection"
                );
                let selected = greedy_select(candidates, constraints, objective);
                let mut result = assemble(
                    candidates,
                    selected,
                    constraints,
                    objective,
                    Method::GreedyFallback,
                );
                result
                    .warnings
                    .push(format!("{} solver failed: {err}", self.solver.name()));
                result
            }
        }
    }
}

/// Optimizes with the default MILP backend.
pub fn optimize(
    candidates: &[Candidate],
    constraints: &ConstraintSet,
    objective: Objective,
) -> AllocationResult {
    Optimizer::default().optimize(candidates, constraints, objective)
}

/// Lowers the non-forced candidates into a solver program. Budget is in
/// whole cents so the knapsack row is exact.
fn lower(
    ordered: &[&Candidate],
    constraints: &ConstraintSet,
    objective: Objective,
) -> AllocationProblem {
    let decision: Vec<&Candidate> = ordered
        .iter()
        .copied()
        .filter(|c| !constraints.is_forced(&c.id))
        .collect();
    let position: BTreeMap<&str, usize> = decision
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.id.as_str(), idx))
        .collect();

    let items = decision
        .iter()
        .map(|c| solver::DecisionItem {
            id: c.id.clone(),
            cost_cents: to_cents_f64(c.cost),
            weight: c.weight(objective),
        })
        .collect();

    let dependencies = constraints
        .dependencies
        .iter()
        .filter_map(|edge| {
            let dependent = *position.get(edge.dependent.as_str())?;
            let required = *position.get(edge.required.as_str())?;
            Some((dependent, required))
        })
        .collect();

    let group_caps = constraints
        .period_caps
        .iter()
        .map(|cap| solver::GroupCap {
            label: cap.period.clone(),
            members: cap
                .members
                .iter()
                .filter_map(|id| position.get(id.as_str()).copied())
                .collect(),
            cap: cap.remaining(),
        })
        .filter(|group| !group.members.is_empty())
        .collect();

    AllocationProblem {
        items,
        capacity_cents: to_cents_f64(constraints.available_budget()),
        dependencies,
        group_caps,
    }
}

fn assemble(
    candidates: &[Candidate],
    selected_ids: BTreeSet<String>,
    constraints: &ConstraintSet,
    objective: Objective,
    method: Method,
) -> AllocationResult {
    let mut chosen: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| selected_ids.contains(&c.id))
        .collect();
    chosen.sort_by(|a, b| a.id.cmp(&b.id));
    let total_cost = round_cents(chosen.iter().map(|c| c.cost).sum());
    let total_benefit = chosen.iter().map(|c| c.expected_benefit).sum();
    let objective_value = chosen.iter().map(|c| c.weight(objective)).sum();

    AllocationResult {
        selected_ids,
        total_cost,
        total_benefit,
        objective_value,
        feasible: true,
        method,
        objective,
        budget: constraints.budget,
        mandatory_ids: constraints.mandatory_ids.clone(),
        infeasibility: None,
        warnings: Vec::new(),
    }
}

impl AllocationResult {
    fn infeasible(mut self, reason: String) -> Self {
        self.feasible = false;
        self.infeasibility = Some(reason);
        self
    }
}
