//! Solver seam for the binary allocation program.
//!
//! The optimizer lowers a candidate set into an [`AllocationProblem`] and
//! hands it to an [`AllocationSolver`]. Backends are passed explicitly, so a
//! request never shares solver state with another one.

use good_lp::{
    default_solver, variable, Expression, ResolutionError, Solution, SolverModel, Variable,
    variables,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for reading a binary variable back from the solver.
const BINARY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    #[error("allocation program is infeasible")]
    Infeasible,
    #[error("solver backend failed: {0}")]
    Backend(String),
    #[error("solver returned an unusable solution: {0}")]
    InvalidSolution(String),
}

impl From<ResolutionError> for SolverError {
    fn from(value: ResolutionError) -> Self {
        match value {
            ResolutionError::Infeasible => Self::Infeasible,
            other => Self::Backend(other.to_string()),
        }
    }
}

/// One binary decision variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionItem {
    pub id: String,
    pub cost_cents: f64,
    pub weight: f64,
}

/// `maximize Σ weight·x` subject to the knapsack row, `x_dependent <= x_required`
/// rows and per-group cardinality caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationProblem {
    pub items: Vec<DecisionItem>,
    pub capacity_cents: f64,
    /// `(dependent, required)` item indices.
    pub dependencies: Vec<(usize, usize)>,
    pub group_caps: Vec<GroupCap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCap {
    pub label: String,
    pub members: Vec<usize>,
    pub cap: u32,
}

pub trait AllocationSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns one flag per item of `problem`.
    fn solve(&self, problem: &AllocationProblem) -> Result<Vec<bool>, SolverError>;
}

/// Exact 0/1 solve through `good_lp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MilpSolver;

impl AllocationSolver for MilpSolver {
    fn name(&self) -> &'static str {
        "milp"
    }

    fn solve(&self, problem: &AllocationProblem) -> Result<Vec<bool>, SolverError> {
        if problem.items.is_empty() {
            return Ok(Vec::new());
        }

        let mut vars = variables!();
        let xs: Vec<Variable> = problem
            .items
            .iter()
            .map(|_| vars.add(variable().binary()))
            .collect();

        let mut objective = Expression::with_capacity(xs.len());
        let mut spend = Expression::with_capacity(xs.len());
        for (item, &x) in problem.items.iter().zip(&xs) {
            objective.add_mul(item.weight, x);
            spend.add_mul(item.cost_cents, x);
        }

        let mut model = vars
            .maximise(objective)
            .using(default_solver)
            .with(spend.leq(problem.capacity_cents));

        for &(dependent, required) in &problem.dependencies {
            let (Some(&dep_x), Some(&req_x)) = (xs.get(dependent), xs.get(required)) else {
                return Err(SolverError::Backend(format!(
                    "dependency row references missing item ({dependent}, {required})"
                )));
            };
            model = model.with((dep_x - req_x).leq(0.0));
        }

        for group in &problem.group_caps {
            let mut count = Expression::with_capacity(group.members.len());
            for &member in &group.members {
                let Some(&x) = xs.get(member) else {
                    return Err(SolverError::Backend(format!(
                        "group {} references missing item {member}",
                        group.label
                    )));
                };
                count.add_mul(1.0, x);
            }
            model = model.with(count.leq(f64::from(group.cap)));
        }

        let solution = model.solve()?;
        xs.iter()
            .zip(&problem.items)
            .map(|(&x, item)| {
                let value = solution.value(x);
                if (value - 1.0).abs() <= BINARY_TOLERANCE {
                    Ok(true)
                } else if value.abs() <= BINARY_TOLERANCE {
                    Ok(false)
                } else {
                    Err(SolverError::InvalidSolution(format!(
                        "{} has non-binary value {value}",
                        item.id
                    )))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, cost_cents: f64, weight: f64) -> DecisionItem {
        DecisionItem {
            id: id.to_string(),
            cost_cents,
            weight,
        }
    }

    #[test]
    fn solves_small_knapsack_exactly() {
        let problem = AllocationProblem {
            items: vec![
                item("a", 10_000.0, 50.0),
                item("b", 20_000.0, 90.0),
            ],
            capacity_cents: 20_000.0,
            dependencies: Vec::new(),
            group_caps: Vec::new(),
        };
        let picks = MilpSolver.solve(&problem).expect("solvable");
        assert_eq!(picks, vec![false, true]);
    }

    #[test]
    fn respects_dependency_and_group_rows() {
        let problem = AllocationProblem {
            items: vec![
                item("a", 100.0, 10.0),
                item("b", 100.0, 1.0),
                item("c", 100.0, 5.0),
            ],
            capacity_cents: 1_000.0,
            dependencies: vec![(0, 1)],
            group_caps: vec![GroupCap {
                label: "2026".to_string(),
                members: vec![1, 2],
                cap: 1,
            }],
        };
        let picks = MilpSolver.solve(&problem).expect("solvable");
        assert_eq!(picks, vec![true, true, false]);
    }

    #[test]
    fn empty_problem_needs_no_backend() {
        let problem = AllocationProblem {
            items: Vec::new(),
            capacity_cents: 0.0,
            dependencies: Vec::new(),
            group_caps: Vec::new(),
        };
        assert_eq!(MilpSolver.solve(&problem), Ok(Vec::new()));
    }

    #[test]
    fn maps_resolution_errors() {
        assert_eq!(
            SolverError::from(ResolutionError::Infeasible),
            SolverError::Infeasible
        );
        assert!(matches!(
            SolverError::from(ResolutionError::Unbounded),
            SolverError::Backend(_)
        ));
    }
}
