use std::collections::BTreeSet;
use std::sync::Arc;

use capital_allocator::optimizer::pareto::exhaustive_frontier;
use capital_allocator::optimizer::sensitivity::DEFAULT_LEVELS;
use capital_allocator::optimizer::{AllocationProblem, SolverError};
use capital_allocator::{
    build, normalize, AllocationResult, AllocationSolver, Candidate, ConstraintOptions, Method,
    Objective, Optimizer, RawCandidate,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

struct FailingSolver;

impl AllocationSolver for FailingSolver {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn solve(&self, _problem: &AllocationProblem) -> Result<Vec<bool>, SolverError> {
        Err(SolverError::Backend("injected failure".to_string()))
    }
}

/// Deterministic portfolio: chained dependencies, three periods, one mandatory
/// item whose dependency is forced along with it.
fn portfolio() -> Vec<Candidate> {
    let mut seed: u64 = 0x5eed;
    let mut next = move |modulo: u64| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) % modulo
    };

    let raw: Vec<RawCandidate> = (0..12)
        .map(|i| {
            let cost = 10 + next(490);
            let benefit = 1 + next(100);
            let mut record = json!({
                "id": format!("c{i:02}"),
                "cost": cost,
                "expected_benefit": benefit,
                "period": 2026 + (i % 3),
            });
            if i % 4 == 3 {
                record["depends_on"] = json!([format!("c{:02}", i - 2)]);
            }
            if i == 7 {
                record["mandatory"] = json!(true);
            }
            serde_json::from_value(record).expect("raw record")
        })
        .collect();
    normalize(&raw).expect("generated portfolio is valid")
}

fn options() -> ConstraintOptions {
    ConstraintOptions {
        max_per_period: Some(3),
    }
}

fn total_cost(candidates: &[Candidate]) -> Decimal {
    candidates.iter().map(|c| c.cost).sum()
}

fn assert_hard_constraints(candidates: &[Candidate], result: &AllocationResult, budget: Decimal) {
    let set = build(candidates, budget, &options()).expect("valid constraints");
    if !result.feasible {
        assert!(result.infeasibility.is_some());
        return;
    }
    assert!(
        result.total_cost <= budget,
        "spent {} of {budget}",
        result.total_cost
    );
    let violations = set.violations(candidates, &result.selected_ids);
    assert!(violations.is_empty(), "{violations:?}");
    for candidate in candidates.iter().filter(|c| c.mandatory) {
        assert!(result.is_selected(&candidate.id));
    }
}

fn budget_grid(candidates: &[Candidate]) -> Vec<Decimal> {
    let total = total_cost(candidates);
    (0..=10)
        .map(|step| (total * Decimal::from(step) / dec!(10)).round_dp(2))
        .collect()
}

#[test]
fn milp_results_respect_every_hard_constraint() {
    let candidates = portfolio();
    let optimizer = Optimizer::default();
    for budget in budget_grid(&candidates) {
        let result = optimizer
            .plan(&candidates, budget, &options(), Objective::Benefit)
            .expect("valid input");
        assert_eq!(result.method, Method::Lp);
        assert_hard_constraints(&candidates, &result, budget);
    }
}

#[test]
fn greedy_fallback_respects_every_hard_constraint() {
    let candidates = portfolio();
    let optimizer = Optimizer::new(Arc::new(FailingSolver));
    for budget in budget_grid(&candidates) {
        let result = optimizer
            .plan(&candidates, budget, &options(), Objective::Benefit)
            .expect("valid input");
        assert_hard_constraints(&candidates, &result, budget);
        if result.feasible {
            assert_eq!(result.method, Method::GreedyFallback);
            assert!(!result.warnings.is_empty());
        }
    }
}

#[test]
fn benefit_never_decreases_as_budget_grows() {
    let candidates = portfolio();
    let optimizer = Optimizer::default();
    let mut previous: Option<f64> = None;
    for budget in budget_grid(&candidates) {
        let result = optimizer
            .plan(&candidates, budget, &options(), Objective::Benefit)
            .expect("valid input");
        if !result.feasible {
            continue;
        }
        if let Some(prev) = previous {
            assert!(
                result.total_benefit + 1e-9 >= prev,
                "benefit dropped from {prev} to {} at {budget}",
                result.total_benefit
            );
        }
        previous = Some(result.total_benefit);
    }
    assert!(previous.is_some());
}

#[test]
fn milp_matches_enumerated_optimum_and_beats_greedy() {
    let candidates = portfolio();
    let budget = (total_cost(&candidates) / dec!(2)).round_dp(2);
    let milp = Optimizer::default()
        .plan(&candidates, budget, &options(), Objective::Benefit)
        .expect("valid input");
    let greedy = Optimizer::new(Arc::new(FailingSolver))
        .plan(&candidates, budget, &options(), Objective::Benefit)
        .expect("valid input");

    let frontier =
        exhaustive_frontier(&candidates, &options(), budget, 16).expect("enumerable");
    let best = frontier
        .iter()
        .filter(|p| p.total_cost <= budget)
        .map(|p| p.total_benefit)
        .fold(0.0, f64::max);

    assert!((milp.total_benefit - best).abs() < 1e-6, "{} vs {best}", milp.total_benefit);
    assert!(milp.total_benefit + 1e-9 >= greedy.total_benefit);
}

#[test]
fn pareto_points_are_mutually_non_dominated() {
    let candidates = portfolio();
    let frontier = Optimizer::default()
        .pareto_frontier(
            &candidates,
            &budget_grid(&candidates),
            &options(),
            Objective::Benefit,
        )
        .expect("valid sweep");
    assert!(!frontier.is_empty());
    for pair in frontier.windows(2) {
        assert!(pair[0].total_cost < pair[1].total_cost);
        assert!(pair[0].total_benefit < pair[1].total_benefit);
    }
    for a in &frontier {
        for b in &frontier {
            assert!(!a.dominates(b));
        }
    }
}

#[test]
fn optimize_is_idempotent_and_order_independent() {
    let candidates = portfolio();
    let budget = (total_cost(&candidates) * dec!(0.4)).round_dp(2);
    let optimizer = Optimizer::default();
    let first = optimizer
        .plan(&candidates, budget, &options(), Objective::Benefit)
        .expect("valid input");
    let second = optimizer
        .plan(&candidates, budget, &options(), Objective::Benefit)
        .expect("valid input");
    assert_eq!(first, second);

    let mut reversed = candidates.clone();
    reversed.reverse();
    let shuffled = optimizer
        .plan(&reversed, budget, &options(), Objective::Benefit)
        .expect("valid input");
    assert_eq!(first.selected_ids, shuffled.selected_ids);
}

#[test]
fn sensitivity_sweep_tracks_the_default_levels() {
    let candidates = portfolio();
    let base = (total_cost(&candidates) / dec!(2)).round_dp(2);
    let points = Optimizer::default()
        .analyze_sensitivity(
            &candidates,
            base,
            &DEFAULT_LEVELS,
            &options(),
            Objective::Benefit,
        )
        .expect("valid sweep");
    let levels: Vec<f64> = points.iter().map(|p| p.budget_level).collect();
    assert_eq!(levels, DEFAULT_LEVELS.to_vec());
    for pair in points.windows(2) {
        assert!(pair[0].budget < pair[1].budget);
        assert!(pair[1].result.total_benefit + 1e-9 >= pair[0].result.total_benefit);
    }
}

#[test]
fn mandatory_cost_above_budget_is_reported_not_raised() {
    let candidates = portfolio();
    let forced: BTreeSet<String> = build(&candidates, Decimal::ZERO, &options())
        .expect("valid constraints")
        .forced_ids;
    assert_eq!(forced.len(), 2);

    let result = Optimizer::default()
        .plan(&candidates, Decimal::ZERO, &options(), Objective::Benefit)
        .expect("valid input");
    assert!(!result.feasible);
    assert_eq!(result.selected_ids, forced);
}
