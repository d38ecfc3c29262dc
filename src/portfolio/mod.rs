use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::candidate::money::round_cents;
use crate::candidate::Candidate;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Cost-weighted condition index after funding.
    pub weighted_ci: f64,
    /// Deferred cost over replacement value; lower is better.
    pub weighted_fci: f64,
    pub total_cost: Decimal,
    pub total_benefit: f64,
    pub funded_count: usize,
    pub candidate_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsComparison {
    pub before: PortfolioMetrics,
    pub after: PortfolioMetrics,
    pub ci_change: f64,
    pub fci_change: f64,
}

pub fn aggregate(candidates: &[Candidate], selection: &BTreeSet<String>) -> PortfolioMetrics {
    let mut metrics = PortfolioMetrics {
        candidate_count: candidates.len(),
        ..PortfolioMetrics::default()
    };

    let mut ci_weighted_sum = 0.0;
    let mut ci_weight = 0.0;
    let mut deferred = 0.0;
    let mut replacement_value = 0.0;
    let mut total_cost = Decimal::ZERO;

    for candidate in candidates {
        let funded = selection.contains(&candidate.id);
        if funded {
            total_cost += candidate.cost;
            metrics.total_benefit += candidate.expected_benefit;
            metrics.funded_count += 1;
        }

        let Some(condition) = candidate.condition else {
            continue;
        };
        let cost = candidate.cost_f64();
        let ci = if funded {
            condition.target_ci
        } else {
            condition.current_ci
        };
        ci_weighted_sum += ci * cost;
        ci_weight += cost;

        if let Some(value) = condition.replacement_value.filter(|v| *v > 0.0) {
            replacement_value += value;
            if !funded {
                deferred += cost;
            }
        }
    }

    metrics.total_cost = round_cents(total_cost);
    if ci_weight > 0.0 {
        metrics.weighted_ci = ci_weighted_sum / ci_weight;
    }
    if replacement_value > 0.0 {
        metrics.weighted_fci = deferred / replacement_value;
    }
    metrics
}

/// Metrics with nothing funded next to metrics for `selection`.
pub fn compare(candidates: &[Candidate], selection: &BTreeSet<String>) -> MetricsComparison {
    let before = aggregate(candidates, &BTreeSet::new());
    let after = aggregate(candidates, selection);
    MetricsComparison {
        ci_change: after.weighted_ci - before.weighted_ci,
        fci_change: after.weighted_fci - before.weighted_fci,
        before,
        after,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::candidate::ConditionProfile;

    fn condition(current_ci: f64, target_ci: f64, replacement_value: Option<f64>) -> ConditionProfile {
        ConditionProfile {
            current_ci,
            target_ci,
            replacement_value,
        }
    }

    fn portfolio() -> Vec<Candidate> {
        vec![
            Candidate::new("roof", dec!(300), 20.0)
                .with_condition(condition(40.0, 90.0, Some(1000.0))),
            Candidate::new("hvac", dec!(100), 10.0)
                .with_condition(condition(60.0, 80.0, Some(1000.0))),
            Candidate::new("paint", dec!(50), 1.0),
        ]
    }

    fn selection(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn weights_condition_by_cost() {
        let metrics = aggregate(&portfolio(), &selection(&["roof", "paint"]));
        // (90 * 300 + 60 * 100) / 400
        assert!((metrics.weighted_ci - 82.5).abs() < 1e-9);
        assert!((metrics.weighted_fci - 0.05).abs() < 1e-9);
        assert_eq!(metrics.total_cost, dec!(350));
        assert_eq!(metrics.total_benefit, 21.0);
        assert_eq!(metrics.funded_count, 2);
        assert_eq!(metrics.candidate_count, 3);
    }

    #[test]
    fn empty_input_is_zeroed() {
        let metrics = aggregate(&[], &BTreeSet::new());
        assert_eq!(metrics, PortfolioMetrics::default());
    }

    #[test]
    fn comparison_shows_improvement() {
        let comparison = compare(&portfolio(), &selection(&["roof", "hvac"]));
        assert!((comparison.before.weighted_ci - 45.0).abs() < 1e-9);
        assert!((comparison.before.weighted_fci - 0.2).abs() < 1e-9);
        assert_eq!(comparison.after.weighted_fci, 0.0);
        assert!(comparison.ci_change > 0.0);
        assert!(comparison.fci_change < 0.0);
    }
}
