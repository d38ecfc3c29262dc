use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::candidate::Candidate;
use crate::constraints::ConstraintSet;
use crate::optimizer::Objective;
use crate::ranking::ranked_order;

/// Deterministic approximate selection in ranking order.
///
/// Forced candidates are taken first. A candidate whose dependencies are not
/// funded yet is deferred; the ranked list is rescanned while the previous
/// pass accepted anything, so deferred candidates get another chance once
/// their dependencies land. Candidates that would overrun the remaining
/// budget or their period cap are skipped. The caller must check
/// [`ConstraintSet::forced_shortfall`] first.
pub fn greedy_select(
    candidates: &[Candidate],
    constraints: &ConstraintSet,
    objective: Objective,
) -> BTreeSet<String> {
    let mut selected = constraints.forced_ids.clone();
    let mut remaining = constraints.available_budget();
    let mut period_room: BTreeMap<&str, u32> = constraints
        .period_caps
        .iter()
        .map(|cap| (cap.period.as_str(), cap.remaining()))
        .collect();

    let order = ranked_order(
        candidates.iter().filter(|c| !constraints.is_forced(&c.id)),
        objective,
    );

    let mut pass = 0usize;
    loop {
        pass += 1;
        let mut accepted = 0usize;
        for candidate in &order {
            if selected.contains(&candidate.id) {
                continue;
            }
            if !candidate.depends_on.iter().all(|dep| selected.contains(dep)) {
                continue;
            }
            if candidate.cost > remaining {
                continue;
            }
            let room = candidate
                .period
                .as_deref()
                .and_then(|period| period_room.get_mut(period));
            if let Some(room) = room {
                if *room == 0 {
                    continue;
                }
                *room -= 1;
            }
            remaining -= candidate.cost;
            selected.insert(candidate.id.clone());
            accepted += 1;
        }
        if accepted == 0 {
            break;
        }
    }
    debug!(passes = pass, selected = selected.len(), "greedy selection finished");
    selected
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::constraints::{build, ConstraintOptions};

    fn ids(selected: &BTreeSet<String>) -> Vec<&str> {
        selected.iter().map(String::as_str).collect()
    }

    #[test]
    fn takes_most_efficient_items_that_fit() {
        let candidates = vec![
            Candidate::new("a", dec!(100), 50.0),
            Candidate::new("b", dec!(200), 90.0),
            Candidate::new("c", dec!(50), 40.0).mandatory(),
        ];
        let set = build(&candidates, dec!(250), &ConstraintOptions::default()).unwrap();
        let selected = greedy_select(&candidates, &set, Objective::Benefit);
        assert_eq!(ids(&selected), vec!["a", "c"]);
    }

    #[test]
    fn defers_until_dependency_is_funded() {
        let candidates = vec![
            Candidate::new("cheap-upgrade", dec!(10), 9.0).depends_on(["base"]),
            Candidate::new("base", dec!(100), 10.0),
        ];
        let set = build(&candidates, dec!(110), &ConstraintOptions::default()).unwrap();
        let selected = greedy_select(&candidates, &set, Objective::Benefit);
        assert_eq!(ids(&selected), vec!["base", "cheap-upgrade"]);
    }

    #[test]
    fn never_funds_dependent_without_its_dependency() {
        let candidates = vec![
            Candidate::new("a", dec!(50), 40.0).depends_on(["b"]),
            Candidate::new("b", dec!(500), 10.0),
        ];
        let set = build(&candidates, dec!(100), &ConstraintOptions::default()).unwrap();
        assert!(greedy_select(&candidates, &set, Objective::Benefit).is_empty());
    }

    #[test]
    fn honours_period_caps_including_forced_items() {
        let candidates = vec![
            Candidate::new("m", dec!(10), 1.0).mandatory().in_period("2026"),
            Candidate::new("x", dec!(10), 9.0).in_period("2026"),
            Candidate::new("y", dec!(10), 8.0).in_period("2026"),
            Candidate::new("z", dec!(10), 7.0).in_period("2027"),
        ];
        let options = ConstraintOptions {
            max_per_period: Some(2),
        };
        let set = build(&candidates, dec!(1000), &options).unwrap();
        let selected = greedy_select(&candidates, &set, Objective::Benefit);
        assert_eq!(ids(&selected), vec!["m", "x", "z"]);
        assert!(set.violations(&candidates, &selected).is_empty());
    }
}
