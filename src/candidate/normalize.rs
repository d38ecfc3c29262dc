use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde_json::Value;

use crate::candidate::graph::DependencyGraph;
use crate::candidate::money::{parse_amount, parse_optional_scalar, parse_scalar};
use crate::candidate::{Candidate, ConditionProfile, RawCandidate};
use crate::error::{CandidateIssue, IssueKind, ValidationError};

/// Validates a whole batch of raw records. Every problem found is reported
/// together; nothing is silently dropped.
pub fn normalize(raw_items: &[RawCandidate]) -> Result<Vec<Candidate>, ValidationError> {
    let mut issues = Vec::new();
    let mut candidates = Vec::with_capacity(raw_items.len());
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    // Cycle detection covers every record with an id and readable
    // dependencies, including records rejected for other fields.
    let mut edges: Vec<(String, BTreeSet<String>)> = Vec::with_capacity(raw_items.len());

    for (index, raw) in raw_items.iter().enumerate() {
        let mut record_issues = Vec::new();
        let id = parse_id(&raw.id);
        let Some(id) = id else {
            issues.push(CandidateIssue {
                index,
                id: None,
                problem: IssueKind::MissingId,
            });
            continue;
        };
        if seen.contains_key(&id) {
            record_issues.push(IssueKind::DuplicateId);
        } else {
            seen.insert(id.clone(), index);
        }

        let cost = match parse_amount(&raw.cost) {
            Ok(cost) if cost <= Decimal::ZERO => {
                record_issues.push(IssueKind::NonPositiveCost {
                    value: cost.to_string(),
                });
                None
            }
            Ok(cost) => Some(cost),
            Err(detail) => {
                record_issues.push(malformed("cost", detail));
                None
            }
        };

        let expected_benefit = match parse_scalar(&raw.expected_benefit) {
            Ok(benefit) if benefit < 0.0 => {
                record_issues.push(IssueKind::NegativeBenefit {
                    value: benefit.to_string(),
                });
                None
            }
            Ok(benefit) => Some(benefit),
            Err(detail) => {
                record_issues.push(malformed("expected_benefit", detail));
                None
            }
        };

        let priority_score = parse_optional_scalar(&raw.priority_score)
            .map_err(|detail| record_issues.push(malformed("priority_score", detail)))
            .unwrap_or(None);

        let depends_on = match parse_id_list(&raw.depends_on) {
            Ok(deps) => {
                let mut graph_deps = deps.clone();
                if graph_deps.remove(&id) {
                    record_issues.push(IssueKind::SelfDependency);
                }
                edges.push((id.clone(), graph_deps));
                deps
            }
            Err(detail) => {
                record_issues.push(malformed("depends_on", detail));
                BTreeSet::new()
            }
        };

        let period = parse_period(&raw.period)
            .map_err(|detail| record_issues.push(malformed("period", detail)))
            .unwrap_or(None);

        let mandatory = parse_flag(&raw.mandatory)
            .map_err(|detail| record_issues.push(malformed("mandatory", detail)))
            .unwrap_or(false);

        let condition = parse_condition(raw)
            .map_err(|(field, detail)| record_issues.push(malformed(field, detail)))
            .unwrap_or(None);

        if !record_issues.is_empty() {
            issues.extend(record_issues.into_iter().map(|problem| CandidateIssue {
                index,
                id: Some(id.clone()),
                problem,
            }));
            continue;
        }

        if let (Some(cost), Some(expected_benefit)) = (cost, expected_benefit) {
            candidates.push(Candidate {
                id,
                cost,
                expected_benefit,
                priority_score,
                depends_on,
                period,
                mandatory,
                condition,
            });
        }
    }

    let cycles =
        DependencyGraph::from_edges(edges.iter().map(|(id, deps)| (id.as_str(), deps)))
            .find_cycles();
    if issues.is_empty() {
        if cycles.is_empty() {
            return Ok(candidates);
        }
        return Err(ValidationError::DependencyCycle { cycles });
    }

    for members in cycles {
        let Some(first) = members.first() else {
            continue;
        };
        let index = seen.get(first).copied().unwrap_or_default();
        issues.push(CandidateIssue {
            index,
            id: Some(first.clone()),
            problem: IssueKind::DependencyCycle { members },
        });
    }
    issues.sort_by_key(|issue| issue.index);
    Err(ValidationError::InvalidCandidates { issues })
}

fn malformed(field: &str, detail: String) -> IssueKind {
    IssueKind::Malformed {
        field: field.to_string(),
        detail,
    }
}

fn parse_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_id_list(value: &Value) -> Result<BTreeSet<String>, String> {
    match value {
        Value::Null => Ok(BTreeSet::new()),
        Value::String(s) => Ok(s
            .split([',', ';'])
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(ToString::to_string)
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| parse_id(item).ok_or_else(|| format!("contains a non-id entry ({item})")))
            .collect(),
        other => Err(format!("has unsupported type ({other})")),
    }
}

fn parse_period(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(format!("has unsupported type ({other})")),
    }
}

fn parse_flag(value: &Value) -> Result<bool, String> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("is not a flag ({n})")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "no" | "n" | "0" => Ok(false),
            "true" | "yes" | "y" | "1" => Ok(true),
            _ => Err(format!("is not a flag ({s:?})")),
        },
        other => Err(format!("has unsupported type ({other})")),
    }
}

fn parse_condition(raw: &RawCandidate) -> Result<Option<ConditionProfile>, (&'static str, String)> {
    let current = parse_optional_scalar(&raw.current_ci).map_err(|e| ("current_ci", e))?;
    let target = parse_optional_scalar(&raw.target_ci).map_err(|e| ("target_ci", e))?;
    let replacement_value =
        parse_optional_scalar(&raw.replacement_value).map_err(|e| ("replacement_value", e))?;
    if let Some(value) = replacement_value {
        if value <= 0.0 {
            return Err(("replacement_value", format!("must be positive (got {value})")));
        }
    }
    match (current, target) {
        (None, None) => Ok(None),
        (Some(current_ci), Some(target_ci)) => Ok(Some(ConditionProfile {
            current_ci,
            target_ci,
            replacement_value,
        })),
        (Some(_), None) => Err(("target_ci", "is required with current_ci".to_string())),
        (None, Some(_)) => Err(("current_ci", "is required with target_ci".to_string())),
    }
}

/// [`normalize`] behind a batch-size ceiling, checked before any parsing.
pub fn normalize_bounded(
    raw_items: &[RawCandidate],
    max_candidates: usize,
) -> Result<Vec<Candidate>, ValidationError> {
    if raw_items.len() > max_candidates {
        return Err(ValidationError::TooManyCandidates {
            count: raw_items.len(),
            max: max_candidates,
        });
    }
    normalize(raw_items)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn raw(value: serde_json::Value) -> RawCandidate {
        serde_json::from_value(value).expect("raw candidate")
    }

    #[test]
    fn normalizes_loose_records() {
        let items = vec![
            raw(json!({"id": "roof", "cost": "$12,000.50", "expectedBenefit": "35",
                       "dependsOn": "structure; drainage", "year": 2027, "mandatory": "yes",
                       "currentCi": 40, "targetCi": 90, "replacementValue": "100000"})),
            raw(json!({"id": "structure", "cost": 5000, "benefit": 10})),
            raw(json!({"id": 17, "cost": 1.005, "expected_benefit": 0})),
        ];
        let candidates = normalize(&items).expect("valid batch");
        assert_eq!(candidates.len(), 3);
        let roof = &candidates[0];
        assert_eq!(roof.cost, dec!(12000.50));
        assert_eq!(roof.period.as_deref(), Some("2027"));
        assert!(roof.mandatory);
        assert_eq!(
            roof.depends_on.iter().cloned().collect::<Vec<_>>(),
            vec!["drainage".to_string(), "structure".to_string()]
        );
        assert_eq!(roof.condition.and_then(|c| c.replacement_value), Some(100000.0));
        assert_eq!(candidates[2].id, "17");
        assert_eq!(candidates[2].cost, dec!(1.01));
    }

    #[test]
    fn reports_every_invalid_record_at_once() {
        let items = vec![
            raw(json!({"id": "a", "cost": 0, "expected_benefit": 5})),
            raw(json!({"id": "b", "cost": 100, "expected_benefit": -1})),
            raw(json!({"cost": 100, "expected_benefit": 1})),
            raw(json!({"id": "c", "cost": 100, "expected_benefit": 1})),
            raw(json!({"id": "c", "cost": "n/a", "expected_benefit": 1})),
        ];
        let Err(ValidationError::InvalidCandidates { issues }) = normalize(&items) else {
            panic!("expected batched invalid-candidate error");
        };
        let problems: Vec<(usize, &IssueKind)> =
            issues.iter().map(|i| (i.index, &i.problem)).collect();
        assert_eq!(issues.len(), 5);
        assert!(matches!(problems[0], (0, IssueKind::NonPositiveCost { .. })));
        assert!(matches!(problems[1], (1, IssueKind::NegativeBenefit { .. })));
        assert!(matches!(problems[2], (2, IssueKind::MissingId)));
        assert!(matches!(problems[3], (4, IssueKind::DuplicateId)));
        assert!(matches!(problems[4], (4, IssueKind::Malformed { .. })));
    }

    #[test]
    fn cycle_only_batches_raise_dependency_cycle() {
        let items = vec![
            raw(json!({"id": "a", "cost": 10, "expected_benefit": 1, "depends_on": ["b"]})),
            raw(json!({"id": "b", "cost": 10, "expected_benefit": 1, "depends_on": ["a"]})),
            raw(json!({"id": "c", "cost": 10, "expected_benefit": 1, "depends_on": ["zz"]})),
        ];
        assert_eq!(
            normalize(&items),
            Err(ValidationError::DependencyCycle {
                cycles: vec![vec!["a".to_string(), "b".to_string()]],
            })
        );
    }

    #[test]
    fn cycles_join_the_batch_when_records_are_also_invalid() {
        let items = vec![
            raw(json!({"id": "bad", "cost": -5, "expected_benefit": 1})),
            raw(json!({"id": "a", "cost": 10, "expected_benefit": 1, "depends_on": ["b"]})),
            raw(json!({"id": "b", "cost": 10, "expected_benefit": 1, "depends_on": ["a"]})),
        ];
        let Err(ValidationError::InvalidCandidates { issues }) = normalize(&items) else {
            panic!("expected batched error");
        };
        assert_eq!(issues.len(), 2);
        assert!(matches!(
            &issues[1].problem,
            IssueKind::DependencyCycle { members } if members == &vec!["a".to_string(), "b".to_string()]
        ));
    }

    #[test]
    fn cycles_through_invalid_records_are_still_reported() {
        let items = vec![
            raw(json!({"id": "a", "cost": 10, "expected_benefit": 1, "depends_on": ["b"]})),
            raw(json!({"id": "b", "cost": 0, "expected_benefit": 1, "depends_on": ["a"]})),
        ];
        let Err(ValidationError::InvalidCandidates { issues }) = normalize(&items) else {
            panic!("expected batched error");
        };
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].index, 0);
        assert!(matches!(
            &issues[0].problem,
            IssueKind::DependencyCycle { members } if members == &vec!["a".to_string(), "b".to_string()]
        ));
        assert_eq!(issues[1].id.as_deref(), Some("b"));
        assert!(matches!(issues[1].problem, IssueKind::NonPositiveCost { .. }));
    }

    #[test]
    fn large_rings_fail_validation_instead_of_crashing() {
        const RING: usize = 50_000;
        let items: Vec<RawCandidate> = (0..RING)
            .map(|i| {
                raw(json!({
                    "id": format!("n{i:05}"),
                    "cost": 10,
                    "expected_benefit": 1,
                    "depends_on": [format!("n{:05}", (i + 1) % RING)],
                }))
            })
            .collect();
        let Err(ValidationError::DependencyCycle { cycles }) = normalize(&items) else {
            panic!("expected dependency cycle");
        };
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), RING);
    }

    #[test]
    fn rejects_self_dependency_and_half_condition() {
        let items = vec![
            raw(json!({"id": "a", "cost": 10, "expected_benefit": 1, "depends_on": "a"})),
            raw(json!({"id": "b", "cost": 10, "expected_benefit": 1, "current_ci": 50})),
        ];
        let Err(ValidationError::InvalidCandidates { issues }) = normalize(&items) else {
            panic!("expected batched error");
        };
        assert_eq!(issues[0].problem, IssueKind::SelfDependency);
        assert!(matches!(&issues[1].problem, IssueKind::Malformed { field, .. } if field == "target_ci"));
    }

    #[test]
    fn rejects_batches_over_the_ceiling() {
        let raw = vec![RawCandidate::default(); 3];
        let err = normalize_bounded(&raw, 2).expect_err("too many");
        assert!(matches!(
            err,
            ValidationError::TooManyCandidates { count: 3, max: 2 }
        ));
    }
}
