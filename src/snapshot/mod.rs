pub mod migrations;
pub mod store;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::candidate::{Candidate, RawCandidate};
use crate::optimizer::{AllocationResult, Method, Objective};

pub use store::ScenarioStore;

/// A saved optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the candidate set, so runs over the same input can be grouped.
    pub fingerprint: String,
    pub candidate_count: usize,
    pub budget: Decimal,
    pub objective: Objective,
    pub method: Method,
    pub feasible: bool,
    pub total_cost: Decimal,
    pub total_benefit: f64,
    pub selected_ids: Vec<String>,
}

impl ScenarioRecord {
    pub fn from_result(
        name: impl Into<String>,
        candidates: &[Candidate],
        result: &AllocationResult,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            created_at: Utc::now(),
            fingerprint: fingerprint(candidates),
            candidate_count: candidates.len(),
            budget: result.budget,
            objective: result.objective,
            method: result.method,
            feasible: result.feasible,
            total_cost: result.total_cost,
            total_benefit: result.total_benefit,
            selected_ids: result.selected_ids.iter().cloned().collect(),
        }
    }
}

/// Order-independent hash of a candidate set.
pub fn fingerprint(candidates: &[Candidate]) -> String {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));
    let canonical: Vec<RawCandidate> = ordered.into_iter().map(RawCandidate::from).collect();
    let encoded = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn fingerprint_ignores_input_order() {
        let a = Candidate::new("a", dec!(10), 1.0);
        let b = Candidate::new("b", dec!(20), 2.0).depends_on(["a"]);
        let forward = fingerprint(&[a.clone(), b.clone()]);
        let reverse = fingerprint(&[b.clone(), a.clone()]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 64);

        let changed = fingerprint(&[a, b.mandatory()]);
        assert_ne!(forward, changed);
    }
}
