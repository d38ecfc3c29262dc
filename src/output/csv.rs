use anyhow::Result;

use crate::optimizer::sensitivity::SensitivityPoint;
use crate::optimizer::{AllocationResult, ParetoPoint};
use crate::ranking::RankedCandidate;
use crate::snapshot::ScenarioRecord;

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

fn join_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    ids.into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";")
}

pub fn ranking_to_csv(ranked: &[RankedCandidate]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["rank", "id", "cost", "expected_benefit", "weight", "ratio", "mandatory"])?;
    for r in ranked {
        writer.write_record([
            r.rank.to_string(),
            r.id.clone(),
            r.cost.to_string(),
            r.expected_benefit.to_string(),
            r.weight.to_string(),
            format!("{:.8}", r.ratio),
            r.mandatory.to_string(),
        ])?;
    }
    finish(writer)
}

/// One row per candidate id with its funding decision.
pub fn allocation_to_csv(result: &AllocationResult, candidate_ids: &[String]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["id", "selected", "mandatory", "method", "feasible"])?;
    for id in candidate_ids {
        writer.write_record([
            id.clone(),
            result.is_selected(id).to_string(),
            result.mandatory_ids.contains(id).to_string(),
            result.method.to_string(),
            result.feasible.to_string(),
        ])?;
    }
    finish(writer)
}

pub fn sensitivity_to_csv(points: &[SensitivityPoint]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "budget_level",
        "budget",
        "total_cost",
        "total_benefit",
        "feasible",
        "method",
        "selected_ids",
    ])?;
    for point in points {
        writer.write_record([
            point.budget_level.to_string(),
            point.budget.to_string(),
            point.result.total_cost.to_string(),
            format!("{:.4}", point.result.total_benefit),
            point.result.feasible.to_string(),
            point.result.method.to_string(),
            join_ids(&point.result.selected_ids),
        ])?;
    }
    finish(writer)
}

pub fn pareto_to_csv(points: &[ParetoPoint]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["total_cost", "total_benefit", "budget", "selected_ids"])?;
    for point in points {
        writer.write_record([
            point.total_cost.to_string(),
            format!("{:.4}", point.total_benefit),
            point.budget.map(|b| b.to_string()).unwrap_or_default(),
            join_ids(&point.selected_ids),
        ])?;
    }
    finish(writer)
}

pub fn history_to_csv(records: &[ScenarioRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "id",
        "name",
        "created_at",
        "fingerprint",
        "budget",
        "objective",
        "method",
        "feasible",
        "total_cost",
        "total_benefit",
        "selected_ids",
    ])?;
    for record in records {
        writer.write_record([
            record.id.map(|id| id.to_string()).unwrap_or_default(),
            record.name.clone(),
            record.created_at.to_rfc3339(),
            record.fingerprint.clone(),
            record.budget.to_string(),
            record.objective.to_string(),
            record.method.to_string(),
            record.feasible.to_string(),
            record.total_cost.to_string(),
            format!("{:.4}", record.total_benefit),
            join_ids(&record.selected_ids),
        ])?;
    }
    finish(writer)
}
