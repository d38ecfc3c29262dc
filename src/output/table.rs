use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::optimizer::sensitivity::{inflection_points, SensitivityPoint};
use crate::optimizer::{AllocationResult, ParetoPoint};
use crate::portfolio::MetricsComparison;
use crate::ranking::RankedCandidate;
use crate::snapshot::ScenarioRecord;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn join_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    let joined = ids
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

fn feasible_cell(feasible: bool) -> Cell {
    if feasible {
        Cell::new("YES").fg(Color::Green)
    } else {
        Cell::new("NO").fg(Color::Red)
    }
}

pub fn render_ranking_table(ranked: &[RankedCandidate]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Rank",
        "Candidate",
        "Cost",
        "Benefit",
        "Benefit / $1k",
        "Mandatory",
    ]);
    for r in ranked {
        table.add_row(vec![
            r.rank.to_string(),
            r.id.clone(),
            format!("{:.2}", r.cost),
            format!("{:.2}", r.expected_benefit),
            format!("{:.4}", r.ratio * 1000.0),
            if r.mandatory { "yes" } else { "" }.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_allocation_table(result: &AllocationResult) -> String {
    let mut table = new_table();
    table.set_header(vec!["Budget", "Spent", "Benefit", "Feasible", "Method", "Selected"]);
    table.add_row(Row::from(vec![
        Cell::new(format!("{:.2}", result.budget)),
        Cell::new(format!("{:.2}", result.total_cost)),
        Cell::new(format!("{:.2}", result.total_benefit)),
        feasible_cell(result.feasible),
        Cell::new(result.method.to_string()),
        Cell::new(join_ids(&result.selected_ids)),
    ]));

    let mut out = table.to_string();
    if let Some(reason) = &result.infeasibility {
        out.push_str(&format!("\nInfeasible: {reason}"));
    }
    for warning in &result.warnings {
        out.push_str(&format!("\nWarning: {warning}"));
    }
    out
}

pub fn render_sensitivity_table(points: &[SensitivityPoint]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Level",
        "Budget",
        "Spent",
        "Benefit",
        "Feasible",
        "Selected",
    ]);
    for point in points {
        table.add_row(Row::from(vec![
            Cell::new(format!("{:.0}%", point.budget_level * 100.0)),
            Cell::new(format!("{:.2}", point.budget)),
            Cell::new(format!("{:.2}", point.result.total_cost)),
            Cell::new(format!("{:.2}", point.result.total_benefit)),
            feasible_cell(point.result.feasible),
            Cell::new(point.result.selected_ids.len().to_string()),
        ]));
    }

    let mut out = table.to_string();
    for inflection in inflection_points(points) {
        out.push_str(&format!(
            "\nAt {:.0}%: +[{}] -[{}] ({:+.2} benefit)",
            inflection.budget_level * 100.0,
            inflection.added.join(", "),
            inflection.removed.join(", "),
            inflection.benefit_delta
        ));
    }
    out
}

pub fn render_pareto_table(points: &[ParetoPoint]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Cost", "Benefit", "Budget", "Selected"]);
    for point in points {
        table.add_row(vec![
            format!("{:.2}", point.total_cost),
            format!("{:.2}", point.total_benefit),
            point
                .budget
                .map(|b| format!("{b:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            join_ids(&point.selected_ids),
        ]);
    }
    table.to_string()
}

pub fn render_metrics_table(comparison: &MetricsComparison) -> String {
    let mut table = new_table();
    table.set_header(vec!["Metric", "Before", "After", "Change"]);
    let before = &comparison.before;
    let after = &comparison.after;
    table.add_row(vec![
        "Weighted CI".to_string(),
        format!("{:.2}", before.weighted_ci),
        format!("{:.2}", after.weighted_ci),
        format!("{:+.2}", comparison.ci_change),
    ]);
    table.add_row(vec![
        "Weighted FCI".to_string(),
        format!("{:.4}", before.weighted_fci),
        format!("{:.4}", after.weighted_fci),
        format!("{:+.4}", comparison.fci_change),
    ]);
    table.add_row(vec![
        "Funded".to_string(),
        before.funded_count.to_string(),
        after.funded_count.to_string(),
        format!("of {}", after.candidate_count),
    ]);
    table.add_row(vec![
        "Cost".to_string(),
        format!("{:.2}", before.total_cost),
        format!("{:.2}", after.total_cost),
        String::new(),
    ]);
    table.to_string()
}

pub fn render_history_table(records: &[ScenarioRecord]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Id", "Name", "Saved", "Budget", "Spent", "Benefit", "Method", "Feasible",
    ]);
    for record in records {
        table.add_row(Row::from(vec![
            Cell::new(record.id.map(|id| id.to_string()).unwrap_or_default()),
            Cell::new(&record.name),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(format!("{:.2}", record.budget)),
            Cell::new(format!("{:.2}", record.total_cost)),
            Cell::new(format!("{:.2}", record.total_benefit)),
            Cell::new(record.method.to_string()),
            feasible_cell(record.feasible),
        ]));
    }
    table.to_string()
}
