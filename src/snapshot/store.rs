use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::optimizer::{Method, Objective};
use crate::snapshot::migrations::BASE_MIGRATION;
use crate::snapshot::ScenarioRecord;

pub struct ScenarioStore {
    conn: Connection,
}

const SELECT_COLUMNS: &str = r#"
SELECT id, name, created_at, fingerprint, candidate_count, budget, objective,
       method, feasible, total_cost, total_benefit, selected_json
FROM scenario_runs
"#;

impl ScenarioStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed creating data directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed opening scenario store: {}", path.display()))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    pub fn insert_scenario(&self, record: &ScenarioRecord) -> Result<i64> {
        self.conn.execute(
            r#"
INSERT INTO scenario_runs(
    name, created_at, fingerprint, candidate_count, budget, objective,
    method, feasible, total_cost, total_benefit, selected_json
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#,
            params![
                record.name,
                record.created_at.to_rfc3339(),
                record.fingerprint,
                record.candidate_count as i64,
                record.budget.to_string(),
                record.objective.to_string(),
                record.method.to_string(),
                if record.feasible { 1 } else { 0 },
                record.total_cost.to_string(),
                record.total_benefit,
                serde_json::to_string(&record.selected_ids)?
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent runs first.
    pub fn load_history(&self, limit: usize) -> Result<Vec<ScenarioRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_scenario)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn latest_for_fingerprint(&self, fingerprint: &str) -> Result<Option<ScenarioRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE fingerprint = ?1 ORDER BY id DESC LIMIT 1");
        let mut stmt = self.conn.prepare(&sql)?;
        let result = stmt.query_row(params![fingerprint], row_to_scenario);
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn row_to_scenario(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScenarioRecord> {
    let created_at_raw: String = row.get(2)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let budget_raw: String = row.get(5)?;
    let objective_raw: String = row.get(6)?;
    let method_raw: String = row.get(7)?;
    let total_cost_raw: String = row.get(9)?;
    let selected_raw: String = row.get(11)?;

    Ok(ScenarioRecord {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        created_at,
        fingerprint: row.get(3)?,
        candidate_count: row.get::<_, i64>(4)? as usize,
        budget: Decimal::from_str(&budget_raw).unwrap_or_default(),
        objective: objective_raw.parse::<Objective>().unwrap_or_default(),
        method: if method_raw == Method::GreedyFallback.to_string() {
            Method::GreedyFallback
        } else {
            Method::Lp
        },
        feasible: row.get::<_, i64>(8)? != 0,
        total_cost: Decimal::from_str(&total_cost_raw).unwrap_or_default(),
        total_benefit: row.get(10)?,
        selected_ids: serde_json::from_str(&selected_raw).unwrap_or_default(),
    })
}
