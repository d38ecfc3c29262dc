pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS scenario_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    candidate_count INTEGER NOT NULL,
    budget TEXT NOT NULL,
    objective TEXT NOT NULL,
    method TEXT NOT NULL,
    feasible INTEGER NOT NULL,
    total_cost TEXT NOT NULL,
    total_benefit REAL NOT NULL,
    selected_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scenario_runs_created
    ON scenario_runs(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_scenario_runs_fingerprint
    ON scenario_runs(fingerprint, id DESC);
"#;
