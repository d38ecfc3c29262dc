use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintOptions;
use crate::optimizer::sensitivity::DEFAULT_LEVELS;
use crate::optimizer::{Objective, Optimizer, SolverChoice};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub sensitivity: SensitivityConfig,
    #[serde(default)]
    pub pareto: ParetoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub max_per_period: Option<u32>,
    #[serde(default)]
    pub solver: SolverChoice,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_enumeration_cap")]
    pub enumeration_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityConfig {
    #[serde(default = "default_levels")]
    pub levels: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoConfig {
    #[serde(default = "default_steps")]
    pub steps: usize,
    /// Upper bound on budgets solved in one frontier sweep.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl ParetoConfig {
    /// Requested sweep size, or the configured default, clamped to `max_steps`.
    pub fn sweep_steps(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.steps).min(self.max_steps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub objective: Option<Objective>,
    pub max_per_period: Option<u32>,
    pub solver: Option<SolverChoice>,
    pub db_path: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/capital-allocator/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::from_toml(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(objective) = overrides.objective {
            self.optimizer.objective = objective;
        }
        if let Some(cap) = overrides.max_per_period {
            self.optimizer.max_per_period = Some(cap);
        }
        if let Some(solver) = overrides.solver {
            self.optimizer.solver = solver;
        }
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
    }

    pub fn constraint_options(&self) -> ConstraintOptions {
        ConstraintOptions {
            max_per_period: self.optimizer.max_per_period,
        }
    }

    pub fn build_optimizer(&self) -> Optimizer {
        Optimizer::from_choice(self.optimizer.solver)
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn default_template() -> String {
        let template = r#"[optimizer]
# benefit | priority
objective = "benefit"
# max_per_period = 3
# milp | greedy
solver = "milp"
max_candidates = 500
enumeration_cap = 16

[sensitivity]
levels = [0.8, 0.9, 1.0, 1.1, 1.2]

[pareto]
steps = 10
max_steps = 100

[storage]
db_path = "~/.local/share/capital-allocator/scenarios.db"

[server]
host = "127.0.0.1"
port = 8080
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            objective: Objective::default(),
            max_per_period: None,
            solver: SolverChoice::default(),
            max_candidates: default_max_candidates(),
            enumeration_cap: default_enumeration_cap(),
        }
    }
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            levels: default_levels(),
        }
    }
}

impl Default for ParetoConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            max_steps: default_max_steps(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_max_candidates() -> usize {
    500
}

fn default_enumeration_cap() -> usize {
    16
}

fn default_levels() -> Vec<f64> {
    DEFAULT_LEVELS.to_vec()
}

fn default_steps() -> usize {
    10
}

fn default_max_steps() -> usize {
    100
}

fn default_db_path() -> String {
    "~/.local/share/capital-allocator/scenarios.db".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}
