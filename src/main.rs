use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use capital_allocator::candidate::load::load_raw_candidates;
use capital_allocator::candidate::money::parse_amount;
use capital_allocator::candidate::{normalize_bounded, Candidate};
use capital_allocator::config::{Config, ConfigOverrides};
use capital_allocator::optimizer::pareto::{budget_sweep, exhaustive_frontier};
use capital_allocator::optimizer::sensitivity::SensitivityPoint;
use capital_allocator::optimizer::{AllocationResult, Objective, ParetoPoint, SolverChoice};
use capital_allocator::output::csv::{
    allocation_to_csv, history_to_csv, pareto_to_csv, ranking_to_csv, sensitivity_to_csv,
};
use capital_allocator::output::json::render_json;
use capital_allocator::output::table::{
    render_allocation_table, render_history_table, render_metrics_table, render_pareto_table,
    render_ranking_table, render_sensitivity_table,
};
use capital_allocator::portfolio::{compare, MetricsComparison};
use capital_allocator::ranking::{rank_by, RankedCandidate};
use capital_allocator::server::run_server;
use capital_allocator::snapshot::{ScenarioRecord, ScenarioStore};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SolverArg {
    Milp,
    Greedy,
}

impl From<SolverArg> for SolverChoice {
    fn from(value: SolverArg) -> Self {
        match value {
            SolverArg::Milp => SolverChoice::Milp,
            SolverArg::Greedy => SolverChoice::Greedy,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "capital-allocator",
    about = "Capital planning portfolio optimizer"
)]
struct Cli {
    /// Candidate records (JSON array/object or CSV).
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(long)]
    objective: Option<Objective>,
    #[arg(long = "max-per-period")]
    max_per_period: Option<u32>,
    #[arg(long, value_enum)]
    solver: Option<SolverArg>,
    #[arg(long)]
    db: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Rank,
    Optimize {
        #[arg(long, value_parser = parse_budget)]
        budget: Decimal,
        /// Save the run to the scenario history under this name.
        #[arg(long)]
        save: Option<String>,
    },
    Sensitivity {
        #[arg(long, value_parser = parse_budget)]
        budget: Decimal,
        #[arg(long, value_delimiter = ',')]
        levels: Vec<f64>,
    },
    Pareto {
        #[arg(long, value_delimiter = ',', value_parser = parse_budget)]
        budgets: Vec<Decimal>,
        #[arg(long = "max-budget", value_parser = parse_budget)]
        max_budget: Option<Decimal>,
        #[arg(long)]
        steps: Option<usize>,
        #[arg(long)]
        exhaustive: bool,
    },
    Metrics {
        #[arg(long, value_parser = parse_budget)]
        budget: Decimal,
    },
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        objective: cli.objective,
        max_per_period: cli.max_per_period,
        solver: cli.solver.map(SolverChoice::from),
        db_path: cli.db.clone(),
    });

    match &cli.command {
        Commands::Config { init, show } => {
            return handle_config_command(*init, *show, &config, &config_path);
        }
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            return run_server(config, addr).await;
        }
        Commands::History { limit } => {
            let store = ScenarioStore::open(&config.resolved_db_path())?;
            let records = store.load_history((*limit).max(1))?;
            return print_history(&records, cli.output);
        }
        _ => {}
    }

    let input = cli
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("--input <file> is required for this command"))?;
    let candidates = load_candidates(input, config.optimizer.max_candidates)?;
    let optimizer = config.build_optimizer();
    let options = config.constraint_options();
    let objective = config.optimizer.objective;
    info!(
        candidates = candidates.len(),
        solver = optimizer.solver_name(),
        %objective,
        "loaded candidate set"
    );

    match &cli.command {
        Commands::Rank => {
            let ranked = rank_by(&candidates, objective);
            print_ranking(&ranked, cli.output)?;
        }
        Commands::Optimize { budget, save } => {
            let result = optimizer.plan(&candidates, *budget, &options, objective)?;
            if let Some(name) = save {
                let store = ScenarioStore::open(&config.resolved_db_path())?;
                let record = ScenarioRecord::from_result(name.as_str(), &candidates, &result);
                let id = store.insert_scenario(&record)?;
                info!(scenario_id = id, name = %name, "saved scenario");
            }
            print_allocation(&result, &candidates, cli.output)?;
        }
        Commands::Sensitivity { budget, levels } => {
            let levels = if levels.is_empty() {
                config.sensitivity.levels.clone()
            } else {
                levels.clone()
            };
            let points =
                optimizer.analyze_sensitivity(&candidates, *budget, &levels, &options, objective)?;
            print_sensitivity(&points, cli.output)?;
        }
        Commands::Pareto {
            budgets,
            max_budget,
            steps,
            exhaustive,
        } => {
            let frontier = if *exhaustive {
                let max_budget = max_budget
                    .or_else(|| budgets.iter().max().copied())
                    .context("--exhaustive needs --max-budget or --budgets")?;
                exhaustive_frontier(
                    &candidates,
                    &options,
                    max_budget,
                    config.optimizer.enumeration_cap,
                )?
            } else {
                let sweep = if !budgets.is_empty() {
                    budgets.clone()
                } else if let Some(max_budget) = max_budget {
                    budget_sweep(*max_budget, config.pareto.sweep_steps(*steps))
                } else {
                    bail!("pareto needs --budgets or --max-budget");
                };
                optimizer.pareto_frontier(&candidates, &sweep, &options, objective)?
            };
            print_pareto(&frontier, cli.output)?;
        }
        Commands::Metrics { budget } => {
            let result = optimizer.plan(&candidates, *budget, &options, objective)?;
            let comparison = compare(&candidates, &result.selected_ids);
            print_metrics(&result, &comparison, cli.output)?;
        }
        Commands::History { .. } | Commands::Serve { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}

fn parse_budget(raw: &str) -> std::result::Result<Decimal, String> {
    let budget = parse_amount(&Value::String(raw.to_string()))?;
    if budget.is_sign_negative() && !budget.is_zero() {
        return Err(format!("budget must not be negative: {raw}"));
    }
    Ok(budget)
}

fn load_candidates(path: &Path, max_candidates: usize) -> Result<Vec<Candidate>> {
    let raw = load_raw_candidates(path)?;
    let candidates = normalize_bounded(&raw, max_candidates)
        .with_context(|| format!("invalid candidates in {}", path.display()))?;
    Ok(candidates)
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn print_ranking(ranked: &[RankedCandidate], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_ranking_table(ranked)),
        OutputFormat::Json => println!("{}", render_json(ranked)?),
        OutputFormat::Csv => print!("{}", ranking_to_csv(ranked)?),
    }
    Ok(())
}

fn print_allocation(
    result: &AllocationResult,
    candidates: &[Candidate],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_allocation_table(result)),
        OutputFormat::Json => println!("{}", render_json(result)?),
        OutputFormat::Csv => {
            let mut ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
            ids.sort();
            print!("{}", allocation_to_csv(result, &ids)?);
        }
    }
    Ok(())
}

fn print_sensitivity(points: &[SensitivityPoint], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_sensitivity_table(points)),
        OutputFormat::Json => println!("{}", render_json(points)?),
        OutputFormat::Csv => print!("{}", sensitivity_to_csv(points)?),
    }
    Ok(())
}

fn print_pareto(points: &[ParetoPoint], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_pareto_table(points)),
        OutputFormat::Json => println!("{}", render_json(points)?),
        OutputFormat::Csv => print!("{}", pareto_to_csv(points)?),
    }
    Ok(())
}

fn print_metrics(
    result: &AllocationResult,
    comparison: &MetricsComparison,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_allocation_table(result));
            println!("{}", render_metrics_table(comparison));
        }
        OutputFormat::Json => println!("{}", render_json(comparison)?),
        OutputFormat::Csv => {
            warn!("CSV output for metrics not implemented, using JSON");
            println!("{}", render_json(comparison)?);
        }
    }
    Ok(())
}

fn print_history(records: &[ScenarioRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_history_table(records)),
        OutputFormat::Json => println!("{}", render_json(records)?),
        OutputFormat::Csv => print!("{}", history_to_csv(records)?),
    }
    Ok(())
}
