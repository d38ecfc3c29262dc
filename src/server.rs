use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::candidate::{normalize_bounded, Candidate, RawCandidate};
use crate::config::Config;
use crate::constraints::ConstraintOptions;
use crate::error::ValidationError;
use crate::optimizer::pareto::{budget_sweep, exhaustive_frontier};
use crate::optimizer::sensitivity::{inflection_points, InflectionPoint, SensitivityPoint};
use crate::optimizer::{AllocationResult, Objective, Optimizer, ParetoPoint};
use crate::portfolio::{compare, MetricsComparison};
use crate::ranking::{rank_by, RankedCandidate};
use crate::snapshot::{ScenarioRecord, ScenarioStore};

#[derive(Clone)]
struct ApiState {
    config: Config,
    optimizer: Optimizer,
    db_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<ValidationError>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<ValidationError>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
            details: None,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: error.to_string(),
            details: Some(error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Default, Deserialize)]
struct CandidateContext {
    #[serde(default)]
    candidates: Vec<RawCandidate>,
    objective: Option<Objective>,
    max_per_period: Option<u32>,
}

#[derive(Debug, Clone)]
struct EffectiveContext {
    candidates: Vec<Candidate>,
    options: ConstraintOptions,
    objective: Objective,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RankRequest {
    #[serde(flatten)]
    context: CandidateContext,
}

#[derive(Debug, Clone, Deserialize)]
struct OptimizeRequest {
    #[serde(flatten)]
    context: CandidateContext,
    budget: Decimal,
    /// Scenario name; the run is saved when present.
    save: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SensitivityRequest {
    #[serde(flatten)]
    context: CandidateContext,
    budget: Decimal,
    levels: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ParetoRequest {
    #[serde(flatten)]
    context: CandidateContext,
    budgets: Option<Vec<Decimal>>,
    max_budget: Option<Decimal>,
    steps: Option<usize>,
    #[serde(default)]
    exhaustive: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct MetricsRequest {
    #[serde(flatten)]
    context: CandidateContext,
    budget: Decimal,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct HistoryRequest {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct RankResponse {
    ranking: Vec<RankedCandidate>,
}

#[derive(Debug, Serialize)]
struct OptimizeResponse {
    result: AllocationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SensitivityResponse {
    points: Vec<SensitivityPoint>,
    inflections: Vec<InflectionPoint>,
}

#[derive(Debug, Serialize)]
struct ParetoResponse {
    frontier: Vec<ParetoPoint>,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    result: AllocationResult,
    metrics: MetricsComparison,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    records: Vec<ScenarioRecord>,
}

pub fn router(config: Config) -> Router {
    let state = ApiState {
        db_path: config.resolved_db_path(),
        optimizer: config.build_optimizer(),
        config,
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/config", get(show_config))
        .route("/v1/rank", post(rank))
        .route("/v1/optimize", post(optimize))
        .route("/v1/sensitivity", post(sensitivity))
        .route("/v1/pareto", post(pareto))
        .route("/v1/metrics", post(metrics))
        .route("/v1/history", post(history))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let app = router(config);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn rank(
    State(state): State<ApiState>,
    Json(request): Json<RankRequest>,
) -> ApiResult<RankResponse> {
    let effective = resolve_effective_context(&state, &request.context)?;
    let ranking = rank_by(&effective.candidates, effective.objective);
    Ok(ok(RankResponse { ranking }))
}

async fn optimize(
    State(state): State<ApiState>,
    Json(request): Json<OptimizeRequest>,
) -> ApiResult<OptimizeResponse> {
    let effective = resolve_effective_context(&state, &request.context)?;
    let optimizer = state.optimizer.clone();
    let budget = request.budget;
    let planned = effective.clone();
    let result = run_blocking(move || {
        optimizer.plan(
            &planned.candidates,
            budget,
            &planned.options,
            planned.objective,
        )
    })
    .await??;

    let scenario_id = match request.save {
        Some(name) if !name.trim().is_empty() => {
            let record = ScenarioRecord::from_result(name.trim(), &effective.candidates, &result);
            let store = open_store(&state)?;
            Some(store.insert_scenario(&record).map_err(ApiError::internal)?)
        }
        Some(_) => return Err(ApiError::bad_request("scenario name cannot be empty")),
        None => None,
    };

    Ok(ok(OptimizeResponse {
        result,
        scenario_id,
    }))
}

async fn sensitivity(
    State(state): State<ApiState>,
    Json(request): Json<SensitivityRequest>,
) -> ApiResult<SensitivityResponse> {
    let effective = resolve_effective_context(&state, &request.context)?;
    let levels = request
        .levels
        .unwrap_or_else(|| state.config.sensitivity.levels.clone());
    let optimizer = state.optimizer.clone();
    let budget = request.budget;
    let points = run_blocking(move || {
        optimizer.analyze_sensitivity(
            &effective.candidates,
            budget,
            &levels,
            &effective.options,
            effective.objective,
        )
    })
    .await??;
    let inflections = inflection_points(&points);
    Ok(ok(SensitivityResponse {
        points,
        inflections,
    }))
}

async fn pareto(
    State(state): State<ApiState>,
    Json(request): Json<ParetoRequest>,
) -> ApiResult<ParetoResponse> {
    let effective = resolve_effective_context(&state, &request.context)?;

    if request.exhaustive {
        let max_budget = request
            .max_budget
            .or_else(|| request.budgets.as_ref().and_then(|b| b.iter().max().copied()))
            .ok_or_else(|| ApiError::bad_request("exhaustive frontier needs max_budget"))?;
        let cap = state.config.optimizer.enumeration_cap;
        let frontier = run_blocking(move || {
            exhaustive_frontier(&effective.candidates, &effective.options, max_budget, cap)
        })
        .await??;
        return Ok(ok(ParetoResponse { frontier }));
    }

    let budgets = match (request.budgets, request.max_budget) {
        (Some(budgets), _) => budgets,
        (None, Some(max_budget)) => {
            budget_sweep(max_budget, state.config.pareto.sweep_steps(request.steps))
        }
        (None, None) => {
            return Err(ApiError::bad_request(
                "either budgets or max_budget is required",
            ))
        }
    };
    if budgets.is_empty() {
        return Err(ApiError::bad_request("budget sweep is empty"));
    }
    if budgets.len() > state.config.pareto.max_steps {
        return Err(ApiError::bad_request(format!(
            "budget sweep has {} budgets, limit is {}",
            budgets.len(),
            state.config.pareto.max_steps
        )));
    }
    if let Some(negative) = budgets.iter().find(|b| b.is_sign_negative() && !b.is_zero()) {
        return Err(ValidationError::InvalidBudget {
            value: negative.to_string(),
        }
        .into());
    }

    let optimizer = state.optimizer.clone();
    let frontier = run_blocking(move || {
        optimizer.pareto_frontier(
            &effective.candidates,
            &budgets,
            &effective.options,
            effective.objective,
        )
    })
    .await??;
    Ok(ok(ParetoResponse { frontier }))
}

async fn metrics(
    State(state): State<ApiState>,
    Json(request): Json<MetricsRequest>,
) -> ApiResult<MetricsResponse> {
    let effective = resolve_effective_context(&state, &request.context)?;
    let optimizer = state.optimizer.clone();
    let budget = request.budget;
    let (result, metrics) = run_blocking(move || {
        let result = optimizer.plan(
            &effective.candidates,
            budget,
            &effective.options,
            effective.objective,
        )?;
        let metrics = compare(&effective.candidates, &result.selected_ids);
        Ok::<_, ValidationError>((result, metrics))
    })
    .await??;
    Ok(ok(MetricsResponse { result, metrics }))
}

async fn history(
    State(state): State<ApiState>,
    Json(request): Json<HistoryRequest>,
) -> ApiResult<HistoryResponse> {
    let limit = request.limit.unwrap_or(20).max(1);
    let store = open_store(&state)?;
    let records = store.load_history(limit).map_err(ApiError::internal)?;
    Ok(ok(HistoryResponse { records }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn open_store(state: &ApiState) -> std::result::Result<ScenarioStore, ApiError> {
    ScenarioStore::open(&state.db_path).map_err(ApiError::internal)
}

/// Solver work is CPU-bound; keep it off the async workers.
async fn run_blocking<T, F>(work: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        warn!("optimization task failed: {error}");
        ApiError::internal(error)
    })
}

fn resolve_effective_context(
    state: &ApiState,
    context: &CandidateContext,
) -> std::result::Result<EffectiveContext, ApiError> {
    if context.candidates.is_empty() {
        return Err(ApiError::bad_request("candidate list cannot be empty"));
    }
    let candidates = normalize_bounded(&context.candidates, state.config.optimizer.max_candidates)?;
    let options = ConstraintOptions {
        max_per_period: context
            .max_per_period
            .or(state.config.optimizer.max_per_period),
    };
    Ok(EffectiveContext {
        candidates,
        options,
        objective: context.objective.unwrap_or(state.config.optimizer.objective),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state() -> ApiState {
        let config = Config::default();
        ApiState {
            optimizer: config.build_optimizer(),
            db_path: std::env::temp_dir().join(format!(
                "capital-allocator-test-{}.db",
                std::process::id()
            )),
            config,
        }
    }

    fn scenario_candidates() -> serde_json::Value {
        json!([
            {"id": "A", "cost": 100, "expected_benefit": 50},
            {"id": "B", "cost": 200, "expected_benefit": 90},
            {"id": "C", "cost": 50, "expected_benefit": 40, "mandatory": true}
        ])
    }

    fn request<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Json<T> {
        Json(serde_json::from_value(body).expect("valid request body"))
    }

    #[test]
    fn optimize_returns_the_best_allocation() {
        let response = tokio_test::block_on(optimize(
            State(state()),
            request(json!({"candidates": scenario_candidates(), "budget": "250"})),
        ))
        .expect("optimization succeeds");
        let result = &response.0.data.result;
        assert!(result.feasible);
        assert_eq!(
            result.selected_ids.iter().cloned().collect::<Vec<_>>(),
            vec!["B".to_string(), "C".to_string()]
        );
        assert!(response.0.data.scenario_id.is_none());
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = tokio_test::block_on(rank(
            State(state()),
            request(json!({"candidates": [{"id": "x", "cost": 0, "expected_benefit": 1}]})),
        ))
        .expect_err("invalid candidate");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(matches!(
            err.details,
            Some(ValidationError::InvalidCandidates { .. })
        ));
    }

    #[test]
    fn candidate_ceiling_is_enforced() {
        let mut state = state();
        state.config.optimizer.max_candidates = 2;
        let err = tokio_test::block_on(rank(
            State(state),
            request(json!({"candidates": scenario_candidates()})),
        ))
        .expect_err("too many candidates");
        assert!(matches!(
            err.details,
            Some(ValidationError::TooManyCandidates { count: 3, max: 2 })
        ));
    }

    #[test]
    fn pareto_requires_a_budget_source() {
        let err = tokio_test::block_on(pareto(
            State(state()),
            request(json!({"candidates": scenario_candidates()})),
        ))
        .expect_err("no budgets");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pareto_sweep_size_is_capped() {
        let mut state = state();
        state.config.pareto.max_steps = 3;
        let response = tokio_test::block_on(pareto(
            State(state.clone()),
            request(json!({
                "candidates": scenario_candidates(),
                "max_budget": "350",
                "steps": 10_000_000
            })),
        ))
        .expect("clamped sweep succeeds");
        assert!(!response.0.data.frontier.is_empty());
        assert!(response.0.data.frontier.len() <= 3);

        let err = tokio_test::block_on(pareto(
            State(state),
            request(json!({
                "candidates": scenario_candidates(),
                "budgets": ["100", "150", "200", "250"]
            })),
        ))
        .expect_err("too many budgets");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rank_uses_requested_objective() {
        let response = tokio_test::block_on(rank(
            State(state()),
            request(json!({
                "candidates": [
                    {"id": "a", "cost": 100, "expected_benefit": 50, "priority_score": 1},
                    {"id": "b", "cost": 100, "expected_benefit": 10, "priority_score": 9}
                ],
                "objective": "priority"
            })),
        ))
        .expect("ranking succeeds");
        assert_eq!(response.0.data.ranking[0].id, "b");
    }
}
