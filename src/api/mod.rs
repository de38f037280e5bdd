//! REST surface over the orchestrator.

pub mod extract;
pub mod response;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::collect::CollectMode;
use crate::error::Error;
use crate::orchestrator::Orchestrator;
use crate::project::SwitchOutcome;
use extract::{ApiJson, ApiQuery};
use response::{ApiResult, success};

type AppState = Arc<Orchestrator>;

/// Build the router with every command route.
pub fn routes(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/jobs", get(list_jobs))
        .route("/plans", get(list_plans))
        .route("/plans/create", post(create_plan))
        .route("/files", get(list_files))
        .route("/plan", post(plan))
        .route("/flush-plan", post(flush_plan))
        .route("/dispatch", post(dispatch))
        .route("/flush-queue", post(flush_queue))
        .route("/play", post(play))
        .route("/pause", post(pause))
        .route("/reset", post(reset))
        .route("/collect", post(collect_clean))
        .route("/collect-with-stash", post(collect_stash))
        .route("/collect-force", post(collect_force))
        .route("/collections", get(list_collections))
        .route("/projects", get(list_projects))
        .route("/projects/create", post(create_project))
        .route("/projects/switch", post(switch_project))
        .route("/git/status", get(git_status))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

async fn root(State(orch): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "Work orchestration server",
        "version": env!("CARGO_PKG_VERSION"),
        "data_dir": orch.config().data_dir,
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "work-orchestrator"}))
}

async fn status(State(orch): State<AppState>) -> impl IntoResponse {
    Json(orch.status().await)
}

async fn list_jobs(State(orch): State<AppState>) -> impl IntoResponse {
    Json(orch.jobs().await)
}

// ── Plans ───────────────────────────────────────────────────────────────

async fn list_plans(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let plans = orch.plans().await?;
    Ok(Json(json!({"plans": plans})))
}

/// Accepted as a JSON body or as `?name=`.
#[derive(Deserialize)]
struct CreatePlanRequest {
    #[serde(default)]
    name: Option<String>,
}

async fn create_plan(
    State(orch): State<AppState>,
    ApiQuery(query): ApiQuery<CreatePlanRequest>,
    body: Option<ApiJson<CreatePlanRequest>>,
) -> ApiResult<impl IntoResponse> {
    let name = body
        .and_then(|ApiJson(body)| body.name)
        .or(query.name)
        .ok_or_else(|| Error::BadRequest("missing field `name`".to_string()))?;
    let stub = orch.create_plan(&name).await?;
    Ok(success(
        format!("Created plan '{}'", stub.id),
        json!({"plan_id": stub.id, "path": stub.path}),
    ))
}

async fn list_files(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(orch.files().await?))
}

#[derive(Deserialize)]
struct PlanRequest {
    plan_id: String,
    #[serde(default)]
    inputs: HashMap<String, String>,
}

async fn plan(
    State(orch): State<AppState>,
    ApiJson(body): ApiJson<PlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let summary = orch.plan(&body.plan_id, &body.inputs).await?;
    Ok(success(
        format!("Planned {} jobs from {}", summary.count, summary.plan_id),
        json!({"count": summary.count, "task_counter": summary.task_counter}),
    ))
}

// ── Ledger and dispatch ─────────────────────────────────────────────────

async fn flush_plan(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let removed = orch.flush_planned().await?;
    Ok(success(
        format!("Flushed {removed} planned jobs"),
        json!({"removed": removed}),
    ))
}

async fn dispatch(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let moved = orch.dispatch().await?;
    Ok(success(
        format!("Dispatched {moved} jobs to queue"),
        json!({"moved": moved}),
    ))
}

async fn flush_queue(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let removed = orch.flush_queued().await?;
    Ok(success(
        format!("Flushed {removed} queued jobs"),
        json!({"removed": removed}),
    ))
}

async fn play(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let work_state = orch.play().await?;
    Ok(success("Work started", json!({"work_state": work_state})))
}

async fn pause(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let work_state = orch.pause().await?;
    Ok(success("Work paused", json!({"work_state": work_state})))
}

async fn reset(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let removed = orch.reset().await?;
    Ok(success(
        format!("Reset {removed} completed jobs"),
        json!({"removed": removed}),
    ))
}

// ── Collection ──────────────────────────────────────────────────────────

/// Accepted as a JSON body or as `?label=`.
#[derive(Deserialize)]
struct CollectRequest {
    #[serde(default)]
    label: Option<String>,
}

async fn collect(
    orch: &Orchestrator,
    query: CollectRequest,
    body: Option<ApiJson<CollectRequest>>,
    mode: CollectMode,
) -> ApiResult<Json<Value>> {
    let label = body.and_then(|ApiJson(body)| body.label).or(query.label);
    let record = orch.collect(label.as_deref(), mode).await?;
    let message = match mode {
        CollectMode::Clean => format!("Collected {} results", record.count),
        CollectMode::Stash => format!(
            "Collected {} results with stash",
            record.count
        ),
        CollectMode::Force => format!("Force collected {} results", record.count),
    };
    Ok(success(
        message,
        json!({
            "filename": record.filename,
            "path": record.path,
            "count": record.count,
            "record": record,
        }),
    ))
}

async fn collect_clean(
    State(orch): State<AppState>,
    ApiQuery(query): ApiQuery<CollectRequest>,
    body: Option<ApiJson<CollectRequest>>,
) -> ApiResult<impl IntoResponse> {
    collect(&orch, query, body, CollectMode::Clean).await
}

async fn collect_stash(
    State(orch): State<AppState>,
    ApiQuery(query): ApiQuery<CollectRequest>,
    body: Option<ApiJson<CollectRequest>>,
) -> ApiResult<impl IntoResponse> {
    collect(&orch, query, body, CollectMode::Stash).await
}

async fn collect_force(
    State(orch): State<AppState>,
    ApiQuery(query): ApiQuery<CollectRequest>,
    body: Option<ApiJson<CollectRequest>>,
) -> ApiResult<impl IntoResponse> {
    collect(&orch, query, body, CollectMode::Force).await
}

async fn list_collections(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    let collections = orch.collections().await?;
    Ok(Json(json!({"collections": collections})))
}

// ── Projects ────────────────────────────────────────────────────────────

async fn list_projects(State(orch): State<AppState>) -> impl IntoResponse {
    Json(orch.projects().await)
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    description: String,
}

async fn create_project(
    State(orch): State<AppState>,
    ApiJson(body): ApiJson<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let project = orch.create_project(&body.name, &body.description).await?;
    Ok(success(
        format!("Created project '{}'", project.name),
        json!({"project": project}),
    ))
}

#[derive(Deserialize)]
struct SwitchProjectRequest {
    project: String,
}

async fn switch_project(
    State(orch): State<AppState>,
    ApiJson(body): ApiJson<SwitchProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = orch.switch_project(&body.project).await?;
    let message = match &outcome {
        SwitchOutcome::Switched { from, to } => format!("Switched from '{from}' to '{to}'"),
        SwitchOutcome::AlreadyActive { project } => format!("Project '{project}' already active"),
    };
    Ok(success(message, json!({"current_project": body.project})))
}

async fn git_status(State(orch): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(orch.git_status().await?))
}
