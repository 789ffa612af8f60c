//! REST API handlers for promotions, policy and the evolve step.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use tollgate_policy::{PolicyDecision, PolicyOverride};
use tollgate_rollout::{CanaryRequest, EvolveRequest, MAX_CANDIDATES};

use crate::handlers::{controller_error, error_response, ApiResponse};
use crate::ApiState;

/// POST /deploy/canary
pub async fn start_canary(
    State(state): State<ApiState>,
    Query(req): Query<CanaryRequest>,
) -> impl IntoResponse {
    match state.controller.start_canary(req).await {
        Ok(started) => ApiResponse::ok(started).into_response(),
        Err(e) => controller_error(e),
    }
}

/// POST /deploy/promote
pub async fn promote(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.force_promote().await)
}

#[derive(serde::Deserialize)]
pub struct RollbackQuery {
    #[serde(default = "default_rollback_reason")]
    pub reason: String,
}

fn default_rollback_reason() -> String {
    "manual".to_string()
}

/// POST /deploy/rollback
pub async fn rollback(
    State(state): State<ApiState>,
    Query(q): Query<RollbackQuery>,
) -> impl IntoResponse {
    ApiResponse::ok(state.controller.rollback(&q.reason).await)
}

/// GET /deploy/status
pub async fn deploy_status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.deploy_status().await)
}

// ── Policy ─────────────────────────────────────────────────────

/// Policy force request body.
///
/// `reset` clears earlier overrides first, then any forced values are
/// merged, then `enforce` is applied.
#[derive(Debug, Default, serde::Deserialize)]
pub struct PolicyForceRequest {
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub enforce: Option<bool>,
    #[serde(flatten)]
    pub overrides: PolicyOverride,
}

/// POST /policy/force
pub async fn policy_force(
    State(state): State<ApiState>,
    Json(req): Json<PolicyForceRequest>,
) -> impl IntoResponse {
    let gate = state.controller.policy();
    if req.reset {
        gate.reset().await;
    }
    if !req.overrides.is_empty() {
        gate.set_override(req.overrides).await;
    }
    if let Some(enforce) = req.enforce {
        gate.set_enforce(enforce).await;
    }
    ApiResponse::ok(serde_json::json!({
        "enforce": gate.is_enforced().await,
        "overrides": gate.current_override().await,
    }))
}

/// GET /policy/check
pub async fn policy_check(State(state): State<ApiState>) -> impl IntoResponse {
    let gate = state.controller.policy();
    let outcome = gate.evaluate(&PolicyDecision::trivial("check")).await;
    ApiResponse::ok(serde_json::json!({
        "enforce": gate.is_enforced().await,
        "allowed": outcome.allowed,
        "reason": outcome.reason,
        "snapshot": outcome.certificate.ethics,
        "certificate": outcome.certificate,
    }))
}

// ── Evolve ─────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct ProposeQuery {
    #[serde(default = "default_proposals")]
    pub n: usize,
}

fn default_proposals() -> usize {
    1
}

/// GET /candidates/propose
pub async fn propose_candidates(
    State(state): State<ApiState>,
    Query(q): Query<ProposeQuery>,
) -> impl IntoResponse {
    if q.n > MAX_CANDIDATES {
        return error_response(
            &format!("n must be at most {MAX_CANDIDATES}"),
            StatusCode::BAD_REQUEST,
        );
    }
    let candidates = state.controller.generator().propose(q.n);
    ApiResponse::ok(serde_json::json!({
        "count": candidates.len(),
        "candidates": candidates,
    }))
    .into_response()
}

#[derive(serde::Deserialize)]
pub struct TrainQuery {
    #[serde(default = "default_steps")]
    pub steps: u32,
}

fn default_steps() -> u32 {
    10
}

/// POST /trainer/train
pub async fn train(
    State(state): State<ApiState>,
    Query(q): Query<TrainQuery>,
) -> impl IntoResponse {
    ApiResponse::ok(state.controller.trainer().train(q.steps))
}

/// POST /evolve
pub async fn evolve(
    State(state): State<ApiState>,
    Query(req): Query<EvolveRequest>,
) -> impl IntoResponse {
    match state.controller.evolve(req).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => controller_error(e),
    }
}
