//! REST API handlers for health, guards, modes and events.
//!
//! Each handler goes through the shared controller and returns JSON
//! responses in the `{success, data, error}` envelope.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use tollgate_guard::{render_prometheus, GuardOverride};
use tollgate_rollout::{ControllerError, ErrorKind};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

/// Map a controller error to its HTTP status.
///
/// Policy denials carry the reason and certificate so automation can
/// tell a veto from bad input.
pub(crate) fn controller_error(err: ControllerError) -> Response {
    match err {
        ControllerError::PolicyBlocked {
            reason,
            certificate,
        } => (
            StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
            Json(serde_json::json!({
                "success": false,
                "error": "policy_block",
                "reason": reason,
                "certificate": certificate,
            })),
        )
            .into_response(),
        other => {
            let status = match other.kind() {
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::PolicyDenied => StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
            };
            error_response(&other.to_string(), status)
        }
    }
}

// ── Health ─────────────────────────────────────────────────────

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: toll_core::DeploymentMode,
    pub canary_traffic: f64,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let current = state.controller.health().await;
    ApiResponse::ok(HealthResponse {
        status: "ok",
        mode: current.mode,
        canary_traffic: current.canary_traffic,
    })
}

/// GET /live
pub async fn live() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "live": true }))
}

#[derive(serde::Deserialize)]
pub struct ReadyQuery {
    #[serde(default = "default_max_age")]
    pub max_age_s: u64,
}

fn default_max_age() -> u64 {
    5
}

/// GET /ready
///
/// Ready while the guard publisher has ticked within `max_age_s`.
pub async fn ready(
    State(state): State<ApiState>,
    Query(q): Query<ReadyQuery>,
) -> impl IntoResponse {
    let age_ms = state.controller.guard().publish_age_ms().await;
    let age_s = age_ms as f64 / 1000.0;
    if age_ms > q.max_age_s.saturating_mul(1000) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "success": false,
                "error": "guard publisher stale",
                "data": { "ready": false, "age_s": age_s },
            })),
        )
            .into_response();
    }
    ApiResponse::ok(serde_json::json!({ "ready": true, "age_s": age_s })).into_response()
}

/// GET /version
pub async fn version() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.controller.guard().current_snapshot().await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_prometheus(&snapshot),
    )
}

// ── Guards ─────────────────────────────────────────────────────

/// GET /guard/check
pub async fn guard_check(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.guard_check().await)
}

/// Guard force request body. Unset signals keep their current value.
#[derive(Debug, Default, serde::Deserialize)]
pub struct GuardForceRequest {
    #[serde(default)]
    pub reset: bool,
    #[serde(flatten)]
    pub overrides: GuardOverride,
}

/// POST /guard/force
pub async fn guard_force(
    State(state): State<ApiState>,
    Json(req): Json<GuardForceRequest>,
) -> impl IntoResponse {
    let guard = state.controller.guard();
    if req.reset {
        guard.reset_override().await;
        return ApiResponse::ok(serde_json::json!({ "overrides": null })).into_response();
    }
    let merged = guard.set_override(req.overrides).await;
    ApiResponse::ok(serde_json::json!({ "overrides": merged })).into_response()
}

// ── Modes ──────────────────────────────────────────────────────

#[derive(Debug, Default, serde::Deserialize)]
pub struct ModeQuery {
    pub set: Option<String>,
    pub traffic: Option<f64>,
}

/// GET /mode
pub async fn mode(
    State(state): State<ApiState>,
    Query(q): Query<ModeQuery>,
) -> impl IntoResponse {
    match state
        .controller
        .set_mode_named(q.set.as_deref(), q.traffic)
        .await
    {
        Ok(change) => ApiResponse::ok(change).into_response(),
        Err(e) => controller_error(e),
    }
}

// ── Events ─────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_event_limit")]
    pub limit: usize,
}

fn default_event_limit() -> usize {
    50
}

/// GET /events
pub async fn events(
    State(state): State<ApiState>,
    Query(q): Query<EventsQuery>,
) -> impl IntoResponse {
    ApiResponse::ok(state.controller.events().recent(q.limit).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use toll_core::{DeploymentMode, TollgateConfig};
    use tollgate_rollout::PromotionController;

    fn test_state() -> ApiState {
        ApiState {
            controller: PromotionController::from_config(&TollgateConfig::default()),
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_mode() {
        let resp = health(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["mode"], "main");
        assert_eq!(json["data"]["canary_traffic"], 0.0);
    }

    #[tokio::test]
    async fn guard_force_then_reset() {
        let state = test_state();
        let req = GuardForceRequest {
            reset: false,
            overrides: GuardOverride {
                latency_p95_ms: Some(800.0),
                ..Default::default()
            },
        };
        let resp = guard_force(State(state.clone()), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(guard_check(State(state.clone())).await.into_response()).await;
        assert_eq!(json["data"]["lat_ok"], false);
        assert_eq!(json["data"]["all_green"], false);

        let reset = GuardForceRequest {
            reset: true,
            ..Default::default()
        };
        guard_force(State(state.clone()), Json(reset)).await;
        let json = body_json(guard_check(State(state)).await.into_response()).await;
        assert_eq!(json["data"]["all_green"], true);
    }

    #[tokio::test]
    async fn mode_rejects_unknown_name() {
        let state = test_state();
        let q = ModeQuery {
            set: Some("purple".to_string()),
            traffic: None,
        };
        let resp = mode(State(state.clone()), Query(q)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.controller.health().await.mode, DeploymentMode::Main);
    }

    #[tokio::test]
    async fn mode_traffic_outside_canary_is_bad_request() {
        let state = test_state();
        let q = ModeQuery {
            set: Some("shadow".to_string()),
            traffic: Some(0.2),
        };
        let resp = mode(State(state), Query(q)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mode_sets_canary_traffic() {
        let state = test_state();
        let q = ModeQuery {
            set: Some("canary".to_string()),
            traffic: Some(0.1),
        };
        let json = body_json(mode(State(state), Query(q)).await.into_response()).await;
        assert_eq!(json["data"]["prev"], "main");
        assert_eq!(json["data"]["mode"], "canary");
        assert_eq!(json["data"]["canary_traffic"], 0.1);
    }

    #[tokio::test]
    async fn ready_when_recently_published() {
        let resp = ready(State(test_state()), Query(ReadyQuery { max_age_s: 5 }))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exposes_guard_gauges() {
        let resp = prometheus_metrics(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("tollgate_vdot"));
        assert!(text.contains("tollgate_oci"));
    }
}
