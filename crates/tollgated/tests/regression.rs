//! Daemon regression tests.
//!
//! Drives the full router the daemon serves: canary promotions, rollbacks,
//! conflicts, policy blocks, and the manual mode endpoints.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use toll_core::TollgateConfig;
use tollgate_api::build_router;
use tollgate_rollout::PromotionController;

fn test_router() -> Router {
    build_router(PromotionController::from_config(&TollgateConfig::default()))
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(router, "GET", uri, None).await
}

async fn post(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(router, "POST", uri, None).await
}

async fn post_json(
    router: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(router, "POST", uri, Some(body)).await
}

#[tokio::test]
async fn health_starts_in_main() {
    let router = test_router();
    let (status, json) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["mode"], "main");
    assert_eq!(json["data"]["canary_traffic"], 0.0);
}

#[tokio::test]
async fn metrics_render_guard_gauges() {
    let router = test_router();
    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("tollgate_vdot"));
    assert!(text.contains("tollgate_cost_usd_per_hour"));
}

#[tokio::test(start_paused = true)]
async fn all_green_canary_promotes_to_main() {
    let router = test_router();
    let uri = "/deploy/canary?traffic=0.1&windows=2&window_seconds=3";
    let (status, json) = post(&router, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["state"]["mode"], "canary");

    tokio::time::sleep(Duration::from_secs(7)).await;

    let (_, json) = get(&router, "/deploy/status").await;
    assert_eq!(json["data"]["state"]["mode"], "main");
    assert_eq!(json["data"]["state"]["canary_traffic"], 0.0);
    assert_eq!(json["data"]["promotion"]["greens"], 2);

    let (_, json) = get(&router, "/events?limit=10").await;
    let kinds: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["kind"].as_str())
        .collect();
    assert_eq!(kinds.iter().filter(|k| **k == "promote").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn forced_guard_failure_rolls_back() {
    let router = test_router();
    let (status, _) = post_json(&router, "/guard/force", json!({ "vdot": 0.05 })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = get(&router, "/guard/check").await;
    assert_eq!(json["data"]["all_green"], false);

    post(&router, "/deploy/canary?windows=2&window_seconds=2").await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let (_, json) = get(&router, "/deploy/status").await;
    assert_eq!(json["data"]["state"]["mode"], "shadow");
    assert_eq!(json["data"]["promotion"]["fail_reason"], "guard_failed");

    let (_, json) = post_json(&router, "/guard/force", json!({ "reset": true })).await;
    assert_eq!(json["success"], true);
    let (_, json) = get(&router, "/guard/check").await;
    assert_eq!(json["data"]["all_green"], true);
}

#[tokio::test(start_paused = true)]
async fn second_canary_conflicts() {
    let router = test_router();
    let (status, _) = post(&router, "/deploy/canary?windows=3&window_seconds=10").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post(&router, "/deploy/canary").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);

    let (_, json) = get(&router, "/deploy/status").await;
    assert_eq!(json["data"]["promotion"]["windows"], 3);
}

#[tokio::test]
async fn out_of_range_canary_is_rejected() {
    let router = test_router();
    let (status, _) = post(&router, "/deploy/canary?windows=21").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post(&router, "/deploy/canary?traffic=1.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = get(&router, "/health").await;
    assert_eq!(json["data"]["mode"], "main");
}

#[tokio::test(start_paused = true)]
async fn policy_block_then_reset_allows_canary() {
    let router = test_router();
    let forced = json!({ "vdot": "0.05", "enforce": true });
    post_json(&router, "/policy/force", forced).await;

    let (status, json) = post(&router, "/deploy/canary?windows=1&window_seconds=1").await;
    assert_eq!(status, StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS);
    assert_eq!(json["error"], "policy_block");
    assert_eq!(json["reason"], "Invariant");
    assert_eq!(json["certificate"]["assumptions_id"], "sigma-ea-v1.0");

    let (_, json) = get(&router, "/health").await;
    assert_eq!(json["data"]["mode"], "main");

    post_json(&router, "/policy/force", json!({ "reset": true })).await;

    let (status, json) = post(&router, "/deploy/canary?windows=1&window_seconds=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["certificate"]["allowed"], true);
    assert_eq!(json["data"]["certificate"]["reason"], "Allow");
}

#[tokio::test]
async fn manual_mode_and_traffic() {
    let router = test_router();
    let (status, json) = get(&router, "/mode?set=canary&traffic=0.25").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["mode"], "canary");
    assert_eq!(json["data"]["canary_traffic"], 0.25);

    let (status, _) = get(&router, "/mode?set=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = post(&router, "/deploy/promote").await;
    assert_eq!(json["data"]["mode"], "main");
    assert_eq!(json["data"]["canary_traffic"], 0.0);

    let (_, json) = post(&router, "/deploy/rollback?reason=operator").await;
    assert_eq!(json["data"]["prev"], "main");
    assert_eq!(json["data"]["mode"], "shadow");
}

#[tokio::test]
async fn candidate_batches_are_capped() {
    let router = test_router();
    let (status, _) = get(&router, "/candidates/propose?n=200000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = post(&router, "/evolve?candidates=200000&auto=false").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, json) = post(&router, "/evolve?candidates=100&auto=false").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["shadowed"], false);

    let (_, json) = get(&router, "/health").await;
    assert_eq!(json["data"]["mode"], "main");
}
