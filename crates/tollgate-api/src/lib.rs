//! tollgate-api — REST API for the Tollgate controller.
//!
//! Binds every controller operation to an axum route. Handlers never
//! hold state of their own; everything goes through the shared
//! `PromotionController`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Mode and canary traffic |
//! | GET | `/live` | Process liveness |
//! | GET | `/ready` | Guard publisher freshness |
//! | GET | `/version` | Build version |
//! | GET | `/metrics` | Prometheus exposition of guard gauges |
//! | GET | `/guard/check` | Per-signal verdict |
//! | POST | `/guard/force` | Force or reset guard values |
//! | GET | `/mode` | Read or set mode / canary traffic |
//! | POST | `/deploy/canary` | Start a canary promotion |
//! | POST | `/deploy/promote` | Forced promotion to main |
//! | POST | `/deploy/rollback` | Manual rollback to shadow |
//! | GET | `/deploy/status` | Mode, run record, recent events |
//! | POST | `/policy/force` | Force or reset policy values, toggle enforcement |
//! | GET | `/policy/check` | Current policy snapshot and verdict |
//! | GET | `/events` | Recent events |
//! | GET | `/candidates/propose` | Candidate generator |
//! | POST | `/trainer/train` | Trainer |
//! | POST | `/evolve` | Propose, train, maybe enter shadow |

pub mod handlers;
pub mod rollout_handlers;

use axum::routing::{get, post};
use axum::Router;

use tollgate_rollout::PromotionController;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: PromotionController,
}

/// Build the complete API router.
pub fn build_router(controller: PromotionController) -> Router {
    let state = ApiState { controller };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/live", get(handlers::live))
        .route("/ready", get(handlers::ready))
        .route("/version", get(handlers::version))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/guard/check", get(handlers::guard_check))
        .route("/guard/force", post(handlers::guard_force))
        .route("/mode", get(handlers::mode))
        .route("/events", get(handlers::events))
        .route("/deploy/canary", post(rollout_handlers::start_canary))
        .route("/deploy/promote", post(rollout_handlers::promote))
        .route("/deploy/rollback", post(rollout_handlers::rollback))
        .route("/deploy/status", get(rollout_handlers::deploy_status))
        .route("/policy/force", post(rollout_handlers::policy_force))
        .route("/policy/check", get(rollout_handlers::policy_check))
        .route("/candidates/propose", get(rollout_handlers::propose_candidates))
        .route("/trainer/train", post(rollout_handlers::train))
        .route("/evolve", post(rollout_handlers::evolve))
        .with_state(state)
}
