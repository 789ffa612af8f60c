//! Promotion controller — drives the deployment mode state machine.
//!
//! The controller owns the current mode and the promotion run record.
//! Starting a canary spawns a window loop that sleeps one window at a
//! time, checks the guards, and either rolls back to shadow on the first
//! red window or promotes to main after the last green one.
//!
//! Manual operations (`force_promote`, `rollback`, `set_mode`) are not
//! fenced off from an active loop. They take effect immediately, but the
//! loop keeps running and its terminal transition overwrites the mode
//! again. Callers that need exclusivity should check `running` first.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use toll_core::{DeploymentMode, TollgateConfig};
use tollgate_guard::{GuardMetrics, GuardThresholds, GuardVerdict};
use tollgate_policy::{PolicyCertificate, PolicyDecision, PolicyGate};

use crate::error::{ControllerError, ControllerResult};
use crate::events::{Event, EventKind, EventLog};
use crate::evolve::{
    Candidate, CandidateGenerator, StubGenerator, StubTrainer, Trainer, TrainingReport,
    MIN_SHADOW_FITNESS,
};

pub const MAX_WINDOWS: u32 = 20;
pub const MAX_WINDOW_SECONDS: u64 = 600;

/// Largest candidate batch one proposal or evolve step may ask for.
pub const MAX_CANDIDATES: usize = 100;

/// Failure reason recorded when a window turns red.
pub const GUARD_FAILED: &str = "guard_failed";

/// Events included in a status report.
const STATUS_EVENTS: usize = 10;

/// Parameters for a canary promotion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryRequest {
    /// Fraction of traffic routed to the canary, in `[0, 1]`.
    pub traffic: f64,
    pub windows: u32,
    pub window_seconds: u64,
    /// Consult the policy gate even when enforcement is off.
    pub enforce_policy: bool,
}

impl Default for CanaryRequest {
    fn default() -> Self {
        Self {
            traffic: 0.1,
            windows: 3,
            window_seconds: 10,
            enforce_policy: false,
        }
    }
}

impl CanaryRequest {
    pub fn validate(&self) -> ControllerResult<()> {
        validate_traffic(self.traffic)?;
        if !(1..=MAX_WINDOWS).contains(&self.windows) {
            return Err(ControllerError::InvalidWindows {
                got: self.windows,
                max: MAX_WINDOWS,
            });
        }
        if !(1..=MAX_WINDOW_SECONDS).contains(&self.window_seconds) {
            return Err(ControllerError::InvalidWindowSeconds {
                got: self.window_seconds,
                max: MAX_WINDOW_SECONDS,
            });
        }
        Ok(())
    }
}

fn validate_traffic(traffic: f64) -> ControllerResult<()> {
    if (0.0..=1.0).contains(&traffic) {
        Ok(())
    } else {
        Err(ControllerError::TrafficOutOfRange(traffic))
    }
}

/// Record of the current (or most recent) promotion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionRun {
    pub target: Option<DeploymentMode>,
    pub windows: u32,
    pub window_seconds: u64,
    /// Green windows observed so far.
    pub greens: u32,
    pub running: bool,
    pub fail_reason: Option<String>,
}

/// How a window loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Promoted { greens: u32 },
    /// `window` is 1-based.
    RolledBack { window: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeState {
    pub mode: DeploymentMode,
    pub canary_traffic: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeChange {
    pub prev: DeploymentMode,
    pub mode: DeploymentMode,
    pub canary_traffic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanaryStarted {
    pub state: ModeState,
    pub promotion: PromotionRun,
    /// Present when the policy gate was consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<PolicyCertificate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployStatus {
    pub state: ModeState,
    pub promotion: PromotionRun,
    pub events: Vec<Event>,
}

/// Parameters for an evolve step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolveRequest {
    pub steps: u32,
    pub candidates: usize,
    /// Allow the step to change mode at all.
    pub auto: bool,
    /// Enter shadow regardless of the scores.
    pub force: bool,
}

impl Default for EvolveRequest {
    fn default() -> Self {
        Self {
            steps: 1,
            candidates: 3,
            auto: true,
            force: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolveReport {
    pub best: Candidate,
    pub training: TrainingReport,
    pub fitness: f64,
    pub loss_delta: f64,
    pub shadowed: bool,
    pub state: ModeState,
}

struct ControllerState {
    mode: DeploymentMode,
    canary_traffic: f64,
    run: PromotionRun,
    /// Handle to the active (or last finished) window loop.
    task: Option<JoinHandle<RunOutcome>>,
}

impl ControllerState {
    fn mode_state(&self) -> ModeState {
        ModeState {
            mode: self.mode,
            canary_traffic: self.canary_traffic,
        }
    }
}

/// Owns deployment mode and promotion state. Cheap to clone.
#[derive(Clone)]
pub struct PromotionController {
    state: Arc<RwLock<ControllerState>>,
    guard: GuardMetrics,
    thresholds: GuardThresholds,
    policy: PolicyGate,
    events: EventLog,
    generator: Arc<dyn CandidateGenerator>,
    trainer: Arc<dyn Trainer>,
}

impl PromotionController {
    /// Create a controller in `Main` mode with no run recorded.
    pub fn new(guard: GuardMetrics, thresholds: GuardThresholds, policy: PolicyGate) -> Self {
        Self {
            state: Arc::new(RwLock::new(ControllerState {
                mode: DeploymentMode::Main,
                canary_traffic: 0.0,
                run: PromotionRun::default(),
                task: None,
            })),
            guard,
            thresholds,
            policy,
            events: EventLog::new(),
            generator: Arc::new(StubGenerator),
            trainer: Arc::new(StubTrainer),
        }
    }

    pub fn from_config(cfg: &TollgateConfig) -> Self {
        Self::new(
            GuardMetrics::new(cfg.guards.oci_min),
            GuardThresholds::from(&cfg.guards),
            PolicyGate::from_config(&cfg.policy),
        )
    }

    /// Replace the stub candidate generator and trainer.
    pub fn with_evolver(
        mut self,
        generator: Arc<dyn CandidateGenerator>,
        trainer: Arc<dyn Trainer>,
    ) -> Self {
        self.generator = generator;
        self.trainer = trainer;
        self
    }

    pub fn guard(&self) -> &GuardMetrics {
        &self.guard
    }

    pub fn thresholds(&self) -> &GuardThresholds {
        &self.thresholds
    }

    pub fn policy(&self) -> &PolicyGate {
        &self.policy
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn generator(&self) -> &dyn CandidateGenerator {
        self.generator.as_ref()
    }

    pub fn trainer(&self) -> &dyn Trainer {
        self.trainer.as_ref()
    }

    pub async fn health(&self) -> ModeState {
        self.state.read().await.mode_state()
    }

    pub async fn guard_check(&self) -> GuardVerdict {
        let snapshot = self.guard.current_snapshot().await;
        self.thresholds.evaluate(&snapshot)
    }

    pub async fn promotion(&self) -> PromotionRun {
        self.state.read().await.run.clone()
    }

    pub async fn deploy_status(&self) -> DeployStatus {
        let (state, promotion) = {
            let st = self.state.read().await;
            (st.mode_state(), st.run.clone())
        };
        DeployStatus {
            state,
            promotion,
            events: self.events.recent(STATUS_EVENTS).await,
        }
    }

    /// Enter canary mode and spawn the window loop.
    ///
    /// Returns once the loop is scheduled; use [`wait_for_run`] to
    /// observe its outcome.
    ///
    /// [`wait_for_run`]: PromotionController::wait_for_run
    pub async fn start_canary(&self, req: CanaryRequest) -> ControllerResult<CanaryStarted> {
        req.validate()?;

        let mut state = self.state.write().await;
        if state.run.running {
            warn!(greens = state.run.greens, "canary rejected, promotion already running");
            return Err(ControllerError::PromotionAlreadyRunning);
        }

        let certificate = if req.enforce_policy || self.policy.is_enforced().await {
            let decision = PolicyDecision::trivial("canary").with_detail(json!({
                "traffic": req.traffic,
                "windows": req.windows,
                "window_seconds": req.window_seconds,
            }));
            let outcome = self.policy.evaluate(&decision).await;
            if !outcome.allowed {
                return Err(ControllerError::PolicyBlocked {
                    reason: outcome.reason,
                    certificate: Box::new(outcome.certificate),
                });
            }
            Some(outcome.certificate)
        } else {
            None
        };

        let prev = state.mode;
        state.mode = DeploymentMode::Canary;
        state.canary_traffic = req.traffic;
        self.events
            .append(
                EventKind::CanaryStart,
                json!({
                    "prev": prev,
                    "traffic": req.traffic,
                    "windows": req.windows,
                    "window_seconds": req.window_seconds,
                }),
            )
            .await;

        state.run = PromotionRun {
            target: Some(DeploymentMode::Main),
            windows: req.windows,
            window_seconds: req.window_seconds,
            greens: 0,
            running: true,
            fail_reason: None,
        };

        let controller = self.clone();
        let window = Duration::from_secs(req.window_seconds);
        let windows = req.windows;
        state.task = Some(tokio::spawn(async move {
            controller.run_windows(windows, window).await
        }));

        info!(
            %prev,
            traffic = req.traffic,
            windows = req.windows,
            window_secs = req.window_seconds,
            "canary started"
        );

        Ok(CanaryStarted {
            state: state.mode_state(),
            promotion: state.run.clone(),
            certificate,
        })
    }

    /// Wait for the most recently started window loop to finish.
    ///
    /// Returns `None` if no loop was started or it was already awaited.
    pub async fn wait_for_run(&self) -> Option<RunOutcome> {
        let handle = self.state.write().await.task.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            // A panic in the loop is a programming fault; surface it.
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => None,
        }
    }

    async fn run_windows(self, windows: u32, window: Duration) -> RunOutcome {
        for index in 1..=windows {
            tokio::time::sleep(window).await;

            let verdict = self.guard_check().await;
            debug!(
                window = index,
                windows,
                all_green = verdict.all_green,
                "canary window evaluated"
            );

            let mut state = self.state.write().await;
            if !verdict.all_green {
                let prev = state.mode;
                state.run.fail_reason = Some(GUARD_FAILED.to_string());
                state.run.running = false;
                state.mode = DeploymentMode::Shadow;
                state.canary_traffic = 0.0;
                self.events
                    .append(
                        EventKind::Rollback,
                        json!({
                            "reason": GUARD_FAILED,
                            "stage": "canary",
                            "window": index,
                            "failing": verdict.failing(),
                            "prev": prev,
                            "new": DeploymentMode::Shadow,
                        }),
                    )
                    .await;
                warn!(
                    window = index,
                    failing = ?verdict.failing(),
                    "canary rolled back, guard failed"
                );
                return RunOutcome::RolledBack { window: index };
            }
            state.run.greens += 1;
        }

        let mut state = self.state.write().await;
        let prev = state.mode;
        state.mode = DeploymentMode::Main;
        state.canary_traffic = 0.0;
        state.run.running = false;
        self.events
            .append(
                EventKind::Promote,
                json!({ "prev": prev, "new": DeploymentMode::Main, "greens": state.run.greens }),
            )
            .await;
        info!(greens = state.run.greens, "canary promoted to main");
        RunOutcome::Promoted {
            greens: state.run.greens,
        }
    }

    /// Promote to main regardless of any run in progress.
    pub async fn force_promote(&self) -> ModeChange {
        let mut state = self.state.write().await;
        let prev = state.mode;
        state.mode = DeploymentMode::Main;
        state.canary_traffic = 0.0;
        self.events
            .append(
                EventKind::Promote,
                json!({ "prev": prev, "new": DeploymentMode::Main, "forced": true }),
            )
            .await;
        info!(%prev, running = state.run.running, "forced promotion to main");
        ModeChange {
            prev,
            mode: state.mode,
            canary_traffic: state.canary_traffic,
        }
    }

    /// Fall back to shadow regardless of any run in progress.
    pub async fn rollback(&self, reason: &str) -> ModeChange {
        let mut state = self.state.write().await;
        let prev = state.mode;
        state.mode = DeploymentMode::Shadow;
        state.canary_traffic = 0.0;
        self.events
            .append(
                EventKind::Rollback,
                json!({ "reason": reason, "prev": prev, "new": DeploymentMode::Shadow }),
            )
            .await;
        warn!(%prev, %reason, running = state.run.running, "manual rollback to shadow");
        ModeChange {
            prev,
            mode: state.mode,
            canary_traffic: state.canary_traffic,
        }
    }

    /// Set the mode and, optionally, the canary traffic fraction.
    ///
    /// Traffic may only be set when the resulting mode is canary. Both
    /// are validated before anything changes.
    pub async fn set_mode(
        &self,
        mode: Option<DeploymentMode>,
        traffic: Option<f64>,
    ) -> ControllerResult<ModeChange> {
        if let Some(t) = traffic {
            validate_traffic(t)?;
        }

        let mut state = self.state.write().await;
        let prev = state.mode;
        let next = mode.unwrap_or(prev);
        if traffic.is_some() && next != DeploymentMode::Canary {
            return Err(ControllerError::InvalidModeForTraffic(next));
        }

        if let Some(mode) = mode {
            state.mode = mode;
            self.events
                .append(EventKind::ModeSet, json!({ "prev": prev, "new": mode }))
                .await;
            info!(%prev, new = %mode, "mode set");
        }
        if let Some(t) = traffic {
            state.canary_traffic = t;
            self.events
                .append(EventKind::CanaryTraffic, json!({ "value": t }))
                .await;
            info!(traffic = t, "canary traffic set");
        }

        Ok(ModeChange {
            prev,
            mode: state.mode,
            canary_traffic: state.canary_traffic,
        })
    }

    /// Parse a mode name and apply it.
    pub async fn set_mode_named(
        &self,
        mode: Option<&str>,
        traffic: Option<f64>,
    ) -> ControllerResult<ModeChange> {
        let mode = mode.map(str::parse::<DeploymentMode>).transpose()?;
        self.set_mode(mode, traffic).await
    }

    pub async fn set_traffic(&self, fraction: f64) -> ControllerResult<ModeChange> {
        self.set_mode(None, Some(fraction)).await
    }

    /// Propose candidates, train the best, and enter shadow mode when
    /// the scores justify it (or `force` is set).
    pub async fn evolve(&self, req: EvolveRequest) -> ControllerResult<EvolveReport> {
        if req.candidates == 0 {
            return Err(ControllerError::NoCandidates);
        }
        if req.candidates > MAX_CANDIDATES {
            return Err(ControllerError::TooManyCandidates {
                got: req.candidates,
                max: MAX_CANDIDATES,
            });
        }

        let best = self
            .generator
            .propose(req.candidates)
            .into_iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .ok_or(ControllerError::NoCandidates)?;
        let training = self.trainer.train(req.steps);
        let loss_delta = training.loss_delta();

        let qualifies = best.fitness >= MIN_SHADOW_FITNESS && loss_delta > 0.0;
        let shadowed = req.auto && (qualifies || req.force);

        let mut state = self.state.write().await;
        if shadowed {
            let prev = state.mode;
            state.mode = DeploymentMode::Shadow;
            state.canary_traffic = 0.0;
            self.events
                .append(
                    EventKind::ShadowStart,
                    json!({ "prev": prev, "candidate": best.id, "fitness": best.fitness }),
                )
                .await;
            info!(
                candidate = %best.id,
                fitness = best.fitness,
                forced = req.force,
                "candidate entered shadow"
            );
        } else {
            debug!(
                candidate = %best.id,
                fitness = best.fitness,
                loss_delta,
                "candidate not shadowed"
            );
        }

        Ok(EvolveReport {
            fitness: best.fitness,
            best,
            training,
            loss_delta,
            shadowed,
            state: state.mode_state(),
        })
    }
}
