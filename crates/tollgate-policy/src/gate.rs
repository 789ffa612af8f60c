//! Policy gate — ordered invariant checks with a certificate per verdict.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use toll_core::PolicyConfig;

use crate::snapshot::{EthicsSnapshot, PolicyOverride};

/// Identifies the rule set a certificate was issued under.
pub const ASSUMPTIONS_ID: &str = "sigma-ea-v1.0";

/// Thresholds for the policy checks. Fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyThresholds {
    pub tau_e: f64,
    pub tau_ai: f64,
    pub g_min: f64,
    pub rho_max: f64,
    pub truth_ece_max: f64,
    pub c_min: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for PolicyThresholds {
    fn from(cfg: &PolicyConfig) -> Self {
        Self {
            tau_e: cfg.tau_e,
            tau_ai: cfg.tau_ai,
            g_min: cfg.g_min,
            rho_max: cfg.rho_max,
            truth_ece_max: cfg.truth_ece_max,
            c_min: cfg.c_min,
        }
    }
}

/// The single reason attached to every gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyReason {
    Unattested,
    Invariant,
    #[serde(rename = "Risk>0")]
    RiskPositive,
    #[serde(rename = "Truth/Eco/Consent")]
    TruthEcoConsent,
    #[serde(rename = "REU/CBF/Fairness")]
    ReuCbfFairness,
    NoSacrificialCost,
    Allow,
    GoodDuty,
}

impl PolicyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyReason::Unattested => "Unattested",
            PolicyReason::Invariant => "Invariant",
            PolicyReason::RiskPositive => "Risk>0",
            PolicyReason::TruthEcoConsent => "Truth/Eco/Consent",
            PolicyReason::ReuCbfFairness => "REU/CBF/Fairness",
            PolicyReason::NoSacrificialCost => "NoSacrificialCost",
            PolicyReason::Allow => "Allow",
            PolicyReason::GoodDuty => "GoodDuty",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyReason::Allow | PolicyReason::GoodDuty)
    }
}

impl fmt::Display for PolicyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action being vetted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub action: String,
    /// Every affected party's utility delta is non-negative.
    #[serde(default)]
    pub delta_u_all_nonneg: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl PolicyDecision {
    /// A decision carrying nothing beyond its action name.
    pub fn trivial(action: &str) -> Self {
        Self {
            action: action.to_string(),
            delta_u_all_nonneg: false,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Record of what the gate saw and decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCertificate {
    pub allowed: bool,
    pub reason: PolicyReason,
    pub decision: PolicyDecision,
    pub ethics: EthicsSnapshot,
    pub assumptions_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub allowed: bool,
    pub reason: PolicyReason,
    pub certificate: PolicyCertificate,
}

impl PolicyThresholds {
    /// Run the ordered checks. The first failure decides the reason.
    ///
    /// Checks are written as "passes" predicates so a NaN reading fails.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn judge(&self, decision: &PolicyDecision, s: &EthicsSnapshot) -> PolicyReason {
        if !s.attested {
            return PolicyReason::Unattested;
        }
        let invariants_hold = s.e > self.tau_e
            && s.ai > self.tau_ai
            && s.g >= self.g_min
            && s.lyapunov_derivative <= 0.0;
        if !invariants_hold {
            return PolicyReason::Invariant;
        }
        if !(s.risk <= 0.0) {
            return PolicyReason::RiskPositive;
        }
        if !(s.eco_ok && s.truth_ece <= self.truth_ece_max && s.consent_ok) {
            return PolicyReason::TruthEcoConsent;
        }
        if !(s.reu_ok && s.cbf_ok && s.fairness_ok && s.impartiality_ratio <= self.rho_max) {
            return PolicyReason::ReuCbfFairness;
        }
        if !(s.sacrificial_cost >= self.c_min) {
            return PolicyReason::NoSacrificialCost;
        }
        if decision.delta_u_all_nonneg {
            PolicyReason::GoodDuty
        } else {
            PolicyReason::Allow
        }
    }

    pub fn check(&self, decision: &PolicyDecision, snapshot: &EthicsSnapshot) -> PolicyOutcome {
        let reason = self.judge(decision, snapshot);
        let allowed = reason.is_allowed();
        PolicyOutcome {
            allowed,
            reason,
            certificate: PolicyCertificate {
                allowed,
                reason,
                decision: decision.clone(),
                ethics: snapshot.clone(),
                assumptions_id: ASSUMPTIONS_ID.to_string(),
            },
        }
    }
}

struct PolicyState {
    overrides: PolicyOverride,
    enforce: bool,
}

/// The gate plus its runtime override and enforcement toggle.
#[derive(Clone)]
pub struct PolicyGate {
    thresholds: PolicyThresholds,
    /// Enforcement value restored on reset.
    default_enforce: bool,
    state: Arc<RwLock<PolicyState>>,
}

impl PolicyGate {
    pub fn new(thresholds: PolicyThresholds, enforce: bool) -> Self {
        Self {
            thresholds,
            default_enforce: enforce,
            state: Arc::new(RwLock::new(PolicyState {
                overrides: PolicyOverride::default(),
                enforce,
            })),
        }
    }

    pub fn from_config(cfg: &PolicyConfig) -> Self {
        Self::new(PolicyThresholds::from(cfg), cfg.enforce)
    }

    pub fn thresholds(&self) -> &PolicyThresholds {
        &self.thresholds
    }

    /// Build a snapshot from the current override.
    pub async fn measure(&self) -> EthicsSnapshot {
        self.state.read().await.overrides.measure()
    }

    /// Measure and judge in one step.
    pub async fn evaluate(&self, decision: &PolicyDecision) -> PolicyOutcome {
        let snapshot = self.measure().await;
        let outcome = self.thresholds.check(decision, &snapshot);
        if outcome.allowed {
            debug!(action = %decision.action, reason = %outcome.reason, "policy gate allowed");
        } else {
            warn!(action = %decision.action, reason = %outcome.reason, "policy gate denied");
        }
        outcome
    }

    pub async fn set_override(&self, forced: PolicyOverride) -> PolicyOverride {
        let mut state = self.state.write().await;
        state.overrides.merge(forced);
        info!(overrides = ?state.overrides, "policy override applied");
        state.overrides.clone()
    }

    pub async fn current_override(&self) -> PolicyOverride {
        self.state.read().await.overrides.clone()
    }

    /// Clear the override and restore the configured enforcement value.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.overrides = PolicyOverride::default();
        state.enforce = self.default_enforce;
        info!(enforce = state.enforce, "policy override cleared");
    }

    pub async fn set_enforce(&self, enforce: bool) {
        self.state.write().await.enforce = enforce;
        info!(enforce, "policy enforcement toggled");
    }

    pub async fn is_enforced(&self) -> bool {
        self.state.read().await.enforce
    }
}
