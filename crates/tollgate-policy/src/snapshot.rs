//! Ethics snapshot — the values the policy gate reads.
//!
//! A snapshot is rebuilt on every check from the operator override, with
//! fixed "good" fallbacks for anything not forced. It is never stored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use toll_core::epoch_millis;

const NOMINAL_NOTE: &str = "all gates met; risk=0; audit-only mode";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicsSnapshot {
    /// Primary bound E, must stay above `tau_e`.
    #[serde(rename = "E")]
    pub e: f64,
    /// Primary bound AI, must stay above `tau_ai`.
    #[serde(rename = "AI")]
    pub ai: f64,
    /// Closure G, must stay at or above `g_min`.
    #[serde(rename = "G")]
    pub g: f64,
    #[serde(rename = "dV_dt")]
    pub lyapunov_derivative: f64,
    pub truth_ece: f64,
    /// Proven risk. Anything above zero blocks.
    pub risk: f64,
    /// Impartiality ratio rho, bounded by `rho_max`.
    pub impartiality_ratio: f64,
    pub consent_ok: bool,
    pub eco_ok: bool,
    /// Humans, earth, machines ordering holds.
    pub reu_ok: bool,
    pub fairness_ok: bool,
    /// Control-barrier safety constraint holds.
    pub cbf_ok: bool,
    pub attested: bool,
    pub sacrificial_cost: f64,
    pub residual_risk_note: String,
    pub measured_at_ms: u64,
}

impl EthicsSnapshot {
    pub fn nominal() -> Self {
        PolicyOverride::default().measure()
    }
}

/// Forced ethics values. Unset fields use the nominal value.
///
/// Fields are parsed leniently: a value of the wrong type is treated as
/// unset instead of rejecting the whole override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverride {
    #[serde(rename = "E", alias = "e")]
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub e: Option<f64>,
    #[serde(rename = "AI", alias = "ai")]
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub ai: Option<f64>,
    #[serde(rename = "G", alias = "g")]
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
    #[serde(rename = "vdot", alias = "dV_dt")]
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub lyapunov_derivative: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub truth_ece: Option<f64>,
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub risk: Option<f64>,
    #[serde(rename = "rho")]
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub impartiality_ratio: Option<f64>,
    #[serde(deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub consent_ok: Option<bool>,
    #[serde(deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub eco_ok: Option<bool>,
    #[serde(deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub reu_ok: Option<bool>,
    #[serde(deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub fairness_ok: Option<bool>,
    #[serde(deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub cbf_ok: Option<bool>,
    #[serde(alias = "attest_ok")]
    #[serde(deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub attested: Option<bool>,
    #[serde(alias = "c_self")]
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub sacrificial_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual_risk_note: Option<String>,
}

impl PolicyOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Take every field `other` sets, keep the rest.
    pub fn merge(&mut self, other: PolicyOverride) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            e,
            ai,
            g,
            lyapunov_derivative,
            truth_ece,
            risk,
            impartiality_ratio,
            consent_ok,
            eco_ok,
            reu_ok,
            fairness_ok,
            cbf_ok,
            attested,
            sacrificial_cost,
            residual_risk_note
        );
    }

    /// Build a snapshot from the forced values and nominal fallbacks.
    pub fn measure(&self) -> EthicsSnapshot {
        EthicsSnapshot {
            e: self.e.unwrap_or(0.97),
            ai: self.ai.unwrap_or(0.995),
            g: self.g.unwrap_or(0.96),
            lyapunov_derivative: self.lyapunov_derivative.unwrap_or(-0.01),
            truth_ece: self.truth_ece.unwrap_or(0.003),
            risk: self.risk.unwrap_or(0.0),
            impartiality_ratio: self.impartiality_ratio.unwrap_or(1.0),
            consent_ok: self.consent_ok.unwrap_or(true),
            eco_ok: self.eco_ok.unwrap_or(true),
            reu_ok: self.reu_ok.unwrap_or(true),
            fairness_ok: self.fairness_ok.unwrap_or(true),
            cbf_ok: self.cbf_ok.unwrap_or(true),
            attested: self.attested.unwrap_or(true),
            sacrificial_cost: self.sacrificial_cost.unwrap_or(0.12),
            residual_risk_note: self
                .residual_risk_note
                .clone()
                .unwrap_or_else(|| NOMINAL_NOTE.to_string()),
            measured_at_ms: epoch_millis(),
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }))
}
