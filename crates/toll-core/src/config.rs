//! tollgate.toml configuration parser.
//!
//! Every section and key is optional. Missing values fall back to the
//! defaults the controller ships with, so an empty file is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TollgateConfig {
    pub guards: GuardConfig,
    pub policy: PolicyConfig,
}

/// Bounds for the five guard signals plus the publish cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Upper bound on the Lyapunov derivative.
    pub vdot_max: f64,
    /// Lower bound on the closure index.
    pub oci_min: f64,
    pub ece_max: f64,
    pub latency_max_ms: f64,
    pub cost_max_per_hour: f64,
    /// Seconds between guard gauge refreshes.
    pub publish_interval_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            vdot_max: 0.0,
            oci_min: 0.6,
            ece_max: 0.05,
            latency_max_ms: 500.0,
            cost_max_per_hour: 10.0,
            publish_interval_secs: 2,
        }
    }
}

/// Thresholds consulted by the policy gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub tau_e: f64,
    pub tau_ai: f64,
    pub g_min: f64,
    pub rho_max: f64,
    pub truth_ece_max: f64,
    pub c_min: f64,
    /// Consult the gate on every canary start, not only when asked.
    pub enforce: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tau_e: 0.95,
            tau_ai: 0.99,
            g_min: 0.90,
            rho_max: 1.05,
            truth_ece_max: 0.01,
            c_min: 0.10,
            enforce: false,
        }
    }
}

/// A config that parsed but cannot be used.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{section}.{key} must be a finite number, got {value}")]
    NotFinite {
        section: &'static str,
        key: &'static str,
        value: f64,
    },

    #[error("guards.publish_interval_secs must be at least 1")]
    ZeroPublishInterval,
}

impl TollgateConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Parse and validate a config from TOML text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: TollgateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.guards;
        let p = &self.policy;
        let numbers = [
            ("guards", "vdot_max", g.vdot_max),
            ("guards", "oci_min", g.oci_min),
            ("guards", "ece_max", g.ece_max),
            ("guards", "latency_max_ms", g.latency_max_ms),
            ("guards", "cost_max_per_hour", g.cost_max_per_hour),
            ("policy", "tau_e", p.tau_e),
            ("policy", "tau_ai", p.tau_ai),
            ("policy", "g_min", p.g_min),
            ("policy", "rho_max", p.rho_max),
            ("policy", "truth_ece_max", p.truth_ece_max),
            ("policy", "c_min", p.c_min),
        ];
        for (section, key, value) in numbers {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite {
                    section,
                    key,
                    value,
                });
            }
        }
        if g.publish_interval_secs == 0 {
            return Err(ConfigError::ZeroPublishInterval);
        }
        Ok(())
    }
}
