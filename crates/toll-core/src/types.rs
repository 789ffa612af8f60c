//! Shared types used across Tollgate crates.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Which deployment currently serves the primary role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// The promoted deployment takes all traffic.
    Main,
    /// The candidate runs alongside without live traffic.
    Shadow,
    /// The candidate takes a fraction of live traffic under observation.
    Canary,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Main => "main",
            DeploymentMode::Shadow => "shadow",
            DeploymentMode::Canary => "canary",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a mode name is not one of `main`, `shadow`, `canary`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for DeploymentMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(DeploymentMode::Main),
            "shadow" => Ok(DeploymentMode::Shadow),
            "canary" => Ok(DeploymentMode::Canary),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_names_case_insensitively() {
        assert_eq!("main".parse::<DeploymentMode>().unwrap(), DeploymentMode::Main);
        assert_eq!("Shadow".parse::<DeploymentMode>().unwrap(), DeploymentMode::Shadow);
        assert_eq!(" CANARY ".parse::<DeploymentMode>().unwrap(), DeploymentMode::Canary);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = "blue".parse::<DeploymentMode>().unwrap_err();
        assert_eq!(err, UnknownMode("blue".to_string()));
        assert_eq!(err.to_string(), "invalid mode: blue");
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&DeploymentMode::Canary).unwrap();
        assert_eq!(json, "\"canary\"");
        let back: DeploymentMode = serde_json::from_str("\"shadow\"").unwrap();
        assert_eq!(back, DeploymentMode::Shadow);
    }
}
