//! Error types for the promotion controller.

use thiserror::Error;

use toll_core::{DeploymentMode, UnknownMode};
use tollgate_policy::{PolicyCertificate, PolicyReason};

/// Broad class of a rejected request. Callers branch on this to tell
/// bad input from a busy controller from a policy veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    PolicyDenied,
}

/// Every variant is raised before any state is touched.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("traffic fraction must be within [0, 1], got {0}")]
    TrafficOutOfRange(f64),

    #[error("windows must be within [1, {max}], got {got}")]
    InvalidWindows { got: u32, max: u32 },

    #[error("window_seconds must be within [1, {max}], got {got}")]
    InvalidWindowSeconds { got: u64, max: u64 },

    #[error("set mode=canary before adjusting traffic (current mode: {0})")]
    InvalidModeForTraffic(DeploymentMode),

    #[error("candidate count must be at least 1")]
    NoCandidates,

    #[error("candidate count must be at most {max}, got {got}")]
    TooManyCandidates { got: usize, max: usize },

    #[error("promotion already running")]
    PromotionAlreadyRunning,

    #[error("promotion blocked by policy: {reason}")]
    PolicyBlocked {
        reason: PolicyReason,
        certificate: Box<PolicyCertificate>,
    },
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::PromotionAlreadyRunning => ErrorKind::Conflict,
            ControllerError::PolicyBlocked { .. } => ErrorKind::PolicyDenied,
            _ => ErrorKind::Validation,
        }
    }
}

impl From<UnknownMode> for ControllerError {
    fn from(err: UnknownMode) -> Self {
        ControllerError::InvalidMode(err.0)
    }
}

/// Result type alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;
