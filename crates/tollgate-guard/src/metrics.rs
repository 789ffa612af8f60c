//! Guard metrics — the current value of each guard signal.
//!
//! Values come from the nominal defaults unless an operator override is
//! in place. The override and the publish timestamp live behind a single
//! lock, so a snapshot never mixes old and new override fields.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use toll_core::epoch_millis;

/// Point-in-time values for the five guard signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardSnapshot {
    /// Lyapunov derivative proxy. Positive means the system is drifting.
    pub lyapunov_derivative: f64,
    /// Organizational closure index.
    pub closure_index: f64,
    /// Expected calibration error.
    pub calibration_error: f64,
    pub latency_p95_ms: f64,
    pub cost_per_hour: f64,
}

impl GuardSnapshot {
    /// Healthy values used when nothing is forced.
    ///
    /// The closure index is lifted to `oci_min` when the configured floor
    /// is above the usual 0.70.
    pub fn nominal(oci_min: f64) -> Self {
        Self {
            lyapunov_derivative: -0.01,
            closure_index: oci_min.max(0.70),
            calibration_error: 0.03,
            latency_p95_ms: 120.0,
            cost_per_hour: 3.50,
        }
    }
}

/// Partial set of forced guard values. Unset fields keep their nominal value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardOverride {
    #[serde(alias = "vdot", skip_serializing_if = "Option::is_none")]
    pub lyapunov_derivative: Option<f64>,
    #[serde(alias = "oci", skip_serializing_if = "Option::is_none")]
    pub closure_index: Option<f64>,
    #[serde(alias = "ece", skip_serializing_if = "Option::is_none")]
    pub calibration_error: Option<f64>,
    #[serde(alias = "lat95", skip_serializing_if = "Option::is_none")]
    pub latency_p95_ms: Option<f64>,
    #[serde(alias = "cost", skip_serializing_if = "Option::is_none")]
    pub cost_per_hour: Option<f64>,
}

impl GuardOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Take every field `other` sets, keep the rest.
    pub fn merge(&mut self, other: &GuardOverride) {
        if other.lyapunov_derivative.is_some() {
            self.lyapunov_derivative = other.lyapunov_derivative;
        }
        if other.closure_index.is_some() {
            self.closure_index = other.closure_index;
        }
        if other.calibration_error.is_some() {
            self.calibration_error = other.calibration_error;
        }
        if other.latency_p95_ms.is_some() {
            self.latency_p95_ms = other.latency_p95_ms;
        }
        if other.cost_per_hour.is_some() {
            self.cost_per_hour = other.cost_per_hour;
        }
    }

    /// Overlay the forced fields onto `base`.
    pub fn apply(&self, base: GuardSnapshot) -> GuardSnapshot {
        GuardSnapshot {
            lyapunov_derivative: self.lyapunov_derivative.unwrap_or(base.lyapunov_derivative),
            closure_index: self.closure_index.unwrap_or(base.closure_index),
            calibration_error: self.calibration_error.unwrap_or(base.calibration_error),
            latency_p95_ms: self.latency_p95_ms.unwrap_or(base.latency_p95_ms),
            cost_per_hour: self.cost_per_hour.unwrap_or(base.cost_per_hour),
        }
    }
}

struct GuardState {
    overrides: Option<GuardOverride>,
    /// Epoch millis of the last publish tick.
    last_published_ms: u64,
}

/// Shared handle to the guard signal values.
#[derive(Clone)]
pub struct GuardMetrics {
    state: Arc<RwLock<GuardState>>,
    nominal: GuardSnapshot,
}

impl GuardMetrics {
    /// Create guard metrics seeded with nominal values.
    ///
    /// The publish timestamp starts at construction time so a freshly
    /// started controller reports ready before the first tick.
    pub fn new(oci_min: f64) -> Self {
        Self {
            state: Arc::new(RwLock::new(GuardState {
                overrides: None,
                last_published_ms: epoch_millis(),
            })),
            nominal: GuardSnapshot::nominal(oci_min),
        }
    }

    pub fn nominal(&self) -> GuardSnapshot {
        self.nominal
    }

    /// Merge forced values into the current override and return the result.
    pub async fn set_override(&self, forced: GuardOverride) -> GuardOverride {
        let mut state = self.state.write().await;
        let merged = {
            let current = state.overrides.get_or_insert_with(GuardOverride::default);
            current.merge(&forced);
            *current
        };
        state.last_published_ms = epoch_millis();
        info!(overrides = ?merged, "guard override applied");
        merged
    }

    /// Drop every forced value. The next snapshot is nominal.
    pub async fn reset_override(&self) {
        let mut state = self.state.write().await;
        state.overrides = None;
        state.last_published_ms = epoch_millis();
        info!("guard override cleared");
    }

    pub async fn current_override(&self) -> Option<GuardOverride> {
        self.state.read().await.overrides
    }

    pub async fn current_snapshot(&self) -> GuardSnapshot {
        let state = self.state.read().await;
        match &state.overrides {
            Some(forced) => forced.apply(self.nominal),
            None => self.nominal,
        }
    }

    /// Refresh the published values and stamp the publish time.
    pub async fn publish(&self) -> GuardSnapshot {
        let mut state = self.state.write().await;
        state.last_published_ms = epoch_millis();
        let snapshot = match &state.overrides {
            Some(forced) => forced.apply(self.nominal),
            None => self.nominal,
        };
        debug!(?snapshot, "guard signals published");
        snapshot
    }

    /// Milliseconds since the last publish tick.
    pub async fn publish_age_ms(&self) -> u64 {
        let last = self.state.read().await.last_published_ms;
        epoch_millis().saturating_sub(last)
    }

    /// Run the publish loop until shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "guard publisher started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.publish().await;
                }
                _ = shutdown.changed() => {
                    info!("guard publisher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nominal_without_override() {
        let metrics = GuardMetrics::new(0.6);
        let snap = metrics.current_snapshot().await;
        assert_eq!(snap, GuardSnapshot::nominal(0.6));
        assert_eq!(snap.closure_index, 0.70);
        assert!(metrics.current_override().await.is_none());
    }

    #[test]
    fn nominal_closure_index_follows_high_floor() {
        assert_eq!(GuardSnapshot::nominal(0.85).closure_index, 0.85);
    }

    #[tokio::test]
    async fn override_merges_fields() {
        let metrics = GuardMetrics::new(0.6);
        metrics
            .set_override(GuardOverride {
                lyapunov_derivative: Some(0.05),
                ..Default::default()
            })
            .await;
        let merged = metrics
            .set_override(GuardOverride {
                latency_p95_ms: Some(900.0),
                ..Default::default()
            })
            .await;

        assert_eq!(merged.lyapunov_derivative, Some(0.05));
        assert_eq!(merged.latency_p95_ms, Some(900.0));

        let snap = metrics.current_snapshot().await;
        assert_eq!(snap.lyapunov_derivative, 0.05);
        assert_eq!(snap.latency_p95_ms, 900.0);
        // Untouched fields stay nominal.
        assert_eq!(snap.cost_per_hour, 3.50);
    }

    #[tokio::test]
    async fn later_value_replaces_earlier_one() {
        let metrics = GuardMetrics::new(0.6);
        for v in [0.2, 0.4] {
            metrics
                .set_override(GuardOverride {
                    calibration_error: Some(v),
                    ..Default::default()
                })
                .await;
        }
        assert_eq!(metrics.current_snapshot().await.calibration_error, 0.4);
    }

    #[tokio::test]
    async fn reset_restores_nominal() {
        let metrics = GuardMetrics::new(0.6);
        metrics
            .set_override(GuardOverride {
                cost_per_hour: Some(50.0),
                ..Default::default()
            })
            .await;
        metrics.reset_override().await;
        assert_eq!(metrics.current_snapshot().await, metrics.nominal());
        assert!(metrics.current_override().await.is_none());
    }

    #[test]
    fn override_accepts_short_names() {
        let forced: GuardOverride =
            serde_json::from_str(r#"{"vdot": 0.05, "lat95": 800}"#).unwrap();
        assert_eq!(forced.lyapunov_derivative, Some(0.05));
        assert_eq!(forced.latency_p95_ms, Some(800.0));
        assert!(forced.closure_index.is_none());
        assert!(!forced.is_empty());
        assert!(GuardOverride::default().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn publish_loop_stops_on_shutdown() {
        let metrics = GuardMetrics::new(0.6);
        let (tx, rx) = watch::channel(false);
        let runner = metrics.clone();
        let handle = tokio::spawn(async move {
            runner.run(Duration::from_secs(2), rx).await;
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
