//! Guard evaluation — compare a snapshot against fixed bounds.

use serde::{Deserialize, Serialize};

use toll_core::GuardConfig;

use crate::metrics::GuardSnapshot;

/// Bounds for the five guard signals. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardThresholds {
    pub vdot_max: f64,
    pub oci_min: f64,
    pub ece_max: f64,
    pub latency_max_ms: f64,
    pub cost_max_per_hour: f64,
}

impl Default for GuardThresholds {
    fn default() -> Self {
        Self::from(&GuardConfig::default())
    }
}

impl From<&GuardConfig> for GuardThresholds {
    fn from(cfg: &GuardConfig) -> Self {
        Self {
            vdot_max: cfg.vdot_max,
            oci_min: cfg.oci_min,
            ece_max: cfg.ece_max,
            latency_max_ms: cfg.latency_max_ms,
            cost_max_per_hour: cfg.cost_max_per_hour,
        }
    }
}

/// Per-signal pass/fail plus the combined verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub vdot_ok: bool,
    pub oci_ok: bool,
    pub ece_ok: bool,
    pub lat_ok: bool,
    pub cost_ok: bool,
    pub all_green: bool,
}

impl GuardThresholds {
    /// Check every signal. NaN compares false, so it fails its check.
    pub fn evaluate(&self, snapshot: &GuardSnapshot) -> GuardVerdict {
        let vdot_ok = snapshot.lyapunov_derivative <= self.vdot_max;
        let oci_ok = snapshot.closure_index >= self.oci_min;
        let ece_ok = snapshot.calibration_error <= self.ece_max;
        let lat_ok = snapshot.latency_p95_ms <= self.latency_max_ms;
        let cost_ok = snapshot.cost_per_hour <= self.cost_max_per_hour;

        GuardVerdict {
            vdot_ok,
            oci_ok,
            ece_ok,
            lat_ok,
            cost_ok,
            all_green: vdot_ok && oci_ok && ece_ok && lat_ok && cost_ok,
        }
    }
}

impl GuardVerdict {
    /// Names of the checks that failed, in evaluation order.
    pub fn failing(&self) -> Vec<&'static str> {
        [
            ("vdot", self.vdot_ok),
            ("oci", self.oci_ok),
            ("ece", self.ece_ok),
            ("lat", self.lat_ok),
            ("cost", self.cost_ok),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::GuardOverride;

    fn nominal() -> GuardSnapshot {
        GuardSnapshot::nominal(0.6)
    }

    #[test]
    fn nominal_is_all_green() {
        let verdict = GuardThresholds::default().evaluate(&nominal());
        assert!(verdict.all_green);
        assert!(verdict.failing().is_empty());
    }

    #[test]
    fn each_signal_can_fail_alone() {
        let thresholds = GuardThresholds::default();
        let cases: [(fn(&mut GuardOverride), &str); 5] = [
            (|o| o.lyapunov_derivative = Some(0.05), "vdot"),
            (|o| o.closure_index = Some(0.3), "oci"),
            (|o| o.calibration_error = Some(0.2), "ece"),
            (|o| o.latency_p95_ms = Some(501.0), "lat"),
            (|o| o.cost_per_hour = Some(12.0), "cost"),
        ];

        for (set, name) in cases {
            let mut forced = GuardOverride::default();
            set(&mut forced);
            let verdict = thresholds.evaluate(&forced.apply(nominal()));
            assert!(!verdict.all_green, "{name} should turn the verdict red");
            assert_eq!(verdict.failing(), vec![name]);
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let thresholds = GuardThresholds::default();
        let snap = GuardSnapshot {
            lyapunov_derivative: 0.0,
            closure_index: 0.6,
            calibration_error: 0.05,
            latency_p95_ms: 500.0,
            cost_per_hour: 10.0,
        };
        assert!(thresholds.evaluate(&snap).all_green);
    }

    #[test]
    fn nan_fails_its_check() {
        let mut snap = nominal();
        snap.closure_index = f64::NAN;
        let verdict = GuardThresholds::default().evaluate(&snap);
        assert!(!verdict.oci_ok);
        assert!(!verdict.all_green);
        assert!(verdict.vdot_ok && verdict.ece_ok && verdict.lat_ok && verdict.cost_ok);
    }

    #[test]
    fn all_green_matches_conjunction() {
        let thresholds = GuardThresholds::default();
        let values = [-1.0, 0.0, 0.04, 0.06, 0.7, 120.0, 499.0, 600.0, 9.0, 11.0];
        for &a in &values {
            for &b in &values {
                let snap = GuardSnapshot {
                    lyapunov_derivative: a,
                    closure_index: b,
                    calibration_error: a.abs() / 10.0,
                    latency_p95_ms: b * 100.0,
                    cost_per_hour: a + b,
                };
                let v = thresholds.evaluate(&snap);
                assert_eq!(v.all_green, v.vdot_ok && v.oci_ok && v.ece_ok && v.lat_ok && v.cost_ok);
            }
        }
    }

    #[test]
    fn thresholds_follow_config() {
        let cfg = GuardConfig {
            vdot_max: 0.1,
            ..Default::default()
        };
        let thresholds = GuardThresholds::from(&cfg);
        let mut snap = nominal();
        snap.lyapunov_derivative = 0.05;
        assert!(thresholds.evaluate(&snap).all_green);
    }
}
