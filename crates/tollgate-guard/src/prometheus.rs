//! Prometheus text exposition format.
//!
//! Renders the guard signals as gauges for scraping by a Prometheus
//! server or compatible agent.

use crate::metrics::GuardSnapshot;

/// Render a guard snapshot into Prometheus text format.
pub fn render_prometheus(snapshot: &GuardSnapshot) -> String {
    let gauges = [
        (
            "tollgate_vdot",
            "Lyapunov derivative (must be <= vdot_max).",
            snapshot.lyapunov_derivative,
        ),
        (
            "tollgate_oci",
            "Organizational closure index (must be >= oci_min).",
            snapshot.closure_index,
        ),
        (
            "tollgate_ece",
            "Expected calibration error.",
            snapshot.calibration_error,
        ),
        (
            "tollgate_latency_p95_ms",
            "P95 latency in milliseconds.",
            snapshot.latency_p95_ms,
        ),
        (
            "tollgate_cost_usd_per_hour",
            "Cost per hour in USD.",
            snapshot.cost_per_hour,
        ),
    ];

    let mut out = String::new();
    for (name, help, value) in gauges {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} gauge\n"));
        out.push_str(&format!("{name} {value}\n"));
    }
    out
}
