//! tollgate-guard — the five guard signals watched during a promotion.
//!
//! Holds the current signal values (nominal or operator-forced), checks
//! them against fixed thresholds, and renders them as Prometheus gauges.
//!
//! # Architecture
//!
//! ```text
//! GuardMetrics
//!   ├── set_override() / reset_override() ← operator or test tooling
//!   ├── current_snapshot() → GuardSnapshot
//!   └── run() → periodic publish loop (feeds readiness)
//!
//! GuardThresholds
//!   └── evaluate(&GuardSnapshot) → GuardVerdict
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod evaluator;
pub mod metrics;
pub mod prometheus;

pub use evaluator::{GuardThresholds, GuardVerdict};
pub use metrics::{GuardMetrics, GuardOverride, GuardSnapshot};
pub use prometheus::render_prometheus;
