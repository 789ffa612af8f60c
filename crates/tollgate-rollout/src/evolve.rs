//! Evolve step collaborators — candidate proposals and training runs.
//!
//! The controller only reads the scores these produce. The stub
//! implementations stand in for a real architecture search and trainer.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use toll_core::epoch_millis;

/// Fitness a candidate needs before it may enter shadow mode.
pub const MIN_SHADOW_FITNESS: f64 = 0.80;

/// A proposed candidate with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub structure: serde_json::Value,
    pub fitness: f64,
}

/// Loss trajectory of one training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub steps: u32,
    pub initial_loss: f64,
    pub final_loss: f64,
    pub stable: bool,
}

impl TrainingReport {
    /// Positive when the loss went down.
    pub fn loss_delta(&self) -> f64 {
        self.initial_loss - self.final_loss
    }
}

pub trait CandidateGenerator: Send + Sync {
    fn propose(&self, n: usize) -> Vec<Candidate>;
}

pub trait Trainer: Send + Sync {
    fn train(&self, steps: u32) -> TrainingReport;
}

/// Proposes a fixed conv+attention structure with a random fitness in
/// `[0.70, 0.95]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubGenerator;

impl CandidateGenerator for StubGenerator {
    fn propose(&self, n: usize) -> Vec<Candidate> {
        let now = epoch_millis();
        (0..n)
            .map(|i| Candidate {
                id: format!("cand-{now}-{i}"),
                structure: json!([
                    { "type": "conv", "k": 3, "c": 32 },
                    { "type": "attn", "h": 4 },
                ]),
                fitness: round4(0.70 + 0.25 * unit_random()),
            })
            .collect()
    }
}

/// Loss starts at a random value in `[0.6, 0.9]` and drops 0.02 per
/// step, floored at 0.1.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubTrainer;

impl Trainer for StubTrainer {
    fn train(&self, steps: u32) -> TrainingReport {
        let initial_loss = round4(0.6 + 0.3 * unit_random());
        let final_loss = (initial_loss - f64::from(steps) * 0.02).max(0.1);
        TrainingReport {
            steps,
            initial_loss,
            final_loss: round4(final_loss),
            stable: true,
        }
    }
}

/// Uniform sample in `[0, 1]`.
fn unit_random() -> f64 {
    let mut buf = [0u8; 4];
    if let Err(e) = getrandom::getrandom(&mut buf) {
        warn!(error = %e, "entropy unavailable, using midpoint sample");
        return 0.5;
    }
    f64::from(u32::from_le_bytes(buf)) / f64::from(u32::MAX)
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
