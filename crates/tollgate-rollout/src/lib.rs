//! Tollgate promotion controller — canary windows, promote and rollback.
//!
//! This crate owns the deployment mode state machine. A canary run is
//! observed over a fixed number of windows; every window checks the
//! guard signals and the first red one rolls the deployment back to
//! shadow. A run with every window green is promoted to main.
//!
//! # Components
//!
//! - **`controller`** — Mode state machine, window loop, manual overrides
//! - **`events`** — Bounded append-only event log
//! - **`evolve`** — Candidate generator and trainer collaborators
//! - **`error`** — Controller error taxonomy

pub mod controller;
pub mod error;
pub mod events;
pub mod evolve;

pub use controller::{
    CanaryRequest, CanaryStarted, DeployStatus, EvolveReport, EvolveRequest, ModeChange,
    ModeState, PromotionController, PromotionRun, RunOutcome, GUARD_FAILED, MAX_CANDIDATES,
};
pub use error::{ControllerError, ControllerResult, ErrorKind};
pub use events::{Event, EventKind, EventLog, EVENT_LOG_CAPACITY};
pub use evolve::{
    Candidate, CandidateGenerator, StubGenerator, StubTrainer, Trainer, TrainingReport,
};
