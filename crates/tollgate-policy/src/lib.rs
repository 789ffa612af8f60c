//! tollgate-policy — the veto applied before a promotion may start.
//!
//! The gate measures an [`EthicsSnapshot`] (nominal values unless an
//! operator forced some), runs a fixed, ordered list of invariant checks
//! against it and returns a single reason together with a certificate
//! recording what was checked.
//!
//! # Check order
//!
//! 1. attestation → `Unattested`
//! 2. E / AI / G bounds and Lyapunov derivative → `Invariant`
//! 3. proven risk → `Risk>0`
//! 4. truth calibration, ecology, consent → `Truth/Eco/Consent`
//! 5. human/earth/machine ordering, safety constraint, fairness → `REU/CBF/Fairness`
//! 6. sacrificial cost floor → `NoSacrificialCost`
//!
//! The first failing check wins, so a caller always sees exactly one reason.

pub mod gate;
pub mod snapshot;

pub use gate::{
    PolicyCertificate, PolicyDecision, PolicyGate, PolicyOutcome, PolicyReason, PolicyThresholds,
    ASSUMPTIONS_ID,
};
pub use snapshot::{EthicsSnapshot, PolicyOverride};
