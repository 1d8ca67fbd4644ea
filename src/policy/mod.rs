//! Policy gate
//!
//! Server-side enforcement of plan-level invariants: risk grading, step
//! ceilings, and mandatory confirmation for destructive operations.

mod gate;

pub use gate::{
    assess_risk, validate_policy, PolicyReport, PolicyViolation, RiskAssessment, Severity,
    ViolationCode,
};
