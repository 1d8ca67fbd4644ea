//! taskplan
//!
//! Plan compilation and transactional execution for a natural-language task
//! assistant. An external planner turns an instruction into a structured
//! plan; this crate validates it, grades its risk, binds its free-text task
//! hints to real task ids, and executes it atomically against a snapshot of
//! application state.
//!
//! Pipeline: raw plan -> [`plan::validate_plan`] -> [`preflight::run_preflight`]
//! -> [`executor::execute_plan`], with suspension on `confirm` steps parked
//! in a [`session::SessionStore`] and resumed through [`engine::PlanEngine`].

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod policy;
pub mod preflight;
pub mod resolver;
pub mod session;
pub mod snapshot;

pub use config::PolicyConfig;
pub use engine::{EngineOutcome, PlanEngine};
pub use error::CoreError;
pub use executor::{
    continue_after_confirm, execute_plan, ConfirmPending, TransactionContext, TransactionResult,
};
pub use plan::{Intent, Plan, PlanStep, Skeleton, SkeletonKind};
pub use preflight::{run_preflight, ClarificationRequest, ExecutablePlan, PreflightOutcome};
pub use resolver::{resolve_skeleton, ResolutionError};
pub use session::{InMemorySessionStore, SessionStore};
pub use snapshot::{Effect, Snapshot, Task};
