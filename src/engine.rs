//! Plan engine
//!
//! Orchestration facade over validation, preflight, execution and the
//! confirmation session round trip. The caller hands in a raw planner
//! document plus the current snapshot and gets one of four outcomes back.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::PolicyConfig;
use crate::error::CoreError;
use crate::executor::{
    continue_after_confirm, execute_plan, StepTrace, TransactionResult,
};
use crate::plan::{validate_plan, Plan};
use crate::planner::Planner;
use crate::preflight::{
    run_preflight, ClarificationReason, ClarificationRequest, PreflightOutcome,
};
use crate::session::SessionStore;
use crate::snapshot::{Effect, Snapshot};

/// Terminal answer for one engine call.
#[derive(Debug)]
pub enum EngineOutcome {
    Completed {
        effects: Vec<Effect>,
        final_snapshot: Snapshot,
        trace: Vec<StepTrace>,
        variables: HashMap<String, Value>,
        warnings: Vec<String>,
    },
    NeedsClarification(ClarificationRequest),
    AwaitingConfirm {
        session_id: String,
        message: String,
        warnings: Vec<String>,
    },
    Failed {
        failed_at: usize,
        step_kind: String,
        error: String,
        trace: Vec<StepTrace>,
    },
}

/// Validation, preflight, execution and confirmation wiring in one place.
pub struct PlanEngine<S: SessionStore> {
    config: PolicyConfig,
    sessions: S,
}

impl<S: SessionStore> PlanEngine<S> {
    pub fn new(config: PolicyConfig, sessions: S) -> Self {
        Self { config, sessions }
    }

    /// Convenience wrapper that asks the planner first.
    pub async fn run_instruction(
        &self,
        planner: &dyn Planner,
        instruction: &str,
        snapshot: &Snapshot,
    ) -> anyhow::Result<EngineOutcome> {
        let raw = planner.plan(instruction).await?;
        Ok(self.submit(&raw, instruction, snapshot).await?)
    }

    /// Take a raw plan document through validation, preflight and execution.
    pub async fn submit(
        &self,
        raw: &Value,
        instruction: &str,
        snapshot: &Snapshot,
    ) -> Result<EngineOutcome, CoreError> {
        let report = validate_plan(raw);
        if !report.is_valid() {
            let detail = report
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            warn!(%detail, "raw plan rejected");
            return Err(CoreError::InvalidPlan(detail));
        }
        let plan: Plan = serde_json::from_value(raw.clone())?;

        let (executable, warnings) = match run_preflight(&plan, snapshot, &self.config) {
            PreflightOutcome::Ready {
                executable,
                warnings,
            } => (executable, warnings),
            PreflightOutcome::NeedsClarification(request) => {
                return Ok(EngineOutcome::NeedsClarification(request))
            }
        };

        match execute_plan(&executable, snapshot) {
            TransactionResult::ConfirmPending(pending) => {
                let message = pending.message.clone();
                let session_id = self
                    .sessions
                    .create_confirm_session(
                        *pending,
                        instruction.to_string(),
                        snapshot.clone(),
                        executable.plan,
                    )
                    .await
                    .map_err(|e| CoreError::Session(e.to_string()))?;
                info!(%session_id, "awaiting confirmation");
                Ok(EngineOutcome::AwaitingConfirm {
                    session_id,
                    message,
                    warnings,
                })
            }
            result => Ok(settle(result, warnings)),
        }
    }

    /// Resume a parked confirmation with the user's decision.
    ///
    /// The stored session is consumed either way. If the live snapshot no
    /// longer matches the one the plan was bound against, the decision is
    /// refused with a `VERSION_CONFLICT` clarification instead of executing
    /// against stale state.
    pub async fn resume(
        &self,
        session_id: &str,
        approved: bool,
        current: &Snapshot,
    ) -> Result<EngineOutcome, CoreError> {
        let session = self
            .sessions
            .get_confirm_session(session_id)
            .await
            .map_err(|e| CoreError::Session(e.to_string()))?
            .ok_or_else(|| {
                CoreError::Session(format!("unknown or expired session '{session_id}'"))
            })?;
        self.sessions
            .delete_confirm_session(session_id)
            .await
            .map_err(|e| CoreError::Session(e.to_string()))?;

        if current.fingerprint() != session.snapshot.fingerprint() {
            warn!(%session_id, "snapshot changed since confirmation was requested");
            return Ok(EngineOutcome::NeedsClarification(ClarificationRequest {
                reason: ClarificationReason::VersionConflict,
                message: "The task list changed while the confirmation was pending".to_string(),
                question: "The task list changed in the meantime. Should I start over?"
                    .to_string(),
                candidates: vec![],
                failed_skeleton: None,
                failed_step_index: None,
            }));
        }

        Ok(settle(
            continue_after_confirm(session.pending, approved),
            vec![],
        ))
    }
}

fn settle(result: TransactionResult, warnings: Vec<String>) -> EngineOutcome {
    match result {
        TransactionResult::Success {
            effects,
            final_snapshot,
            trace,
            variables,
        } => EngineOutcome::Completed {
            effects,
            final_snapshot,
            trace,
            variables,
            warnings,
        },
        TransactionResult::Failure {
            failed_at,
            step_kind,
            error,
            trace,
            ..
        } => EngineOutcome::Failed {
            failed_at,
            step_kind,
            error,
            trace,
        },
        // Reachable only from a resume, where further confirms already fail
        // inside the executor.
        TransactionResult::ConfirmPending(pending) => EngineOutcome::Failed {
            failed_at: pending.context.trace.len(),
            step_kind: "confirm".to_string(),
            error: "Multiple confirms not supported".to_string(),
            trace: pending.context.trace,
        },
    }
}
