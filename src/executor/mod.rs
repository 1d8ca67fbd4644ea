//! Transaction executor
//!
//! Walks an [`ExecutablePlan`]'s bound steps against a private clone of the
//! snapshot. Atomicity is whole-plan: any failure discards every effect,
//! while the step trace survives for diagnostics. A `confirm` step suspends
//! the run by returning [`ConfirmPending`]; the pending value exclusively
//! owns the in-progress context until resumed or discarded.

mod cond;
mod effects;
mod query;

pub use cond::eval_cond;
pub use effects::generate_effect;
pub use query::run_query;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::plan::BoundStep;
use crate::preflight::ExecutablePlan;
use crate::snapshot::{apply_effect, Effect, PatchError, Snapshot};

/// Failures raised while executing a single step.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Task '{task_id}' not found in snapshot")]
    UnknownTask { task_id: String },

    #[error("Condition error: {message}")]
    Cond { message: String },

    #[error("{0}")]
    Serialize(#[from] serde_json::Error),
}

/// Mutable state threaded through a run: the working snapshot clone,
/// variable bindings, accumulated effects, and the step trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub snapshot: Snapshot,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub trace: Vec<StepTrace>,
}

impl TransactionContext {
    fn new(snapshot: &Snapshot) -> Self {
        Self {
            snapshot: snapshot.clone(),
            variables: HashMap::new(),
            effects: Vec::new(),
            trace: Vec::new(),
        }
    }
}

/// Per-step execution record, appended regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTrace {
    pub index: usize,
    pub kind: String,
    #[serde(rename = "startTime")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub effect_count: usize,
}

/// A suspended transaction awaiting a yes/no decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPending {
    pub message: String,
    pub on_approve: Vec<BoundStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_reject: Option<Vec<BoundStep>>,
    /// In-progress context, exclusively owned until resumed or discarded.
    #[serde(rename = "currentContext")]
    pub context: TransactionContext,
    /// Sibling steps after the confirm at its nesting level.
    pub remaining_steps: Vec<BoundStep>,
}

/// Terminal outcome of a run or a resume.
#[derive(Debug, Clone)]
pub enum TransactionResult {
    Success {
        effects: Vec<Effect>,
        final_snapshot: Snapshot,
        trace: Vec<StepTrace>,
        variables: HashMap<String, Value>,
    },
    Failure {
        failed_at: usize,
        step_kind: String,
        error: String,
        /// Always true: effects are discarded wholesale.
        rolled_back: bool,
        /// Always empty; kept in the shape for callers that log it.
        partial_effects: Vec<Effect>,
        trace: Vec<StepTrace>,
    },
    ConfirmPending(Box<ConfirmPending>),
}

struct StepFailure {
    index: usize,
    kind: &'static str,
    error: String,
}

enum StepFlow {
    Continue,
    Suspend(Box<ConfirmPending>),
}

/// Execute a bound plan against a clone of the snapshot.
pub fn execute_plan(executable: &ExecutablePlan, snapshot: &Snapshot) -> TransactionResult {
    debug!(steps = executable.bound_steps.len(), "transaction start");
    let mut ctx = TransactionContext::new(snapshot);
    let mut index = 0usize;
    finish(run_steps(&executable.bound_steps, &mut ctx, &mut index, None), ctx)
}

/// Resume a suspended transaction with the user's decision.
///
/// Runs `onApprove` or `onReject` (absent `onReject` means no-op), then the
/// remaining sibling steps, all in the suspended context. Further confirm
/// steps are not supported during a resume and fail the run.
pub fn continue_after_confirm(pending: ConfirmPending, approved: bool) -> TransactionResult {
    debug!(approved, "transaction resume");
    let mut ctx = pending.context;
    let mut index = ctx.trace.len();

    let branch = if approved {
        pending.on_approve
    } else {
        pending.on_reject.unwrap_or_default()
    };
    let outcome = run_steps(&branch, &mut ctx, &mut index, Some("Nested confirm not supported"))
        .and_then(|_| {
            run_steps(
                &pending.remaining_steps,
                &mut ctx,
                &mut index,
                Some("Multiple confirms not supported"),
            )
        });
    finish(outcome, ctx)
}

fn finish(outcome: Result<StepFlow, StepFailure>, ctx: TransactionContext) -> TransactionResult {
    match outcome {
        Ok(StepFlow::Continue) => {
            info!(effects = ctx.effects.len(), "transaction committed");
            TransactionResult::Success {
                effects: ctx.effects,
                final_snapshot: ctx.snapshot,
                trace: ctx.trace,
                variables: ctx.variables,
            }
        }
        Ok(StepFlow::Suspend(pending)) => {
            info!("transaction suspended on confirm");
            TransactionResult::ConfirmPending(pending)
        }
        Err(failure) => {
            warn!(
                index = failure.index,
                kind = failure.kind,
                error = %failure.error,
                "transaction rolled back"
            );
            TransactionResult::Failure {
                failed_at: failure.index,
                step_kind: failure.kind.to_string(),
                error: failure.error,
                rolled_back: true,
                partial_effects: vec![],
                trace: ctx.trace,
            }
        }
    }
}

/// Run steps in order. `deny_confirm` carries the failure message to use when
/// a confirm step is illegal in the current phase (resume only).
fn run_steps(
    steps: &[BoundStep],
    ctx: &mut TransactionContext,
    index: &mut usize,
    deny_confirm: Option<&'static str>,
) -> Result<StepFlow, StepFailure> {
    for (pos, step) in steps.iter().enumerate() {
        let step_index = *index;
        *index += 1;
        let started_at = Utc::now();
        let kind = step.kind_name();

        let record = |ctx: &mut TransactionContext, success, error: Option<String>, effects| {
            ctx.trace.push(StepTrace {
                index: step_index,
                kind: kind.to_string(),
                started_at,
                finished_at: Utc::now(),
                success,
                error,
                effect_count: effects,
            });
        };

        match step {
            BoundStep::Intent { intent, .. } => {
                match generate_effect(&intent.kind, &ctx.snapshot) {
                    Ok(Some(effect)) => {
                        if let Err(e) = apply_effect(&mut ctx.snapshot, &effect) {
                            record(ctx, false, Some(e.to_string()), 0);
                            return Err(StepFailure {
                                index: step_index,
                                kind,
                                error: e.to_string(),
                            });
                        }
                        ctx.effects.push(effect);
                        record(ctx, true, None, 1);
                    }
                    Ok(None) => record(ctx, true, None, 0),
                    Err(e) => {
                        record(ctx, false, Some(e.to_string()), 0);
                        return Err(StepFailure {
                            index: step_index,
                            kind,
                            error: e.to_string(),
                        });
                    }
                }
            }
            BoundStep::Query { query, assign } => {
                let result = run_query(query, &ctx.snapshot);
                if let Some(name) = assign {
                    ctx.variables.insert(name.clone(), result);
                }
                record(ctx, true, None, 0);
            }
            BoundStep::If {
                cond,
                then,
                otherwise,
            } => {
                let taken = match eval_cond(cond, &ctx.variables) {
                    Ok(v) => v,
                    Err(e) => {
                        record(ctx, false, Some(e.to_string()), 0);
                        return Err(StepFailure {
                            index: step_index,
                            kind,
                            error: e.to_string(),
                        });
                    }
                };
                record(ctx, true, None, 0);
                let branch: &[BoundStep] = if taken {
                    then
                } else {
                    otherwise.as_deref().unwrap_or(&[])
                };
                // A suspension inside the branch drops this level's
                // continuation; only the confirm's own siblings resume.
                if let StepFlow::Suspend(pending) =
                    run_steps(branch, ctx, index, deny_confirm)?
                {
                    return Ok(StepFlow::Suspend(pending));
                }
            }
            BoundStep::Confirm {
                message,
                on_approve,
                on_reject,
            } => {
                if let Some(error) = deny_confirm {
                    record(ctx, false, Some(error.to_string()), 0);
                    return Err(StepFailure {
                        index: step_index,
                        kind,
                        error: error.to_string(),
                    });
                }
                record(ctx, true, None, 0);
                return Ok(StepFlow::Suspend(Box::new(ConfirmPending {
                    message: message.clone(),
                    on_approve: on_approve.clone(),
                    on_reject: on_reject.clone(),
                    remaining_steps: steps[pos + 1..].to_vec(),
                    context: ctx.clone(),
                })));
            }
            BoundStep::Note { .. } => record(ctx, true, None, 0),
        }
    }
    Ok(StepFlow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{
        Cond, Intent, IntentKind, Operand, QueryFilter, QueryOp, QuerySpec, Skeleton, SkeletonKind,
        Source,
    };
    use crate::policy::assess_risk;
    use crate::plan::Plan;
    use crate::snapshot::{Priority, Task, TaskStatus, ViewMode};
    use serde_json::json;

    fn task(id: &str, title: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: title.to_string(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            tags: vec![],
            due_date: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn bound_intent(kind: IntentKind) -> BoundStep {
        let skeleton_kind = match &kind {
            IntentKind::ChangeView { view_mode } => SkeletonKind::ChangeView {
                view_mode: *view_mode,
            },
            _ => SkeletonKind::Undo,
        };
        BoundStep::Intent {
            intent: Intent {
                confidence: 0.9,
                source: Source::Agent,
                kind,
            },
            skeleton: Skeleton {
                confidence: 0.9,
                source: Source::Agent,
                kind: skeleton_kind,
            },
            resolved_task: None,
        }
    }

    fn executable(bound_steps: Vec<BoundStep>, snapshot: &Snapshot) -> ExecutablePlan {
        let plan = Plan {
            version: 1,
            goal: "test".to_string(),
            steps: vec![],
            risk: None,
        };
        ExecutablePlan {
            risk: assess_risk(&plan),
            plan,
            bound_steps,
            snapshot_version: snapshot.fingerprint(),
        }
    }

    #[test]
    fn test_empty_plan_is_identity() {
        let snap = Snapshot::default();
        match execute_plan(&executable(vec![], &snap), &snap) {
            TransactionResult::Success {
                effects,
                final_snapshot,
                trace,
                variables,
            } => {
                assert!(effects.is_empty());
                assert_eq!(final_snapshot, snap);
                assert!(trace.is_empty());
                assert!(variables.is_empty());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_caller_snapshot_untouched() {
        let mut snap = Snapshot::default();
        snap.data.tasks.push(task("t1", "Report"));
        let steps = vec![bound_intent(IntentKind::ChangeView {
            view_mode: ViewMode::Table,
        })];
        match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::Success { final_snapshot, effects, .. } => {
                assert_eq!(final_snapshot.state.view_mode, ViewMode::Table);
                assert_eq!(effects.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(snap.state.view_mode, ViewMode::List);
    }

    #[test]
    fn test_failure_discards_all_effects() {
        let snap = Snapshot::default();
        let steps = vec![
            bound_intent(IntentKind::ChangeView {
                view_mode: ViewMode::Table,
            }),
            bound_intent(IntentKind::DeleteTask {
                task_id: "ghost".to_string(),
            }),
        ];
        match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::Failure {
                failed_at,
                step_kind,
                rolled_back,
                partial_effects,
                trace,
                ..
            } => {
                assert_eq!(failed_at, 1);
                assert_eq!(step_kind, "intent");
                assert!(rolled_back);
                assert!(partial_effects.is_empty());
                assert_eq!(trace.len(), 2);
                assert!(trace[0].success);
                assert!(!trace[1].success);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_query_binds_variable_and_if_branches() {
        let mut snap = Snapshot::default();
        snap.data.tasks.push(task("t1", "Alpha"));
        snap.data.tasks.push(task("t2", "Beta"));
        let steps = vec![
            BoundStep::Query {
                query: QuerySpec {
                    op: QueryOp::CountTasks,
                    filter: QueryFilter::default(),
                    limit: None,
                },
                assign: Some("count".to_string()),
            },
            BoundStep::If {
                cond: Cond::Eq {
                    left: Operand::Var {
                        var: "count".to_string(),
                    },
                    right: Operand::Lit(json!(2)),
                },
                then: vec![bound_intent(IntentKind::ChangeView {
                    view_mode: ViewMode::Table,
                })],
                otherwise: None,
            },
        ];
        match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::Success {
                final_snapshot,
                variables,
                trace,
                ..
            } => {
                assert_eq!(final_snapshot.state.view_mode, ViewMode::Table);
                assert_eq!(variables["count"], json!(2));
                assert_eq!(trace.len(), 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_confirm_suspends_with_siblings_only() {
        let snap = Snapshot::default();
        let steps = vec![
            BoundStep::Note {
                text: "before".to_string(),
            },
            BoundStep::Confirm {
                message: "Proceed?".to_string(),
                on_approve: vec![bound_intent(IntentKind::ChangeView {
                    view_mode: ViewMode::Board,
                })],
                on_reject: None,
            },
            BoundStep::Note {
                text: "after".to_string(),
            },
        ];
        let pending = match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::ConfirmPending(p) => p,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(pending.message, "Proceed?");
        assert_eq!(pending.remaining_steps.len(), 1);
        assert_eq!(pending.context.trace.len(), 2);

        match continue_after_confirm(*pending, true) {
            TransactionResult::Success {
                final_snapshot,
                trace,
                ..
            } => {
                assert_eq!(final_snapshot.state.view_mode, ViewMode::Board);
                assert_eq!(trace.len(), 4);
                assert_eq!(trace[3].kind, "note");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reject_without_branch_runs_remaining_only() {
        let snap = Snapshot::default();
        let steps = vec![
            BoundStep::Confirm {
                message: "Proceed?".to_string(),
                on_approve: vec![bound_intent(IntentKind::ChangeView {
                    view_mode: ViewMode::Board,
                })],
                on_reject: None,
            },
            BoundStep::Note {
                text: "after".to_string(),
            },
        ];
        let pending = match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::ConfirmPending(p) => p,
            other => panic!("unexpected: {:?}", other),
        };
        match continue_after_confirm(*pending, false) {
            TransactionResult::Success {
                effects,
                final_snapshot,
                ..
            } => {
                assert!(effects.is_empty());
                assert_eq!(final_snapshot.state.view_mode, ViewMode::List);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_confirm_during_resume_fails() {
        let snap = Snapshot::default();
        let inner_confirm = BoundStep::Confirm {
            message: "again?".to_string(),
            on_approve: vec![],
            on_reject: None,
        };
        let steps = vec![
            BoundStep::Confirm {
                message: "Proceed?".to_string(),
                on_approve: vec![inner_confirm.clone()],
                on_reject: None,
            },
            inner_confirm,
        ];
        let pending = match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::ConfirmPending(p) => p,
            other => panic!("unexpected: {:?}", other),
        };
        match continue_after_confirm(*pending, true) {
            TransactionResult::Failure { error, .. } => {
                assert_eq!(error, "Nested confirm not supported");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_confirm_in_remaining_steps_fails_resume() {
        let snap = Snapshot::default();
        let steps = vec![
            BoundStep::Confirm {
                message: "Proceed?".to_string(),
                on_approve: vec![],
                on_reject: None,
            },
            BoundStep::Confirm {
                message: "again?".to_string(),
                on_approve: vec![],
                on_reject: None,
            },
        ];
        let pending = match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::ConfirmPending(p) => p,
            other => panic!("unexpected: {:?}", other),
        };
        match continue_after_confirm(*pending, true) {
            TransactionResult::Failure { error, .. } => {
                assert_eq!(error, "Multiple confirms not supported");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_trace_and_pending_wire_shape() {
        let snap = Snapshot::default();
        let steps = vec![
            BoundStep::Note {
                text: "before".to_string(),
            },
            BoundStep::Confirm {
                message: "Proceed?".to_string(),
                on_approve: vec![],
                on_reject: None,
            },
        ];
        let pending = match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::ConfirmPending(p) => p,
            other => panic!("unexpected: {:?}", other),
        };
        let wire = serde_json::to_value(&*pending).unwrap();
        assert!(wire.get("currentContext").is_some());
        assert!(wire.get("context").is_none());
        let trace = &wire["currentContext"]["trace"][0];
        assert!(trace.get("startTime").is_some());
        assert!(trace.get("endTime").is_some());
        assert!(trace.get("startedAt").is_none());
    }

    #[test]
    fn test_suspension_inside_if_drops_outer_continuation() {
        let mut snap = Snapshot::default();
        snap.data.tasks.push(task("t1", "Alpha"));
        let steps = vec![
            BoundStep::Query {
                query: QuerySpec {
                    op: QueryOp::CountTasks,
                    filter: QueryFilter::default(),
                    limit: None,
                },
                assign: Some("count".to_string()),
            },
            BoundStep::If {
                cond: Cond::Gt {
                    left: Operand::Var {
                        var: "count".to_string(),
                    },
                    right: Operand::Lit(json!(0)),
                },
                then: vec![
                    BoundStep::Confirm {
                        message: "inner?".to_string(),
                        on_approve: vec![],
                        on_reject: None,
                    },
                    BoundStep::Note {
                        text: "inner sibling".to_string(),
                    },
                ],
                otherwise: None,
            },
            BoundStep::Note {
                text: "outer".to_string(),
            },
        ];
        let pending = match execute_plan(&executable(steps, &snap), &snap) {
            TransactionResult::ConfirmPending(p) => p,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(pending.remaining_steps.len(), 1);
        assert!(matches!(
            pending.remaining_steps[0],
            BoundStep::Note { ref text } if text == "inner sibling"
        ));
    }
}
