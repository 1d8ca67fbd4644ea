//! Preflight
//!
//! Combined policy + resolution pass. A plan either comes out the other side
//! as an [`ExecutablePlan`] with every intent step bound to a real task, or
//! as a [`ClarificationRequest`] the caller turns into a follow-up question.
//! There is no partial success: the first unresolved step anywhere in the
//! tree aborts the whole pass.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PolicyConfig;
use crate::plan::{BoundStep, Plan, PlanStep, Skeleton};
use crate::policy::{validate_policy, RiskAssessment, Severity, ViolationCode};
use crate::resolver::{resolve_skeleton, ResolutionErrorKind};
use crate::snapshot::{Snapshot, Task};

/// Why a plan could not be made executable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClarificationReason {
    AmbiguousTarget,
    NotFound,
    PolicyConfirmRequired,
    TooManySteps,
    /// Produced when a stored confirmation no longer matches the live state.
    VersionConflict,
}

/// A resolution or policy failure surfaced as a question back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationRequest {
    pub reason: ClarificationReason,
    pub message: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_skeleton: Option<Skeleton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step_index: Option<usize>,
}

/// A fully bound plan, ready for the transaction executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutablePlan {
    /// The plan as executed, after any policy normalization.
    pub plan: Plan,
    pub bound_steps: Vec<BoundStep>,
    /// Snapshot fingerprint at bind time (see [`Snapshot::fingerprint`]).
    pub snapshot_version: u64,
    pub risk: RiskAssessment,
}

/// Preflight verdict.
#[derive(Debug, Clone)]
pub enum PreflightOutcome {
    Ready {
        executable: ExecutablePlan,
        warnings: Vec<String>,
    },
    NeedsClarification(ClarificationRequest),
}

/// Run the policy gate, then bind every step depth-first, left to right.
pub fn run_preflight(
    plan: &Plan,
    snapshot: &Snapshot,
    config: &PolicyConfig,
) -> PreflightOutcome {
    debug!(goal = %plan.goal, steps = plan.steps.len(), "preflight start");

    let report = validate_policy(plan, config);
    if let Some(violation) = report
        .violations
        .iter()
        .find(|v| v.severity == Severity::Error)
    {
        let (reason, question) = match violation.code {
            ViolationCode::DestructiveWithoutConfirm => (
                ClarificationReason::PolicyConfirmRequired,
                "This action is destructive and needs your explicit confirmation. Proceed?",
            ),
            ViolationCode::TooManySteps | ViolationCode::TooManyWriteSteps => (
                ClarificationReason::TooManySteps,
                "The request expands into too many steps. Could you split it up?",
            ),
        };
        info!(code = ?violation.code, "preflight blocked by policy");
        return PreflightOutcome::NeedsClarification(ClarificationRequest {
            reason,
            message: violation.message.clone(),
            question: question.to_string(),
            candidates: vec![],
            failed_skeleton: None,
            failed_step_index: None,
        });
    }

    let warnings: Vec<String> = report
        .violations
        .iter()
        .filter(|v| v.severity == Severity::Warning)
        .map(|v| v.message.clone())
        .collect();

    // Execute the normalized plan when the gate rewrote it.
    let effective = report.normalized_plan.unwrap_or_else(|| plan.clone());

    let mut index = 0usize;
    match bind_steps(&effective.steps, snapshot, &mut index) {
        Ok(bound_steps) => {
            let executable = ExecutablePlan {
                snapshot_version: snapshot.fingerprint(),
                risk: report.risk,
                plan: effective,
                bound_steps,
            };
            info!(
                steps = index,
                risk = ?executable.risk.level,
                "preflight ready"
            );
            PreflightOutcome::Ready {
                executable,
                warnings,
            }
        }
        Err(request) => {
            info!(reason = ?request.reason, "preflight needs clarification");
            PreflightOutcome::NeedsClarification(*request)
        }
    }
}

fn bind_steps(
    steps: &[PlanStep],
    snapshot: &Snapshot,
    index: &mut usize,
) -> Result<Vec<BoundStep>, Box<ClarificationRequest>> {
    let mut bound = Vec::with_capacity(steps.len());
    for step in steps {
        let step_index = *index;
        *index += 1;
        match step {
            PlanStep::Intent { skeleton } => {
                match resolve_skeleton(skeleton, snapshot) {
                    Ok(resolution) => bound.push(BoundStep::Intent {
                        intent: resolution.intent,
                        skeleton: skeleton.clone(),
                        resolved_task: resolution.resolved_task,
                    }),
                    Err(err) => {
                        let reason = match err.kind {
                            ResolutionErrorKind::Ambiguous => ClarificationReason::AmbiguousTarget,
                            // Reserved kinds collapse to NOT_FOUND for the caller.
                            ResolutionErrorKind::NotFound
                            | ResolutionErrorKind::Deleted
                            | ResolutionErrorKind::InvalidState => ClarificationReason::NotFound,
                        };
                        return Err(Box::new(ClarificationRequest {
                            reason,
                            message: err.message,
                            question: err.suggested_question,
                            candidates: err.candidates,
                            failed_skeleton: Some(skeleton.clone()),
                            failed_step_index: Some(step_index),
                        }));
                    }
                }
            }
            PlanStep::Query { query, assign } => bound.push(BoundStep::Query {
                query: query.clone(),
                assign: assign.clone(),
            }),
            PlanStep::If {
                cond,
                then,
                otherwise,
            } => {
                let then = bind_steps(then, snapshot, index)?;
                let otherwise = match otherwise {
                    Some(steps) => Some(bind_steps(steps, snapshot, index)?),
                    None => None,
                };
                bound.push(BoundStep::If {
                    cond: cond.clone(),
                    then,
                    otherwise,
                });
            }
            PlanStep::Confirm {
                message,
                on_approve,
                on_reject,
            } => {
                let on_approve = bind_steps(on_approve, snapshot, index)?;
                let on_reject = match on_reject {
                    Some(steps) => Some(bind_steps(steps, snapshot, index)?),
                    None => None,
                };
                bound.push(BoundStep::Confirm {
                    message: message.clone(),
                    on_approve,
                    on_reject,
                });
            }
            PlanStep::Note { text } => bound.push(BoundStep::Note { text: text.clone() }),
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Skeleton, SkeletonKind, Source};
    use crate::snapshot::{Priority, TaskStatus, ViewMode};
    use chrono::Utc;

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

    fn snapshot_with(titles: &[(&str, &str)]) -> Snapshot {
        let mut snap = Snapshot::default();
        for (id, title) in titles {
            snap.data.tasks.push(task(id, title));
        }
        snap
    }

    fn intent_step(kind: SkeletonKind) -> PlanStep {
        PlanStep::Intent {
            skeleton: Skeleton {
                confidence: 0.9,
                source: Source::Agent,
                kind,
            },
        }
    }

    fn plan(steps: Vec<PlanStep>) -> Plan {
        Plan {
            version: 1,
            goal: "test".to_string(),
            steps,
            risk: None,
        }
    }

    #[test]
    fn test_ready_plan_stamps_snapshot_version() {
        let snap = snapshot_with(&[("t1", "Report")]);
        let outcome = run_preflight(
            &plan(vec![intent_step(SkeletonKind::ChangeView {
                view_mode: ViewMode::Table,
            })]),
            &snap,
            &PolicyConfig::default(),
        );
        match outcome {
            PreflightOutcome::Ready { executable, warnings } => {
                assert!(warnings.is_empty());
                assert_eq!(executable.snapshot_version, snap.fingerprint());
                assert_eq!(executable.bound_steps.len(), 1);
            }
            PreflightOutcome::NeedsClarification(req) => panic!("unexpected: {:?}", req),
        }
    }

    #[test]
    fn test_ambiguous_target_aborts_whole_pass() {
        let snap = snapshot_with(&[("t1", "Report A"), ("t2", "Report B")]);
        let outcome = run_preflight(
            &plan(vec![
                intent_step(SkeletonKind::SelectTask {
                    target_hint: Some("Report".to_string()),
                }),
                intent_step(SkeletonKind::ChangeView {
                    view_mode: ViewMode::Table,
                }),
            ]),
            &snap,
            &PolicyConfig::default(),
        );
        match outcome {
            PreflightOutcome::NeedsClarification(req) => {
                assert_eq!(req.reason, ClarificationReason::AmbiguousTarget);
                assert_eq!(req.candidates.len(), 2);
                assert_eq!(req.failed_step_index, Some(0));
                assert!(req.failed_skeleton.is_some());
            }
            PreflightOutcome::Ready { .. } => panic!("should not resolve"),
        }
    }

    #[test]
    fn test_destructive_step_gets_confirm_wrapped() {
        let snap = snapshot_with(&[("t1", "Report task")]);
        let outcome = run_preflight(
            &plan(vec![intent_step(SkeletonKind::DeleteTask {
                target_hint: "Report".to_string(),
            })]),
            &snap,
            &PolicyConfig::default(),
        );
        match outcome {
            PreflightOutcome::Ready { executable, warnings } => {
                assert_eq!(warnings.len(), 1);
                assert!(matches!(executable.bound_steps[0], BoundStep::Confirm { .. }));
            }
            PreflightOutcome::NeedsClarification(req) => panic!("unexpected: {:?}", req),
        }
    }

    #[test]
    fn test_hard_policy_violation_maps_to_too_many_steps() {
        let steps: Vec<PlanStep> = (0..9)
            .map(|i| PlanStep::Note {
                text: format!("note {}", i),
            })
            .collect();
        let outcome = run_preflight(&plan(steps), &Snapshot::default(), &PolicyConfig::default());
        match outcome {
            PreflightOutcome::NeedsClarification(req) => {
                assert_eq!(req.reason, ClarificationReason::TooManySteps);
                assert!(req.failed_step_index.is_none());
            }
            PreflightOutcome::Ready { .. } => panic!("should be blocked"),
        }
    }

    #[test]
    fn test_strict_config_maps_to_policy_confirm_required() {
        let snap = snapshot_with(&[("t1", "Report task")]);
        let outcome = run_preflight(
            &plan(vec![intent_step(SkeletonKind::DeleteTask {
                target_hint: "Report".to_string(),
            })]),
            &snap,
            &PolicyConfig::strict(),
        );
        match outcome {
            PreflightOutcome::NeedsClarification(req) => {
                assert_eq!(req.reason, ClarificationReason::PolicyConfirmRequired);
            }
            PreflightOutcome::Ready { .. } => panic!("should be blocked"),
        }
    }

    #[test]
    fn test_delete_in_reject_branch_is_blocked() {
        let snap = snapshot_with(&[("t1", "Report task")]);
        let outcome = run_preflight(
            &plan(vec![PlanStep::Confirm {
                message: "Keep the report task?".to_string(),
                on_approve: vec![PlanStep::Note {
                    text: "keeping it".to_string(),
                }],
                on_reject: Some(vec![intent_step(SkeletonKind::DeleteTask {
                    target_hint: "Report".to_string(),
                })]),
            }]),
            &snap,
            &PolicyConfig::default(),
        );
        match outcome {
            PreflightOutcome::NeedsClarification(req) => {
                assert_eq!(req.reason, ClarificationReason::PolicyConfirmRequired);
            }
            PreflightOutcome::Ready { .. } => panic!("should be blocked"),
        }
    }

    #[test]
    fn test_failure_index_counts_nested_steps() {
        let snap = snapshot_with(&[("t1", "Report")]);
        // Step 0 is the if, step 1 the note inside then, step 2 the failing intent.
        let outcome = run_preflight(
            &plan(vec![PlanStep::If {
                cond: crate::plan::Cond::Exists {
                    var: "anything".to_string(),
                },
                then: vec![
                    PlanStep::Note {
                        text: "checking".to_string(),
                    },
                    intent_step(SkeletonKind::DeleteTask {
                        target_hint: "nonexistent".to_string(),
                    }),
                ],
                otherwise: None,
            }]),
            &snap,
            &PolicyConfig::default(),
        );
        match outcome {
            PreflightOutcome::NeedsClarification(req) => {
                assert_eq!(req.reason, ClarificationReason::NotFound);
                // Auto-injection wraps the delete first, adding a confirm
                // level: if(0) > note(1) > confirm(2) > intent(3).
                assert_eq!(req.failed_step_index, Some(3));
            }
            PreflightOutcome::Ready { .. } => panic!("should not resolve"),
        }
    }
}
