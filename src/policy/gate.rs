//! Risk assessment and policy validation
//!
//! Every plan flows through here before resolution. The gate never executes
//! anything; it grades risk, enforces ceilings, and (when configured) wraps
//! each unconfirmed destructive step in its own confirmation.

use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::plan::{Plan, PlanStep, RiskLevel, SkeletonKind};

/// Derived risk summary for a plan. Never stored; recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub has_destructive: bool,
    pub write_step_count: usize,
    pub total_step_count: usize,
}

/// Machine-readable policy violation codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    TooManySteps,
    TooManyWriteSteps,
    DestructiveWithoutConfirm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub code: ViolationCode,
    pub severity: Severity,
    pub message: String,
}

/// Gate verdict: hard violations block execution, warnings let a normalized
/// plan through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub violations: Vec<PolicyViolation>,
    pub risk: RiskAssessment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_plan: Option<Plan>,
}

impl PolicyReport {
    pub fn is_valid(&self) -> bool {
        !self
            .violations
            .iter()
            .any(|v| v.severity == Severity::Error)
    }
}

/// Per-kind static risk rating.
fn static_risk(kind: &SkeletonKind) -> RiskLevel {
    match kind {
        SkeletonKind::DeleteTask { .. } | SkeletonKind::RestoreTask { .. } => RiskLevel::High,
        SkeletonKind::ChangeStatus { .. }
        | SkeletonKind::UpdateTask { .. }
        | SkeletonKind::CreateTask { .. }
        | SkeletonKind::Undo => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

/// Write steps are exactly the kinds whose static rating is above low.
fn is_write(kind: &SkeletonKind) -> bool {
    static_risk(kind) > RiskLevel::Low
}

/// Visit every step depth-first, branch bodies included.
fn walk_steps<'a>(steps: &'a [PlanStep], f: &mut impl FnMut(&'a PlanStep)) {
    for step in steps {
        f(step);
        match step {
            PlanStep::If { then, otherwise, .. } => {
                walk_steps(then, f);
                if let Some(otherwise) = otherwise {
                    walk_steps(otherwise, f);
                }
            }
            PlanStep::Confirm {
                on_approve,
                on_reject,
                ..
            } => {
                walk_steps(on_approve, f);
                if let Some(on_reject) = on_reject {
                    walk_steps(on_reject, f);
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct StepCounts {
    total: usize,
    writes: usize,
    creates: usize,
    destructive: usize,
    max_static: Option<RiskLevel>,
}

fn count_steps(plan: &Plan) -> StepCounts {
    let mut counts = StepCounts::default();
    walk_steps(&plan.steps, &mut |step| {
        counts.total += 1;
        if let PlanStep::Intent { skeleton } = step {
            let rating = static_risk(&skeleton.kind);
            counts.max_static = Some(counts.max_static.map_or(rating, |m| m.max(rating)));
            if is_write(&skeleton.kind) {
                counts.writes += 1;
            }
            if matches!(skeleton.kind, SkeletonKind::CreateTask { .. }) {
                counts.creates += 1;
            }
            if skeleton.kind.is_destructive() {
                counts.destructive += 1;
            }
        }
    });
    counts
}

/// Grade a plan. High iff a destructive skeleton is reachable anywhere,
/// including inside `if`/`confirm` branches; at least medium for heavy or
/// individually medium-rated plans.
pub fn assess_risk(plan: &Plan) -> RiskAssessment {
    let counts = count_steps(plan);
    let mut level = RiskLevel::Low;
    let mut reasons = Vec::new();

    if counts.destructive > 0 {
        level = RiskLevel::High;
        reasons.push(format!(
            "{} destructive step(s) (DeleteTask/RestoreTask)",
            counts.destructive
        ));
    }
    if counts.writes > 3 {
        level = level.max(RiskLevel::Medium);
        reasons.push(format!("{} write steps exceeds 3", counts.writes));
    }
    if counts.creates > 2 {
        level = level.max(RiskLevel::Medium);
        reasons.push(format!("{} CreateTask steps exceeds 2", counts.creates));
    }
    if counts.max_static >= Some(RiskLevel::Medium) {
        level = level.max(RiskLevel::Medium);
        reasons.push("plan contains individually medium- or high-risk operations".to_string());
    }
    if counts.total > 5 {
        level = level.max(RiskLevel::Medium);
        reasons.push(format!("{} total steps exceeds 5", counts.total));
    }

    RiskAssessment {
        level,
        reasons,
        has_destructive: counts.destructive > 0,
        write_step_count: counts.writes,
        total_step_count: counts.total,
    }
}

/// Enforce ceilings and the destructive-confirmation rule.
///
/// Step-count breaches are hard errors. An unconfirmed destructive step is a
/// warning (with a normalized plan) when auto-injection is on, a hard error
/// otherwise. Injection wraps each destructive step individually, so a plan
/// that is already confirm-wrapped normalizes to itself. Only `onApprove`
/// counts as confirmed; a destructive step inside `onReject` is always a
/// hard error since it would run on the user's "no".
pub fn validate_policy(plan: &Plan, config: &PolicyConfig) -> PolicyReport {
    let risk = assess_risk(plan);
    let mut violations = Vec::new();
    let mut normalized_plan = None;

    if risk.total_step_count > config.max_steps {
        violations.push(PolicyViolation {
            code: ViolationCode::TooManySteps,
            severity: Severity::Error,
            message: format!(
                "plan has {} steps, limit is {}",
                risk.total_step_count, config.max_steps
            ),
        });
    }
    if risk.write_step_count > config.max_write_steps {
        violations.push(PolicyViolation {
            code: ViolationCode::TooManyWriteSteps,
            severity: Severity::Error,
            message: format!(
                "plan has {} write steps, limit is {}",
                risk.write_step_count, config.max_write_steps
            ),
        });
    }

    if config.require_confirm_for_destructive && destructive_in_reject(&plan.steps) {
        // A rejection branch runs when the user says no; a destructive step
        // there can never be approved, and wrapping it would nest confirms.
        violations.push(PolicyViolation {
            code: ViolationCode::DestructiveWithoutConfirm,
            severity: Severity::Error,
            message: "destructive steps are not allowed inside a rejection branch".to_string(),
        });
    } else if config.require_confirm_for_destructive
        && has_unconfirmed_destructive(&plan.steps, false)
    {
        if config.auto_inject_confirm {
            violations.push(PolicyViolation {
                code: ViolationCode::DestructiveWithoutConfirm,
                severity: Severity::Warning,
                message: "destructive steps were wrapped in confirmation prompts".to_string(),
            });
            let mut plan = plan.clone();
            plan.steps = inject_confirms(plan.steps, false);
            normalized_plan = Some(plan);
        } else {
            violations.push(PolicyViolation {
                code: ViolationCode::DestructiveWithoutConfirm,
                severity: Severity::Error,
                message: "destructive steps require an enclosing confirmation".to_string(),
            });
        }
    }

    PolicyReport {
        violations,
        risk,
        normalized_plan,
    }
}

/// Only `onApprove` counts as confirmed; a rejection branch does not.
fn has_unconfirmed_destructive(steps: &[PlanStep], in_confirm: bool) -> bool {
    steps.iter().any(|step| match step {
        PlanStep::Intent { skeleton } => !in_confirm && skeleton.kind.is_destructive(),
        PlanStep::If { then, otherwise, .. } => {
            has_unconfirmed_destructive(then, in_confirm)
                || otherwise
                    .as_deref()
                    .is_some_and(|steps| has_unconfirmed_destructive(steps, in_confirm))
        }
        PlanStep::Confirm {
            on_approve,
            on_reject,
            ..
        } => {
            has_unconfirmed_destructive(on_approve, true)
                || on_reject
                    .as_deref()
                    .is_some_and(|steps| has_unconfirmed_destructive(steps, false))
        }
        _ => false,
    })
}

/// A destructive skeleton reachable anywhere under an `onReject` branch.
fn destructive_in_reject(steps: &[PlanStep]) -> bool {
    steps.iter().any(|step| match step {
        PlanStep::If { then, otherwise, .. } => {
            destructive_in_reject(then)
                || otherwise.as_deref().is_some_and(destructive_in_reject)
        }
        PlanStep::Confirm {
            on_approve,
            on_reject,
            ..
        } => {
            destructive_in_reject(on_approve)
                || on_reject.as_deref().is_some_and(contains_destructive)
        }
        _ => false,
    })
}

fn contains_destructive(steps: &[PlanStep]) -> bool {
    let mut found = false;
    walk_steps(steps, &mut |step| {
        if let PlanStep::Intent { skeleton } = step {
            if skeleton.kind.is_destructive() {
                found = true;
            }
        }
    });
    found
}

/// Wrap each destructive intent step in its own confirm. Deliberately
/// per-step: one approval per destructive action, never batched.
fn inject_confirms(steps: Vec<PlanStep>, in_confirm: bool) -> Vec<PlanStep> {
    steps
        .into_iter()
        .map(|step| match step {
            PlanStep::Intent { skeleton } if !in_confirm && skeleton.kind.is_destructive() => {
                let message = confirm_message(&skeleton.kind);
                PlanStep::Confirm {
                    message,
                    on_approve: vec![PlanStep::Intent { skeleton }],
                    on_reject: None,
                }
            }
            PlanStep::If {
                cond,
                then,
                otherwise,
            } => PlanStep::If {
                cond,
                then: inject_confirms(then, in_confirm),
                otherwise: otherwise.map(|steps| inject_confirms(steps, in_confirm)),
            },
            PlanStep::Confirm {
                message,
                on_approve,
                on_reject,
            } => PlanStep::Confirm {
                message,
                on_approve: inject_confirms(on_approve, true),
                on_reject: on_reject.map(|steps| inject_confirms(steps, false)),
            },
            other => other,
        })
        .collect()
}

fn confirm_message(kind: &SkeletonKind) -> String {
    match kind {
        SkeletonKind::DeleteTask { target_hint } => {
            format!("Delete the task matching '{}'?", target_hint)
        }
        SkeletonKind::RestoreTask { target_hint } => {
            format!("Restore the task matching '{}'?", target_hint)
        }
        other => format!("Run the {} operation?", other.name()),
    }
}
