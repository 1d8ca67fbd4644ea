//! Symbol resolver
//!
//! Binds a free-text target hint to a concrete task identity against a
//! snapshot. Matching is tiered and short-circuits at the first tier that
//! yields anything: exact case-insensitive title, bidirectional substring,
//! then shared-token overlap. Zero matches or more than one at the winning
//! tier surface as clarification material, not as hard failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::{Intent, IntentKind, Skeleton, SkeletonKind};
use crate::snapshot::{Snapshot, Task};

/// Why a hint failed to bind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionErrorKind {
    NotFound,
    Ambiguous,
    /// Reserved: hint matched only soft-deleted tasks.
    Deleted,
    /// Reserved: matched task cannot accept the operation.
    InvalidState,
}

/// Resolution failure, carrying everything the caller needs to ask the user
/// a useful follow-up question.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    pub message: String,
    pub hint: String,
    #[serde(default)]
    pub candidates: Vec<Task>,
    pub suggested_question: String,
}

/// A successfully bound skeleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub intent: Intent,
    pub resolved_task: Option<Task>,
}

/// Resolve one skeleton against a snapshot.
///
/// Non-task-referencing kinds pass through unchanged. `SelectTask` with an
/// empty hint is not an error: it binds to "deselect".
pub fn resolve_skeleton(
    skeleton: &Skeleton,
    snapshot: &Snapshot,
) -> Result<Resolution, ResolutionError> {
    let passthrough = |kind: IntentKind| Resolution {
        intent: Intent {
            confidence: skeleton.confidence,
            source: skeleton.source,
            kind,
        },
        resolved_task: None,
    };

    match &skeleton.kind {
        SkeletonKind::CreateTask { tasks } => {
            Ok(passthrough(IntentKind::CreateTask { tasks: tasks.clone() }))
        }
        SkeletonKind::ChangeView { view_mode } => {
            Ok(passthrough(IntentKind::ChangeView { view_mode: *view_mode }))
        }
        SkeletonKind::SetDateFilter { filter } => {
            Ok(passthrough(IntentKind::SetDateFilter { filter: *filter }))
        }
        SkeletonKind::QueryTasks { query } => {
            Ok(passthrough(IntentKind::QueryTasks { query: query.clone() }))
        }
        SkeletonKind::ToggleAssistant { enabled } => {
            Ok(passthrough(IntentKind::ToggleAssistant { enabled: *enabled }))
        }
        SkeletonKind::Undo => Ok(passthrough(IntentKind::Undo)),
        SkeletonKind::RequestClarification { question } => {
            Ok(passthrough(IntentKind::RequestClarification {
                question: question.clone(),
            }))
        }

        SkeletonKind::SelectTask { target_hint } => {
            let hint = target_hint.as_deref().unwrap_or("").trim();
            if hint.is_empty() {
                // Empty selection deselects; nothing to look up.
                return Ok(passthrough(IntentKind::SelectTask { task_id: None }));
            }
            let task = find_target(skeleton, hint, snapshot)?;
            Ok(Resolution {
                intent: Intent {
                    confidence: skeleton.confidence,
                    source: skeleton.source,
                    kind: IntentKind::SelectTask {
                        task_id: Some(task.id.clone()),
                    },
                },
                resolved_task: Some(task),
            })
        }
        SkeletonKind::ChangeStatus { target_hint, status } => {
            let task = require_target(skeleton, target_hint, snapshot)?;
            Ok(Resolution {
                intent: Intent {
                    confidence: skeleton.confidence,
                    source: skeleton.source,
                    kind: IntentKind::ChangeStatus {
                        task_id: task.id.clone(),
                        status: *status,
                    },
                },
                resolved_task: Some(task),
            })
        }
        SkeletonKind::UpdateTask { target_hint, changes } => {
            let task = require_target(skeleton, target_hint, snapshot)?;
            Ok(Resolution {
                intent: Intent {
                    confidence: skeleton.confidence,
                    source: skeleton.source,
                    kind: IntentKind::UpdateTask {
                        task_id: task.id.clone(),
                        changes: changes.clone(),
                    },
                },
                resolved_task: Some(task),
            })
        }
        SkeletonKind::DeleteTask { target_hint } => {
            let task = require_target(skeleton, target_hint, snapshot)?;
            Ok(Resolution {
                intent: Intent {
                    confidence: skeleton.confidence,
                    source: skeleton.source,
                    kind: IntentKind::DeleteTask {
                        task_id: task.id.clone(),
                    },
                },
                resolved_task: Some(task),
            })
        }
        SkeletonKind::RestoreTask { target_hint } => {
            let task = require_target(skeleton, target_hint, snapshot)?;
            Ok(Resolution {
                intent: Intent {
                    confidence: skeleton.confidence,
                    source: skeleton.source,
                    kind: IntentKind::RestoreTask {
                        task_id: task.id.clone(),
                    },
                },
                resolved_task: Some(task),
            })
        }
    }
}

/// Clarification question used when a task-referencing skeleton arrives with
/// no usable hint.
fn empty_hint_question(kind: &SkeletonKind) -> &'static str {
    match kind {
        SkeletonKind::DeleteTask { .. } => "Which task would you like to delete?",
        SkeletonKind::RestoreTask { .. } => "Which task would you like to restore?",
        SkeletonKind::ChangeStatus { .. } | SkeletonKind::UpdateTask { .. } => {
            "Which task would you like to update?"
        }
        _ => "Which task do you mean?",
    }
}

fn require_target(
    skeleton: &Skeleton,
    target_hint: &str,
    snapshot: &Snapshot,
) -> Result<Task, ResolutionError> {
    let hint = target_hint.trim();
    if hint.is_empty() {
        return Err(ResolutionError {
            kind: ResolutionErrorKind::NotFound,
            message: format!("{} requires a target task", skeleton.kind.name()),
            hint: String::new(),
            candidates: vec![],
            suggested_question: empty_hint_question(&skeleton.kind).to_string(),
        });
    }
    find_target(skeleton, hint, snapshot)
}

fn find_target(
    skeleton: &Skeleton,
    hint: &str,
    snapshot: &Snapshot,
) -> Result<Task, ResolutionError> {
    // RestoreTask searches the soft-deleted pool; everything else the active one.
    let pool: Vec<&Task> = if matches!(skeleton.kind, SkeletonKind::RestoreTask { .. }) {
        snapshot.deleted_tasks().collect()
    } else {
        snapshot.active_tasks().collect()
    };

    let matches = match_tiers(hint, &pool);
    match matches.len() {
        0 => Err(ResolutionError {
            kind: ResolutionErrorKind::NotFound,
            message: format!("No task matching '{}'", hint),
            hint: hint.to_string(),
            candidates: vec![],
            suggested_question: format!(
                "I couldn't find a task matching '{}'. Could you be more specific?",
                hint
            ),
        }),
        1 => Ok(matches[0].clone()),
        _ => {
            let mut candidates: Vec<Task> = matches.into_iter().cloned().collect();
            // Presentation order only: the candidate set is exactly the
            // matching tier, sorted by similarity to the hint.
            candidates.sort_by(|a, b| {
                let sa = strsim::jaro_winkler(&a.title.to_lowercase(), &hint.to_lowercase());
                let sb = strsim::jaro_winkler(&b.title.to_lowercase(), &hint.to_lowercase());
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
            let titles: Vec<String> = candidates
                .iter()
                .map(|t| format!("'{}'", t.title))
                .collect();
            Err(ResolutionError {
                kind: ResolutionErrorKind::Ambiguous,
                message: format!("Multiple tasks match '{}'", hint),
                hint: hint.to_string(),
                suggested_question: format!("Which one did you mean: {}?", titles.join(", ")),
                candidates,
            })
        }
    }
}

/// Tiered matching; the first non-empty tier wins.
fn match_tiers<'a>(hint: &str, pool: &[&'a Task]) -> Vec<&'a Task> {
    let hint_lower = hint.to_lowercase();

    let exact: Vec<&Task> = pool
        .iter()
        .filter(|t| t.title.to_lowercase() == hint_lower)
        .copied()
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let substring: Vec<&Task> = pool
        .iter()
        .filter(|t| {
            let title_lower = t.title.to_lowercase();
            title_lower.contains(&hint_lower) || hint_lower.contains(&title_lower)
        })
        .copied()
        .collect();
    if !substring.is_empty() {
        return substring;
    }

    let hint_tokens: Vec<&str> = hint_lower
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .collect();
    pool.iter()
        .filter(|t| {
            let title_lower = t.title.to_lowercase();
            title_lower
                .split_whitespace()
                .filter(|tok| tok.len() > 1)
                .any(|tok| hint_tokens.contains(&tok))
        })
        .copied()
        .collect()
}
