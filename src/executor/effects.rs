//! Deterministic effect generation for bound intents.
//!
//! Each intent kind maps to at most one effect. Task-writing intents also
//! stamp `state.lastModifiedTaskId` (or `state.lastCreatedTaskIds` for
//! creation) so the UI can highlight what just changed.

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::plan::{IntentKind, NewTask, TaskChanges};
use crate::snapshot::{
    Effect, PatchOp, PatchPath, Priority, Snapshot, StateField, Task, TaskField, TaskStatus,
};

use super::ExecError;

/// Generate the effect for one intent against the current snapshot.
/// Read-only intents produce `None`.
pub fn generate_effect(kind: &IntentKind, snapshot: &Snapshot) -> Result<Option<Effect>, ExecError> {
    let effect = match kind {
        IntentKind::ChangeStatus { task_id, status } => {
            require_task(snapshot, task_id)?;
            let mut ops = vec![set_task(task_id, TaskField::Status, to_value(status)?)];
            ops.extend(touch(task_id)?);
            Some(patch(ops))
        }
        IntentKind::UpdateTask { task_id, changes } => {
            require_task(snapshot, task_id)?;
            let mut ops = change_ops(task_id, changes)?;
            ops.extend(touch(task_id)?);
            Some(patch(ops))
        }
        IntentKind::DeleteTask { task_id } => {
            require_task(snapshot, task_id)?;
            Some(patch(vec![PatchOp::Remove {
                path: PatchPath::Tasks,
                value: task_id.clone(),
            }]))
        }
        IntentKind::RestoreTask { task_id } => {
            require_task(snapshot, task_id)?;
            Some(patch(vec![PatchOp::Restore {
                path: PatchPath::Tasks,
                value: task_id.clone(),
            }]))
        }
        IntentKind::SelectTask { task_id } => Some(patch(vec![PatchOp::Set {
            path: PatchPath::State(StateField::SelectedTaskId),
            value: to_value(task_id)?,
        }])),
        IntentKind::CreateTask { tasks } => {
            let mut ops = Vec::with_capacity(tasks.len() + 1);
            let mut ids = Vec::with_capacity(tasks.len());
            for spec in tasks {
                let task = instantiate(spec);
                ids.push(task.id.clone());
                ops.push(PatchOp::Append {
                    path: PatchPath::Tasks,
                    value: task,
                });
            }
            ops.push(PatchOp::Set {
                path: PatchPath::State(StateField::LastCreatedTaskIds),
                value: json!(ids),
            });
            Some(patch(ops))
        }
        IntentKind::ChangeView { view_mode } => Some(patch(vec![PatchOp::Set {
            path: PatchPath::State(StateField::ViewMode),
            value: to_value(view_mode)?,
        }])),
        IntentKind::SetDateFilter { filter } => Some(patch(vec![PatchOp::Set {
            path: PatchPath::State(StateField::DateFilter),
            value: to_value(filter)?,
        }])),
        IntentKind::Undo => Some(Effect::Undo {
            id: Uuid::new_v4().to_string(),
        }),
        // Read-only or conversational kinds change nothing.
        IntentKind::QueryTasks { .. }
        | IntentKind::ToggleAssistant { .. }
        | IntentKind::RequestClarification { .. } => None,
    };
    Ok(effect)
}

fn patch(ops: Vec<PatchOp>) -> Effect {
    Effect::Patch {
        id: Uuid::new_v4().to_string(),
        ops,
    }
}

fn require_task(snapshot: &Snapshot, task_id: &str) -> Result<(), ExecError> {
    if snapshot.task(task_id).is_none() {
        return Err(ExecError::UnknownTask {
            task_id: task_id.to_string(),
        });
    }
    Ok(())
}

fn set_task(task_id: &str, field: TaskField, value: Value) -> PatchOp {
    PatchOp::Set {
        path: PatchPath::TaskField {
            task_id: task_id.to_string(),
            field,
        },
        value,
    }
}

/// `updatedAt` plus the last-modified marker, shared by every task write.
fn touch(task_id: &str) -> Result<Vec<PatchOp>, ExecError> {
    Ok(vec![
        set_task(task_id, TaskField::UpdatedAt, to_value(&Utc::now())?),
        PatchOp::Set {
            path: PatchPath::State(StateField::LastModifiedTaskId),
            value: json!(task_id),
        },
    ])
}

fn change_ops(task_id: &str, changes: &TaskChanges) -> Result<Vec<PatchOp>, ExecError> {
    let mut ops = Vec::new();
    if let Some(ref title) = changes.title {
        ops.push(set_task(task_id, TaskField::Title, json!(title)));
    }
    if let Some(status) = changes.status {
        ops.push(set_task(task_id, TaskField::Status, to_value(&status)?));
    }
    if let Some(priority) = changes.priority {
        ops.push(set_task(task_id, TaskField::Priority, to_value(&priority)?));
    }
    if let Some(due_date) = changes.due_date {
        ops.push(set_task(task_id, TaskField::DueDate, to_value(&due_date)?));
    }
    if let Some(ref tags) = changes.tags {
        ops.push(set_task(task_id, TaskField::Tags, json!(tags)));
    }
    Ok(ops)
}

fn instantiate(spec: &NewTask) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4().to_string(),
        title: spec.title.clone(),
        status: TaskStatus::Todo,
        priority: spec.priority.unwrap_or(Priority::Medium),
        tags: spec.tags.clone(),
        due_date: spec.due_date,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ExecError> {
    serde_json::to_value(value).map_err(ExecError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::apply_effect;

    fn seeded() -> Snapshot {
        let now = Utc::now();
        let mut snap = Snapshot::default();
        snap.data.tasks.push(Task {
            id: "t1".to_string(),
            title: "Report".to_string(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            tags: vec![],
            due_date: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        });
        snap
    }

    #[test]
    fn test_change_view_single_set() {
        let effect = generate_effect(
            &IntentKind::ChangeView {
                view_mode: crate::snapshot::ViewMode::Table,
            },
            &Snapshot::default(),
        )
        .unwrap()
        .unwrap();
        match effect {
            Effect::Patch { ref ops, .. } => {
                assert_eq!(ops.len(), 1);
                assert!(matches!(
                    ops[0],
                    PatchOp::Set {
                        path: PatchPath::State(StateField::ViewMode),
                        ..
                    }
                ));
            }
            Effect::Undo { .. } => panic!("wrong effect"),
        }
    }

    #[test]
    fn test_change_status_touches_task() {
        let mut snap = seeded();
        let before = snap.task("t1").unwrap().updated_at;
        let effect = generate_effect(
            &IntentKind::ChangeStatus {
                task_id: "t1".to_string(),
                status: TaskStatus::Done,
            },
            &snap,
        )
        .unwrap()
        .unwrap();
        apply_effect(&mut snap, &effect).unwrap();
        let task = snap.task("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.updated_at >= before);
        assert_eq!(snap.state.last_modified_task_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_create_stamps_last_created_ids() {
        let mut snap = Snapshot::default();
        let effect = generate_effect(
            &IntentKind::CreateTask {
                tasks: vec![
                    NewTask {
                        title: "One".to_string(),
                        priority: None,
                        due_date: None,
                        tags: vec![],
                    },
                    NewTask {
                        title: "Two".to_string(),
                        priority: Some(Priority::High),
                        due_date: None,
                        tags: vec!["work".to_string()],
                    },
                ],
            },
            &snap,
        )
        .unwrap()
        .unwrap();
        apply_effect(&mut snap, &effect).unwrap();
        assert_eq!(snap.data.tasks.len(), 2);
        assert_eq!(snap.data.tasks[0].status, TaskStatus::Todo);
        assert_eq!(snap.data.tasks[1].priority, Priority::High);
        let created = snap.state.last_created_task_ids.as_ref().unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0], snap.data.tasks[0].id);
    }

    #[test]
    fn test_unknown_task_fails() {
        let result = generate_effect(
            &IntentKind::DeleteTask {
                task_id: "ghost".to_string(),
            },
            &Snapshot::default(),
        );
        assert!(matches!(result, Err(ExecError::UnknownTask { .. })));
    }

    #[test]
    fn test_read_only_kinds_have_no_effect() {
        let snap = Snapshot::default();
        assert!(generate_effect(&IntentKind::QueryTasks { query: None }, &snap)
            .unwrap()
            .is_none());
        assert!(generate_effect(
            &IntentKind::RequestClarification {
                question: "Which task?".to_string()
            },
            &snap
        )
        .unwrap()
        .is_none());
        assert!(
            generate_effect(&IntentKind::ToggleAssistant { enabled: Some(true) }, &snap)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_undo_is_distinct_effect() {
        let effect = generate_effect(&IntentKind::Undo, &Snapshot::default())
            .unwrap()
            .unwrap();
        assert!(matches!(effect, Effect::Undo { .. }));
    }
}
