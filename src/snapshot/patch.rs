//! Effects and patch operations
//!
//! Effects are the only way state changes are described. A patch effect is a
//! batch of ops produced by one intent; applying it advances a snapshot.
//! Paths are typed (state field, per-task field, or the task list itself) and
//! serialize to the dotted wire form (`state.viewMode`,
//! `data.tasks.id:<taskId>.<field>`, `data.tasks`).

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::{Snapshot, Task, TaskId};

/// Errors raised while parsing or applying patch operations.
#[derive(Debug, Clone, Error)]
pub enum PatchError {
    #[error("Unknown patch path '{path}'")]
    BadPath { path: String },

    #[error("Task '{task_id}' not found in snapshot")]
    UnknownTask { task_id: TaskId },

    #[error("Value at '{path}' has the wrong shape: {detail}")]
    TypeMismatch { path: String, detail: String },
}

/// Addressable fields of the UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    ViewMode,
    DateFilter,
    SelectedTaskId,
    LastCreatedTaskIds,
    LastModifiedTaskId,
}

impl StateField {
    fn as_str(self) -> &'static str {
        match self {
            StateField::ViewMode => "viewMode",
            StateField::DateFilter => "dateFilter",
            StateField::SelectedTaskId => "selectedTaskId",
            StateField::LastCreatedTaskIds => "lastCreatedTaskIds",
            StateField::LastModifiedTaskId => "lastModifiedTaskId",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "viewMode" => Some(StateField::ViewMode),
            "dateFilter" => Some(StateField::DateFilter),
            "selectedTaskId" => Some(StateField::SelectedTaskId),
            "lastCreatedTaskIds" => Some(StateField::LastCreatedTaskIds),
            "lastModifiedTaskId" => Some(StateField::LastModifiedTaskId),
            _ => None,
        }
    }
}

/// Addressable fields of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Title,
    Status,
    Priority,
    Tags,
    DueDate,
    UpdatedAt,
    DeletedAt,
}

impl TaskField {
    fn as_str(self) -> &'static str {
        match self {
            TaskField::Title => "title",
            TaskField::Status => "status",
            TaskField::Priority => "priority",
            TaskField::Tags => "tags",
            TaskField::DueDate => "dueDate",
            TaskField::UpdatedAt => "updatedAt",
            TaskField::DeletedAt => "deletedAt",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(TaskField::Title),
            "status" => Some(TaskField::Status),
            "priority" => Some(TaskField::Priority),
            "tags" => Some(TaskField::Tags),
            "dueDate" => Some(TaskField::DueDate),
            "updatedAt" => Some(TaskField::UpdatedAt),
            "deletedAt" => Some(TaskField::DeletedAt),
            _ => None,
        }
    }
}

/// A typed patch target. The wire form stays string-addressed for
/// compatibility, but inside the engine the task id and field are explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchPath {
    /// `state.<field>`
    State(StateField),
    /// `data.tasks.id:<taskId>.<field>`
    TaskField { task_id: TaskId, field: TaskField },
    /// `data.tasks`
    Tasks,
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchPath::State(field) => write!(f, "state.{}", field.as_str()),
            PatchPath::TaskField { task_id, field } => {
                write!(f, "data.tasks.id:{}.{}", task_id, field.as_str())
            }
            PatchPath::Tasks => write!(f, "data.tasks"),
        }
    }
}

impl FromStr for PatchPath {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "data.tasks" {
            return Ok(PatchPath::Tasks);
        }
        if let Some(rest) = s.strip_prefix("state.") {
            if let Some(field) = StateField::parse(rest) {
                return Ok(PatchPath::State(field));
            }
        }
        if let Some(rest) = s.strip_prefix("data.tasks.id:") {
            if let Some((id, field)) = rest.rsplit_once('.') {
                if let Some(field) = TaskField::parse(field) {
                    return Ok(PatchPath::TaskField {
                        task_id: id.to_string(),
                        field,
                    });
                }
            }
        }
        Err(PatchError::BadPath {
            path: s.to_string(),
        })
    }
}

impl Serialize for PatchPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PatchPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One mutation inside a patch effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Overwrite a state or task field.
    Set {
        path: PatchPath,
        value: serde_json::Value,
    },
    /// Append a freshly created task to `data.tasks`.
    Append { path: PatchPath, value: Task },
    /// Soft-delete the task with the given id.
    Remove { path: PatchPath, value: TaskId },
    /// Clear the soft-delete marker on the task with the given id.
    Restore { path: PatchPath, value: TaskId },
}

/// A state change produced by executing one intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Effect {
    #[serde(rename = "snapshot.patch")]
    Patch { id: String, ops: Vec<PatchOp> },
    /// History pop, delegated to an external collaborator; the core records
    /// it but does not interpret it.
    #[serde(rename = "snapshot.undo")]
    Undo { id: String },
}

/// Apply a single patch op to a snapshot.
pub fn apply_op(snapshot: &mut Snapshot, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::Set { path, value } => apply_set(snapshot, path, value),
        PatchOp::Append { path, value } => match path {
            PatchPath::Tasks => {
                snapshot.data.tasks.push(value.clone());
                Ok(())
            }
            other => Err(PatchError::BadPath {
                path: other.to_string(),
            }),
        },
        PatchOp::Remove { path, value } => match path {
            PatchPath::Tasks => {
                let task = snapshot
                    .task_mut(value)
                    .ok_or_else(|| PatchError::UnknownTask {
                        task_id: value.clone(),
                    })?;
                task.deleted_at = Some(Utc::now());
                Ok(())
            }
            other => Err(PatchError::BadPath {
                path: other.to_string(),
            }),
        },
        PatchOp::Restore { path, value } => match path {
            PatchPath::Tasks => {
                let now = Utc::now();
                let task = snapshot
                    .task_mut(value)
                    .ok_or_else(|| PatchError::UnknownTask {
                        task_id: value.clone(),
                    })?;
                task.deleted_at = None;
                task.updated_at = now;
                Ok(())
            }
            other => Err(PatchError::BadPath {
                path: other.to_string(),
            }),
        },
    }
}

/// Apply a whole effect. `snapshot.undo` is a pass-through: the history stack
/// lives outside the core.
pub fn apply_effect(snapshot: &mut Snapshot, effect: &Effect) -> Result<(), PatchError> {
    match effect {
        Effect::Patch { ops, .. } => {
            for op in ops {
                apply_op(snapshot, op)?;
            }
            Ok(())
        }
        Effect::Undo { id } => {
            tracing::debug!(effect_id = %id, "undo effect recorded; history pop is external");
            Ok(())
        }
    }
}

fn apply_set(
    snapshot: &mut Snapshot,
    path: &PatchPath,
    value: &serde_json::Value,
) -> Result<(), PatchError> {
    let mismatch = |detail: &str| PatchError::TypeMismatch {
        path: path.to_string(),
        detail: detail.to_string(),
    };

    match path {
        PatchPath::State(field) => {
            let v = value.clone();
            match field {
                StateField::ViewMode => {
                    snapshot.state.view_mode =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?;
                }
                StateField::DateFilter => {
                    snapshot.state.date_filter =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?;
                }
                StateField::SelectedTaskId => {
                    snapshot.state.selected_task_id =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?;
                }
                StateField::LastCreatedTaskIds => {
                    snapshot.state.last_created_task_ids =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?;
                }
                StateField::LastModifiedTaskId => {
                    snapshot.state.last_modified_task_id =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?;
                }
            }
            Ok(())
        }
        PatchPath::TaskField { task_id, field } => {
            let field = *field;
            let v = value.clone();
            let task = snapshot
                .task_mut(task_id)
                .ok_or_else(|| PatchError::UnknownTask {
                    task_id: task_id.clone(),
                })?;
            match field {
                TaskField::Title => {
                    task.title = serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?
                }
                TaskField::Status => {
                    task.status = serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?
                }
                TaskField::Priority => {
                    task.priority =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?
                }
                TaskField::Tags => {
                    task.tags = serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?
                }
                TaskField::DueDate => {
                    task.due_date =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?
                }
                TaskField::UpdatedAt => {
                    task.updated_at =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?
                }
                TaskField::DeletedAt => {
                    task.deleted_at =
                        serde_json::from_value(v).map_err(|e| mismatch(&e.to_string()))?
                }
            }
            Ok(())
        }
        PatchPath::Tasks => Err(mismatch("cannot set the task list directly")),
    }
}
