//! Application state snapshot
//!
//! The snapshot is the full mutable world a plan acts on: the task list plus
//! the UI-facing state fields. Executors never mutate a caller's snapshot in
//! place; they clone it and hand back a fresh one on success.

mod patch;

pub use patch::{apply_effect, apply_op, Effect, PatchError, PatchOp, PatchPath, StateField, TaskField};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task identifier. Planner-facing types never carry these; they appear only
/// after resolver binding or task creation.
pub type TaskId = String;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

/// Task priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Which task listing the UI is showing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    List,
    Board,
    Table,
}

/// Due-date filter applied to the task listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    All,
    Today,
    Week,
    Overdue,
}

/// A single task. Deletion is soft: a deleted task stays in `data.tasks`
/// with `deleted_at` set, and only `RestoreTask` brings it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// UI-facing state carried alongside the task data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub view_mode: ViewMode,
    pub date_filter: DateFilter,
    #[serde(default)]
    pub selected_task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_created_task_ids: Option<Vec<TaskId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_task_id: Option<TaskId>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            view_mode: ViewMode::List,
            date_filter: DateFilter::All,
            selected_task_id: None,
            last_created_task_ids: None,
            last_modified_task_id: None,
        }
    }
}

/// Task data owned by the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotData {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// The full application state a plan executes against.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub data: SnapshotData,
    #[serde(default)]
    pub state: UiState,
}

impl Snapshot {
    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.data.tasks.iter().filter(|t| t.is_active())
    }

    pub fn deleted_tasks(&self) -> impl Iterator<Item = &Task> {
        self.data.tasks.iter().filter(|t| !t.is_active())
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.data.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.data.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Cheap optimistic-concurrency stamp: task count in the high digits,
    /// the freshest `updated_at` (epoch millis, truncated) in the low ones.
    /// Not collision-proof; good enough to catch the common stale case.
    pub fn fingerprint(&self) -> u64 {
        let count = self.data.tasks.len() as u64;
        let max_updated = self
            .data
            .tasks
            .iter()
            .map(|t| t.updated_at.timestamp_millis().max(0) as u64)
            .max()
            .unwrap_or(0);
        count * 1_000_000 + max_updated % 1_000_000
    }
}
