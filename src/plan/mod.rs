//! Plan and skeleton intermediate representation
//!
//! This module defines what the external planner may produce. Skeletons
//! describe WHAT the user wants, never HOW to find it: task-referencing
//! kinds carry a free-text `targetHint` and structurally cannot carry a
//! task id. Ids appear only on the resolved [`Intent`] counterpart.
//!
//! # Design Principles
//!
//! 1. **Closed Enums**: the planner can only classify into known kinds;
//!    adding a capability means adding a variant here.
//! 2. **One tag selects the shape**: every union is serde-tagged so an
//!    unknown kind fails loudly at the boundary.
//! 3. **No resolution knowledge**: nothing in this module touches a
//!    snapshot; binding lives in the resolver.

mod validation;

pub use validation::{validate_intent, validate_plan, validate_skeleton, ValidationIssue, ValidationReport};

use serde::{Deserialize, Serialize};

use crate::snapshot::{DateFilter, Priority, Task, TaskId, TaskStatus, ViewMode};

/// Plan format version accepted by this engine.
pub const PLAN_VERSION: u32 = 1;

/// Coarse risk level attached to plans and assessments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Who authored a skeleton.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Human,
    Agent,
}

/// Fields an `UpdateTask` may change. All optional; absent means untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
    }
}

/// Specification of a task to create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Planner-authored action kinds, pre-resolution.
///
/// The five task-referencing kinds (`ChangeStatus`, `UpdateTask`,
/// `DeleteTask`, `RestoreTask`, `SelectTask`) carry a `targetHint`; the
/// validator rejects any attempt to smuggle an id through them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum SkeletonKind {
    ChangeStatus {
        #[serde(rename = "targetHint")]
        target_hint: String,
        status: TaskStatus,
    },
    UpdateTask {
        #[serde(rename = "targetHint")]
        target_hint: String,
        changes: TaskChanges,
    },
    DeleteTask {
        #[serde(rename = "targetHint")]
        target_hint: String,
    },
    RestoreTask {
        #[serde(rename = "targetHint")]
        target_hint: String,
    },
    SelectTask {
        /// Empty or missing hint means "deselect".
        #[serde(rename = "targetHint", default)]
        target_hint: Option<String>,
    },
    CreateTask {
        tasks: Vec<NewTask>,
    },
    ChangeView {
        #[serde(rename = "viewMode")]
        view_mode: ViewMode,
    },
    SetDateFilter {
        filter: DateFilter,
    },
    QueryTasks {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    ToggleAssistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
    },
    Undo,
    RequestClarification {
        question: String,
    },
}

impl SkeletonKind {
    pub fn name(&self) -> &'static str {
        match self {
            SkeletonKind::ChangeStatus { .. } => "ChangeStatus",
            SkeletonKind::UpdateTask { .. } => "UpdateTask",
            SkeletonKind::DeleteTask { .. } => "DeleteTask",
            SkeletonKind::RestoreTask { .. } => "RestoreTask",
            SkeletonKind::SelectTask { .. } => "SelectTask",
            SkeletonKind::CreateTask { .. } => "CreateTask",
            SkeletonKind::ChangeView { .. } => "ChangeView",
            SkeletonKind::SetDateFilter { .. } => "SetDateFilter",
            SkeletonKind::QueryTasks { .. } => "QueryTasks",
            SkeletonKind::ToggleAssistant { .. } => "ToggleAssistant",
            SkeletonKind::Undo => "Undo",
            SkeletonKind::RequestClarification { .. } => "RequestClarification",
        }
    }

    /// Kinds whose target must be bound to a task id before execution.
    pub fn is_task_referencing(&self) -> bool {
        matches!(
            self,
            SkeletonKind::ChangeStatus { .. }
                | SkeletonKind::UpdateTask { .. }
                | SkeletonKind::DeleteTask { .. }
                | SkeletonKind::RestoreTask { .. }
                | SkeletonKind::SelectTask { .. }
        )
    }

    /// Kinds that require a user confirmation before execution.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            SkeletonKind::DeleteTask { .. } | SkeletonKind::RestoreTask { .. }
        )
    }
}

/// One intended action as produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skeleton {
    /// Planner confidence in [0, 1].
    pub confidence: f64,
    pub source: Source,
    #[serde(flatten)]
    pub kind: SkeletonKind,
}

/// Resolved, executable counterparts of [`SkeletonKind`]: same kinds, but
/// task-referencing variants carry a real id instead of a hint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum IntentKind {
    ChangeStatus {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        status: TaskStatus,
    },
    UpdateTask {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        changes: TaskChanges,
    },
    DeleteTask {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    RestoreTask {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
    SelectTask {
        /// `None` deselects.
        #[serde(rename = "taskId", default)]
        task_id: Option<TaskId>,
    },
    CreateTask {
        tasks: Vec<NewTask>,
    },
    ChangeView {
        #[serde(rename = "viewMode")]
        view_mode: ViewMode,
    },
    SetDateFilter {
        filter: DateFilter,
    },
    QueryTasks {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    ToggleAssistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
    },
    Undo,
    RequestClarification {
        question: String,
    },
}

impl IntentKind {
    pub fn name(&self) -> &'static str {
        match self {
            IntentKind::ChangeStatus { .. } => "ChangeStatus",
            IntentKind::UpdateTask { .. } => "UpdateTask",
            IntentKind::DeleteTask { .. } => "DeleteTask",
            IntentKind::RestoreTask { .. } => "RestoreTask",
            IntentKind::SelectTask { .. } => "SelectTask",
            IntentKind::CreateTask { .. } => "CreateTask",
            IntentKind::ChangeView { .. } => "ChangeView",
            IntentKind::SetDateFilter { .. } => "SetDateFilter",
            IntentKind::QueryTasks { .. } => "QueryTasks",
            IntentKind::ToggleAssistant { .. } => "ToggleAssistant",
            IntentKind::Undo => "Undo",
            IntentKind::RequestClarification { .. } => "RequestClarification",
        }
    }
}

/// A resolved action, ready for effect generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub confidence: f64,
    pub source: Source,
    #[serde(flatten)]
    pub kind: IntentKind,
}

/// Structured query evaluated by the executor against the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub op: QueryOp,
    #[serde(default)]
    pub filter: QueryFilter,
    /// Result cap; `ListTasks` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QueryOp {
    CountTasks,
    FindTask,
    ListTasks,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `true` searches the soft-deleted pool instead of the active one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

/// Comparison operand: a variable reference or a JSON literal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Operand {
    Var { var: String },
    Lit(serde_json::Value),
}

/// Condition tree evaluated against the transaction variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Cond {
    Lt { left: Operand, right: Operand },
    Lte { left: Operand, right: Operand },
    Gt { left: Operand, right: Operand },
    Gte { left: Operand, right: Operand },
    Eq { left: Operand, right: Operand },
    Neq { left: Operand, right: Operand },
    Exists { var: String },
    NotExists { var: String },
    And { items: Vec<Cond> },
    Or { items: Vec<Cond> },
    Not { cond: Box<Cond> },
}

/// One step of a plan. Steps nest arbitrarily inside `if`/`confirm` branches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlanStep {
    Intent {
        skeleton: Skeleton,
    },
    Query {
        query: QuerySpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assign: Option<String>,
    },
    If {
        cond: Cond,
        then: Vec<PlanStep>,
        #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Vec<PlanStep>>,
    },
    #[serde(rename_all = "camelCase")]
    Confirm {
        message: String,
        on_approve: Vec<PlanStep>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_reject: Option<Vec<PlanStep>>,
    },
    Note {
        text: String,
    },
}

impl PlanStep {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PlanStep::Intent { .. } => "intent",
            PlanStep::Query { .. } => "query",
            PlanStep::If { .. } => "if",
            PlanStep::Confirm { .. } => "confirm",
            PlanStep::Note { .. } => "note",
        }
    }
}

/// A whole planner output: goal plus an ordered step list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub version: u32,
    pub goal: String,
    pub steps: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
}

/// A plan step after preflight binding, ready for the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BoundStep {
    #[serde(rename_all = "camelCase")]
    Intent {
        intent: Intent,
        skeleton: Skeleton,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved_task: Option<Task>,
    },
    Query {
        query: QuerySpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assign: Option<String>,
    },
    If {
        cond: Cond,
        then: Vec<BoundStep>,
        #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Vec<BoundStep>>,
    },
    #[serde(rename_all = "camelCase")]
    Confirm {
        message: String,
        on_approve: Vec<BoundStep>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_reject: Option<Vec<BoundStep>>,
    },
    Note {
        text: String,
    },
}

impl BoundStep {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BoundStep::Intent { .. } => "intent",
            BoundStep::Query { .. } => "query",
            BoundStep::If { .. } => "if",
            BoundStep::Confirm { .. } => "confirm",
            BoundStep::Note { .. } => "note",
        }
    }
}
