//! Structural plan validation
//!
//! Validates the raw JSON a planner hands over before anything is parsed
//! into the typed IR, plus per-kind semantic checks on typed skeletons and
//! intents. Validation never mutates input and never infers missing fields.

use serde_json::Value;
use std::fmt;

use super::{Intent, IntentKind, Skeleton, SkeletonKind, PLAN_VERSION};

/// One validation finding, addressed by a JSON-ish path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of a validation pass. `valid` means no errors; warnings are
/// advisory and never block.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }
}

const STEP_KINDS: &[&str] = &["intent", "query", "if", "confirm", "note"];

const SKELETON_KINDS: &[&str] = &[
    "ChangeStatus",
    "UpdateTask",
    "DeleteTask",
    "RestoreTask",
    "SelectTask",
    "CreateTask",
    "ChangeView",
    "SetDateFilter",
    "QueryTasks",
    "ToggleAssistant",
    "Undo",
    "RequestClarification",
];

const TASK_REFERENCING_KINDS: &[&str] = &[
    "ChangeStatus",
    "UpdateTask",
    "DeleteTask",
    "RestoreTask",
    "SelectTask",
];

/// Validate a raw planner output against the plan shape: `version == 1`,
/// non-empty goal, non-empty steps, per-kind required fields for every step
/// including nested branches. Unknown step kinds are hard errors; an
/// out-of-range `risk` is a warning only.
pub fn validate_plan(raw: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(obj) = raw.as_object() else {
        report.error("$", "plan must be a JSON object");
        return report;
    };

    match obj.get("version").and_then(Value::as_u64) {
        Some(v) if v == PLAN_VERSION as u64 => {}
        Some(v) => report.error("version", format!("unsupported plan version {}", v)),
        None => report.error("version", "missing or non-numeric version"),
    }

    match obj.get("goal").and_then(Value::as_str) {
        Some(goal) if !goal.trim().is_empty() => {}
        Some(_) => report.error("goal", "goal must not be empty"),
        None => report.error("goal", "missing goal"),
    }

    match obj.get("steps").and_then(Value::as_array) {
        Some(steps) if !steps.is_empty() => {
            for (i, step) in steps.iter().enumerate() {
                validate_raw_step(step, &format!("steps[{}]", i), &mut report);
            }
        }
        Some(_) => report.error("steps", "steps must not be empty"),
        None => report.error("steps", "missing steps array"),
    }

    if let Some(risk) = obj.get("risk") {
        match risk.as_str() {
            Some("low") | Some("medium") | Some("high") => {}
            _ => report.warn("risk", format!("unrecognized risk value {}", risk)),
        }
    }

    report
}

fn validate_raw_step(step: &Value, path: &str, report: &mut ValidationReport) {
    let Some(obj) = step.as_object() else {
        report.error(path, "step must be a JSON object");
        return;
    };
    let Some(kind) = obj.get("kind").and_then(Value::as_str) else {
        report.error(format!("{}.kind", path), "missing step kind");
        return;
    };
    if !STEP_KINDS.contains(&kind) {
        report.error(format!("{}.kind", path), format!("unknown step kind '{}'", kind));
        return;
    }

    match kind {
        "intent" => match obj.get("skeleton") {
            Some(skeleton) => {
                validate_raw_skeleton(skeleton, &format!("{}.skeleton", path), report)
            }
            None => report.error(format!("{}.skeleton", path), "intent step requires a skeleton"),
        },
        "query" => {
            match obj.get("query").and_then(Value::as_object) {
                Some(query) => match query.get("op").and_then(Value::as_str) {
                    Some("countTasks") | Some("findTask") | Some("listTasks") => {}
                    Some(op) => report.error(
                        format!("{}.query.op", path),
                        format!("unknown query op '{}'", op),
                    ),
                    None => report.error(format!("{}.query.op", path), "missing query op"),
                },
                None => report.error(format!("{}.query", path), "query step requires a query object"),
            }
            if let Some(assign) = obj.get("assign") {
                match assign.as_str() {
                    Some(name) if !name.trim().is_empty() => {}
                    _ => report.error(
                        format!("{}.assign", path),
                        "assign must be a non-empty string",
                    ),
                }
            }
        }
        "if" => {
            match obj.get("cond").and_then(Value::as_object) {
                Some(cond) if cond.get("op").and_then(Value::as_str).is_some() => {}
                _ => report.error(format!("{}.cond", path), "if step requires a cond with an op"),
            }
            match obj.get("then").and_then(Value::as_array) {
                Some(then) => {
                    for (i, step) in then.iter().enumerate() {
                        validate_raw_step(step, &format!("{}.then[{}]", path, i), report);
                    }
                }
                None => report.error(format!("{}.then", path), "if step requires a then branch"),
            }
            if let Some(otherwise) = obj.get("else") {
                match otherwise.as_array() {
                    Some(steps) => {
                        for (i, step) in steps.iter().enumerate() {
                            validate_raw_step(step, &format!("{}.else[{}]", path, i), report);
                        }
                    }
                    None => report.error(format!("{}.else", path), "else branch must be an array"),
                }
            }
        }
        "confirm" => {
            match obj.get("message").and_then(Value::as_str) {
                Some(msg) if !msg.trim().is_empty() => {}
                _ => report.error(
                    format!("{}.message", path),
                    "confirm step requires a non-empty message",
                ),
            }
            match obj.get("onApprove").and_then(Value::as_array) {
                Some(steps) => {
                    for (i, step) in steps.iter().enumerate() {
                        validate_raw_step(step, &format!("{}.onApprove[{}]", path, i), report);
                    }
                }
                None => report.error(
                    format!("{}.onApprove", path),
                    "confirm step requires an onApprove branch",
                ),
            }
            if let Some(reject) = obj.get("onReject") {
                match reject.as_array() {
                    Some(steps) => {
                        for (i, step) in steps.iter().enumerate() {
                            validate_raw_step(step, &format!("{}.onReject[{}]", path, i), report);
                        }
                    }
                    None => report.error(
                        format!("{}.onReject", path),
                        "onReject branch must be an array",
                    ),
                }
            }
        }
        "note" => match obj.get("text").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => {}
            _ => report.error(format!("{}.text", path), "note step requires non-empty text"),
        },
        _ => unreachable!("kind checked against STEP_KINDS"),
    }
}

fn validate_raw_skeleton(raw: &Value, path: &str, report: &mut ValidationReport) {
    let Some(obj) = raw.as_object() else {
        report.error(path, "skeleton must be a JSON object");
        return;
    };
    let Some(kind) = obj.get("kind").and_then(Value::as_str) else {
        report.error(format!("{}.kind", path), "missing skeleton kind");
        return;
    };
    if !SKELETON_KINDS.contains(&kind) {
        report.error(
            format!("{}.kind", path),
            format!("unknown skeleton kind '{}'", kind),
        );
        return;
    }

    match obj.get("confidence").and_then(Value::as_f64) {
        Some(c) if (0.0..=1.0).contains(&c) => {}
        Some(c) => report.error(
            format!("{}.confidence", path),
            format!("confidence {} outside [0, 1]", c),
        ),
        None => report.error(format!("{}.confidence", path), "missing confidence"),
    }

    match obj.get("source").and_then(Value::as_str) {
        Some("human") | Some("agent") => {}
        Some(s) => report.error(format!("{}.source", path), format!("unknown source '{}'", s)),
        None => report.error(format!("{}.source", path), "missing source"),
    }

    if TASK_REFERENCING_KINDS.contains(&kind) {
        // Hard invariant: the planner refers to tasks by hint, never by id.
        if obj.contains_key("taskId") || obj.contains_key("taskIds") {
            report.error(
                format!("{}.taskId", path),
                format!("{} must carry a targetHint, not a task identifier", kind),
            );
        }
        let hint = obj.get("targetHint");
        if kind != "SelectTask" && hint.and_then(Value::as_str).is_none() {
            report.error(
                format!("{}.targetHint", path),
                format!("{} requires a targetHint string", kind),
            );
        }
    }

    match kind {
        "ChangeStatus" => {
            let status = obj.get("status").and_then(Value::as_str);
            if !matches!(status, Some("todo") | Some("in-progress") | Some("review") | Some("done"))
            {
                report.error(format!("{}.status", path), "unknown or missing status");
            }
        }
        "UpdateTask" => {
            if obj.get("changes").and_then(Value::as_object).is_none() {
                report.error(format!("{}.changes", path), "UpdateTask requires a changes object");
            }
        }
        "CreateTask" => match obj.get("tasks").and_then(Value::as_array) {
            Some(tasks) if !tasks.is_empty() => {
                for (i, task) in tasks.iter().enumerate() {
                    let title = task.get("title").and_then(Value::as_str).unwrap_or("");
                    if title.trim().is_empty() {
                        report.error(
                            format!("{}.tasks[{}].title", path, i),
                            "task title must not be empty",
                        );
                    }
                }
            }
            _ => report.error(
                format!("{}.tasks", path),
                "CreateTask requires at least one task",
            ),
        },
        "ChangeView" => {
            let mode = obj.get("viewMode").and_then(Value::as_str);
            if !matches!(mode, Some("list") | Some("board") | Some("table")) {
                report.error(format!("{}.viewMode", path), "unknown or missing viewMode");
            }
        }
        "SetDateFilter" => {
            let filter = obj.get("filter").and_then(Value::as_str);
            if !matches!(filter, Some("all") | Some("today") | Some("week") | Some("overdue")) {
                report.error(format!("{}.filter", path), "unknown or missing filter");
            }
        }
        "RequestClarification" => {
            let question = obj.get("question").and_then(Value::as_str).unwrap_or("");
            if question.trim().is_empty() {
                report.error(
                    format!("{}.question", path),
                    "RequestClarification requires a question",
                );
            }
        }
        _ => {}
    }
}

/// Per-kind semantic checks on an already-typed skeleton. Empty hints are
/// deliberately not errors here; the resolver turns them into clarifications.
pub fn validate_skeleton(skeleton: &Skeleton) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !(0.0..=1.0).contains(&skeleton.confidence) {
        report.error(
            "confidence",
            format!("confidence {} outside [0, 1]", skeleton.confidence),
        );
    }

    match &skeleton.kind {
        SkeletonKind::CreateTask { tasks } => {
            if tasks.is_empty() {
                report.error("tasks", "CreateTask requires at least one task");
            }
            for (i, task) in tasks.iter().enumerate() {
                if task.title.trim().is_empty() {
                    report.error(format!("tasks[{}].title", i), "task title must not be empty");
                }
            }
        }
        SkeletonKind::UpdateTask { changes, .. } => {
            if changes.is_empty() {
                report.warn("changes", "UpdateTask with no changes has no effect");
            }
        }
        SkeletonKind::RequestClarification { question } => {
            if question.trim().is_empty() {
                report.error("question", "RequestClarification requires a question");
            }
        }
        _ => {}
    }

    report
}

/// Same checks as [`validate_skeleton`] for the resolved counterpart, plus
/// the id fields the resolver bound.
pub fn validate_intent(intent: &Intent) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !(0.0..=1.0).contains(&intent.confidence) {
        report.error(
            "confidence",
            format!("confidence {} outside [0, 1]", intent.confidence),
        );
    }

    match &intent.kind {
        IntentKind::ChangeStatus { task_id, .. }
        | IntentKind::DeleteTask { task_id }
        | IntentKind::RestoreTask { task_id } => {
            if task_id.trim().is_empty() {
                report.error("taskId", "bound intent requires a non-empty task id");
            }
        }
        IntentKind::UpdateTask { task_id, changes } => {
            if task_id.trim().is_empty() {
                report.error("taskId", "bound intent requires a non-empty task id");
            }
            if changes.is_empty() {
                report.warn("changes", "UpdateTask with no changes has no effect");
            }
        }
        IntentKind::CreateTask { tasks } => {
            if tasks.is_empty() {
                report.error("tasks", "CreateTask requires at least one task");
            }
            for (i, task) in tasks.iter().enumerate() {
                if task.title.trim().is_empty() {
                    report.error(format!("tasks[{}].title", i), "task title must not be empty");
                }
            }
        }
        _ => {}
    }

    report
}
