//! Structured queries evaluated against the transaction snapshot.

use serde_json::Value;

use crate::plan::{QueryFilter, QueryOp, QuerySpec};
use crate::snapshot::{Snapshot, Task};

/// Run a query against the snapshot. `countTasks` yields a number,
/// `findTask` the first match or `null`, `listTasks` an array.
pub fn run_query(query: &QuerySpec, snapshot: &Snapshot) -> Value {
    let pool: Vec<&Task> = if query.filter.deleted == Some(true) {
        snapshot.deleted_tasks().collect()
    } else {
        snapshot.active_tasks().collect()
    };
    let mut matches = pool.into_iter().filter(|t| accepts(&query.filter, t));

    match query.op {
        QueryOp::CountTasks => Value::from(matches.count()),
        QueryOp::FindTask => matches
            .next()
            .map(|t| serde_json::to_value(t).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        QueryOp::ListTasks => {
            let limited: Vec<&Task> = match query.limit {
                Some(limit) => matches.take(limit).collect(),
                None => matches.collect(),
            };
            serde_json::to_value(limited).unwrap_or_else(|_| Value::Array(vec![]))
        }
    }
}

fn accepts(filter: &QueryFilter, task: &Task) -> bool {
    if let Some(status) = filter.status {
        if task.status != status {
            return false;
        }
    }
    if let Some(priority) = filter.priority {
        if task.priority != priority {
            return false;
        }
    }
    if let Some(ref tag) = filter.tag {
        if !task.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Priority, TaskStatus};
    use chrono::Utc;

    fn task(id: &str, title: &str, status: TaskStatus, tags: &[&str]) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: title.to_string(),
            status,
            priority: Priority::Medium,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            due_date: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn snapshot() -> Snapshot {
        let mut snap = Snapshot::default();
        snap.data.tasks.push(task("t1", "Report", TaskStatus::Todo, &["work"]));
        snap.data
            .tasks
            .push(task("t2", "Groceries", TaskStatus::Done, &["home"]));
        let mut gone = task("t3", "Old report", TaskStatus::Done, &["work"]);
        gone.deleted_at = Some(Utc::now());
        snap.data.tasks.push(gone);
        snap
    }

    fn spec(op: QueryOp, filter: QueryFilter, limit: Option<usize>) -> QuerySpec {
        QuerySpec { op, filter, limit }
    }

    #[test]
    fn test_count_skips_deleted() {
        let result = run_query(
            &spec(QueryOp::CountTasks, QueryFilter::default(), None),
            &snapshot(),
        );
        assert_eq!(result, Value::from(2));
    }

    #[test]
    fn test_count_with_status_filter() {
        let filter = QueryFilter {
            status: Some(TaskStatus::Done),
            ..Default::default()
        };
        let result = run_query(&spec(QueryOp::CountTasks, filter, None), &snapshot());
        assert_eq!(result, Value::from(1));
    }

    #[test]
    fn test_find_returns_first_or_null() {
        let filter = QueryFilter {
            tag: Some("work".to_string()),
            ..Default::default()
        };
        let result = run_query(&spec(QueryOp::FindTask, filter, None), &snapshot());
        assert_eq!(result["id"], "t1");

        let filter = QueryFilter {
            tag: Some("garden".to_string()),
            ..Default::default()
        };
        let result = run_query(&spec(QueryOp::FindTask, filter, None), &snapshot());
        assert!(result.is_null());
    }

    #[test]
    fn test_list_honors_limit() {
        let result = run_query(
            &spec(QueryOp::ListTasks, QueryFilter::default(), Some(1)),
            &snapshot(),
        );
        assert_eq!(result.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_deleted_pool() {
        let filter = QueryFilter {
            deleted: Some(true),
            ..Default::default()
        };
        let result = run_query(&spec(QueryOp::ListTasks, filter, None), &snapshot());
        let items = result.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "t3");
    }
}
