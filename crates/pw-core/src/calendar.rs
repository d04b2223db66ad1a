//! Calendar assignment: turning an ordered, validated subtask list into
//! non-overlapping time windows.
//!
//! `MockCalendar` is a deterministic in-process stand-in for a real calendar
//! service; a real integration implements the same `Calendar` trait and drops
//! in without touching the orchestrator.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::Error;
use crate::schedule::SubTask;

#[async_trait]
pub trait Calendar: Send + Sync {
    fn name(&self) -> &str;

    /// Populate `scheduled_start`/`scheduled_end` on every subtask.
    ///
    /// Input must already be validated: contiguous `order_index`, acyclic
    /// dependencies, positive estimates. Returns the subtasks in execution
    /// order.
    async fn assign(
        &self,
        subtasks: Vec<SubTask>,
        start: DateTime<Utc>,
    ) -> Result<Vec<SubTask>, Error>;
}

/// Serial single-cursor allocator: one task at a time, no gaps, no overlap.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCalendar;

impl MockCalendar {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Calendar for MockCalendar {
    fn name(&self) -> &str {
        "mock"
    }

    async fn assign(
        &self,
        subtasks: Vec<SubTask>,
        start: DateTime<Utc>,
    ) -> Result<Vec<SubTask>, Error> {
        let mut tasks = subtasks;
        tasks.sort_by_key(|t| t.order_index);

        let mut ends: HashMap<String, DateTime<Utc>> = HashMap::with_capacity(tasks.len());
        let mut cursor = start;

        for task in tasks.iter_mut() {
            let mut begin = cursor;
            for dep in &task.dependencies {
                let Some(&dep_end) = ends.get(dep) else {
                    // Validation guarantees dependencies are ordered earlier,
                    // so reaching this is a defect upstream of the calendar.
                    error!(
                        task = %task.id,
                        dependency = %dep,
                        "dependency has no assigned window; validation let a bad schedule through"
                    );
                    return Err(Error::scheduling(format!(
                        "dependency {dep} of {} has no assigned window",
                        task.id
                    )));
                };
                if dep_end > begin {
                    begin = dep_end;
                }
            }

            let end = begin + task.duration();
            task.scheduled_start = Some(begin);
            task.scheduled_end = Some(end);
            ends.insert(task.id.clone(), end);
            cursor = end;
        }

        debug!(count = tasks.len(), start = %start, "assigned calendar windows");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SubTask;
    use chrono::TimeZone;

    fn task(id: &str, minutes: i64, order: usize, deps: &[&str]) -> SubTask {
        SubTask::new(
            id,
            format!("Step {id}"),
            minutes,
            order,
            deps.iter().map(|d| d.to_string()).collect(),
        )
        .unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_windows_are_contiguous_without_dependencies() {
        let tasks = vec![
            task("task-1", 60, 0, &[]),
            task("task-2", 30, 1, &[]),
            task("task-3", 45, 2, &[]),
            task("task-4", 15, 3, &[]),
        ];
        let assigned = MockCalendar::new().assign(tasks, start()).await.unwrap();

        assert_eq!(assigned[0].scheduled_start, Some(start()));
        for pair in assigned.windows(2) {
            assert_eq!(pair[1].scheduled_start, pair[0].scheduled_end);
        }
        let total: i64 = assigned.iter().map(|t| t.estimated_minutes).sum();
        assert_eq!(
            assigned.last().unwrap().scheduled_end,
            Some(start() + chrono::Duration::minutes(total))
        );
    }

    #[tokio::test]
    async fn test_dependent_never_starts_before_dependency_ends() {
        let tasks = vec![
            task("task-1", 60, 0, &[]),
            task("task-2", 30, 1, &["task-1"]),
            task("task-3", 45, 2, &["task-1", "task-2"]),
        ];
        let assigned = MockCalendar::new().assign(tasks, start()).await.unwrap();

        for t in &assigned {
            for dep in &t.dependencies {
                let dep_end = assigned
                    .iter()
                    .find(|d| &d.id == dep)
                    .and_then(|d| d.scheduled_end)
                    .unwrap();
                assert!(t.scheduled_start.unwrap() >= dep_end);
            }
        }
    }

    #[tokio::test]
    async fn test_assignment_is_idempotent() {
        let tasks = vec![
            task("task-1", 20, 0, &[]),
            task("task-2", 40, 1, &["task-1"]),
        ];
        let first = MockCalendar::new()
            .assign(tasks.clone(), start())
            .await
            .unwrap();
        let second = MockCalendar::new().assign(tasks, start()).await.unwrap();
        assert_eq!(first, second);

        // Re-running on already-assigned input overwrites with the same windows.
        let third = MockCalendar::new()
            .assign(first.clone(), start())
            .await
            .unwrap();
        assert_eq!(first, third);
    }

    #[tokio::test]
    async fn test_unassigned_dependency_is_a_scheduling_error() {
        // order_index inverted relative to the dependency edge; validation
        // would reject this, the calendar must fail loudly.
        let tasks = vec![
            task("task-1", 20, 1, &[]),
            task("task-2", 40, 0, &["task-1"]),
        ];
        let err = MockCalendar::new().assign(tasks, start()).await.unwrap_err();
        assert!(matches!(err, Error::Scheduling(_)));
        assert!(err.to_string().contains("task-1"));
    }
}
