//! Asynchronous schedule persistence.
//!
//! A finished schedule is written in two forms: a lossless JSON document that
//! round-trips back into the domain model, and a human-readable text
//! rendering. The two writes run concurrently and independently; each goes to
//! a temporary sibling file first and is renamed into place so a crash
//! mid-write never leaves a partial file at the target path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Error;
use crate::schedule::Schedule;

/// On-disk wrapper for the structured form.
#[derive(Debug, Serialize, Deserialize)]
struct SavedSchedule {
    saved_at: DateTime<Utc>,
    schedule: Schedule,
}

/// Per-file results of a persistence pass. One side failing never aborts
/// the other, so both results are always populated.
#[derive(Debug)]
pub struct PersistOutcome {
    pub structured: Result<PathBuf, Error>,
    pub readable: Result<PathBuf, Error>,
}

impl PersistOutcome {
    pub fn is_complete(&self) -> bool {
        self.structured.is_ok() && self.readable.is_ok()
    }

    pub fn is_total_failure(&self) -> bool {
        self.structured.is_err() && self.readable.is_err()
    }

    /// The failed writes, labeled for reporting.
    pub fn failures(&self) -> Vec<(&'static str, &Error)> {
        let mut failures = Vec::new();
        if let Err(e) = &self.structured {
            failures.push(("structured", e));
        }
        if let Err(e) = &self.readable {
            failures.push(("readable", e));
        }
        failures
    }
}

/// Write both representations of a schedule concurrently.
pub async fn persist_schedule(
    schedule: &Schedule,
    structured_path: &Path,
    readable_path: &Path,
) -> PersistOutcome {
    let (structured, readable) = tokio::join!(
        write_structured(schedule, structured_path),
        write_readable(schedule, readable_path),
    );

    for (label, err) in [("structured", &structured), ("readable", &readable)] {
        if let Err(e) = err {
            warn!(file = label, error = %e, "schedule write failed");
        }
    }

    PersistOutcome {
        structured,
        readable,
    }
}

/// Read the structured form back into a Schedule.
pub async fn load_schedule(path: &Path) -> Result<Schedule, Error> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| Error::persistence(format!("read {}: {e}", path.display())))?;
    let saved: SavedSchedule = serde_json::from_str(&content)?;
    Ok(saved.schedule)
}

async fn write_structured(schedule: &Schedule, path: &Path) -> Result<PathBuf, Error> {
    let payload = SavedSchedule {
        saved_at: Utc::now(),
        schedule: schedule.clone(),
    };
    let json = serde_json::to_string_pretty(&payload)?;
    write_atomic(path, &json).await?;
    debug!(path = %path.display(), "wrote structured schedule");
    Ok(path.to_path_buf())
}

async fn write_readable(schedule: &Schedule, path: &Path) -> Result<PathBuf, Error> {
    write_atomic(path, &render_readable(schedule)).await?;
    debug!(path = %path.display(), "wrote readable schedule");
    Ok(path.to_path_buf())
}

/// Render the human-oriented text form: the goal, then subtasks in execution
/// order with estimate, scheduled window, and dependencies.
pub fn render_readable(schedule: &Schedule) -> String {
    let mut lines = vec![format!("Goal: {}", schedule.goal.title)];
    if !schedule.goal.description.is_empty() {
        lines.push(format!("Description: {}", schedule.goal.description));
    }
    lines.push(format!(
        "Generated: {}",
        schedule.generated_at.format("%Y-%m-%d %H:%M")
    ));
    lines.push(String::new());

    for (idx, task) in schedule.in_execution_order().iter().enumerate() {
        lines.push(format!("{}. {} [{}]", idx + 1, task.title, task.id));
        let window = match (task.scheduled_start, task.scheduled_end) {
            (Some(start), Some(end)) => format!(
                "{} .. {}",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            ),
            _ => "unscheduled".to_string(),
        };
        lines.push(format!("   - Window: {window}"));
        let estimate = if task.is_estimated() {
            format!("{} min", task.estimated_minutes)
        } else {
            "unknown duration".to_string()
        };
        lines.push(format!("   - Estimate: {estimate}"));
        if !task.dependencies.is_empty() {
            lines.push(format!("   - Depends on: {}", task.dependencies.join(", ")));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    let tmp = tmp_path(path);
    fs::write(&tmp, contents)
        .await
        .map_err(|e| Error::persistence(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::persistence(format!("rename {} -> {}: {e}", tmp.display(), path.display())))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "schedule".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{validate, Goal, PlanLimits, SubTask};
    use chrono::{Duration, TimeZone};

    fn sample_schedule() -> Schedule {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut first = SubTask::new("task-1", "Pick an online course", 60, 0, vec![]).unwrap();
        first.scheduled_start = Some(start);
        first.scheduled_end = Some(start + Duration::minutes(60));
        let mut second =
            SubTask::new("task-2", "Work through module one", 90, 1, vec!["task-1".into()])
                .unwrap();
        second.scheduled_start = first.scheduled_end;
        second.scheduled_end = Some(start + Duration::minutes(150));

        Schedule::new(
            Goal::new("Learn Python basics", "Course plus projects").unwrap(),
            vec![first, second],
        )
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields_and_validity() {
        let dir = tempfile::tempdir().unwrap();
        let structured = dir.path().join("schedule.json");
        let readable = dir.path().join("schedule.txt");

        let schedule = sample_schedule();
        let outcome = persist_schedule(&schedule, &structured, &readable).await;
        assert!(outcome.is_complete());

        let loaded = load_schedule(&structured).await.unwrap();
        assert_eq!(loaded, schedule);
        assert!(validate(&loaded, &PlanLimits::default()).is_empty());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let structured = dir.path().join("schedule.json");
        let readable = dir.path().join("schedule.txt");

        persist_schedule(&sample_schedule(), &structured, &readable).await;

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let structured = dir.path().join("schedule.json");
        let readable = dir.path().join("schedule.txt");
        std::fs::write(&structured, "stale").unwrap();

        let outcome = persist_schedule(&sample_schedule(), &structured, &readable).await;
        assert!(outcome.is_complete());
        let loaded = load_schedule(&structured).await.unwrap();
        assert_eq!(loaded.subtasks.len(), 2);
    }

    #[tokio::test]
    async fn test_one_failed_write_does_not_block_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let structured = dir.path().join("schedule.json");
        // Parent directory does not exist, so this write fails.
        let readable = dir.path().join("missing").join("schedule.txt");

        let outcome = persist_schedule(&sample_schedule(), &structured, &readable).await;
        assert!(!outcome.is_complete());
        assert!(!outcome.is_total_failure());
        assert!(outcome.structured.is_ok());
        assert_eq!(outcome.failures().len(), 1);
        assert_eq!(outcome.failures()[0].0, "readable");
        assert!(structured.exists());
    }

    #[test]
    fn test_readable_rendering_contains_everything() {
        let text = render_readable(&sample_schedule());
        assert!(text.contains("Goal: Learn Python basics"));
        assert!(text.contains("Description: Course plus projects"));
        assert!(text.contains("1. Pick an online course [task-1]"));
        assert!(text.contains("2. Work through module one [task-2]"));
        assert!(text.contains("60 min"));
        assert!(text.contains("Depends on: task-1"));
        assert!(text.contains("2026-03-02 09:00"));
    }

    #[test]
    fn test_readable_rendering_marks_unscheduled_tasks() {
        let schedule = Schedule::new(
            Goal::new("Goal", "").unwrap(),
            vec![SubTask::candidate("task-1", "Only step", 0).unwrap()],
        );
        let text = render_readable(&schedule);
        assert!(text.contains("unscheduled"));
        assert!(text.contains("unknown duration"));
    }
}
