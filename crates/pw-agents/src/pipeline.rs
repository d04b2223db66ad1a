//! The pipeline orchestrator: planner -> refiner -> calendar -> persistence.
//!
//! The orchestrator owns the validation policy. Each agent runs its own
//! bounded retry loop internally; after every pass the orchestrator still
//! re-validates the full schedule itself and fails the stage on any residue.
//! A cancellation flag is checked between stages (a backend call is not
//! preemptible); cancellation skips persistence and surfaces as cancelled,
//! not as a failure.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use pw_core::{
    persist_schedule, validate, Calendar, Error, Goal, PersistOutcome, PlanLimits, Provider,
    Schedule,
};

use crate::planner::PlannerAgent;
use crate::refiner::RefinerAgent;
use crate::AgentOptions;

/// Pipeline stages, in order. `Failed` is reachable from any non-terminal
/// stage; the stage recorded in a `StageFailure` is the one that was active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Planning,
    PlanValidated,
    Refining,
    RefineValidated,
    Scheduling,
    Persisting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Planning => "planning",
            Stage::PlanValidated => "plan-validated",
            Stage::Refining => "refining",
            Stage::RefineValidated => "refine-validated",
            Stage::Scheduling => "scheduling",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline run that ended without a schedule.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: Error,
}

impl StageFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Error::Cancelled)
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline failed during {}: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure {}

/// Cooperative cancellation signal, checked by the orchestrator between
/// stages. Clone freely; all clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// First calendar cursor position. None means "now" at scheduling time.
    pub calendar_start: Option<DateTime<Utc>>,
    pub limits: PlanLimits,
    pub structured_path: PathBuf,
    pub readable_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calendar_start: None,
            limits: PlanLimits::default(),
            structured_path: PathBuf::from("schedule.json"),
            readable_path: PathBuf::from("schedule.txt"),
        }
    }
}

/// The result of a successful computation. Persistence failures do not roll
/// back the schedule; they are carried here so the caller can distinguish
/// "computed but not (fully) saved" from "computation failed".
#[derive(Debug)]
pub struct PipelineReport {
    pub schedule: Schedule,
    pub persistence: PersistOutcome,
}

impl PipelineReport {
    pub fn fully_persisted(&self) -> bool {
        self.persistence.is_complete()
    }
}

pub struct Pipeline {
    planner: PlannerAgent,
    refiner: RefinerAgent,
    calendar: Arc<dyn Calendar>,
    config: PipelineConfig,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        options: AgentOptions,
        calendar: Arc<dyn Calendar>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            planner: PlannerAgent::new(Arc::clone(&provider), options.clone()),
            refiner: RefinerAgent::new(provider, options),
            calendar,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// A handle the caller can use to request cancellation of an
    /// in-flight run.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the full pipeline for one goal.
    pub async fn run(&self, goal: Goal) -> Result<PipelineReport, StageFailure> {
        info!(goal = %goal.title, "pipeline starting");

        self.checkpoint(Stage::Planning)?;
        let candidates = self
            .planner
            .plan(&goal)
            .await
            .map_err(|e| fail(Stage::Planning, e))?;
        // Never trust agent output as pre-validated.
        let draft = Schedule::new(goal, candidates);
        self.revalidate(&draft, &self.config.limits.candidates(), Stage::Planning)?;
        info!(stage = %Stage::PlanValidated, count = draft.subtasks.len(), "plan validated");

        self.checkpoint(Stage::Refining)?;
        let refined = self
            .refiner
            .refine(&draft.goal, &draft.subtasks)
            .await
            .map_err(|e| fail(Stage::Refining, e))?;
        let mut schedule = Schedule::new(draft.goal, refined);
        self.revalidate(&schedule, &self.config.limits, Stage::Refining)?;
        info!(stage = %Stage::RefineValidated, count = schedule.subtasks.len(), "refinement validated");

        self.checkpoint(Stage::Scheduling)?;
        let start = self.config.calendar_start.unwrap_or_else(Utc::now);
        let subtasks = std::mem::take(&mut schedule.subtasks);
        schedule.subtasks = self
            .calendar
            .assign(subtasks, start)
            .await
            .map_err(|e| {
                // Validation should have excluded this input; reaching here
                // is a defect in the pipeline, not bad agent output.
                error!(error = %e, "invariant violation reached the calendar");
                fail(Stage::Scheduling, e)
            })?;
        info!(stage = %Stage::Scheduling, start = %start, "calendar windows assigned");

        self.checkpoint(Stage::Persisting)?;
        let persistence = persist_schedule(
            &schedule,
            &self.config.structured_path,
            &self.config.readable_path,
        )
        .await;
        info!(stage = %Stage::Done, "pipeline finished");

        Ok(PipelineReport {
            schedule,
            persistence,
        })
    }

    fn checkpoint(&self, next: Stage) -> Result<(), StageFailure> {
        if self.cancel.is_cancelled() {
            warn!(stage = %next, "cancellation requested; stopping before stage");
            return Err(fail(next, Error::Cancelled));
        }
        Ok(())
    }

    fn revalidate(
        &self,
        schedule: &Schedule,
        limits: &PlanLimits,
        stage: Stage,
    ) -> Result<(), StageFailure> {
        let errors = validate(schedule, limits);
        if errors.is_empty() {
            return Ok(());
        }
        for error in &errors {
            warn!(stage = %stage, error = %error, "schedule invariant violated");
        }
        let summary = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let error = match stage {
            Stage::Planning => Error::planning(summary),
            Stage::Refining => Error::refining(summary),
            _ => Error::validation("schedule", summary),
        };
        Err(fail(stage, error))
    }
}

fn fail(stage: Stage, error: Error) -> StageFailure {
    StageFailure { stage, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pw_core::testing::MockProvider;
    use pw_core::{load_schedule, MockCalendar};
    use std::time::Duration;

    const PLANNER_REPLY: &str = r#"[
        {"title": "Pick an online course"},
        {"title": "Work through the course"},
        {"title": "Build three small projects"},
        {"title": "Document everything on GitHub"}
    ]"#;

    const REFINER_REPLY: &str = r#"[
        {"id": "task-1", "title": "Pick an online course", "estimated_duration_minutes": 60, "order_index": 0, "dependencies": []},
        {"id": "task-2", "title": "Work through the course", "estimated_duration_minutes": 240, "order_index": 1, "dependencies": []},
        {"id": "task-3", "title": "Build three small projects", "estimated_duration_minutes": 180, "order_index": 2, "dependencies": []},
        {"id": "task-4", "title": "Document everything on GitHub", "estimated_duration_minutes": 45, "order_index": 3, "dependencies": []}
    ]"#;

    fn goal() -> Goal {
        Goal::new(
            "Learn Python basics",
            "Complete online course, build 3 small projects, document in GitHub",
        )
        .unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn pipeline_in(dir: &std::path::Path, provider: Arc<MockProvider>) -> Pipeline {
        let config = PipelineConfig {
            calendar_start: Some(start()),
            structured_path: dir.join("schedule.json"),
            readable_path: dir.join("schedule.txt"),
            ..PipelineConfig::default()
        };
        Pipeline::new(
            provider,
            AgentOptions::default().with_retry_backoff(Duration::ZERO),
            Arc::new(MockCalendar::new()),
            config,
        )
    }

    #[tokio::test]
    async fn test_full_pipeline_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new());
        provider.queue_response(PLANNER_REPLY);
        provider.queue_response(REFINER_REPLY);

        let pipeline = pipeline_in(dir.path(), provider.clone());
        let report = pipeline.run(goal()).await.unwrap();

        assert!(report.fully_persisted());
        assert_eq!(report.schedule.subtasks.len(), 4);
        assert_eq!(provider.request_count(), 2);

        let orders: Vec<usize> = report
            .schedule
            .in_execution_order()
            .iter()
            .map(|t| t.order_index)
            .collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);

        // Windows are strictly increasing and contiguous from the start cursor.
        let ordered = report.schedule.in_execution_order();
        assert_eq!(ordered[0].scheduled_start, Some(start()));
        for pair in ordered.windows(2) {
            assert_eq!(pair[1].scheduled_start, pair[0].scheduled_end);
            assert!(pair[1].scheduled_end > pair[1].scheduled_start);
        }

        // The structured file round-trips into an equivalent schedule.
        let loaded = load_schedule(&dir.path().join("schedule.json"))
            .await
            .unwrap();
        assert_eq!(loaded, report.schedule);
        assert!(dir.path().join("schedule.txt").exists());
    }

    #[tokio::test]
    async fn test_cycle_from_refiner_fails_at_refining_stage() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new());
        provider.queue_response(r#"[{"title": "A"}, {"title": "B"}]"#);
        let cyclic = r#"[
            {"id": "task-1", "title": "A", "estimated_duration_minutes": 30, "order_index": 0, "dependencies": ["task-2"]},
            {"id": "task-2", "title": "B", "estimated_duration_minutes": 30, "order_index": 1, "dependencies": ["task-1"]}
        ]"#;
        provider.queue_repeated(cyclic, 3);

        let pipeline = pipeline_in(dir.path(), provider);
        let failure = pipeline.run(goal()).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Refining);
        assert!(matches!(failure.error, Error::Refining(_)));
        assert!(!dir.path().join("schedule.json").exists());
        assert!(!dir.path().join("schedule.txt").exists());
    }

    #[tokio::test]
    async fn test_planner_retry_exhaustion_fails_at_planning_stage() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new());
        provider.queue_repeated("no structure here", 3);

        let pipeline = pipeline_in(dir.path(), provider.clone());
        let failure = pipeline.run(goal()).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Planning);
        assert!(matches!(failure.error, Error::Planning(_)));
        assert_eq!(provider.request_count(), 3);
        assert!(!dir.path().join("schedule.json").exists());
    }

    #[tokio::test]
    async fn test_cancellation_before_run_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new());

        let pipeline = pipeline_in(dir.path(), provider.clone());
        pipeline.cancel_flag().cancel();
        let failure = pipeline.run(goal()).await.unwrap_err();

        assert!(failure.is_cancelled());
        assert_eq!(failure.stage, Stage::Planning);
        assert_eq!(provider.request_count(), 0);
        assert!(!dir.path().join("schedule.json").exists());
    }

    #[tokio::test]
    async fn test_partial_persistence_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new());
        provider.queue_response(PLANNER_REPLY);
        provider.queue_response(REFINER_REPLY);

        let config = PipelineConfig {
            calendar_start: Some(start()),
            structured_path: dir.path().join("schedule.json"),
            // Parent directory missing: this write fails.
            readable_path: dir.path().join("missing").join("schedule.txt"),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(
            provider,
            AgentOptions::default().with_retry_backoff(Duration::ZERO),
            Arc::new(MockCalendar::new()),
            config,
        );

        let report = pipeline.run(goal()).await.unwrap();
        assert!(!report.fully_persisted());
        assert!(!report.persistence.is_total_failure());
        assert_eq!(report.persistence.failures().len(), 1);
        assert!(dir.path().join("schedule.json").exists());
    }
}
