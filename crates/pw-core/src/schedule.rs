//! The domain model: Goal, SubTask, Schedule, and schedule validation.
//!
//! Agent output is untrusted, so everything that enters a `Schedule` goes
//! through `validate()` before the pipeline acts on it. Constructors catch
//! per-field mistakes early; `validate()` is the aggregate-level backstop.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The user-supplied objective. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Result<Self, Error> {
        Self::with_created_at(title, description, Utc::now())
    }

    /// Explicit-timestamp constructor for deterministic tests.
    pub fn with_created_at(
        title: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(Error::validation("goal.title", "must not be empty"));
        }
        Ok(Self {
            title,
            description: description.into(),
            created_at,
        })
    }
}

/// One decomposed unit of work.
///
/// Built incrementally: the planner fills in `id`, `title`, and a provisional
/// `order_index`; the refiner adds `estimated_minutes`, the final ordering,
/// and `dependencies`; the calendar pass adds the scheduled window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub title: String,
    /// Estimated duration in minutes. 0 means "not yet estimated".
    #[serde(rename = "estimated_duration_minutes")]
    pub estimated_minutes: i64,
    pub order_index: usize,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end: Option<DateTime<Utc>>,
}

impl SubTask {
    /// A planner-pass candidate: title only, no estimate, no dependencies.
    pub fn candidate(
        id: impl Into<String>,
        title: impl Into<String>,
        order_index: usize,
    ) -> Result<Self, Error> {
        let id = id.into();
        let title = title.into();
        if title.trim().is_empty() {
            return Err(Error::validation(
                format!("subtask[{id}].title"),
                "must not be empty",
            ));
        }
        Ok(Self {
            id,
            title,
            estimated_minutes: 0,
            order_index,
            dependencies: Vec::new(),
            scheduled_start: None,
            scheduled_end: None,
        })
    }

    /// A fully refined subtask with estimate, order, and dependencies.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        estimated_minutes: i64,
        order_index: usize,
        dependencies: Vec<String>,
    ) -> Result<Self, Error> {
        let mut task = Self::candidate(id, title, order_index)?;
        if estimated_minutes <= 0 {
            return Err(Error::validation(
                format!("subtask[{}].estimated_duration_minutes", task.id),
                format!("must be positive, got {estimated_minutes}"),
            ));
        }
        task.estimated_minutes = estimated_minutes;
        task.dependencies = dependencies;
        Ok(task)
    }

    pub fn is_estimated(&self) -> bool {
        self.estimated_minutes > 0
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.estimated_minutes)
    }
}

/// The validated aggregate of a Goal and its ordered, time-assigned SubTasks.
/// The only entity written externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub goal: Goal,
    pub subtasks: Vec<SubTask>,
    pub generated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(goal: Goal, subtasks: Vec<SubTask>) -> Self {
        Self::with_generated_at(goal, subtasks, Utc::now())
    }

    pub fn with_generated_at(
        goal: Goal,
        subtasks: Vec<SubTask>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            goal,
            subtasks,
            generated_at,
        }
    }

    pub fn task(&self, id: &str) -> Option<&SubTask> {
        self.subtasks.iter().find(|t| t.id == id)
    }

    /// Subtasks sorted by `order_index`.
    pub fn in_execution_order(&self) -> Vec<&SubTask> {
        let mut tasks: Vec<&SubTask> = self.subtasks.iter().collect();
        tasks.sort_by_key(|t| t.order_index);
        tasks
    }
}

/// A single schema/invariant violation found in a Schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation {
            field: err.field,
            reason: err.reason,
        }
    }
}

/// Subtask count policy. The 5-10 range from the product brief is prompt
/// guidance; the hard bounds live here and are configurable.
#[derive(Debug, Clone, Copy)]
pub struct PlanLimits {
    pub min_subtasks: usize,
    pub max_subtasks: usize,
    /// Whether every subtask must carry a positive duration estimate.
    /// Off for the planner pass, on from the refiner pass onward.
    pub require_estimates: bool,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            min_subtasks: 1,
            max_subtasks: 20,
            require_estimates: true,
        }
    }
}

impl PlanLimits {
    /// The same limits, relaxed for planner-pass candidates.
    pub fn candidates(self) -> Self {
        Self {
            require_estimates: false,
            ..self
        }
    }
}

/// Check that no subtask is ordered before any of its dependencies.
///
/// Unresolvable dependency ids are skipped here; referential integrity is
/// reported separately by `validate()`.
pub fn check_order_consistency(subtasks: &[SubTask]) -> Vec<ValidationError> {
    let order_by_id: HashMap<&str, usize> = subtasks
        .iter()
        .map(|t| (t.id.as_str(), t.order_index))
        .collect();

    let mut errors = Vec::new();
    for task in subtasks {
        for dep in &task.dependencies {
            if let Some(&dep_order) = order_by_id.get(dep.as_str()) {
                if dep_order >= task.order_index && dep != &task.id {
                    errors.push(ValidationError::new(
                        format!("subtask[{}].order_index", task.id),
                        format!(
                            "ordered at {} but depends on {dep} ordered at {dep_order}",
                            task.order_index
                        ),
                    ));
                }
            }
        }
    }
    errors
}

/// Validate a Schedule against every structural invariant.
///
/// Pure: returns all violations found rather than failing fast, so retry
/// prompts and logs can name everything that is wrong at once.
pub fn validate(schedule: &Schedule, limits: &PlanLimits) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let subtasks = &schedule.subtasks;
    let n = subtasks.len();

    if n == 0 {
        errors.push(ValidationError::new("subtasks", "must not be empty"));
        return errors;
    }
    if n < limits.min_subtasks || n > limits.max_subtasks {
        errors.push(ValidationError::new(
            "subtasks",
            format!(
                "count {n} outside allowed range {}..={}",
                limits.min_subtasks, limits.max_subtasks
            ),
        ));
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for task in subtasks {
        if !seen_ids.insert(task.id.as_str()) {
            errors.push(ValidationError::new(
                format!("subtask[{}].id", task.id),
                "duplicate id",
            ));
        }
        if task.title.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("subtask[{}].title", task.id),
                "must not be empty",
            ));
        }
        if limits.require_estimates && task.estimated_minutes <= 0 {
            errors.push(ValidationError::new(
                format!("subtask[{}].estimated_duration_minutes", task.id),
                format!("must be positive, got {}", task.estimated_minutes),
            ));
        }
    }

    // order_index must form a permutation of 0..n.
    let mut seen_orders: HashSet<usize> = HashSet::new();
    for task in subtasks {
        if task.order_index >= n {
            errors.push(ValidationError::new(
                format!("subtask[{}].order_index", task.id),
                format!("{} out of range for {n} subtasks", task.order_index),
            ));
        } else if !seen_orders.insert(task.order_index) {
            errors.push(ValidationError::new(
                format!("subtask[{}].order_index", task.id),
                format!("duplicate order_index {}", task.order_index),
            ));
        }
    }

    // Referential integrity of dependency ids.
    let ids: HashSet<&str> = subtasks.iter().map(|t| t.id.as_str()).collect();
    for task in subtasks {
        for dep in &task.dependencies {
            if dep == &task.id {
                errors.push(ValidationError::new(
                    format!("subtask[{}].dependencies", task.id),
                    "depends on itself",
                ));
            } else if !ids.contains(dep.as_str()) {
                errors.push(ValidationError::new(
                    format!("subtask[{}].dependencies", task.id),
                    format!("references unknown subtask {dep}"),
                ));
            }
        }
    }

    errors.extend(find_cycles(subtasks));
    errors.extend(check_order_consistency(subtasks));

    // Scheduled windows, when present, must respect dependency precedence.
    for task in subtasks {
        let Some(start) = task.scheduled_start else {
            continue;
        };
        for dep in &task.dependencies {
            if let Some(dep_end) = schedule.task(dep).and_then(|d| d.scheduled_end) {
                if start < dep_end {
                    errors.push(ValidationError::new(
                        format!("subtask[{}].scheduled_start", task.id),
                        format!("starts before dependency {dep} ends"),
                    ));
                }
            }
        }
    }

    errors
}

/// Cycle detection via Kahn's topological sort: any node left unvisited
/// after the sort sits on a cycle.
fn find_cycles(subtasks: &[SubTask]) -> Vec<ValidationError> {
    let ids: HashSet<&str> = subtasks.iter().map(|t| t.id.as_str()).collect();

    let mut indegree: HashMap<&str, usize> = subtasks.iter().map(|t| (t.id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in subtasks {
        for dep in &task.dependencies {
            // Unknown ids are a referential-integrity error, not a cycle.
            if dep != &task.id && ids.contains(dep.as_str()) {
                *indegree.get_mut(task.id.as_str()).expect("id present") += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(task.id.as_str());
            }
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for &dependent in dependents.get(id).into_iter().flatten() {
            let deg = indegree.get_mut(dependent).expect("id present");
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if visited == subtasks.len() {
        return Vec::new();
    }

    let mut errors: Vec<ValidationError> = subtasks
        .iter()
        .filter(|t| indegree.get(t.id.as_str()).copied().unwrap_or(0) > 0)
        .map(|t| {
            ValidationError::new(
                format!("subtask[{}].dependencies", t.id),
                "part of a dependency cycle",
            )
        })
        .collect();
    errors.sort_by(|a, b| a.field.cmp(&b.field));
    errors
}
