//! Refiner agent: turns candidate subtasks into a fully populated plan.
//!
//! The refiner assigns realistic duration estimates, fixes the execution
//! order, and resolves dependencies. Its output is held to the full set of
//! schedule invariants before control returns to the orchestrator: a reply
//! with a dependency cycle, inconsistent ordering, or a non-positive
//! duration is rejected and re-prompted, never silently repaired.

use std::sync::Arc;

use tracing::info;

use pw_core::{validate, Error, Goal, Message, Provider, Schedule, SubTask};

use crate::parse::{candidate_payload, parse_refined_subtasks};
use crate::retry::call_with_repair;
use crate::AgentOptions;

const SYSTEM_PROMPT: &str = r#"You are an experienced execution-focused project manager. You know how long realistic tasks take and how to order them for flow. You receive a goal and a list of candidate subtasks; you refine them with time estimates, a logical execution order, and dependencies.

Respond with ONLY a JSON array where each element has exactly these fields:

[
  {
    "id": "task-1",
    "title": "The subtask title",
    "estimated_duration_minutes": 60,
    "order_index": 0,
    "dependencies": []
  }
]

Rules:
- Keep the candidate ids you were given.
- estimated_duration_minutes is a positive integer.
- order_index values are 0-based and contiguous: each of 0..N-1 exactly once.
- dependencies lists ids that must finish before the task starts; a task is
  never ordered before one of its dependencies, and there are no cycles.
- No prose, no markdown, nothing outside the JSON array."#;

pub struct RefinerAgent {
    provider: Arc<dyn Provider>,
    options: AgentOptions,
}

impl RefinerAgent {
    pub fn new(provider: Arc<dyn Provider>, options: AgentOptions) -> Self {
        Self { provider, options }
    }

    /// Refine candidates into subtasks with estimates, order, and
    /// dependencies, verified against every schedule invariant.
    pub async fn refine(
        &self,
        goal: &Goal,
        candidates: &[SubTask],
    ) -> Result<Vec<SubTask>, Error> {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "Goal title: {}\nGoal description: {}\n\nCandidate subtasks:\n{}",
                goal.title,
                goal.description,
                candidate_payload(candidates)
            )),
        ];

        let limits = self.options.limits;
        let check_goal = goal.clone();
        let refined = call_with_repair(
            "refiner",
            self.provider.as_ref(),
            &self.options,
            &messages,
            move |text| {
                let subtasks = parse_refined_subtasks(text)?;
                // Full invariant check before handing back to the
                // orchestrator, so invalid output rides the retry path.
                let draft = Schedule::new(check_goal.clone(), subtasks);
                let errors = validate(&draft, &limits);
                if errors.is_empty() {
                    return Ok(draft.subtasks);
                }
                let summary = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(Error::validation("schedule", summary))
            },
            Error::Refining,
        )
        .await?;

        info!(goal = %goal.title, count = refined.len(), "refiner produced estimates and ordering");
        Ok(refined)
    }
}
