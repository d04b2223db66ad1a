//! Planner agent: decomposes a goal into candidate subtasks.

use std::sync::Arc;

use tracing::info;

use pw_core::{Error, Goal, Message, Provider, SubTask};

use crate::parse::parse_planned_candidates;
use crate::retry::call_with_repair;
use crate::AgentOptions;

const SYSTEM_PROMPT: &str = r#"You are an expert project planner. You break a high-level user goal into clear, atomic subtasks suitable for execution and scheduling. You think in terms of concrete steps with clear outcomes and never skip obvious prerequisites.

Respond with ONLY a JSON array of objects, each with a single "title" field:

[
  {"title": "First concrete action for this goal"},
  {"title": "Second concrete action"}
]

Rules:
- Aim for 5-10 subtasks.
- Each title is one specific, actionable step for THIS exact goal.
- No generic project-planning advice, no prose, no fields other than "title"."#;

pub struct PlannerAgent {
    provider: Arc<dyn Provider>,
    options: AgentOptions,
}

impl PlannerAgent {
    pub fn new(provider: Arc<dyn Provider>, options: AgentOptions) -> Self {
        Self { provider, options }
    }

    /// Decompose a goal into candidate subtasks (title only, ids and
    /// provisional order assigned positionally).
    pub async fn plan(&self, goal: &Goal) -> Result<Vec<SubTask>, Error> {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "Goal title: {}\nGoal description: {}\n\n\
                 Break this goal into concrete subtasks specific to achieving it.",
                goal.title, goal.description
            )),
        ];

        let limits = self.options.limits;
        let candidates = call_with_repair(
            "planner",
            self.provider.as_ref(),
            &self.options,
            &messages,
            |text| {
                let candidates = parse_planned_candidates(text)?;
                let n = candidates.len();
                if n < limits.min_subtasks || n > limits.max_subtasks {
                    return Err(Error::validation(
                        "subtasks",
                        format!(
                            "count {n} outside allowed range {}..={}",
                            limits.min_subtasks, limits.max_subtasks
                        ),
                    ));
                }
                Ok(candidates)
            },
            Error::Planning,
        )
        .await?;

        info!(goal = %goal.title, count = candidates.len(), "planner produced candidates");
        Ok(candidates)
    }
}
