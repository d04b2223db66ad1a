//! pw-agents: the two reasoning-backed stages of planwise.
//!
//! This crate provides:
//! - `PlannerAgent`: decomposes a goal into candidate subtasks
//! - `RefinerAgent`: adds duration estimates, ordering, and dependencies
//! - `Pipeline`: sequences planner -> refiner -> calendar -> persistence,
//!   owns the validation policy, and checks for cancellation between stages
//!
//! Both agents treat the backend as an untrusted producer: every response
//! passes through a strict parse-and-validate step, with bounded retry and
//! corrective re-prompting on failure.

mod parse;
mod retry;

pub mod pipeline;
pub mod planner;
pub mod refiner;

pub use parse::{extract_json_block, parse_planned_candidates, parse_refined_subtasks};
pub use pipeline::{CancelFlag, Pipeline, PipelineConfig, PipelineReport, Stage, StageFailure};
pub use planner::PlannerAgent;
pub use refiner::RefinerAgent;

use std::time::Duration;

use pw_core::PlanLimits;

/// Shared knobs for both agents. Passed in explicitly so tests can run with
/// stub backends, zero backoff, and tight timeouts.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Maximum backend attempts per agent call, including the first.
    pub max_attempts: u32,
    /// Deadline for a single backend call.
    pub request_timeout: Duration,
    /// Base delay before a retry; doubles with each further attempt.
    pub retry_backoff: Duration,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub limits: PlanLimits,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(500),
            model: None,
            temperature: None,
            limits: PlanLimits::default(),
        }
    }
}

impl AgentOptions {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_limits(mut self, limits: PlanLimits) -> Self {
        self.limits = limits;
        self
    }
}
