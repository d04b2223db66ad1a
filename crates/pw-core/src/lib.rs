//! pw-core: Core types and traits for planwise
//!
//! This crate provides the foundational pieces of the planning pipeline:
//! the domain model (Goal, SubTask, Schedule) with its validation rules,
//! the error taxonomy, the chat completion types and `Provider` trait,
//! the calendar assignment contract, and asynchronous schedule persistence.

pub mod calendar;
pub mod error;
pub mod message;
pub mod persist;
pub mod provider;
pub mod schedule;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use calendar::{Calendar, MockCalendar};
pub use error::Error;
pub use message::{Message, Role};
pub use persist::{load_schedule, persist_schedule, render_readable, PersistOutcome};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, Usage};
pub use schedule::{
    check_order_consistency, validate, Goal, PlanLimits, Schedule, SubTask, ValidationError,
};

pub type Result<T> = std::result::Result<T, Error>;
