//! pw-providers: reasoning backend implementations for planwise
//!
//! This crate provides implementations of the Provider trait for
//! OpenAI-compatible chat completion APIs (Groq being the default backend).

pub mod openai;

pub use openai::OpenAIProvider;
