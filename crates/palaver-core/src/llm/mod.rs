//! LLM provider abstractions for Palaver.
//!
//! - `LlmProvider`: trait for concrete streaming backends
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `ScriptedProvider`: replays a fixed event script

pub mod box_provider;
pub mod provider;
pub mod scripted;
