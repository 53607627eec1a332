//! Shared domain types for Palaver.
//!
//! This crate contains the core domain types used across the Palaver chat
//! engine: chat messages and records, session identities, per-client context,
//! usage quotas, LLM streaming shapes, configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod bot;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod llm;
pub mod usage;
