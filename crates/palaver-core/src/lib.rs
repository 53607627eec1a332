//! Chat session engine components and repository trait definitions for Palaver.
//!
//! This crate defines the "ports" (repository and provider traits) that the
//! infrastructure layer implements, plus the components built on them. It
//! depends only on `palaver-types` -- never on `palaver-infra` or any
//! database/IO crate.

pub mod chat;
pub mod context;
pub mod identity;
pub mod llm;
pub mod storage;
pub mod usage;
