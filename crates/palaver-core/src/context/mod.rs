//! Best-effort per-(bot, client) conversational context.

pub mod manager;
pub mod repository;
