//! Infrastructure layer for Palaver.
//!
//! Contains implementations of the repository traits defined in `palaver-core`:
//! SQLite storage, the OpenAI-compatible streaming provider, data directory
//! resolution, and `config.toml` loading.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod sqlite;
