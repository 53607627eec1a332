//! Storage abstractions for Palaver.
//!
//! Defines the key-value store trait plus in-memory implementations of every
//! storage port, used by tests and by hosts that do not need durability.

pub mod kv_store;
pub mod memory;
